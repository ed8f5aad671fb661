//! Playback controller: the step counter, its rate, and the Stopped/Running
//! state machine.
//!
//! ```text
//! Stopped --start--> Running
//! Running --stop | reach boundary | replay failure--> Stopped
//! Stopped --seek--> Stopped        Running --seek--> Running
//! Running --set_rate--> Running
//! ```
//!
//! The controller is single-writer: every operation takes `&mut self`, so a
//! tick's read-replay-write of the step can never interleave with a seek.
//! Callers that share it across threads put it behind one mutex
//! (see `SharedPlayback`).

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::engine::{Scene, replay};
use crate::error::{ReplayError, ReplayResult};
use crate::frame::{FrameStore, Snapshot};

use super::ticker::Ticker;

pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(20);

/// Slack, in steps, when truncating the accumulator. Absorbs float error
/// from summing periods like 0.02 so that 50 of them make exactly one step.
const ACCUMULATOR_SLACK: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackOptions {
    pub tick_period: Duration,
    /// Steps per second. Negative plays backwards.
    pub rate: f64,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        PlaybackOptions {
            tick_period: DEFAULT_TICK_PERIOD,
            rate: 1.0,
        }
    }
}

#[derive(Debug, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Running(Ticker),
}

impl PlaybackState {
    pub fn is_running(&self) -> bool {
        matches!(self, PlaybackState::Running(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Stopped,
    Running,
}

/// What a status display needs, as a value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackStatus {
    pub group_id: String,
    pub state: RunState,
    pub step: usize,
    pub total_steps: usize,
    pub rate: f64,
    pub time: f64,
    pub failure: Option<String>,
}

#[derive(Debug)]
pub struct PlaybackController {
    scene: Arc<Scene>,
    store: FrameStore,
    step: usize,
    rate: f64,
    accumulator: f64,
    tick_period: Duration,
    state: PlaybackState,
    failure: Option<ReplayError>,
}

impl PlaybackController {
    pub fn new(scene: Arc<Scene>, options: PlaybackOptions) -> Self {
        let store = scene.working_store();
        PlaybackController {
            scene,
            store,
            step: 0,
            rate: if options.rate.is_finite() { options.rate } else { 1.0 },
            accumulator: 0.0,
            tick_period: options.tick_period,
            state: PlaybackState::Stopped,
            failure: None,
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn failure(&self) -> Option<&ReplayError> {
        self.failure.as_ref()
    }

    /// Read-only view of the working frame.
    pub fn store(&self) -> &FrameStore {
        &self.store
    }

    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    pub fn status(&self) -> PlaybackStatus {
        PlaybackStatus {
            group_id: self.scene.group_id().to_string(),
            state: if self.is_running() {
                RunState::Running
            } else {
                RunState::Stopped
            },
            step: self.step,
            total_steps: self.scene.max_step(),
            rate: self.rate,
            time: self.store.time(),
            failure: self.failure.as_ref().map(ToString::to_string),
        }
    }

    /// Stopped -> Running. Returns whether playback is running afterwards.
    ///
    /// Refused after a replay failure, and when already at the boundary the
    /// rate is heading towards.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.is_running() {
            return true;
        }
        if let Some(err) = &self.failure {
            warn!(%err, "not starting: working frame is corrupt, reset first");
            return false;
        }
        if self.at_boundary() {
            debug!(step = self.step, rate = self.rate, "not starting: already at boundary");
            return false;
        }
        self.accumulator = 0.0;
        self.state = PlaybackState::Running(Ticker::start(self.tick_period, now));
        info!(group = self.scene.group_id(), step = self.step, rate = self.rate, "playback started");
        true
    }

    /// Running -> Stopped. Drops the ticker; no tick fires afterwards.
    pub fn stop(&mut self) {
        if let PlaybackState::Running(_) = std::mem::take(&mut self.state) {
            info!(group = self.scene.group_id(), step = self.step, "playback stopped");
        }
    }

    pub fn toggle(&mut self, now: Instant) -> bool {
        if self.is_running() {
            self.stop();
            false
        } else {
            self.start(now)
        }
    }

    /// Rate for subsequent ticks. Non-finite rates are ignored.
    ///
    /// Running playback stops if the new rate leaves it at a boundary.
    pub fn set_rate(&mut self, rate: f64) {
        if !rate.is_finite() {
            warn!(rate, "ignoring non-finite playback rate");
            return;
        }
        self.rate = rate;
        self.stop_at_boundary();
    }

    /// Time until the next tick is due, or `None` when stopped.
    pub fn time_until_tick(&self, now: Instant) -> Option<Duration> {
        match &self.state {
            PlaybackState::Running(ticker) => Some(ticker.time_until_next(now)),
            PlaybackState::Stopped => None,
        }
    }

    /// Fire every tick that is due by `now`. Returns the number fired.
    pub fn pump(&mut self, now: Instant) -> ReplayResult<u32> {
        let due = match &mut self.state {
            PlaybackState::Running(ticker) => ticker.due(now),
            PlaybackState::Stopped => return Ok(0),
        };
        let mut fired = 0;
        for _ in 0..due {
            if !self.is_running() {
                break;
            }
            self.tick()?;
            fired += 1;
        }
        Ok(fired)
    }

    /// One fixed-period tick. Returns whether the step changed.
    ///
    /// The fractional accumulator gains `rate * period`; its whole part is
    /// the step delta and only the remainder carries over, so the long-run
    /// step rate equals `rate` exactly. A zero delta makes no replay call.
    pub fn tick(&mut self) -> ReplayResult<bool> {
        if !self.is_running() {
            return Ok(false);
        }
        self.accumulator += self.rate * self.tick_period.as_secs_f64();
        let delta = (self.accumulator + ACCUMULATOR_SLACK.copysign(self.accumulator)).trunc();
        self.accumulator -= delta;
        if delta == 0.0 {
            return Ok(false);
        }

        let from = self.step;
        let target = (from as f64 + delta).clamp(0.0, self.scene.last_step() as f64) as usize;
        self.replay_to(target)?;
        self.stop_at_boundary();
        Ok(self.step != from)
    }

    /// Jump straight to `step` (clamped) in one replay. Keeps the run state
    /// and the accumulator, unless the jump lands on the boundary the rate
    /// is heading towards: then playback stops.
    pub fn seek(&mut self, step: i64) -> ReplayResult<usize> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        let target = self.clamp_step(step);
        self.replay_to(target)?;
        self.stop_at_boundary();
        Ok(self.step)
    }

    pub fn step_by(&mut self, delta: i64) -> ReplayResult<usize> {
        self.seek((self.step as i64).saturating_add(delta))
    }

    pub fn seek_start(&mut self) -> ReplayResult<usize> {
        self.seek(0)
    }

    pub fn seek_end(&mut self) -> ReplayResult<usize> {
        self.seek(self.scene.last_step() as i64)
    }

    /// Discard the working frame and any failure; back to step 0, stopped.
    pub fn reset(&mut self) {
        self.stop();
        self.store = self.scene.working_store();
        self.step = 0;
        self.accumulator = 0.0;
        self.failure = None;
    }

    fn clamp_step(&self, step: i64) -> usize {
        step.clamp(0, self.scene.last_step() as i64) as usize
    }

    /// A zero rate counts as heading forwards.
    fn at_boundary(&self) -> bool {
        (self.rate >= 0.0 && self.step == self.scene.last_step()) || (self.rate < 0.0 && self.step == 0)
    }

    fn stop_at_boundary(&mut self) {
        if self.is_running() && self.at_boundary() {
            debug!(step = self.step, rate = self.rate, "reached boundary");
            self.stop();
        }
    }

    fn replay_to(&mut self, target: usize) -> ReplayResult<()> {
        match replay(&mut self.store, self.scene.transitions(), self.step, target) {
            Ok(reached) => {
                self.step = reached;
                Ok(())
            }
            Err(err) => {
                error!(%err, from = self.step, to = target, "replay failed, stopping playback");
                self.stop();
                self.failure = Some(err.clone());
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Circle, CirclePatch, Element, ElementDiff, ElementPatch, FrameData, GraphicData, Transition};

    fn move_x(x: f64) -> ElementDiff {
        ElementDiff::Update(ElementPatch::Circle(CirclePatch {
            uid: "C1".into(),
            x: Some(x),
            ..Default::default()
        }))
    }

    /// `steps` steps; C1 sits at x = step.
    fn scene(steps: usize) -> Arc<Scene> {
        let circle = Element::Circle(Circle {
            uid: "C1".into(),
            name: None,
            color: None,
            x: 0.0,
            y: 0.0,
            r: 1.0,
            z: 0.0,
            theta: 0.0,
        });
        let transitions = (0..steps)
            .map(|i| Transition {
                time: i as f64 * 0.5,
                next: if i + 1 < steps { vec![move_x((i + 1) as f64)] } else { vec![] },
                prev: if i > 0 { vec![move_x((i - 1) as f64)] } else { vec![] },
            })
            .collect();
        let initial = FrameData {
            time: 0.0,
            elems: vec![circle],
        };
        let graphic = GraphicData {
            final_frame: initial.clone(),
            initial,
            transitions,
        };
        Arc::new(Scene::load("group0", graphic).unwrap())
    }

    fn controller(steps: usize, rate: f64) -> PlaybackController {
        PlaybackController::new(
            scene(steps),
            PlaybackOptions {
                tick_period: DEFAULT_TICK_PERIOD,
                rate,
            },
        )
    }

    fn x(ctrl: &PlaybackController) -> f64 {
        match ctrl.store().get(&"C1".into()) {
            Some(Element::Circle(c)) => c.x,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn starts_stopped_at_step_zero() {
        let ctrl = controller(10, 1.0);
        let status = ctrl.status();
        assert_eq!(status.state, RunState::Stopped);
        assert_eq!(status.step, 0);
        assert_eq!(status.total_steps, 10);
        assert_eq!(status.rate, 1.0);
        assert_eq!(status.failure, None);
    }

    #[test]
    fn one_step_per_second_takes_fifty_ticks() {
        let mut ctrl = controller(10, 1.0);
        assert!(ctrl.start(Instant::now()));
        let mut moved = 0;
        for _ in 0..49 {
            if ctrl.tick().unwrap() {
                moved += 1;
            }
        }
        assert_eq!(moved, 0);
        assert!(ctrl.tick().unwrap());
        assert_eq!(ctrl.step(), 1);
        assert_eq!(x(&ctrl), 1.0);
        assert_eq!(ctrl.store().time(), 0.5);
    }

    #[test]
    fn fractional_rate_does_not_drift() {
        let mut ctrl = controller(1000, 7.3);
        ctrl.start(Instant::now());
        // 10 seconds of ticks
        for _ in 0..500 {
            ctrl.tick().unwrap();
        }
        assert_eq!(ctrl.step(), 73);
    }

    #[test]
    fn fast_rate_moves_several_steps_per_tick() {
        let mut ctrl = controller(100, 250.0);
        ctrl.start(Instant::now());
        ctrl.tick().unwrap();
        assert_eq!(ctrl.step(), 5);
        assert_eq!(x(&ctrl), 5.0);
    }

    #[test]
    fn auto_stops_at_last_step() {
        let mut ctrl = controller(4, 100.0);
        ctrl.start(Instant::now());
        ctrl.tick().unwrap();
        assert_eq!(ctrl.step(), 2);
        assert!(ctrl.is_running());
        ctrl.tick().unwrap();
        assert_eq!(ctrl.step(), 3);
        assert!(!ctrl.is_running());
        assert_eq!(ctrl.status().state, RunState::Stopped);
        // further ticks do nothing
        assert!(!ctrl.tick().unwrap());
        assert_eq!(ctrl.step(), 3);
    }

    #[test]
    fn reverse_playback_stops_at_zero() {
        let mut ctrl = controller(10, 100.0);
        ctrl.seek(3).unwrap();
        ctrl.set_rate(-100.0);
        assert!(ctrl.start(Instant::now()));
        ctrl.tick().unwrap();
        assert_eq!(ctrl.step(), 1);
        ctrl.tick().unwrap();
        assert_eq!(ctrl.step(), 0);
        assert_eq!(x(&ctrl), 0.0);
        assert!(!ctrl.is_running());
    }

    #[test]
    fn start_at_boundary_stays_stopped() {
        let mut ctrl = controller(5, 1.0);
        ctrl.seek_end().unwrap();
        assert!(!ctrl.start(Instant::now()));
        assert!(!ctrl.is_running());

        ctrl.set_rate(-1.0);
        assert!(ctrl.start(Instant::now()));
    }

    #[test]
    fn seek_clamps_and_jumps() {
        let mut ctrl = controller(10, 1.0);
        assert_eq!(ctrl.seek(7).unwrap(), 7);
        assert_eq!(x(&ctrl), 7.0);
        assert_eq!(ctrl.seek(42).unwrap(), 9);
        assert_eq!(ctrl.seek(-5).unwrap(), 0);
        assert_eq!(x(&ctrl), 0.0);
        assert_eq!(ctrl.step_by(3).unwrap(), 3);
        assert_eq!(ctrl.step_by(-1).unwrap(), 2);
    }

    #[test]
    fn seek_keeps_running_state_and_accumulator() {
        let mut ctrl = controller(100, 1.0);
        ctrl.start(Instant::now());
        for _ in 0..30 {
            ctrl.tick().unwrap();
        }
        ctrl.seek(10).unwrap();
        assert!(ctrl.is_running());
        // 20 more ticks complete the second begun before the seek
        for _ in 0..20 {
            ctrl.tick().unwrap();
        }
        assert_eq!(ctrl.step(), 11);
    }

    #[test]
    fn huge_rate_jumps_to_the_end() {
        let mut ctrl = controller(10, 1e21);
        ctrl.seek(3).unwrap();
        assert!(ctrl.start(Instant::now()));
        assert!(ctrl.tick().unwrap());
        assert_eq!(ctrl.step(), 9);
        assert_eq!(x(&ctrl), 9.0);
        assert!(!ctrl.is_running());

        ctrl.set_rate(-1e21);
        assert!(ctrl.start(Instant::now()));
        ctrl.tick().unwrap();
        assert_eq!(ctrl.step(), 0);
    }

    #[test]
    fn step_by_saturates() {
        let mut ctrl = controller(10, 1.0);
        ctrl.seek(3).unwrap();
        assert_eq!(ctrl.step_by(i64::MAX).unwrap(), 9);
        assert_eq!(ctrl.step_by(i64::MIN).unwrap(), 0);
    }

    #[test]
    fn seek_to_end_while_running_stops_at_once() {
        let mut ctrl = controller(10, 1.0);
        assert!(ctrl.start(Instant::now()));
        assert_eq!(ctrl.seek(9).unwrap(), 9);
        assert!(!ctrl.is_running());
        assert_eq!(ctrl.status().state, RunState::Stopped);
        assert!(!ctrl.tick().unwrap());
    }

    #[test]
    fn seek_to_start_while_reversing_stops_at_once() {
        let mut ctrl = controller(10, -1.0);
        ctrl.seek(5).unwrap();
        assert!(ctrl.start(Instant::now()));
        ctrl.seek(0).unwrap();
        assert!(!ctrl.is_running());
    }

    #[test]
    fn zero_rate_at_last_step_is_terminal() {
        let mut ctrl = controller(10, 0.0);
        assert!(ctrl.start(Instant::now()));
        ctrl.tick().unwrap();
        assert!(ctrl.is_running());
        ctrl.seek_end().unwrap();
        assert!(!ctrl.is_running());
        assert!(!ctrl.start(Instant::now()));
    }

    #[test]
    fn rate_change_into_a_boundary_stops() {
        let mut ctrl = controller(10, -1.0);
        ctrl.seek_end().unwrap();
        assert!(ctrl.start(Instant::now()));
        ctrl.set_rate(0.0);
        assert!(!ctrl.is_running());
    }

    #[test]
    fn rate_change_does_not_replay() {
        let mut ctrl = controller(10, 1.0);
        ctrl.set_rate(50.0);
        assert_eq!(ctrl.step(), 0);
        ctrl.set_rate(f64::NAN);
        assert_eq!(ctrl.rate(), 50.0);
    }

    #[test]
    fn stop_discards_the_ticker() {
        let mut ctrl = controller(10, 1.0);
        let now = Instant::now();
        ctrl.start(now);
        assert!(ctrl.time_until_tick(now).is_some());
        assert!(!ctrl.toggle(now));
        assert_eq!(ctrl.time_until_tick(now), None);
        assert_eq!(ctrl.pump(now + Duration::from_secs(5)).unwrap(), 0);
    }

    #[test]
    fn pump_fires_due_ticks() {
        let mut ctrl = controller(100, 50.0);
        let t0 = Instant::now();
        ctrl.start(t0);
        assert_eq!(ctrl.pump(t0 + Duration::from_millis(100)).unwrap(), 5);
        assert_eq!(ctrl.step(), 5);
    }

    #[test]
    fn pump_stops_firing_after_auto_stop() {
        let mut ctrl = controller(3, 50.0);
        let t0 = Instant::now();
        ctrl.start(t0);
        assert_eq!(ctrl.pump(t0 + Duration::from_millis(200)).unwrap(), 2);
        assert_eq!(ctrl.step(), 2);
        assert!(!ctrl.is_running());
    }

    #[test]
    fn replay_failure_stops_and_is_reported() {
        let mut graphic = scene(5).to_graphic();
        graphic.transitions[2].next = vec![ElementDiff::delete("ghost".into(), crate::types::ElementKind::Circle)];
        let scene = Arc::new(Scene::load("broken", graphic).unwrap());
        let mut ctrl = PlaybackController::new(
            scene,
            PlaybackOptions {
                tick_period: DEFAULT_TICK_PERIOD,
                rate: 50.0,
            },
        );

        ctrl.start(Instant::now());
        ctrl.tick().unwrap();
        ctrl.tick().unwrap();
        let err = ctrl.tick().unwrap_err();
        assert_eq!(err, ReplayError::UnknownElement("ghost".into()));
        assert!(!ctrl.is_running());
        assert_eq!(ctrl.step(), 2);
        assert!(ctrl.status().failure.unwrap().contains("ghost"));

        assert!(!ctrl.start(Instant::now()));
        assert_eq!(ctrl.seek(0).unwrap_err(), err);

        ctrl.reset();
        assert_eq!(ctrl.step(), 0);
        assert!(ctrl.failure().is_none());
        assert_eq!(x(&ctrl), 0.0);
    }
}
