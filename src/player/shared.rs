//! Thread-driven playback.
//!
//! `SharedPlayback` owns a controller behind one mutex and a timer thread
//! that pumps it. Every tick, seek and status read takes the lock, so each
//! is one critical section and readers only ever see whole steps.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error};

use crate::engine::Scene;
use crate::error::ReplayResult;
use crate::frame::Snapshot;

use super::controller::{PlaybackController, PlaybackOptions, PlaybackStatus};

/// Upper bound on one wait of the timer thread.
const MAX_WAIT: Duration = Duration::from_millis(250);

struct TimerThread {
    cancel: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct SharedPlayback {
    controller: Arc<Mutex<PlaybackController>>,
    timer: Option<TimerThread>,
}

impl SharedPlayback {
    pub fn new(scene: Arc<Scene>, options: PlaybackOptions) -> Self {
        SharedPlayback {
            controller: Arc::new(Mutex::new(PlaybackController::new(scene, options))),
            timer: None,
        }
    }

    /// Start playback and its timer thread. Returns whether playback runs.
    pub fn start(&mut self) -> std::io::Result<bool> {
        if self.is_running() {
            return Ok(true);
        }
        // a timer left over from an auto-stop is exiting or gone
        self.cancel_timer();
        let running = lock(&self.controller).start(Instant::now());
        if running && self.timer.is_none() {
            self.timer = Some(spawn_timer(Arc::clone(&self.controller))?);
        }
        Ok(running)
    }

    /// Stop playback. No tick fires after this returns.
    pub fn stop(&mut self) {
        self.cancel_timer();
        lock(&self.controller).stop();
    }

    pub fn set_rate(&self, rate: f64) {
        lock(&self.controller).set_rate(rate);
    }

    pub fn seek(&self, step: i64) -> ReplayResult<usize> {
        lock(&self.controller).seek(step)
    }

    pub fn status(&self) -> PlaybackStatus {
        lock(&self.controller).status()
    }

    pub fn snapshot(&self) -> Snapshot {
        lock(&self.controller).snapshot()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.controller).is_running()
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            // the thread may already have exited; a failed send is fine
            let _ = timer.cancel.send(());
            if timer.handle.join().is_err() {
                error!("playback timer thread panicked");
            }
        }
    }
}

impl Drop for SharedPlayback {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

fn lock(controller: &Mutex<PlaybackController>) -> MutexGuard<'_, PlaybackController> {
    controller.lock().unwrap_or_else(PoisonError::into_inner)
}

fn spawn_timer(controller: Arc<Mutex<PlaybackController>>) -> std::io::Result<TimerThread> {
    let (cancel, cancel_rx) = mpsc::channel::<()>();
    let handle = thread::Builder::new()
        .name("playback-timer".into())
        .spawn(move || {
            loop {
                let wait = match lock(&controller).time_until_tick(Instant::now()) {
                    Some(wait) => wait.min(MAX_WAIT),
                    None => break,
                };
                match cancel_rx.recv_timeout(wait) {
                    Err(RecvTimeoutError::Timeout) => {
                        let mut ctrl = lock(&controller);
                        if let Err(err) = ctrl.pump(Instant::now()) {
                            error!(%err, "playback stopped by replay failure");
                            break;
                        }
                        if !ctrl.is_running() {
                            break;
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            debug!("playback timer exited");
        })?;
    Ok(TimerThread { cancel, handle })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::controller::RunState;
    use crate::types::{FrameData, GraphicData, Transition};

    fn scene(steps: usize) -> Arc<Scene> {
        let graphic = GraphicData {
            initial: FrameData::default(),
            final_frame: FrameData::default(),
            transitions: (0..steps)
                .map(|i| Transition {
                    time: i as f64,
                    ..Transition::default()
                })
                .collect(),
        };
        Arc::new(Scene::load("group0", graphic).unwrap())
    }

    fn options(rate: f64) -> PlaybackOptions {
        PlaybackOptions {
            tick_period: Duration::from_millis(2),
            rate,
        }
    }

    #[test]
    fn runs_to_the_end_and_stops() {
        let mut playback = SharedPlayback::new(scene(5), options(1000.0));
        assert!(playback.start().unwrap());

        let deadline = Instant::now() + Duration::from_secs(5);
        while playback.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let status = playback.status();
        assert_eq!(status.state, RunState::Stopped);
        assert_eq!(status.step, 4);
    }

    #[test]
    fn no_tick_after_stop_returns() {
        let mut playback = SharedPlayback::new(scene(1_000_000), options(500.0));
        assert!(playback.start().unwrap());
        thread::sleep(Duration::from_millis(20));
        playback.stop();

        let stopped_at = playback.status().step;
        thread::sleep(Duration::from_millis(30));
        assert_eq!(playback.status().step, stopped_at);
        assert!(!playback.is_running());
    }

    #[test]
    fn seek_while_running_is_atomic_with_ticks() {
        let mut playback = SharedPlayback::new(scene(1_000_000), options(500.0));
        playback.start().unwrap();
        for target in [10_000, 20_000, 30_000] {
            let reached = playback.seek(target).unwrap();
            assert_eq!(reached, target as usize);
        }
        assert!(playback.status().step >= 30_000);
        playback.stop();
    }

    #[test]
    fn restart_after_auto_stop_spawns_a_new_timer() {
        let mut playback = SharedPlayback::new(scene(3), options(1000.0));
        playback.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while playback.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        playback.set_rate(-1000.0);
        assert!(playback.start().unwrap());
        let deadline = Instant::now() + Duration::from_secs(5);
        while playback.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(playback.status().step, 0);
    }
}
