//! Offline check of a recording's producer contract.
//!
//! Replay itself trusts the log. This walks it once, step by step, and
//! reports every place where `prev` fails to undo `next` or where the end of
//! the log disagrees with the recorded final frame.

use std::fmt;

use crate::error::ReplayError;

use super::{Scene, replay};

#[derive(Debug, Clone, PartialEq)]
pub enum Problem {
    /// Replaying across `step -> step + 1` (or back) failed outright.
    ReplayFailed { step: usize, error: ReplayError },
    /// `next` of `step` followed by `prev` of `step + 1` did not restore the
    /// frame at `step`.
    RoundTrip { step: usize },
    /// Replaying the whole log does not reproduce the final frame.
    FinalMismatch,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Problem::ReplayFailed { step, error } => write!(f, "step {step}: replay failed: {error}"),
            Problem::RoundTrip { step } => {
                write!(f, "step {step}: prev of step {} does not undo next", step + 1)
            }
            Problem::FinalMismatch => f.write_str("replaying the log does not reach the final frame"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerifyReport {
    pub steps: usize,
    pub problems: Vec<Problem>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

pub fn verify(scene: &Scene) -> VerifyReport {
    let transitions = scene.transitions();
    let mut problems = Vec::new();
    let mut store = scene.working_store();

    for step in 0..scene.last_step() {
        let before = store.clone();
        if let Err(error) = replay(&mut store, transitions, step, step + 1) {
            problems.push(Problem::ReplayFailed { step, error });
            return VerifyReport {
                steps: scene.max_step(),
                problems,
            };
        }
        let after = store.clone();

        match replay(&mut store, transitions, step + 1, step) {
            Ok(_) if store.same_elements(&before) => {}
            Ok(_) => problems.push(Problem::RoundTrip { step }),
            Err(error) => problems.push(Problem::ReplayFailed { step, error }),
        }
        store = after;
    }

    if !store.same_elements(scene.final_frame()) {
        problems.push(Problem::FinalMismatch);
    }

    VerifyReport {
        steps: scene.max_step(),
        problems,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scene(prev_x: f64, final_x: f64) -> Scene {
        let graphic = serde_json::from_value(json!({
            "initial": {"time": 0, "elems": [
                {"UID": "C1", "elemType": "Circle", "x": 0, "y": 0, "r": 5}
            ]},
            "final": {"time": 1, "elems": [
                {"UID": "C1", "elemType": "Circle", "x": final_x, "y": 0, "r": 5}
            ]},
            "transitions": [
                {"time": 0, "next": [{"diffType": "Update", "elemType": "Circle", "UID": "C1", "x": 10}]},
                {"time": 1, "prev": [{"diffType": "Update", "elemType": "Circle", "UID": "C1", "x": prev_x}]}
            ]
        }))
        .unwrap();
        Scene::load("group0", graphic).unwrap()
    }

    #[test]
    fn consistent_scene_passes() {
        let report = verify(&scene(0.0, 10.0));
        assert!(report.is_ok(), "{:?}", report.problems);
        assert_eq!(report.steps, 2);
    }

    #[test]
    fn bad_prev_and_final_are_reported() {
        let report = verify(&scene(3.0, 11.0));
        assert_eq!(
            report.problems,
            [Problem::RoundTrip { step: 0 }, Problem::FinalMismatch]
        );
    }

    #[test]
    fn replay_failure_stops_the_walk() {
        let graphic = serde_json::from_value(json!({
            "initial": {"time": 0, "elems": []},
            "final": {"time": 1, "elems": []},
            "transitions": [
                {"time": 0, "next": [{"diffType": "Delete", "UID": "ghost"}]},
                {"time": 1}
            ]
        }))
        .unwrap();
        let report = verify(&Scene::load("group0", graphic).unwrap());
        assert!(matches!(
            report.problems.as_slice(),
            [Problem::ReplayFailed { step: 0, .. }]
        ));
    }
}
