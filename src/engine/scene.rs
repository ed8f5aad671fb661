use std::sync::Arc;

use tracing::debug;

use crate::error::{ReplayError, ReplayResult};
use crate::frame::FrameStore;
use crate::types::{ElementDiff, GraphicData, Recording, Transition};

/// A validated recording. Immutable once loaded; the transition log is only
/// ever indexed.
#[derive(Debug, Clone)]
pub struct Scene {
    group_id: String,
    initial: FrameStore,
    final_frame: FrameStore,
    transitions: Vec<Transition>,
}

impl Scene {
    /// Validate a parsed graphic. No partial scene is produced on failure.
    pub fn load(group_id: impl Into<String>, graphic: GraphicData) -> ReplayResult<Self> {
        let group_id = group_id.into();
        if graphic.transitions.is_empty() {
            return Err(ReplayError::malformed(format!(
                "scene {group_id} has no transitions"
            )));
        }
        let initial = FrameStore::from_frame(&graphic.initial)?;
        let final_frame = FrameStore::from_frame(&graphic.final_frame)?;

        for (step, transition) in graphic.transitions.iter().enumerate() {
            let diffs = transition.next.iter().chain(transition.prev.iter());
            if let Some(bad) = diffs.map(ElementDiff::uid).find(|uid| uid.is_empty()) {
                return Err(ReplayError::malformed(format!(
                    "scene {group_id}: diff without a UID at step {step} ({bad:?})"
                )));
            }
        }

        debug!(
            group = %group_id,
            steps = graphic.transitions.len(),
            elements = initial.len(),
            "scene loaded"
        );
        Ok(Scene {
            group_id,
            initial,
            final_frame,
            transitions: graphic.transitions,
        })
    }

    /// Every scene in a recording file, in file order.
    pub fn load_all(json: &str) -> ReplayResult<Vec<Arc<Scene>>> {
        let graphics = Recording::from_json(json)?.into_graphics();
        if graphics.is_empty() {
            return Err(ReplayError::malformed("recording contains no graphic"));
        }
        graphics
            .into_iter()
            .map(|(group_id, graphic)| Scene::load(group_id, graphic).map(Arc::new))
            .collect()
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Reference frame at step 0.
    pub fn initial(&self) -> &FrameStore {
        &self.initial
    }

    /// Reference frame at the last step.
    pub fn final_frame(&self) -> &FrameStore {
        &self.final_frame
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Number of transitions; valid steps are `0..max_step()`.
    pub fn max_step(&self) -> usize {
        self.transitions.len()
    }

    pub fn last_step(&self) -> usize {
        self.transitions.len() - 1
    }

    /// Fresh working copy of the initial frame for live playback.
    pub fn working_store(&self) -> FrameStore {
        self.initial.clone()
    }

    pub fn to_graphic(&self) -> GraphicData {
        GraphicData {
            initial: self.initial.to_frame(),
            final_frame: self.final_frame.to_frame(),
            transitions: self.transitions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graphic_json(transitions: serde_json::Value) -> String {
        json!({
            "initial": {"time": 0, "elems": [
                {"UID": "C1", "elemType": "Circle", "x": 0, "y": 0, "r": 5, "color": "#fff"}
            ]},
            "final": {"time": 1, "elems": [
                {"UID": "C1", "elemType": "Circle", "x": 10, "y": 0, "r": 5, "color": "#fff"}
            ]},
            "transitions": transitions
        })
        .to_string()
    }

    #[test]
    fn loads_single_graphic() {
        let json = graphic_json(json!([
            {"time": 0, "next": [{"diffType": "Update", "elemType": "Circle", "UID": "C1", "x": 10}], "prev": []},
            {"time": 1, "next": [], "prev": [{"diffType": "Update", "elemType": "Circle", "UID": "C1", "x": 0}]}
        ]));
        let scenes = Scene::load_all(&json).unwrap();
        assert_eq!(scenes.len(), 1);
        let scene = &scenes[0];
        assert_eq!(scene.group_id(), "group0");
        assert_eq!(scene.max_step(), 2);
        assert_eq!(scene.last_step(), 1);
        assert_eq!(scene.working_store(), *scene.initial());
    }

    #[test]
    fn empty_log_is_malformed() {
        let err = Scene::load_all(&graphic_json(json!([]))).unwrap_err();
        assert!(matches!(err, ReplayError::MalformedScene(_)));
    }

    #[test]
    fn wrong_discriminant_is_malformed() {
        let json = graphic_json(json!([
            {"time": 0, "next": [{"diffType": "Teleport", "elemType": "Circle", "UID": "C1"}], "prev": []}
        ]));
        assert!(matches!(
            Scene::load_all(&json),
            Err(ReplayError::MalformedScene(_))
        ));
    }

    #[test]
    fn diff_without_uid_is_malformed() {
        let json = graphic_json(json!([
            {"time": 0, "next": [{"diffType": "Delete", "UID": ""}], "prev": []}
        ]));
        assert!(matches!(
            Scene::load_all(&json),
            Err(ReplayError::MalformedScene(_))
        ));
    }

    #[test]
    fn grouped_recording_without_graphics_is_malformed() {
        let json = json!([{"groupID": "g", "chart": {"lines": []}}]).to_string();
        assert!(matches!(
            Scene::load_all(&json),
            Err(ReplayError::MalformedScene(_))
        ));
    }
}
