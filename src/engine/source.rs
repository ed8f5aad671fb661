//! Source recording types: the raw input the recorder compiles.
//!
//! A source is a flat list of timed patches: "at time t, element X looks like
//! this" or "at time t, element X is gone". Elements are identified by kind
//! and name; UIDs are assigned by the recorder, so any `UID` in a source
//! element is ignored.

use serde::{Deserialize, Serialize};

use crate::types::{DEFAULT_GROUP, Element, ElementKey};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceRecording {
    pub patches: Vec<SourcePatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePatch {
    pub time: f64,
    #[serde(rename = "groupID", default = "default_group")]
    pub group_id: String,
    #[serde(flatten)]
    pub action: PatchAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchAction {
    /// Full element state at this time.
    Elem(Element),
    /// The element stops existing at this time.
    Remove(ElementKey),
}

fn default_group() -> String {
    DEFAULT_GROUP.to_string()
}

impl SourcePatch {
    pub fn put(time: f64, elem: Element) -> Self {
        SourcePatch {
            time,
            group_id: default_group(),
            action: PatchAction::Elem(elem),
        }
    }

    pub fn remove(time: f64, key: ElementKey) -> Self {
        SourcePatch {
            time,
            group_id: default_group(),
            action: PatchAction::Remove(key),
        }
    }

    pub fn in_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = group_id.into();
        self
    }

    pub fn key(&self) -> ElementKey {
        match &self.action {
            PatchAction::Elem(elem) => elem.key(),
            PatchAction::Remove(key) => key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ElementKind;
    use serde_json::json;

    #[test]
    fn parses_elem_and_remove_patches() {
        let source: SourceRecording = serde_json::from_value(json!({
            "patches": [
                {"time": 0, "elem": {"elemType": "Rect", "name": "box", "x": 0, "y": 0, "w": 4, "h": 2}},
                {"time": 2, "groupID": "other", "remove": {"elemType": "Rect", "name": "box"}}
            ]
        }))
        .unwrap();

        assert_eq!(source.patches.len(), 2);
        assert_eq!(source.patches[0].group_id, DEFAULT_GROUP);
        assert!(matches!(source.patches[0].action, PatchAction::Elem(_)));
        assert_eq!(source.patches[1].group_id, "other");
        assert_eq!(
            source.patches[1].key(),
            ElementKey {
                kind: ElementKind::Rect,
                name: Some("box".into())
            }
        );
        assert_eq!(source.patches[0].key(), source.patches[1].key());
    }
}
