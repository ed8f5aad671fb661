//! Frame store: one scene state at one point in logical time.
//!
//! The store is the live working copy that replay mutates in place. Readers
//! (rendering, status displays) only ever get a `Snapshot`, an independent
//! value copy, so they never observe a store mid-mutation.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use crate::error::{ReplayError, ReplayResult};
use crate::types::{Element, ElementDiff, ElementKind, FrameData, Uid};

/// View rectangle used when the scene has no camera.
pub const DEFAULT_VIEWPORT: Viewport = Viewport {
    x: 0.0,
    y: 0.0,
    w: 1000.0,
    h: 1000.0,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Viewport {
    /// SVG `viewBox` form: `"x y w h"`.
    pub fn view_box(&self) -> String {
        format!("{} {} {} {}", self.x, self.y, self.w, self.h)
    }
}

/// Read-only copy of a frame handed to rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub time: f64,
    pub elements: BTreeMap<Uid, Element>,
    pub viewport: Viewport,
}

impl Snapshot {
    /// Drawable elements in ascending `z`. Cameras are left out; ties keep
    /// UID order.
    pub fn draw_order(&self) -> Vec<&Element> {
        let mut elems: Vec<&Element> = self
            .elements
            .values()
            .filter(|e| e.kind() != ElementKind::Camera)
            .collect();
        elems.sort_by(|a, b| a.z().total_cmp(&b.z()));
        elems
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStore {
    time: f64,
    elements: BTreeMap<Uid, Element>,
    active_camera: Option<Uid>,
}

impl FrameStore {
    pub fn new(time: f64) -> Self {
        FrameStore {
            time,
            ..Default::default()
        }
    }

    /// Build a store from a wire frame. Duplicate UIDs and more than one
    /// camera make the frame malformed; a single camera becomes active.
    pub fn from_frame(frame: &FrameData) -> ReplayResult<Self> {
        let mut store = FrameStore::new(frame.time);
        for elem in &frame.elems {
            if elem.uid().is_empty() {
                return Err(ReplayError::malformed(format!(
                    "{} element without a UID",
                    elem.kind()
                )));
            }
            if elem.kind() == ElementKind::Camera {
                if let Some(existing) = &store.active_camera {
                    return Err(ReplayError::malformed(format!(
                        "frame has more than one camera: {existing} and {}",
                        elem.uid()
                    )));
                }
                store.active_camera = Some(elem.uid().clone());
            }
            if store
                .elements
                .insert(elem.uid().clone(), elem.clone())
                .is_some()
            {
                return Err(ReplayError::malformed(format!(
                    "duplicate UID in frame: {}",
                    elem.uid()
                )));
            }
        }
        Ok(store)
    }

    /// Wire form of the current state, elements in UID order.
    pub fn to_frame(&self) -> FrameData {
        FrameData {
            time: self.time,
            elems: self.elements.values().cloned().collect(),
        }
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, uid: &Uid) -> Option<&Element> {
        self.elements.get(uid)
    }

    pub fn contains(&self, uid: &Uid) -> bool {
        self.elements.contains_key(uid)
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    pub fn active_camera(&self) -> Option<&Uid> {
        self.active_camera.as_ref()
    }

    /// Element content equality, ignoring time and camera designation.
    pub fn same_elements(&self, other: &FrameStore) -> bool {
        self.elements == other.elements
    }

    pub fn set_active_camera(&mut self, uid: Uid) -> ReplayResult<()> {
        match self.elements.get(&uid) {
            Some(Element::Camera(_)) => {
                self.active_camera = Some(uid);
                Ok(())
            }
            Some(other) => Err(ReplayError::missing_camera(format!(
                "{uid} is a {}, not a Camera",
                other.kind()
            ))),
            None => Err(ReplayError::missing_camera(format!("{uid} is not in the frame"))),
        }
    }

    /// Apply one diff in place.
    ///
    /// Create of a present UID is `DuplicateElement`; Update or Delete of an
    /// absent UID is `UnknownElement`. On error the store is unchanged.
    pub fn apply_diff(&mut self, diff: &ElementDiff) -> ReplayResult<()> {
        match diff {
            ElementDiff::Create(elem) => {
                let uid = elem.uid();
                if self.elements.contains_key(uid) {
                    return Err(ReplayError::DuplicateElement(uid.clone()));
                }
                // A camera takes over when none is designated or the designated
                // one has been deleted.
                let designated_present = self
                    .active_camera
                    .as_ref()
                    .is_some_and(|active| self.elements.contains_key(active));
                if elem.kind() == ElementKind::Camera && !designated_present {
                    self.active_camera = Some(uid.clone());
                }
                self.elements.insert(uid.clone(), elem.clone());
            }
            ElementDiff::Update(patch) => {
                let elem = self
                    .elements
                    .get_mut(patch.uid())
                    .ok_or_else(|| ReplayError::UnknownElement(patch.uid().clone()))?;
                elem.apply_patch(patch)?;
            }
            ElementDiff::Delete(target) => {
                let Some(elem) = self.elements.get(&target.uid) else {
                    return Err(ReplayError::UnknownElement(target.uid.clone()));
                };
                if let Some(kind) = target.kind {
                    if kind != elem.kind() {
                        return Err(ReplayError::TypeMismatch {
                            uid: target.uid.clone(),
                            expected: elem.kind(),
                            found: kind,
                        });
                    }
                }
                self.elements.remove(&target.uid);
            }
        }
        Ok(())
    }

    /// Active camera rectangle.
    ///
    /// With no camera designated this is `DEFAULT_VIEWPORT`. A designated
    /// camera that is absent or not a Camera is `MissingActiveCamera`.
    pub fn viewport(&self) -> ReplayResult<Viewport> {
        let Some(uid) = &self.active_camera else {
            return Ok(DEFAULT_VIEWPORT);
        };
        match self.elements.get(uid) {
            Some(Element::Camera(c)) => Ok(Viewport {
                x: c.x,
                y: c.y,
                w: c.w,
                h: c.h,
            }),
            Some(other) => Err(ReplayError::missing_camera(format!(
                "{uid} is a {}, not a Camera",
                other.kind()
            ))),
            None => Err(ReplayError::missing_camera(format!("{uid} is not in the frame"))),
        }
    }

    /// Like `viewport`, but falls back to `DEFAULT_VIEWPORT` with a warning.
    pub fn viewport_or_default(&self) -> Viewport {
        self.viewport().unwrap_or_else(|err| {
            warn!(%err, "falling back to the default viewport");
            DEFAULT_VIEWPORT
        })
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            time: self.time,
            elements: self.elements.clone(),
            viewport: self.viewport_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Camera, Circle, CirclePatch, ElementPatch, Rect};

    fn circle(uid: &str, x: f64) -> Element {
        Element::Circle(Circle {
            uid: uid.into(),
            name: None,
            color: Some("#fff".into()),
            x,
            y: 0.0,
            r: 5.0,
            z: 0.0,
            theta: 0.0,
        })
    }

    fn camera(uid: &str) -> Element {
        Element::Camera(Camera {
            uid: uid.into(),
            x: 10.0,
            y: 20.0,
            w: 300.0,
            h: 200.0,
        })
    }

    fn move_x(uid: &str, x: f64) -> ElementDiff {
        ElementDiff::Update(ElementPatch::Circle(CirclePatch {
            uid: uid.into(),
            x: Some(x),
            ..Default::default()
        }))
    }

    #[test]
    fn create_update_delete() {
        let mut store = FrameStore::new(0.0);
        store.apply_diff(&ElementDiff::Create(circle("C1", 0.0))).unwrap();
        store.apply_diff(&move_x("C1", 10.0)).unwrap();
        assert_eq!(store.get(&"C1".into()), Some(&circle("C1", 10.0)));

        store
            .apply_diff(&ElementDiff::delete("C1".into(), ElementKind::Circle))
            .unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let mut store = FrameStore::new(0.0);
        store.apply_diff(&ElementDiff::Create(circle("C1", 0.0))).unwrap();
        let err = store
            .apply_diff(&ElementDiff::Create(circle("C1", 3.0)))
            .unwrap_err();
        assert_eq!(err, ReplayError::DuplicateElement("C1".into()));
        assert_eq!(store.get(&"C1".into()), Some(&circle("C1", 0.0)));
    }

    #[test]
    fn update_or_delete_of_absent_uid_is_unknown() {
        let mut store = FrameStore::new(0.0);
        assert_eq!(
            store.apply_diff(&move_x("C9", 1.0)).unwrap_err(),
            ReplayError::UnknownElement("C9".into())
        );
        assert_eq!(
            store
                .apply_diff(&ElementDiff::delete("C9".into(), ElementKind::Circle))
                .unwrap_err(),
            ReplayError::UnknownElement("C9".into())
        );
    }

    #[test]
    fn delete_with_wrong_kind_is_a_mismatch() {
        let mut store = FrameStore::new(0.0);
        store.apply_diff(&ElementDiff::Create(circle("C1", 0.0))).unwrap();
        let err = store
            .apply_diff(&ElementDiff::delete("C1".into(), ElementKind::Rect))
            .unwrap_err();
        assert!(matches!(err, ReplayError::TypeMismatch { .. }));
        assert!(store.contains(&"C1".into()));
    }

    #[test]
    fn snapshot_is_independent() {
        let mut store = FrameStore::new(1.5);
        store.apply_diff(&ElementDiff::Create(circle("C1", 0.0))).unwrap();
        let snap = store.snapshot();
        store.apply_diff(&move_x("C1", 99.0)).unwrap();
        assert_eq!(snap.elements[&Uid::from("C1")], circle("C1", 0.0));
        assert_eq!(snap.time, 1.5);
    }

    #[test]
    fn from_frame_designates_single_camera() {
        let frame = FrameData {
            time: 0.0,
            elems: vec![camera("cam"), circle("C1", 0.0)],
        };
        let store = FrameStore::from_frame(&frame).unwrap();
        assert_eq!(store.active_camera(), Some(&Uid::from("cam")));
        assert_eq!(store.viewport().unwrap().view_box(), "10 20 300 200");
    }

    #[test]
    fn from_frame_rejects_duplicates_and_second_camera() {
        let dup = FrameData {
            time: 0.0,
            elems: vec![circle("C1", 0.0), circle("C1", 1.0)],
        };
        assert!(matches!(
            FrameStore::from_frame(&dup),
            Err(ReplayError::MalformedScene(_))
        ));

        let two_cams = FrameData {
            time: 0.0,
            elems: vec![camera("a"), camera("b")],
        };
        assert!(matches!(
            FrameStore::from_frame(&two_cams),
            Err(ReplayError::MalformedScene(_))
        ));
    }

    #[test]
    fn viewport_defaults_without_camera() {
        let store = FrameStore::new(0.0);
        assert_eq!(store.viewport().unwrap(), DEFAULT_VIEWPORT);
    }

    #[test]
    fn deleted_camera_is_reported_and_falls_back() {
        let frame = FrameData {
            time: 0.0,
            elems: vec![camera("cam")],
        };
        let mut store = FrameStore::from_frame(&frame).unwrap();
        store
            .apply_diff(&ElementDiff::delete("cam".into(), ElementKind::Camera))
            .unwrap();
        assert!(matches!(
            store.viewport(),
            Err(ReplayError::MissingActiveCamera(_))
        ));
        assert_eq!(store.viewport_or_default(), DEFAULT_VIEWPORT);
    }

    #[test]
    fn replacement_camera_takes_over_after_delete() {
        let frame = FrameData {
            time: 0.0,
            elems: vec![camera("cam")],
        };
        let mut store = FrameStore::from_frame(&frame).unwrap();
        store
            .apply_diff(&ElementDiff::delete("cam".into(), ElementKind::Camera))
            .unwrap();
        store.apply_diff(&ElementDiff::Create(camera("cam2"))).unwrap();
        assert_eq!(store.active_camera(), Some(&Uid::from("cam2")));
        assert_eq!(store.viewport().unwrap().view_box(), "10 20 300 200");

        // undoing brings the first camera back as the active one
        store
            .apply_diff(&ElementDiff::delete("cam2".into(), ElementKind::Camera))
            .unwrap();
        store.apply_diff(&ElementDiff::Create(camera("cam"))).unwrap();
        assert_eq!(store.active_camera(), Some(&Uid::from("cam")));
        assert!(store.viewport().is_ok());
    }

    #[test]
    fn present_camera_keeps_its_designation() {
        let frame = FrameData {
            time: 0.0,
            elems: vec![camera("cam")],
        };
        let mut store = FrameStore::from_frame(&frame).unwrap();
        store.apply_diff(&ElementDiff::Create(camera("extra"))).unwrap();
        assert_eq!(store.active_camera(), Some(&Uid::from("cam")));
    }

    #[test]
    fn set_active_camera_requires_a_camera() {
        let mut store = FrameStore::new(0.0);
        store.apply_diff(&ElementDiff::Create(circle("C1", 0.0))).unwrap();
        assert!(store.set_active_camera("C1".into()).is_err());
        assert!(store.set_active_camera("nope".into()).is_err());

        store.apply_diff(&ElementDiff::Create(camera("cam"))).unwrap();
        assert_eq!(store.active_camera(), Some(&Uid::from("cam")));
        store.set_active_camera("cam".into()).unwrap();
    }

    #[test]
    fn draw_order_skips_cameras_and_sorts_by_z() {
        let mut store = FrameStore::new(0.0);
        let high = Element::Rect(Rect {
            uid: "R1".into(),
            name: None,
            color: None,
            x: 0.0,
            y: 0.0,
            w: 1.0,
            h: 1.0,
            z: 5.0,
            theta: 0.0,
        });
        store.apply_diff(&ElementDiff::Create(high)).unwrap();
        store.apply_diff(&ElementDiff::Create(circle("C1", 0.0))).unwrap();
        store.apply_diff(&ElementDiff::Create(camera("cam"))).unwrap();

        let snap = store.snapshot();
        let order: Vec<&str> = snap.draw_order().iter().map(|e| e.uid().as_str()).collect();
        assert_eq!(order, ["C1", "R1"]);
    }
}
