//! Shared boundary types for scene recordings.
//!
//! This module defines the data contracts between the recording file and the
//! replay machinery:
//! - Elements and their partial updates (`Element`, `ElementPatch`)
//! - The diff log (`ElementDiff`, `Transition`)
//! - The recording file shapes (`FrameData`, `GraphicData`, `SceneGroup`)
//!
//! Everything here is plain data. Mutation lives in `frame`, replay in `engine`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ReplayError, ReplayResult};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(pub String);

impl Uid {
    pub fn new(id: impl Into<String>) -> Self {
        Uid(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Uid {
    fn from(id: &str) -> Self {
        Uid(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Camera,
    Rect,
    Circle,
    Path,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ElementKind::Camera => "Camera",
            ElementKind::Rect => "Rect",
            ElementKind::Circle => "Circle",
            ElementKind::Path => "Path",
        })
    }
}

// ---------------------------------------------------------------------------
// Geometry primitives
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }
}

/// Points go over the wire as an SVG polyline string: `"x0 y0 x1 y1 ..."`.
fn serialize_points<S>(points: &[Point], s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let joined = points
        .iter()
        .map(|p| format!("{} {}", p.x, p.y))
        .collect::<Vec<_>>()
        .join(" ");
    s.serialize_str(&joined)
}

fn serialize_points_opt<S>(points: &Option<Vec<Point>>, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match points {
        Some(points) => serialize_points(points, s),
        None => s.serialize_none(),
    }
}

/// Accepts either the polyline string form (`"0 0 10 5"`, commas allowed as
/// separators) or an array of `[x, y]` pairs.
fn deserialize_points<'de, D>(d: D) -> Result<Vec<Point>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{Error, SeqAccess, Visitor};

    struct PointsVisitor;

    impl<'de> Visitor<'de> for PointsVisitor {
        type Value = Vec<Point>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a polyline string or an array of [x, y] pairs")
        }

        fn visit_str<E: Error>(self, v: &str) -> Result<Vec<Point>, E> {
            let coords = v
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|w| !w.is_empty())
                .map(|w| {
                    w.parse::<f64>()
                        .map_err(|_| E::custom(format!("invalid coordinate in points: {w:?}")))
                })
                .collect::<Result<Vec<_>, E>>()?;
            if coords.len() % 2 != 0 {
                return Err(E::custom("points string has an odd number of coordinates"));
            }
            Ok(coords.chunks(2).map(|c| Point::new(c[0], c[1])).collect())
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<Point>, A::Error> {
            let mut points = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some((x, y)) = seq.next_element::<(f64, f64)>()? {
                points.push(Point::new(x, y));
            }
            Ok(points)
        }
    }

    d.deserialize_any(PointsVisitor)
}

fn deserialize_points_opt<'de, D>(d: D) -> Result<Option<Vec<Point>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_points(d).map(Some)
}

// ---------------------------------------------------------------------------
// Elements
// ---------------------------------------------------------------------------

/// Viewport rectangle. The frame store treats the active camera as the view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    #[serde(rename = "UID", default)]
    pub uid: Uid,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    #[serde(rename = "UID", default)]
    pub uid: Uid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub theta: f64,
}

/// `x`/`y` is the centre. `cx`/`cy` are accepted on input for older recordings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    #[serde(rename = "UID", default)]
    pub uid: Uid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(alias = "cx")]
    pub x: f64,
    #[serde(alias = "cy")]
    pub y: f64,
    pub r: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub theta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    #[serde(rename = "UID", default)]
    pub uid: Uid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(
        serialize_with = "serialize_points",
        deserialize_with = "deserialize_points"
    )]
    pub points: Vec<Point>,
    #[serde(default)]
    pub z: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "elemType")]
pub enum Element {
    Camera(Camera),
    Rect(Rect),
    Circle(Circle),
    Path(Path),
}

/// Identity of an element inside a recorder source: its kind plus its name.
/// There is only ever one camera, so cameras are keyed by kind alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementKey {
    #[serde(rename = "elemType")]
    pub kind: ElementKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Element {
    pub fn uid(&self) -> &Uid {
        match self {
            Element::Camera(e) => &e.uid,
            Element::Rect(e) => &e.uid,
            Element::Circle(e) => &e.uid,
            Element::Path(e) => &e.uid,
        }
    }

    pub fn set_uid(&mut self, uid: Uid) {
        match self {
            Element::Camera(e) => e.uid = uid,
            Element::Rect(e) => e.uid = uid,
            Element::Circle(e) => e.uid = uid,
            Element::Path(e) => e.uid = uid,
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            Element::Camera(_) => ElementKind::Camera,
            Element::Rect(_) => ElementKind::Rect,
            Element::Circle(_) => ElementKind::Circle,
            Element::Path(_) => ElementKind::Path,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Element::Camera(_) => None,
            Element::Rect(e) => e.name.as_deref(),
            Element::Circle(e) => e.name.as_deref(),
            Element::Path(e) => e.name.as_deref(),
        }
    }

    pub fn color(&self) -> Option<&str> {
        match self {
            Element::Camera(_) => None,
            Element::Rect(e) => e.color.as_deref(),
            Element::Circle(e) => e.color.as_deref(),
            Element::Path(e) => e.color.as_deref(),
        }
    }

    /// Draw order. Cameras are never drawn and report 0.
    pub fn z(&self) -> f64 {
        match self {
            Element::Camera(_) => 0.0,
            Element::Rect(e) => e.z,
            Element::Circle(e) => e.z,
            Element::Path(e) => e.z,
        }
    }

    pub fn key(&self) -> ElementKey {
        ElementKey {
            kind: self.kind(),
            name: match self {
                Element::Camera(_) => None,
                other => other.name().map(str::to_string),
            },
        }
    }

    /// Merge every field present in `patch` into this element.
    ///
    /// The element kind of a UID never changes, so a patch for another kind
    /// is rejected without touching `self`.
    pub fn apply_patch(&mut self, patch: &ElementPatch) -> ReplayResult<()> {
        match (self, patch) {
            (Element::Camera(e), ElementPatch::Camera(p)) => {
                merge(&mut e.x, &p.x);
                merge(&mut e.y, &p.y);
                merge(&mut e.w, &p.w);
                merge(&mut e.h, &p.h);
            }
            (Element::Rect(e), ElementPatch::Rect(p)) => {
                merge_opt(&mut e.name, &p.name);
                merge_opt(&mut e.color, &p.color);
                merge(&mut e.x, &p.x);
                merge(&mut e.y, &p.y);
                merge(&mut e.w, &p.w);
                merge(&mut e.h, &p.h);
                merge(&mut e.z, &p.z);
                merge(&mut e.theta, &p.theta);
            }
            (Element::Circle(e), ElementPatch::Circle(p)) => {
                merge_opt(&mut e.name, &p.name);
                merge_opt(&mut e.color, &p.color);
                merge(&mut e.x, &p.x);
                merge(&mut e.y, &p.y);
                merge(&mut e.r, &p.r);
                merge(&mut e.z, &p.z);
                merge(&mut e.theta, &p.theta);
            }
            (Element::Path(e), ElementPatch::Path(p)) => {
                merge_opt(&mut e.name, &p.name);
                merge_opt(&mut e.color, &p.color);
                merge(&mut e.points, &p.points);
                merge(&mut e.z, &p.z);
            }
            (elem, patch) => {
                return Err(ReplayError::TypeMismatch {
                    uid: patch.uid().clone(),
                    expected: elem.kind(),
                    found: patch.kind(),
                });
            }
        }
        Ok(())
    }

    /// The patch that turns `previous` into `self`: only fields that differ
    /// are set. The patch carries `self`'s UID.
    pub fn diff_from(&self, previous: &Element) -> ReplayResult<ElementPatch> {
        let patch = match (self, previous) {
            (Element::Camera(new), Element::Camera(old)) => ElementPatch::Camera(CameraPatch {
                uid: new.uid.clone(),
                x: changed(&new.x, &old.x),
                y: changed(&new.y, &old.y),
                w: changed(&new.w, &old.w),
                h: changed(&new.h, &old.h),
            }),
            (Element::Rect(new), Element::Rect(old)) => ElementPatch::Rect(RectPatch {
                uid: new.uid.clone(),
                name: changed_opt(&new.name, &old.name),
                color: changed_opt(&new.color, &old.color),
                x: changed(&new.x, &old.x),
                y: changed(&new.y, &old.y),
                w: changed(&new.w, &old.w),
                h: changed(&new.h, &old.h),
                z: changed(&new.z, &old.z),
                theta: changed(&new.theta, &old.theta),
            }),
            (Element::Circle(new), Element::Circle(old)) => ElementPatch::Circle(CirclePatch {
                uid: new.uid.clone(),
                name: changed_opt(&new.name, &old.name),
                color: changed_opt(&new.color, &old.color),
                x: changed(&new.x, &old.x),
                y: changed(&new.y, &old.y),
                r: changed(&new.r, &old.r),
                z: changed(&new.z, &old.z),
                theta: changed(&new.theta, &old.theta),
            }),
            (Element::Path(new), Element::Path(old)) => ElementPatch::Path(PathPatch {
                uid: new.uid.clone(),
                name: changed_opt(&new.name, &old.name),
                color: changed_opt(&new.color, &old.color),
                points: changed(&new.points, &old.points),
                z: changed(&new.z, &old.z),
            }),
            (new, old) => {
                return Err(ReplayError::TypeMismatch {
                    uid: new.uid().clone(),
                    expected: old.kind(),
                    found: new.kind(),
                });
            }
        };
        Ok(patch)
    }
}

fn merge<T: Clone>(slot: &mut T, value: &Option<T>) {
    if let Some(v) = value {
        *slot = v.clone();
    }
}

fn merge_opt<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if let Some(v) = value {
        *slot = Some(v.clone());
    }
}

fn changed<T: Clone + PartialEq>(new: &T, old: &T) -> Option<T> {
    (new != old).then(|| new.clone())
}

// A field that disappears (Some -> None) has no patch form and is left out;
// the recorder replaces the element instead.
fn changed_opt<T: Clone + PartialEq>(new: &Option<T>, old: &Option<T>) -> Option<T> {
    if new != old { new.clone() } else { None }
}

// ---------------------------------------------------------------------------
// Patches and diffs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraPatch {
    #[serde(rename = "UID")]
    pub uid: Uid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RectPatch {
    #[serde(rename = "UID")]
    pub uid: Uid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theta: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CirclePatch {
    #[serde(rename = "UID")]
    pub uid: Uid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, alias = "cx", skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, alias = "cy", skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theta: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathPatch {
    #[serde(rename = "UID")]
    pub uid: Uid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(
        default,
        serialize_with = "serialize_points_opt",
        deserialize_with = "deserialize_points_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub points: Option<Vec<Point>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

/// Same shape as `Element`, every field except the UID optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "elemType")]
pub enum ElementPatch {
    Camera(CameraPatch),
    Rect(RectPatch),
    Circle(CirclePatch),
    Path(PathPatch),
}

impl ElementPatch {
    pub fn uid(&self) -> &Uid {
        match self {
            ElementPatch::Camera(p) => &p.uid,
            ElementPatch::Rect(p) => &p.uid,
            ElementPatch::Circle(p) => &p.uid,
            ElementPatch::Path(p) => &p.uid,
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            ElementPatch::Camera(_) => ElementKind::Camera,
            ElementPatch::Rect(_) => ElementKind::Rect,
            ElementPatch::Circle(_) => ElementKind::Circle,
            ElementPatch::Path(_) => ElementKind::Path,
        }
    }

    /// True when applying the patch would change nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            ElementPatch::Camera(p) => {
                p.x.is_none() && p.y.is_none() && p.w.is_none() && p.h.is_none()
            }
            ElementPatch::Rect(p) => {
                p.name.is_none()
                    && p.color.is_none()
                    && p.x.is_none()
                    && p.y.is_none()
                    && p.w.is_none()
                    && p.h.is_none()
                    && p.z.is_none()
                    && p.theta.is_none()
            }
            ElementPatch::Circle(p) => {
                p.name.is_none()
                    && p.color.is_none()
                    && p.x.is_none()
                    && p.y.is_none()
                    && p.r.is_none()
                    && p.z.is_none()
                    && p.theta.is_none()
            }
            ElementPatch::Path(p) => {
                p.name.is_none() && p.color.is_none() && p.points.is_none() && p.z.is_none()
            }
        }
    }
}

/// Target of a delete. Older recordings omit `elemType` on deletes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementRef {
    #[serde(rename = "UID")]
    pub uid: Uid,
    #[serde(rename = "elemType", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ElementKind>,
}

/// One Create/Update/Delete instruction for a single element.
///
/// A create always carries a complete element: an incomplete create fails to
/// parse, which surfaces as a malformed scene at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "diffType")]
pub enum ElementDiff {
    Create(Element),
    Update(ElementPatch),
    Delete(ElementRef),
}

impl ElementDiff {
    pub fn uid(&self) -> &Uid {
        match self {
            ElementDiff::Create(e) => e.uid(),
            ElementDiff::Update(p) => p.uid(),
            ElementDiff::Delete(r) => &r.uid,
        }
    }

    pub fn delete(uid: Uid, kind: ElementKind) -> Self {
        ElementDiff::Delete(ElementRef { uid, kind: Some(kind) })
    }
}

// ---------------------------------------------------------------------------
// Recording file shapes
// ---------------------------------------------------------------------------

/// Transition `i` describes logical step `i`: `next` leads to step `i + 1`,
/// `prev` leads back to step `i - 1`, and `time` is the time of step `i`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub time: f64,
    #[serde(default)]
    pub next: Vec<ElementDiff>,
    #[serde(default)]
    pub prev: Vec<ElementDiff>,
}

/// A frame as stored on the wire: an element array, not a UID map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameData {
    pub time: f64,
    #[serde(default, alias = "shapes")]
    pub elems: Vec<Element>,
}

/// One recorded scene: the two reference frames plus the diff log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphicData {
    pub initial: FrameData,
    #[serde(rename = "final")]
    pub final_frame: FrameData,
    pub transitions: Vec<Transition>,
}

/// Grouped file form: one entry per scene. Chart payloads may sit next to the
/// graphic and are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneGroup {
    #[serde(rename = "groupID")]
    pub group_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graphic: Option<GraphicData>,
}

pub const DEFAULT_GROUP: &str = "group0";

/// A recording file: either a bare graphic or an array of grouped scenes.
#[derive(Debug, Clone, PartialEq)]
pub enum Recording {
    Single(GraphicData),
    Grouped(Vec<SceneGroup>),
}

impl Recording {
    pub fn from_json(json: &str) -> ReplayResult<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if value.is_array() {
            Ok(Recording::Grouped(serde_json::from_value(value)?))
        } else {
            Ok(Recording::Single(serde_json::from_value(value)?))
        }
    }

    /// Scenes with their group ids, in file order. Groups without a graphic
    /// are skipped.
    pub fn into_graphics(self) -> Vec<(String, GraphicData)> {
        match self {
            Recording::Single(graphic) => vec![(DEFAULT_GROUP.to_string(), graphic)],
            Recording::Grouped(groups) => groups
                .into_iter()
                .filter_map(|g| g.graphic.map(|graphic| (g.group_id, graphic)))
                .collect(),
        }
    }
}
