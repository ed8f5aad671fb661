//! Recorder: compiles timed element patches into replayable recordings.
//!
//! Patches are sorted by time and bucketed by equal time. The first bucket
//! becomes the initial frame; every later bucket contributes forward diffs
//! to the previous transition's `next` and backward diffs to its own
//! `prev`. Forward diffs are derived against the live frame, so several
//! patches for one element in a bucket chain correctly; backward diffs are
//! stored in reverse order so they undo in the right sequence.
//!
//! A change a patch cannot carry, such as a colour that goes away, is
//! recorded as a Delete followed by a Create of the whole element.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{ReplayError, ReplayResult};
use crate::frame::FrameStore;
use crate::types::{Element, ElementDiff, ElementKey, ElementPatch, GraphicData, SceneGroup, Transition, Uid};

use super::source::{PatchAction, SourcePatch, SourceRecording};

const UID_DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Hands out base-62 UIDs in call order, starting at `1`.
#[derive(Debug, Default)]
pub struct UidGen {
    count: u64,
}

impl UidGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_uid(&mut self) -> Uid {
        self.count += 1;
        Uid(to_base62(self.count))
    }
}

fn to_base62(mut n: u64) -> String {
    let base = UID_DIGITS.len() as u64;
    let mut digits = Vec::new();
    while n != 0 {
        digits.push(UID_DIGITS[(n % base) as usize] as char);
        n /= base;
    }
    digits.iter().rev().collect()
}

#[derive(Debug, Default)]
pub struct Recorder {
    patches: Vec<SourcePatch>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_source(source: SourceRecording) -> Self {
        Recorder {
            patches: source.patches,
        }
    }

    pub fn add(&mut self, patch: SourcePatch) {
        self.patches.push(patch);
    }

    /// One scene per group id, in order of first appearance.
    pub fn compile(&self) -> ReplayResult<Vec<SceneGroup>> {
        let mut groups: Vec<(String, Vec<&SourcePatch>)> = Vec::new();
        for patch in &self.patches {
            match groups.iter_mut().find(|(id, _)| *id == patch.group_id) {
                Some((_, members)) => members.push(patch),
                None => groups.push((patch.group_id.clone(), vec![patch])),
            }
        }

        groups
            .into_iter()
            .map(|(group_id, patches)| {
                let graphic = compile_graphic(&group_id, patches)?;
                Ok(SceneGroup {
                    group_id,
                    graphic: Some(graphic),
                })
            })
            .collect()
    }
}

fn compile_graphic(group_id: &str, mut patches: Vec<&SourcePatch>) -> ReplayResult<GraphicData> {
    if let Some(bad) = patches.iter().find(|p| !p.time.is_finite()) {
        return Err(ReplayError::malformed(format!(
            "group {group_id}: patch time is not finite: {}",
            bad.time
        )));
    }
    patches.sort_by(|a, b| a.time.total_cmp(&b.time));

    let mut uid_gen = UidGen::new();
    let mut uids: HashMap<ElementKey, Uid> = HashMap::new();
    for patch in &patches {
        if let PatchAction::Elem(_) = patch.action {
            uids.entry(patch.key()).or_insert_with(|| uid_gen.next_uid());
        }
    }

    let mut graphic = GraphicData::default();
    let mut frame = FrameStore::new(0.0);

    for (bucket_index, bucket) in patches.chunk_by(|a, b| a.time == b.time).enumerate() {
        let time = bucket[0].time;
        frame.set_time(time);

        let mut next = Vec::new();
        let mut prev = Vec::new();
        for patch in bucket {
            let key = patch.key();
            let uid = uids.get(&key).cloned().ok_or_else(|| {
                ReplayError::malformed(format!(
                    "group {group_id}: remove of {} {:?} which never exists",
                    key.kind, key.name
                ))
            })?;
            let Some((forward, backward)) = diff_pair(&frame, &uid, &patch.action)? else {
                continue;
            };
            for diff in &forward {
                frame.apply_diff(diff)?;
            }
            next.extend(forward);
            prev.push(backward);
        }
        let prev: Vec<ElementDiff> = prev.into_iter().rev().flatten().collect();

        if bucket_index == 0 {
            graphic.initial = frame.to_frame();
            graphic.transitions.push(Transition {
                time,
                ..Transition::default()
            });
        } else {
            if let Some(last) = graphic.transitions.last_mut() {
                last.next = next;
            }
            graphic.transitions.push(Transition {
                time,
                prev,
                next: Vec::new(),
            });
        }
    }

    graphic.final_frame = frame.to_frame();
    debug!(
        group = group_id,
        steps = graphic.transitions.len(),
        elements = uids.len(),
        "recording compiled"
    );
    Ok(graphic)
}

/// Forward and backward diffs for one patch against the live frame, or
/// `None` when the patch changes nothing. Each list applies in its own order.
fn diff_pair(
    frame: &FrameStore,
    uid: &Uid,
    action: &PatchAction,
) -> ReplayResult<Option<(Vec<ElementDiff>, Vec<ElementDiff>)>> {
    let pair = match (action, frame.get(uid)) {
        (PatchAction::Elem(elem), None) => {
            let mut elem = elem.clone();
            elem.set_uid(uid.clone());
            let kind = elem.kind();
            (vec![ElementDiff::Create(elem)], vec![ElementDiff::delete(uid.clone(), kind)])
        }
        (PatchAction::Elem(elem), Some(old)) => {
            let mut elem = elem.clone();
            elem.set_uid(uid.clone());
            if elem == *old {
                return Ok(None);
            }
            let forward = elem.diff_from(old)?;
            let backward = old.diff_from(&elem)?;
            if reproduces(old, &forward, &elem) && reproduces(&elem, &backward, old) {
                (vec![ElementDiff::Update(forward)], vec![ElementDiff::Update(backward)])
            } else {
                let kind = elem.kind();
                (
                    vec![ElementDiff::delete(uid.clone(), kind), ElementDiff::Create(elem)],
                    vec![ElementDiff::delete(uid.clone(), kind), ElementDiff::Create(old.clone())],
                )
            }
        }
        (PatchAction::Remove(_), Some(old)) => (
            vec![ElementDiff::delete(uid.clone(), old.kind())],
            vec![ElementDiff::Create(old.clone())],
        ),
        (PatchAction::Remove(key), None) => {
            return Err(ReplayError::malformed(format!(
                "remove of {} {:?} which is not present",
                key.kind, key.name
            )));
        }
    };
    Ok(Some(pair))
}

fn reproduces(from: &Element, patch: &ElementPatch, to: &Element) -> bool {
    let mut elem = from.clone();
    elem.apply_patch(patch).is_ok() && elem == *to
}
