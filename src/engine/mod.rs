//! Engine: the transition engine and everything that feeds it.
//!
//! `replay` moves a frame store between two steps of a transition log by
//! applying the intervening diffs in place. `Scene` is a validated, immutable
//! recording; `Recorder` builds recordings from timed element patches; and
//! `verify` checks a recording's producer contract offline.
//!
//! The engine knows nothing about wall-clock time, timers or terminals.

pub mod recorder;
pub mod scene;
pub mod source;
pub mod verify;

use tracing::{debug, trace};

use crate::error::{ReplayError, ReplayResult};
use crate::frame::FrameStore;
use crate::types::{ElementDiff, Transition};

pub use recorder::Recorder;
pub use scene::Scene;

/// Move `store` from step `current` to step `target`.
///
/// `target` is clamped to the last step. Going forward applies
/// `transitions[i].next` for `i` in `current..target`; going backward applies
/// `transitions[i].prev` for `i` from `current` down to `target + 1`. Diffs
/// run in listed order, so later diffs win on overlapping fields. Cost is
/// linear in the distance, never a restart from the initial frame.
///
/// Returns the step reached. A failing diff aborts the replay and leaves the
/// store partially mutated; the caller must treat it as corrupt.
pub fn replay(
    store: &mut FrameStore,
    transitions: &[Transition],
    current: usize,
    target: usize,
) -> ReplayResult<usize> {
    let Some(last) = transitions.len().checked_sub(1) else {
        return Ok(0);
    };
    if current > last {
        return Err(ReplayError::InvalidStepRange {
            step: current,
            last,
        });
    }
    let target = target.min(last);
    debug!(current, target, "replay");

    if current < target {
        for (i, transition) in transitions.iter().enumerate().take(target).skip(current) {
            trace!(step = i, diffs = transition.next.len(), "forward");
            apply_all(store, &transition.next)?;
        }
    } else {
        for i in (target + 1..=current).rev() {
            let transition = &transitions[i];
            trace!(step = i, diffs = transition.prev.len(), "backward");
            apply_all(store, &transition.prev)?;
        }
    }

    store.set_time(transitions[target].time);
    Ok(target)
}

fn apply_all(store: &mut FrameStore, diffs: &[ElementDiff]) -> ReplayResult<()> {
    for diff in diffs {
        store.apply_diff(diff)?;
    }
    Ok(())
}
