//! Multi-part replay stitching.
//!
//! Long sessions are recorded as an ordered set of fragment files that
//! share one `session_id`. Server-side fragments carry part number 0
//! and then odd numbers (1, 3, 5, …); even-numbered fragments are
//! client-side recordings of the same session and are dropped before
//! stitching.
//!
//! The stitcher decodes every fragment as a standalone container,
//! validates the set, and concatenates the packet sequences in part
//! order into one logical replay. Header and settings come from
//! part 0.

use std::collections::BTreeMap;

use crate::container::{read_replay, DecodeSections};
use crate::error::{ReplayError, Result};
use crate::replay::Replay;

/// Decodes and stitches a set of replay fragments.
///
/// Fragment order in `parts` does not matter; ordering comes from each
/// fragment's header. All fragments — client ones included — must
/// agree on the session id.
///
/// # Errors
///
/// - any container error from an individual fragment
/// - [`ReplayError::SessionMismatch`] when two fragments disagree on
///   `session_id`
/// - [`ReplayError::MissingPartZero`] when no server part 0 exists
///   (also the case for an empty or client-only set)
/// - [`ReplayError::FragmentGap`] when the odd server parts are not
///   consecutive
pub fn read_parted_replay<B: AsRef<[u8]>>(parts: &[B]) -> Result<Replay> {
    let mut fragments: BTreeMap<u8, Replay> = BTreeMap::new();
    let mut session_id: Option<u64> = None;

    for part in parts {
        let fragment = read_replay(part.as_ref(), DecodeSections::all())?;
        match session_id {
            None => session_id = Some(fragment.header.session_id),
            Some(expected) => {
                if fragment.header.session_id != expected {
                    return Err(ReplayError::SessionMismatch {
                        first: expected,
                        second: fragment.header.session_id,
                    });
                }
            }
        }
        if fragment.header.is_server() {
            fragments.insert(fragment.header.replay_part_number, fragment);
        } else {
            tracing::debug!(
                part = fragment.header.replay_part_number,
                "dropping client-side fragment"
            );
        }
    }

    if !fragments.contains_key(&0) {
        return Err(ReplayError::MissingPartZero);
    }

    // parts 0, 1, 3, 5, …: every odd part must extend the previous one
    let mut previous = -1i32;
    for &part in fragments.keys() {
        if part % 2 == 1 {
            let part = i32::from(part);
            if previous + 2 != part {
                return Err(ReplayError::FragmentGap { previous, found: part });
            }
            previous = part;
        }
    }

    let mut combined = Vec::new();
    let mut base = None;
    for (part, mut fragment) in fragments {
        combined.append(&mut fragment.packets);
        if part == 0 {
            base = Some(fragment);
        }
    }
    // part 0 is present, checked above
    let mut replay = base.expect("part 0 fragment");
    replay.packets = combined;
    // per-fragment results describe partial states; the stitched
    // replay carries none
    replay.results = None;
    replay.results_raw = Vec::new();
    replay.parse_packets();
    Ok(replay)
}
