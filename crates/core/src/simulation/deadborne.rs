//! Detection of parcels released but never seen in a snapshot
//!
//! Parcels are released in quanta of `granule.size × granule.step` per output
//! step and appended at the tail of each snapshot. A parcel of the current
//! quantum missing from that tail died before its first output and is
//! terminated at its launch position.
//!
//! The watermark starts at one granule rather than zero, so the first sweep
//! compares the first granule and the first quantum against the whole
//! snapshot, and parcels of the first granule that never made it into the
//! launch snapshot are not revisited.

use rustc_hash::FxHashSet;
use std::ops::Range;
use tracing::debug;

use crate::core_types::{GranuleLayout, LaunchTable, Milestone, ParcelFlags, ParcelTable, Snapshot};
use crate::error::ConvsrcError;

/// Identifiers of `expected` absent from `observed`, in increasing order
pub fn find_missing(expected: Range<u64>, observed: &[u64]) -> Vec<u64> {
    let seen: FxHashSet<u64> = observed.iter().copied().collect();
    expected.filter(|id| !seen.contains(id)).collect()
}

/// Terminate parcels as DEADBORNE at their launch position, age 0
///
/// Parcels already DEAD are skipped. Returns the number flagged.
///
/// # Errors
/// Returns `ConvsrcError::ParcelOutOfRange` for an id outside the roster
pub fn mark_deadborne(
    table: &mut ParcelTable,
    launch: &LaunchTable,
    ids: &[u64],
) -> Result<usize, ConvsrcError> {
    let mut flagged = 0;
    for &id in ids {
        let slot = table.index().slot(id)?;
        let at = Milestone::at(launch.state(slot), 0.0);
        if table.terminate(slot, ParcelFlags::DEADBORNE, None, at) {
            flagged += 1;
        }
    }
    Ok(flagged)
}

/// Watermark over the release quanta already checked
#[derive(Debug, Clone)]
pub struct DeadborneTracker {
    origin: u64,
    numpart: usize,
    quanta: usize,
    watermark: usize,
    next_id: u64,
    first: bool,
}

impl DeadborneTracker {
    pub fn new(granules: GranuleLayout, origin: u64, numpart: usize) -> Self {
        Self {
            origin,
            numpart,
            quanta: granules.quanta(),
            watermark: granules.size,
            next_id: origin,
            first: true,
        }
    }

    /// Number of roster parcels covered so far
    pub fn watermark(&self) -> usize {
        self.watermark.min(self.numpart)
    }

    /// True once the whole roster has been swept
    pub fn is_complete(&self) -> bool {
        self.watermark >= self.numpart
    }

    /// Check the quantum released during the step ending at `post`
    ///
    /// # Errors
    /// Returns `ConvsrcError::ParcelOutOfRange` for an id outside the roster
    pub fn sweep(
        &mut self,
        post: &Snapshot,
        table: &mut ParcelTable,
        launch: &LaunchTable,
    ) -> Result<usize, ConvsrcError> {
        if self.is_complete() {
            return Ok(0);
        }
        self.watermark += self.quanta;
        let observed = if self.first {
            post.ids()
        } else {
            post.tail_ids(self.quanta)
        };
        self.first = false;

        let upper = self.origin + self.watermark() as u64;
        let missing = find_missing(self.next_id..upper, observed);
        let flagged = mark_deadborne(table, launch, &missing)?;
        debug!(
            "deadborne sweep up to {}: {} missing, {} flagged",
            upper,
            missing.len(),
            flagged
        );
        self.next_id = upper;
        Ok(flagged)
    }
}
