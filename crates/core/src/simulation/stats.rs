//! Run counters and per-step census

use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core_types::{ParcelFlags, ParcelTable, MILESTONE_SLOTS};
use crate::error::ConvsrcError;

/// Cumulative counters of a run
///
/// `hits[0]` counts ground contacts; `hits[k]` for k ≥ 1 counts first
/// crossings of survival threshold k.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct RunStats {
    pub hits: [u64; MILESTONE_SLOTS],
    pub exits: u64,
    pub deadborne: u64,
    pub new_parcels: u64,
    pub old: u64,
    pub grounded: u64,
}

impl RunStats {
    /// Add per-slot crossing counts
    pub fn add_hits(&mut self, hits: &[usize; MILESTONE_SLOTS]) {
        for (total, &n) in self.hits.iter_mut().zip(hits) {
            *total += n as u64;
        }
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits {:?} exits {} deadborne {} new {} old {} ground {}",
            self.hits, self.exits, self.deadborne, self.new_parcels, self.old, self.grounded
        )
    }
}

/// Flag census over the parcels of one snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Census {
    /// Not DEAD
    pub live: usize,
    /// Neither DEAD nor HIT
    pub pristine: usize,
    /// CROSSED after a hit
    pub out_hit: usize,
    /// CROSSED without a hit
    pub out_pristine: usize,
    /// HIT and not CROSSED
    pub hit_pure: usize,
}

impl Census {
    /// Count the flag classes of the given parcels
    ///
    /// # Errors
    /// Returns `ConvsrcError::ParcelOutOfRange` for an id outside the roster
    pub fn of(table: &ParcelTable, ids: &[u64]) -> Result<Self, ConvsrcError> {
        let mut census = Self::default();
        for &id in ids {
            let flags = table.flags(table.index().slot(id)?);
            if flags.is_alive() {
                census.live += 1;
            }
            if !flags.intersects(ParcelFlags::STOP) {
                census.pristine += 1;
            }
            match (flags.contains(ParcelFlags::HIT), flags.contains(ParcelFlags::CROSSED)) {
                (true, true) => census.out_hit += 1,
                (false, true) => census.out_pristine += 1,
                (true, false) => census.hit_pure += 1,
                (false, false) => {}
            }
        }
        Ok(census)
    }
}

impl fmt::Display for Census {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "live {} pristine {} out-hit {} out-pristine {} hit-pure {}",
            self.live, self.pristine, self.out_hit, self.out_pristine, self.hit_pure
        )
    }
}
