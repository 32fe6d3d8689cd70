//! Trajectory snapshots and the launch roster
//!
//! Readers of the trajectory model output build these from column reads; the
//! constructors check that every column has the same number of records.

use crate::error::{check_len, ConvsrcError};
use rustc_hash::{FxBuildHasher, FxHashMap};
use serde::{Deserialize, Serialize};

/// Position and thermodynamic state of a parcel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParcelState {
    /// Longitude (degrees)
    pub x: f64,
    /// Latitude (degrees)
    pub y: f64,
    /// Pressure (Pa)
    pub p: f64,
    /// Temperature (K)
    pub t: f64,
}

/// Active parcels at one hourly output time
///
/// Parcels released since the previous output are appended at the tail.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    itime: i64,
    ids: Vec<u64>,
    states: Vec<ParcelState>,
}

impl Snapshot {
    /// Build from row records
    ///
    /// # Errors
    /// Returns `ConvsrcError::RecordCount` if `ids` and `states` differ in length
    pub fn new(itime: i64, ids: Vec<u64>, states: Vec<ParcelState>) -> Result<Self, ConvsrcError> {
        check_len("snapshot states", ids.len(), states.len())?;
        Ok(Self { itime, ids, states })
    }

    /// Build from the column layout of the trajectory files
    ///
    /// # Errors
    /// Returns `ConvsrcError::RecordCount` if any column length differs from `ids`
    pub fn from_columns(
        itime: i64,
        ids: Vec<u64>,
        x: &[f64],
        y: &[f64],
        p: &[f64],
        t: &[f64],
    ) -> Result<Self, ConvsrcError> {
        let n = ids.len();
        check_len("snapshot x", n, x.len())?;
        check_len("snapshot y", n, y.len())?;
        check_len("snapshot p", n, p.len())?;
        check_len("snapshot t", n, t.len())?;
        let states = (0..n)
            .map(|i| ParcelState {
                x: x[i],
                y: y[i],
                p: p[i],
                t: t[i],
            })
            .collect();
        Ok(Self { itime, ids, states })
    }

    /// Snapshot with no active parcel
    pub fn empty(itime: i64) -> Self {
        Self {
            itime,
            ids: Vec::new(),
            states: Vec::new(),
        }
    }

    /// Absolute model time (s)
    pub fn itime(&self) -> i64 {
        self.itime
    }

    /// Number of active parcels
    pub fn nact(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    pub fn states(&self) -> &[ParcelState] {
        &self.states
    }

    /// Last `n` identifiers (the whole list if shorter)
    pub fn tail_ids(&self, n: usize) -> &[u64] {
        &self.ids[self.ids.len().saturating_sub(n)..]
    }

    /// Identifier to row position
    pub fn positions(&self) -> FxHashMap<u64, usize> {
        let mut map = FxHashMap::with_capacity_and_hasher(self.ids.len(), FxBuildHasher);
        for (row, &id) in self.ids.iter().enumerate() {
            map.insert(id, row);
        }
        map
    }

    /// Highest parcel pressure, `None` when empty
    pub fn max_pressure(&self) -> Option<f64> {
        self.states.iter().map(|s| s.p).reduce(f64::max)
    }
}

/// Full parcel roster read from the initial index file
#[derive(Debug, Clone)]
pub struct LaunchTable {
    idx_orgn: u64,
    states: Vec<ParcelState>,
    launch_time: Vec<i64>,
    flags: Vec<u32>,
}

impl LaunchTable {
    /// Roster of `states.len()` parcels with ids starting at `idx_orgn`
    ///
    /// # Errors
    /// Returns `ConvsrcError::RecordCount` if the columns differ in length
    pub fn new(
        idx_orgn: u64,
        states: Vec<ParcelState>,
        launch_time: Vec<i64>,
        flags: Vec<u32>,
    ) -> Result<Self, ConvsrcError> {
        check_len("launch times", states.len(), launch_time.len())?;
        check_len("launch flags", states.len(), flags.len())?;
        Ok(Self {
            idx_orgn,
            states,
            launch_time,
            flags,
        })
    }

    /// First parcel identifier
    pub fn idx_orgn(&self) -> u64 {
        self.idx_orgn
    }

    pub fn numpart(&self) -> usize {
        self.states.len()
    }

    /// Launch position of the parcel in `slot`
    pub fn state(&self, slot: usize) -> &ParcelState {
        &self.states[slot]
    }

    /// Launch times (`ir_start`, s)
    pub fn launch_times(&self) -> &[i64] {
        &self.launch_time
    }

    pub fn flags(&self) -> &[u32] {
        &self.flags
    }

    /// Snapshot at itime 0 holding the first `granule_size` parcels
    pub fn first_granule(&self, granule_size: usize) -> Snapshot {
        let n = granule_size.min(self.numpart());
        Snapshot {
            itime: 0,
            ids: (0..n as u64).map(|k| self.idx_orgn + k).collect(),
            states: self.states[..n].to_vec(),
        }
    }
}
