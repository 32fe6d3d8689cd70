//! Per-parcel state table
//!
//! One dense slot per parcel of the launch roster, addressed by
//! `idx_back - origin`. The table is created once and physically retained to
//! the end of the run; a slot is logically frozen the instant DEAD is set.

use crate::core_types::flags::{ExitCode, ParcelFlags};
use crate::core_types::snapshot::{LaunchTable, ParcelState};
use crate::error::ConvsrcError;

/// Number of milestone slots: terminal event plus five thresholds
pub const MILESTONE_SLOTS: usize = 6;

/// Slot holding the terminal event (exit, ground, old, deadborne)
pub const TERMINAL_SLOT: usize = 0;

/// Maps persistent parcel identifiers onto dense table slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParcelIndex {
    origin: u64,
    numpart: usize,
}

impl ParcelIndex {
    /// Index for ids `origin..origin + numpart`
    pub fn new(origin: u64, numpart: usize) -> Self {
        Self { origin, numpart }
    }

    /// First identifier of the roster
    pub fn origin(&self) -> u64 {
        self.origin
    }

    /// Number of parcels in the roster
    pub fn numpart(&self) -> usize {
        self.numpart
    }

    /// Table slot of a parcel identifier
    ///
    /// # Errors
    /// Returns `ConvsrcError::ParcelOutOfRange` if the id is not in the roster
    #[inline]
    pub fn slot(&self, id: u64) -> Result<usize, ConvsrcError> {
        match id.checked_sub(self.origin) {
            Some(offset) if (offset as usize) < self.numpart => Ok(offset as usize),
            _ => Err(ConvsrcError::ParcelOutOfRange {
                id,
                origin: self.origin,
                numpart: self.numpart,
            }),
        }
    }

    /// Identifier stored in a table slot
    #[inline]
    pub fn id(&self, slot: usize) -> u64 {
        self.origin + slot as u64
    }
}

/// Archived parcel state at an event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Milestone {
    pub x: f64,
    pub y: f64,
    /// Pressure (Pa)
    pub p: f64,
    /// Temperature (K)
    pub t: f64,
    /// Launch time minus event time (s)
    pub age: f64,
}

impl Milestone {
    /// Unfilled slot
    pub const EMPTY: Milestone = Milestone {
        x: f64::NAN,
        y: f64::NAN,
        p: f64::NAN,
        t: f64::NAN,
        age: f64::NAN,
    };

    /// Milestone at a parcel state
    #[inline]
    pub fn at(state: &ParcelState, age: f64) -> Self {
        Self {
            x: state.x,
            y: state.y,
            p: state.p,
            t: state.t,
            age,
        }
    }

    /// True when the slot has been written
    pub fn is_filled(&self) -> bool {
        !self.x.is_nan()
    }
}

impl Default for Milestone {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// One step of the survival ratchet
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rung {
    /// Ratchet state from which this rung can fire
    pub from: u8,
    /// Survival fraction below which it fires
    pub threshold: f64,
    /// Ratchet state after firing
    pub to: u8,
    /// Milestone slot written when it fires
    pub slot: usize,
}

/// Rungs in firing order
pub const RUNGS: [Rung; 5] = [
    Rung { from: 10, threshold: 0.9, to: 9, slot: 1 },
    Rung { from: 9, threshold: 0.7, to: 7, slot: 2 },
    Rung { from: 7, threshold: 0.5, to: 5, slot: 3 },
    Rung { from: 5, threshold: 0.3, to: 3, slot: 4 },
    Rung { from: 3, threshold: 0.1, to: 1, slot: 5 },
];

/// One-directional gate over the five survival thresholds
///
/// Takes values in {10, 9, 7, 5, 3, 1}, strictly decreasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ratchet(u8);

impl Ratchet {
    /// State of a fresh parcel
    pub const INITIAL: Ratchet = Ratchet(10);
    /// State once all rungs have fired
    pub const EXHAUSTED: Ratchet = Ratchet(1);

    /// Raw state value
    pub fn value(self) -> u8 {
        self.0
    }

    /// The rung that can still fire from this state
    pub fn pending(self) -> Option<&'static Rung> {
        RUNGS.iter().find(|r| r.from == self.0)
    }

    fn advance(&mut self, rung: &Rung) {
        debug_assert_eq!(rung.from, self.0);
        self.0 = rung.to;
    }
}

impl Default for Ratchet {
    fn default() -> Self {
        Self::INITIAL
    }
}

/// Per-parcel state for the whole roster
#[derive(Debug, Clone)]
pub struct ParcelTable {
    index: ParcelIndex,
    flags: Vec<ParcelFlags>,
    chi: Vec<f64>,
    ratchet: Vec<Ratchet>,
    archive: Vec<[Milestone; MILESTONE_SLOTS]>,
    launch_time: Vec<i64>,
}

impl ParcelTable {
    /// Create one entry per parcel of the launch roster
    pub fn from_launch(launch: &LaunchTable) -> Self {
        let numpart = launch.numpart();
        Self {
            index: ParcelIndex::new(launch.idx_orgn(), numpart),
            flags: launch
                .flags()
                .iter()
                .map(|&f| ParcelFlags::from_bits(f))
                .collect(),
            chi: vec![1.0; numpart],
            ratchet: vec![Ratchet::INITIAL; numpart],
            archive: vec![[Milestone::EMPTY; MILESTONE_SLOTS]; numpart],
            launch_time: launch.launch_times().to_vec(),
        }
    }

    /// Identifier to slot mapping
    pub fn index(&self) -> &ParcelIndex {
        &self.index
    }

    pub fn numpart(&self) -> usize {
        self.index.numpart()
    }

    pub fn flags(&self, slot: usize) -> ParcelFlags {
        self.flags[slot]
    }

    pub fn all_flags(&self) -> &[ParcelFlags] {
        &self.flags
    }

    /// Survival fraction
    pub fn chi(&self, slot: usize) -> f64 {
        self.chi[slot]
    }

    pub fn all_chi(&self) -> &[f64] {
        &self.chi
    }

    pub fn ratchet(&self, slot: usize) -> Ratchet {
        self.ratchet[slot]
    }

    pub fn all_ratchets(&self) -> &[Ratchet] {
        &self.ratchet
    }

    pub fn milestone(&self, slot: usize, k: usize) -> &Milestone {
        &self.archive[slot][k]
    }

    pub fn milestones(&self, slot: usize) -> &[Milestone; MILESTONE_SLOTS] {
        &self.archive[slot]
    }

    /// Launch time (`ir_start`, s)
    pub fn launch_time(&self, slot: usize) -> i64 {
        self.launch_time[slot]
    }

    /// Age in seconds of a parcel at `itime`
    #[inline]
    pub fn age_at(&self, slot: usize, itime: i64) -> f64 {
        (self.launch_time[slot] - itime) as f64
    }

    /// Terminate a live parcel, archiving `at` in the terminal slot
    ///
    /// Returns `false` and leaves the slot untouched if the parcel is already DEAD.
    pub(crate) fn terminate(
        &mut self,
        slot: usize,
        bits: ParcelFlags,
        code: Option<ExitCode>,
        at: Milestone,
    ) -> bool {
        if self.flags[slot].is_dead() {
            return false;
        }
        self.archive[slot][TERMINAL_SLOT] = at;
        let flags = &mut self.flags[slot];
        if let Some(code) = code {
            flags.insert_exit(code);
        }
        flags.insert(bits | ParcelFlags::DEAD);
        true
    }

    /// Replace the survival fraction of a live parcel
    pub(crate) fn set_chi(&mut self, slot: usize, chi: f64) {
        debug_assert!(chi <= self.chi[slot]);
        self.chi[slot] = chi;
    }

    /// Fire `rung` for the parcel, archiving `at` in its slot
    pub(crate) fn fire_rung(&mut self, slot: usize, rung: &Rung, at: Milestone) {
        self.archive[slot][rung.slot] = at;
        if rung.slot == 1 {
            self.flags[slot].insert(ParcelFlags::HIT);
        }
        self.ratchet[slot].advance(rung);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(n: usize) -> LaunchTable {
        let states = vec![
            ParcelState {
                x: 80.0,
                y: 20.0,
                p: 10000.0,
                t: 200.0
            };
            n
        ];
        LaunchTable::new(1, states, vec![-3600; n], vec![0; n]).unwrap()
    }

    #[test]
    fn test_index_bounds() {
        let index = ParcelIndex::new(1, 10);
        assert_eq!(index.slot(1).unwrap(), 0);
        assert_eq!(index.slot(10).unwrap(), 9);
        assert!(index.slot(0).is_err());
        assert!(index.slot(11).is_err());
        assert_eq!(index.id(9), 10);
    }

    #[test]
    fn test_ratchet_walks_rungs_in_order() {
        let mut ratchet = Ratchet::INITIAL;
        let mut seen = vec![ratchet.value()];
        while let Some(rung) = ratchet.pending() {
            ratchet.advance(rung);
            seen.push(ratchet.value());
        }
        assert_eq!(seen, vec![10, 9, 7, 5, 3, 1]);
        assert_eq!(ratchet, Ratchet::EXHAUSTED);
    }

    #[test]
    fn test_terminate_is_one_shot() {
        let mut table = ParcelTable::from_launch(&roster(3));
        let first = Milestone {
            x: 1.0,
            y: 2.0,
            p: 3.0,
            t: 4.0,
            age: 5.0,
        };
        assert!(table.terminate(1, ParcelFlags::CROSSED, Some(ExitCode::West), first));
        let second = Milestone { x: 9.0, ..first };
        assert!(!table.terminate(1, ParcelFlags::OLD, None, second));
        assert_eq!(table.milestone(1, TERMINAL_SLOT).x, 1.0);
        assert!(!table.flags(1).contains(ParcelFlags::OLD));
        assert_eq!(table.flags(1).exit_code(), Some(ExitCode::West));
    }

    #[test]
    fn test_first_rung_sets_hit() {
        let mut table = ParcelTable::from_launch(&roster(1));
        let at = Milestone {
            x: 0.0,
            y: 0.0,
            p: 0.0,
            t: 0.0,
            age: 0.0,
        };
        table.fire_rung(0, &RUNGS[0], at);
        assert!(table.flags(0).contains(ParcelFlags::HIT));
        assert!(table.flags(0).is_alive());
        assert_eq!(table.ratchet(0).value(), 9);
        assert!(table.milestone(0, 1).is_filled());
        assert!(!table.milestone(0, 2).is_filled());
    }

    #[test]
    fn test_age_from_launch_time() {
        let table = ParcelTable::from_launch(&roster(2));
        assert_eq!(table.launch_time(1), -3600);
        assert_eq!(table.age_at(1, -7200), 3600.0);
        assert_eq!(table.chi(0), 1.0);
        assert_eq!(table.ratchet(0), Ratchet::INITIAL);
    }
}
