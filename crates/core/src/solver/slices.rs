//! Sub-hour time slices between two trajectory outputs
//!
//! Each output interval `[tp, ta]` is cut into `N = step / width` slices
//! `[ti, tf]`, scanned backward from `tf = ta`. Parcel positions at the slice
//! bounds are linearly interpolated between the two snapshots and clamped
//! into the domain box to absorb small overshoots.

use chrono::{Duration, NaiveDateTime};

use crate::core_types::{Domain, ParcelFlags, ParcelState, ParcelTable, Snapshot};
use crate::error::ConvsrcError;
use rustc_hash::FxHashMap;

/// Parcels present in both snapshots and not yet DEAD
///
/// Rows are kept in the order of the older snapshot.
#[derive(Debug, Clone, Default)]
pub struct LiveSet {
    ante_rows: Vec<usize>,
    post_rows: Vec<usize>,
    slots: Vec<usize>,
}

impl LiveSet {
    /// Intersect `ante` with `post` and drop DEAD parcels
    ///
    /// # Errors
    /// Returns `ConvsrcError::ParcelOutOfRange` for an id outside the roster
    pub fn new(
        ante: &Snapshot,
        post_positions: &FxHashMap<u64, usize>,
        table: &ParcelTable,
    ) -> Result<Self, ConvsrcError> {
        let mut live = Self::default();
        for (row, &id) in ante.ids().iter().enumerate() {
            let Some(&post_row) = post_positions.get(&id) else {
                continue;
            };
            let slot = table.index().slot(id)?;
            if table.flags(slot).intersects(ParcelFlags::DEAD) {
                continue;
            }
            live.ante_rows.push(row);
            live.post_rows.push(post_row);
            live.slots.push(slot);
        }
        Ok(live)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Table slots of the live parcels
    pub fn slots(&self) -> &[usize] {
        &self.slots
    }
}

/// Parcel positions over one slice `[ti, tf]`
#[derive(Debug, Clone)]
pub struct SliceWindow<'a> {
    /// Position of the slice in the scan (0 = latest)
    pub index: usize,
    pub ti: NaiveDateTime,
    pub tf: NaiveDateTime,
    /// Model time of `ti` (s)
    pub itime: i64,
    /// Weight of the newer snapshot at `ti`
    pub coef_a: f64,
    /// Weight of the older snapshot at `ti`
    pub coef_p: f64,
    /// Table slots, aligned with `start` and `end`
    pub slots: &'a [usize],
    pub start: Vec<ParcelState>,
    pub end: Vec<ParcelState>,
}

impl SliceWindow<'_> {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// One step of the slice scan
#[derive(Debug, Clone)]
pub enum TimeSlice<'a> {
    /// No live parcel: nothing to process for this slice
    Empty { index: usize, itime: i64 },
    Window(SliceWindow<'a>),
}

/// Lazy, non-restartable scan of the slices of one output interval
///
/// `ante` is the snapshot at `ta` (read first in a backward run), `post`
/// the one at `tp = ta - step`.
pub struct SliceGenerator<'a> {
    ante: &'a Snapshot,
    post: &'a Snapshot,
    live: &'a LiveSet,
    domain: Domain,
    ta: NaiveDateTime,
    tp: NaiveDateTime,
    tf: NaiveDateTime,
    width: Duration,
    nb_slices: usize,
    next: usize,
    previous_start: Option<Vec<ParcelState>>,
}

impl<'a> SliceGenerator<'a> {
    /// Slices of width `width` over `[tp, tp + step]`
    pub fn new(
        ante: &'a Snapshot,
        post: &'a Snapshot,
        live: &'a LiveSet,
        domain: Domain,
        tp: NaiveDateTime,
        step: Duration,
        width: Duration,
    ) -> Self {
        let ta = tp + step;
        let nb_slices = (step.num_seconds() / width.num_seconds().max(1)) as usize;
        Self {
            ante,
            post,
            live,
            domain,
            ta,
            tp,
            tf: ta,
            width,
            nb_slices,
            next: 0,
            previous_start: None,
        }
    }

    fn clamped(&self, s: ParcelState) -> ParcelState {
        ParcelState {
            x: self.domain.clamp_lon(s.x),
            y: self.domain.clamp_lat(s.y),
            ..s
        }
    }

    fn at_ante(&self) -> Vec<ParcelState> {
        let states = self.ante.states();
        self.live
            .ante_rows
            .iter()
            .map(|&r| self.clamped(states[r]))
            .collect()
    }

    fn at_post(&self) -> Vec<ParcelState> {
        let states = self.post.states();
        self.live
            .post_rows
            .iter()
            .map(|&r| self.clamped(states[r]))
            .collect()
    }

    fn interpolated(&self, coef_a: f64, coef_p: f64) -> Vec<ParcelState> {
        let (sa, sp) = (self.ante.states(), self.post.states());
        self.live
            .ante_rows
            .iter()
            .zip(&self.live.post_rows)
            .map(|(&ra, &rp)| {
                let (a, p) = (sa[ra], sp[rp]);
                self.clamped(ParcelState {
                    x: coef_a * a.x + coef_p * p.x,
                    y: coef_a * a.y + coef_p * p.y,
                    p: coef_a * a.p + coef_p * p.p,
                    t: coef_a * a.t + coef_p * p.t,
                })
            })
            .collect()
    }
}

impl<'a> Iterator for SliceGenerator<'a> {
    type Item = TimeSlice<'a>;

    fn next(&mut self) -> Option<TimeSlice<'a>> {
        if self.next >= self.nb_slices {
            return None;
        }
        let index = self.next;
        self.next += 1;

        let tf = self.tf;
        let ti = tf - self.width;
        self.tf = ti;
        let itime = self.ante.itime() - (index as i64 + 1) * self.width.num_seconds();

        if self.live.is_empty() {
            return Some(TimeSlice::Empty { index, itime });
        }

        let span = (self.ta - self.tp).num_seconds() as f64;
        let coef_a = (ti - self.tp).num_seconds() as f64 / span;
        let coef_p = (self.ta - ti).num_seconds() as f64 / span;

        let end = match self.previous_start.take() {
            Some(start) if index > 0 => start,
            _ => self.at_ante(),
        };
        let start = if index + 1 == self.nb_slices {
            self.at_post()
        } else {
            self.interpolated(coef_a, coef_p)
        };
        self.previous_start = Some(start.clone());

        Some(TimeSlice::Window(SliceWindow {
            index,
            ti,
            tf,
            itime,
            coef_a,
            coef_p,
            slots: self.live.slots(),
            start,
            end,
        }))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.nb_slices - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for SliceGenerator<'_> {}
