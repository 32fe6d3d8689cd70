//! Detrainment erosion along slice paths
//!
//! During one slice a parcel sweeps the cells of the Bresenham line between
//! its start and end positions, on the hybrid level of its mean pressure.
//! The mean detrainment rate along that path erodes the survival fraction
//!
//! ```text
//! chi' = chi · exp(−τ · rate)        τ = 3600 s
//! ```
//!
//! and the eroded mass `chi − chi'` is deposited at the midpoint source cell.
//! Each survival threshold crossed for the first time archives the slice
//! start state in its milestone slot.

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::atmosphere::{HybridInverter, ReanalysisField};
use crate::core_types::{Milestone, ParcelTable, RunConfig, MILESTONE_SLOTS};
use crate::grid::{Cell, Line, SourceAccumulator};
use crate::solver::slices::SliceWindow;

/// Hybrid level index of every parcel of a window
#[derive(Debug, Clone)]
pub struct LevelSample {
    /// Index into the retained levels; `None` outside the valid data
    pub levels: Vec<Option<i64>>,
    /// Smallest −log σ seen (finite values only)
    pub min_neg_log_sigma: f64,
    /// Largest −log ps seen (finite values only)
    pub max_neg_log_ps: f64,
}

impl LevelSample {
    /// Rows whose level lies below the valid data or could not be located
    pub fn grounded(&self, ceiling: i64) -> Vec<usize> {
        self.levels
            .iter()
            .enumerate()
            .filter(|(_, lev)| lev.is_none_or(|l| l > ceiling))
            .map(|(row, _)| row)
            .collect()
    }
}

/// Locate each parcel of the window on the hybrid grid
///
/// Position and pressure are taken at the middle of the slice.
pub fn locate_levels<H: HybridInverter>(
    window: &SliceWindow<'_>,
    field: &ReanalysisField,
    inverter: &H,
) -> LevelSample {
    let first = field.first_level();
    let located: Vec<(Option<i64>, f64, f64)> = window
        .start
        .par_iter()
        .zip(window.end.par_iter())
        .map(|(s, e)| {
            let lat = 0.5 * (s.y + e.y);
            let lon = 0.5 * (s.x + e.x);
            let lsp = field.neg_log_surface_pressure(lat, lon);
            let lsig = -(0.5 * (s.p + e.p)).ln() - lsp;
            let hyb = inverter.level(lsig, lsp);
            let level = hyb
                .is_finite()
                .then(|| (hyb + 0.5).floor() as i64 - first);
            (level, lsig, lsp)
        })
        .collect();

    let mut sample = LevelSample {
        levels: Vec::with_capacity(located.len()),
        min_neg_log_sigma: f64::INFINITY,
        max_neg_log_ps: f64::NEG_INFINITY,
    };
    for (level, lsig, lsp) in located {
        sample.levels.push(level);
        sample.min_neg_log_sigma = sample.min_neg_log_sigma.min(lsig);
        sample.max_neg_log_ps = sample.max_neg_log_ps.max(lsp);
    }
    sample
}

/// Mean detrainment along one parcel path
#[derive(Debug, Clone, Copy)]
struct PathSample {
    row: usize,
    start: Cell,
    end: Cell,
    rate: f64,
}

/// Erode the live parcels of a window and record the crossed thresholds
///
/// Parcels already DEAD, or whose level has no data, are left untouched.
/// Returns the number of first crossings per milestone slot (slot 0 unused).
pub fn detrain(
    table: &mut ParcelTable,
    acc: &mut SourceAccumulator,
    field: &ReanalysisField,
    config: &RunConfig,
    window: &SliceWindow<'_>,
    levels: &[Option<i64>],
) -> [usize; MILESTONE_SLOTS] {
    let mut hits = [0; MILESTONE_SLOTS];
    let view: &ParcelTable = table;

    let sampled: Vec<Result<PathSample, i64>> = (0..window.len())
        .into_par_iter()
        .filter_map(|row| {
            if view.flags(window.slots[row]).is_dead() {
                return None;
            }
            let level = levels[row]?;
            let (s, e) = (&window.start[row], &window.end[row]);
            let start = field.cell_of(s.x, s.y);
            let end = field.cell_of(e.x, e.y);
            let path = Line::new(start.0, start.1, end.0, end.1);
            let n = path.len();
            let mut total = 0.0;
            for cell in path {
                match field.detrainment_at(level, cell) {
                    Some(rate) => total += rate,
                    None => return Some(Err(level)),
                }
            }
            Some(Ok(PathSample {
                row,
                start,
                end,
                rate: total / n as f64,
            }))
        })
        .collect();

    let mut missing = 0usize;
    for sample in sampled {
        let sample = match sample {
            Ok(sample) => sample,
            Err(level) => {
                missing += 1;
                debug!("level index {} not retained in the reanalysis", level);
                continue;
            }
        };
        if sample.rate < config.detr_offset {
            continue;
        }
        let slot = window.slots[sample.row];
        let chi = table.chi(slot);
        let eroded = chi * (-config.exposure_seconds * sample.rate).exp();
        let (row, col) = acc.midpoint(sample.start, sample.end);
        acc.deposit(row, col, chi - eroded);
        table.set_chi(slot, eroded);

        let at = Milestone::at(&window.start[sample.row], table.age_at(slot, window.itime));
        while let Some(rung) = table.ratchet(slot).pending() {
            if eroded >= rung.threshold {
                break;
            }
            table.fire_rung(slot, rung, at);
            hits[rung.slot] += 1;
        }
    }
    if missing > 0 {
        warn!(
            "{} parcels on levels outside the retained reanalysis levels at {}",
            missing, window.ti
        );
    }
    hits
}
