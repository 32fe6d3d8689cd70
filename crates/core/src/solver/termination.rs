//! Parcel termination: domain exits and ground contact

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::core_types::{
    ExitCode, Milestone, ParcelFlags, ParcelState, ParcelTable, RunConfig, Snapshot,
};
use crate::error::ConvsrcError;
use crate::solver::slices::SliceWindow;

/// Margin (Pa) below the bottom release pressure treated as a bottom exit
const BOTTOM_TOLERANCE: f64 = 150.0;
/// Margin (Pa) above the top pressure cut treated as a top exit
const TOP_TOLERANCE: f64 = 15.0;

/// Classify where a parcel left the domain from its last known state
///
/// Lateral boundaries win over vertical ones, in the order south, west,
/// north, east.
pub fn classify_exit(state: &ParcelState, config: &RunConfig) -> ExitCode {
    let d = &config.domain;
    let margin = config.exit_margin;
    if state.y < d.lat_min + margin {
        ExitCode::South
    } else if state.x < d.lon_min + margin {
        ExitCode::West
    } else if state.y > d.lat_max - margin {
        ExitCode::North
    } else if state.x > d.lon_max - margin {
        ExitCode::East
    } else if state.p > config.high_pcut - BOTTOM_TOLERANCE {
        ExitCode::Bottom
    } else if state.p < config.low_pcut + TOP_TOLERANCE {
        ExitCode::Top
    } else {
        ExitCode::Unknown
    }
}

/// Terminate parcels of `ante` that no longer appear in the newer-in-scan snapshot
///
/// The terminal milestone is the last known state, timed at `itime`.
/// Already DEAD parcels are left untouched.
///
/// # Errors
/// Returns `ConvsrcError::ParcelOutOfRange` for an id outside the roster
pub fn exit_departed(
    table: &mut ParcelTable,
    config: &RunConfig,
    ante: &Snapshot,
    post_positions: &FxHashMap<u64, usize>,
    itime: i64,
) -> Result<usize, ConvsrcError> {
    let mut exits = 0;
    for (&id, state) in ante.ids().iter().zip(ante.states()) {
        if post_positions.contains_key(&id) {
            continue;
        }
        let slot = table.index().slot(id)?;
        let code = classify_exit(state, config);
        let at = Milestone::at(state, table.age_at(slot, itime));
        if table.terminate(slot, ParcelFlags::CROSSED, Some(code), at) {
            exits += 1;
        }
    }
    if exits > 0 {
        debug!("{} parcels left the domain", exits);
    }
    Ok(exits)
}

/// Terminate parcels whose slice crossed the ground or left the reanalysis data
///
/// `rows` index into the window; the terminal milestone is the slice end state.
pub fn ground_contact(table: &mut ParcelTable, window: &SliceWindow<'_>, rows: &[usize]) -> usize {
    rows.iter()
        .filter(|&&row| {
            let slot = window.slots[row];
            let at = Milestone::at(&window.end[row], table.age_at(slot, window.itime));
            table.terminate(slot, ParcelFlags::CROSSED, Some(ExitCode::Ground), at)
        })
        .count()
}
