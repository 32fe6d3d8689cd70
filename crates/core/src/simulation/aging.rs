//! Age-limit sweep

use tracing::debug;

use crate::core_types::{Milestone, ParcelFlags, ParcelTable, RunConfig, Snapshot};
use crate::error::ConvsrcError;

/// Terminate as OLD the parcels of `ante` older than the age bound
///
/// Parcels already DEAD or HIT are skipped. The terminal milestone is the
/// `ante` state with the age in seconds.
///
/// # Errors
/// Returns `ConvsrcError::ParcelOutOfRange` for an id outside the roster
pub fn age_sweep(
    table: &mut ParcelTable,
    config: &RunConfig,
    ante: &Snapshot,
) -> Result<usize, ConvsrcError> {
    let limit = config.age_limit_seconds();
    let mut old = 0;
    for (&id, state) in ante.ids().iter().zip(ante.states()) {
        let slot = table.index().slot(id)?;
        if table.flags(slot).intersects(ParcelFlags::STOP) {
            continue;
        }
        let age = table.age_at(slot, ante.itime());
        if age > limit && table.terminate(slot, ParcelFlags::OLD, None, Milestone::at(state, age)) {
            old += 1;
        }
    }
    debug!("{} parcels reached the age limit", old);
    Ok(old)
}
