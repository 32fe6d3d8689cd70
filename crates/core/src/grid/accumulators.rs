//! Spatial and regional accumulation of detrained mass

use crate::core_types::ReanalysisKind;
use crate::error::ConvsrcError;
use crate::grid::fields::FieldData;
use crate::grid::raster::Cell;
use crate::grid::region::RegionMask;

/// Detrained mass per source cell and per region
///
/// Both accumulators only ever grow; their totals equal the sum of all chi
/// decrements deposited.
#[derive(Debug, Clone)]
pub struct SourceAccumulator {
    source: FieldData<f64>,
    regional: Vec<f64>,
    mask: RegionMask,
    shift: (i64, i64),
}

impl SourceAccumulator {
    /// Accumulator on an explicit grid shape and field-to-source shift
    ///
    /// # Errors
    /// Returns `ConvsrcError::Config` if the mask does not match the grid
    pub fn new(shape: (usize, usize), shift: (i64, i64), mask: RegionMask) -> Result<Self, ConvsrcError> {
        if mask.shape() != shape {
            return Err(ConvsrcError::Config(format!(
                "region mask {:?} does not fit the source grid {:?}",
                mask.shape(),
                shape
            )));
        }
        Ok(Self {
            source: FieldData::new(shape.0, shape.1),
            regional: vec![0.0; mask.slots()],
            mask,
            shift,
        })
    }

    /// Accumulator laid out for a reanalysis
    ///
    /// # Errors
    /// Returns `ConvsrcError::Config` if the mask does not match the grid
    pub fn for_reanalysis(kind: ReanalysisKind, mask: RegionMask) -> Result<Self, ConvsrcError> {
        Self::new(kind.source_shape(), kind.source_shift(), mask)
    }

    /// Source cell (row, col) at the midpoint of a path between two field cells
    pub fn midpoint(&self, start: Cell, end: Cell) -> (usize, usize) {
        let xm = (start.0 + end.0) / 2 + self.shift.0;
        let ym = (start.1 + end.1) / 2 + self.shift.1;
        self.source.clamp_cell(xm, ym)
    }

    /// Add `mass` to a source cell and to its region
    pub fn deposit(&mut self, row: usize, col: usize, mass: f64) {
        *self.source.get_mut(row, col) += mass;
        self.regional[self.mask.code(row, col)] += mass;
    }

    pub fn source(&self) -> &FieldData<f64> {
        &self.source
    }

    pub fn regional(&self) -> &[f64] {
        &self.regional
    }

    pub fn mask(&self) -> &RegionMask {
        &self.mask
    }

    /// Total mass deposited
    pub fn total(&self) -> f64 {
        self.source.total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn accumulator(shift: (i64, i64)) -> SourceAccumulator {
        let codes = FieldData::from_vec(3, 4, vec![0, 0, 1, 1, 0, 0, 1, 1, 2, 2, 2, 2]).unwrap();
        let mask = RegionMask::new(codes, vec!["east".into(), "south".into()]).unwrap();
        SourceAccumulator::new((3, 4), shift, mask).unwrap()
    }

    #[test]
    fn test_midpoint_truncates_and_clamps() {
        let acc = accumulator((0, 0));
        assert_eq!(acc.midpoint((0, 0), (3, 1)), (0, 1));
        assert_eq!(acc.midpoint((10, 10), (12, 12)), (2, 3));
        let shifted = accumulator((-2, 1));
        assert_eq!(shifted.midpoint((2, 0), (2, 0)), (1, 0));
    }

    #[test]
    fn test_deposit_feeds_both_accumulators() {
        let mut acc = accumulator((0, 0));
        acc.deposit(0, 3, 0.25);
        acc.deposit(2, 0, 0.5);
        acc.deposit(0, 0, 0.125);
        assert_relative_eq!(acc.total(), 0.875);
        assert_eq!(acc.regional(), &[0.125, 0.25, 0.5]);
    }

    #[test]
    fn test_reanalysis_layout() {
        let (rows, cols) = ReanalysisKind::EraInterim.source_shape();
        let acc = SourceAccumulator::for_reanalysis(
            ReanalysisKind::EraInterim,
            RegionMask::unassigned(rows, cols),
        )
        .unwrap();
        assert_eq!(acc.source().shape(), (51, 171));
        // global 1° field cell (200, 100) lands on 31E, 10N
        assert_eq!(acc.midpoint((200, 100), (200, 100)), (10, 31));
    }

    #[test]
    fn test_mask_shape_mismatch() {
        let mask = RegionMask::unassigned(2, 2);
        assert!(SourceAccumulator::new((3, 4), (0, 0), mask).is_err());
    }
}
