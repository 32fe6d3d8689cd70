//! Static region mask
//!
//! Maps each cell of the source grid to an integer region code. Code 0 is
//! conventionally "no region"; named regions use codes `1..=names.len()`.

use crate::grid::fields::FieldData;
use crate::error::ConvsrcError;

#[derive(Debug, Clone)]
pub struct RegionMask {
    codes: FieldData<u16>,
    names: Vec<String>,
}

impl RegionMask {
    /// Mask over `codes` for the named regions
    ///
    /// # Errors
    /// Returns `ConvsrcError::Config` if a code exceeds the number of regions
    pub fn new(codes: FieldData<u16>, names: Vec<String>) -> Result<Self, ConvsrcError> {
        if let Some(&bad) = codes.as_slice().iter().find(|&&c| usize::from(c) > names.len()) {
            return Err(ConvsrcError::Config(format!(
                "region code {bad} exceeds the {} named regions",
                names.len()
            )));
        }
        Ok(Self { codes, names })
    }

    /// Mask assigning every cell to "no region"
    pub fn unassigned(rows: usize, cols: usize) -> Self {
        Self {
            codes: FieldData::new(rows, cols),
            names: Vec::new(),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.codes.shape()
    }

    /// Region code of a cell
    #[inline]
    pub fn code(&self, row: usize, col: usize) -> usize {
        usize::from(self.codes.get(row, col))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Length of the regional accumulator
    pub fn slots(&self) -> usize {
        self.names.len() + 1
    }
}
