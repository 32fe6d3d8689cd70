//! Fatal run errors
//!
//! Anything surfacing as a `ConvsrcError` aborts the run before any output is
//! written. Numerical anomalies along trajectories are not errors: they are
//! logged and routed to the ground-contact termination instead.

use crate::atmosphere::FieldError;
use crate::simulation::persistence::OutputError;
use std::fmt;

/// Errors that abort a convective-source run
#[derive(Debug)]
pub enum ConvsrcError {
    /// Underlying I/O failure while reading inputs
    Io(std::io::Error),
    /// Trajectory snapshot could not be produced for an output hour
    TrajectoryUnavailable { hour: u32, reason: String },
    /// Column reads of one record set disagree in length
    RecordCount {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    /// Parcel identifier outside `[origin, origin + numpart)`
    ParcelOutOfRange { id: u64, origin: u64, numpart: usize },
    /// Reanalysis field could not be prepared
    Field(FieldError),
    /// Inconsistent configuration (grid shapes, step/slice ratio, ...)
    Config(String),
    /// Final output could not be written at all
    Output(OutputError),
}

impl fmt::Display for ConvsrcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvsrcError::Io(e) => write!(f, "I/O error: {e}"),
            ConvsrcError::TrajectoryUnavailable { hour, reason } => {
                write!(f, "No trajectory snapshot for hour {hour}: {reason}")
            }
            ConvsrcError::RecordCount {
                what,
                expected,
                found,
            } => write!(
                f,
                "Inconsistent record count in {what}: expected {expected}, found {found}"
            ),
            ConvsrcError::ParcelOutOfRange {
                id,
                origin,
                numpart,
            } => write!(
                f,
                "Parcel id {id} outside roster [{origin}, {})",
                *origin + *numpart as u64
            ),
            ConvsrcError::Field(e) => write!(f, "Reanalysis error: {e}"),
            ConvsrcError::Config(msg) => write!(f, "Invalid configuration: {msg}"),
            ConvsrcError::Output(e) => write!(f, "Output error: {e}"),
        }
    }
}

impl std::error::Error for ConvsrcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConvsrcError::Io(e) => Some(e),
            ConvsrcError::Field(e) => Some(e),
            ConvsrcError::Output(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConvsrcError {
    fn from(e: std::io::Error) -> Self {
        ConvsrcError::Io(e)
    }
}

impl From<FieldError> for ConvsrcError {
    fn from(e: FieldError) -> Self {
        ConvsrcError::Field(e)
    }
}

impl From<OutputError> for ConvsrcError {
    fn from(e: OutputError) -> Self {
        ConvsrcError::Output(e)
    }
}

/// Check that a column has the expected number of records
///
/// # Errors
/// Returns `ConvsrcError::RecordCount` when the lengths differ
pub(crate) fn check_len(what: &'static str, expected: usize, found: usize) -> Result<(), ConvsrcError> {
    if expected == found {
        Ok(())
    } else {
        Err(ConvsrcError::RecordCount {
            what,
            expected,
            found,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_count_display() {
        let err = check_len("snapshot x", 10, 9).unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("snapshot x"), "got: {msg}");
        assert!(msg.contains("expected 10"), "got: {msg}");
    }

    #[test]
    fn test_out_of_range_display() {
        let err = ConvsrcError::ParcelOutOfRange {
            id: 42,
            origin: 1,
            numpart: 10,
        };
        assert_eq!(format!("{err}"), "Parcel id 42 outside roster [1, 11)");
    }
}
