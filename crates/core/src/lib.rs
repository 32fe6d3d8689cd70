//! Convective Source Core Library
//!
//! Reconstructs, from backward trajectories, the convective sources that
//! injected air parcels into the upper troposphere and lower stratosphere.
//! Each parcel carries a survival fraction eroded by the updraught
//! detrainment of the reanalysis along its path; the eroded mass is mapped
//! onto a source grid and summed by region.
//!
//! ## Backward Run
//!
//! The run processes trajectory outputs backward in time:
//! - Deadborne detection of parcels released but never observed
//! - Domain exits and ground contact as terminal events
//! - Detrainment erosion over sub-step time slices with a five-threshold ratchet
//! - Age-limit termination
//! - Two independently compressed copies of the final result set

// Core types: flags, parcel table, snapshots, configuration
pub mod core_types;

// Run errors
pub mod error;

// Grids, rasterization and accumulators
pub mod grid;

// Reanalysis fields and hybrid levels
pub mod atmosphere;

// Per-slice processing
pub mod solver;

// Run loop, sweeps, statistics and output
pub mod simulation;

// In-memory collaborators for demos and tests
pub mod synthetic;

// Re-export core types
pub use core_types::{
    Domain, ExitCode, GranuleLayout, LaunchTable, Milestone, ParcelFlags, ParcelIndex,
    ParcelState, ParcelTable, Ratchet, ReanalysisKind, RunConfig, RunPaths, Snapshot,
};
pub use error::ConvsrcError;

// Re-export grid and reanalysis types
pub use atmosphere::{
    FieldError, HybridCoefficients, HybridInverter, RawReanalysis, ReanalysisField,
    ReanalysisProvider,
};
pub use grid::{rasterize, RegionMask, SourceAccumulator};

// Re-export run types
pub use simulation::{
    Census, ConvectiveSourceRun, OutputError, RunProduct, RunStats, TrajectorySource,
};
pub use synthetic::{DemoScenario, SyntheticReanalysis, SyntheticTrajectories};
