//! Core types and utilities

pub mod config;
pub mod flags;
pub mod parcel;
pub mod snapshot;

pub use config::{Domain, GranuleLayout, ReanalysisKind, RunConfig, RunPaths};
pub use flags::{ExitCode, ParcelFlags};
pub use parcel::{
    Milestone, ParcelIndex, ParcelTable, Ratchet, Rung, MILESTONE_SLOTS, RUNGS, TERMINAL_SLOT,
};
pub use snapshot::{LaunchTable, ParcelState, Snapshot};
