//! Per-slice processing of the backward run
//!
//! Between two trajectory outputs the run scans the interval backward in
//! time slices. For each slice the solver:
//! 1. Interpolates the positions of the live parcels at the slice bounds
//! 2. Locates every parcel on the hybrid model grid
//! 3. Terminates parcels that reached the ground or left the valid data
//! 4. Erodes the survivors by the detrainment along their path
//!
//! Parcels that disappear from the trajectory set between two outputs are
//! classified as domain exits before the slices are scanned.
//!
//! # Example
//!
//! ```rust,ignore
//! use convsrc_core::solver::{LiveSet, SliceGenerator, TimeSlice};
//!
//! let live = LiveSet::new(&ante, &post.positions(), &table)?;
//! for slice in SliceGenerator::new(&ante, &post, &live, domain, tp, step, width) {
//!     if let TimeSlice::Window(window) = slice {
//!         // locate, ground, detrain
//!     }
//! }
//! ```

mod detrainment;
mod slices;
mod termination;

pub use detrainment::{detrain, locate_levels, LevelSample};
pub use slices::{LiveSet, SliceGenerator, SliceWindow, TimeSlice};
pub use termination::{classify_exit, exit_departed, ground_contact};
