//! Reanalysis fields along the trajectories.
//!
//! This module provides the meteorological side of the detrainment analysis:
//! - Preparation of decoded reanalysis arrays into a read-only field view
//! - Updraught detrainment rate per unit mass on hybrid model levels
//! - Interpolated surface pressure at parcel positions
//! - Inversion of parcel pressure to hybrid model levels
//!
//! # Scientific Background
//!
//! The updraught detrainment rate of the convection scheme measures the mass
//! leaving convective clouds per unit volume and time. Divided by the dry air
//! density it becomes a rate per unit mass (s⁻¹), so that exposure during one
//! hour erodes the undetrained fraction of a parcel by `exp(−3600·rate)`.
//!
//! # References
//!
//! - Simmons, A.J. & Burridge, D.M. (1981). "An energy and angular-momentum conserving
//!   vertical finite-difference scheme and hybrid vertical coordinates." MWR.
//! - Bucci, S. et al. (2020). "Deep-convective influence on the upper troposphere–lower
//!   stratosphere composition in the Asian monsoon anticyclone region." ACP.

mod hybrid;
mod reanalysis;

pub use hybrid::{HybridCoefficients, HybridInverter};
pub use reanalysis::{FieldError, RawReanalysis, ReanalysisField, ReanalysisProvider, R_DRY};
