//! Run configuration
//!
//! Everything the handlers need to know about the run is carried in an
//! immutable `RunConfig` passed by reference; there is no ambient state.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ConvsrcError;

/// Geographic box in which the parcels live
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
}

impl Domain {
    /// Clamp a longitude into the box
    #[inline]
    pub fn clamp_lon(&self, x: f64) -> f64 {
        x.clamp(self.lon_min, self.lon_max)
    }

    /// Clamp a latitude into the box
    #[inline]
    pub fn clamp_lat(&self, y: f64) -> f64 {
        y.clamp(self.lat_min, self.lat_max)
    }
}

impl Default for Domain {
    fn default() -> Self {
        Self {
            lon_min: -10.0,
            lon_max: 160.0,
            lat_min: 0.0,
            lat_max: 50.0,
        }
    }
}

/// Parcel release batching of the trajectory run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GranuleLayout {
    /// Parcels launched per release slot
    pub size: usize,
    /// Release slots per output step
    pub step: usize,
}

impl GranuleLayout {
    /// Layout used by the trajectory runs for an advection tag
    pub fn for_advection(advect: &str) -> Self {
        if advect.contains("FULL") {
            Self { size: 28800, step: 6 }
        } else {
            Self {
                size: 8500,
                step: 6 * 4,
            }
        }
    }

    /// Parcels released during one output step
    pub fn quanta(&self) -> usize {
        self.size * self.step
    }
}

/// Reanalysis providing the detrainment rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ReanalysisKind {
    #[default]
    Era5,
    EraInterim,
}

impl ReanalysisKind {
    /// Parse the command-line tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "ERA5" => Some(Self::Era5),
            "ERAI" => Some(Self::EraInterim),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Self::Era5 => "ERA5",
            Self::EraInterim => "ERAI",
        }
    }

    /// Interval between two archived fields
    pub fn field_step(self) -> Duration {
        match self {
            Self::Era5 => Duration::hours(1),
            Self::EraInterim => Duration::hours(3),
        }
    }

    /// (rows, cols) of the accumulated source grid
    pub fn source_shape(self) -> (usize, usize) {
        match self {
            Self::Era5 => (201, 681),
            Self::EraInterim => (51, 171),
        }
    }

    /// (x, y) shift from field grid cells to source grid cells
    pub fn source_shift(self) -> (i64, i64) {
        match self {
            Self::Era5 => (0, 0),
            Self::EraInterim => (-169, -90),
        }
    }
}

impl fmt::Display for ReanalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Immutable parameters of a convective-source run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Start of the backward run (itime = 0)
    pub start: NaiveDateTime,
    /// Hours between two trajectory outputs
    pub step_hours: u32,
    /// Last output hour processed
    pub hmax: u32,
    /// Width of a time slice (hours); must divide `step_hours`
    pub slice_hours: u32,
    /// Exposure window of one erosion (s), independent of the slice width
    pub exposure_seconds: f64,
    /// Detrainment rates below this floor are numerical noise (s⁻¹)
    pub detr_offset: f64,
    /// Parcels older than this (days) are terminated
    pub age_bound_days: f64,
    pub domain: Domain,
    /// Margin (degrees) for edge classification of exits
    pub exit_margin: f64,
    /// Low pressure cut of the trajectory run (Pa)
    pub low_pcut: f64,
    /// High pressure cut of the trajectory run (Pa)
    pub high_pcut: f64,
    /// Hybrid levels beyond this index are below valid data
    pub hybrid_ceiling: i64,
    /// Warn when sigma exceeds this
    pub sigma_warning: f64,
    /// Warn when surface pressure falls below this (Pa)
    pub surface_pressure_warning: f64,
    pub granules: GranuleLayout,
    pub reanalysis: ReanalysisKind,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2017, 9, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap_or_default(),
            step_hours: 6,
            hmax: 1824,
            slice_hours: 1,
            exposure_seconds: 3600.0,
            detr_offset: 1.0 / (100.0 * 3600.0),
            age_bound_days: 44.0,
            domain: Domain::default(),
            exit_margin: 4.0,
            low_pcut: 3000.0,
            high_pcut: 50000.0,
            hybrid_ceiling: 100,
            sigma_warning: 0.95,
            surface_pressure_warning: 45000.0,
            granules: GranuleLayout::for_advection("EAD"),
            reanalysis: ReanalysisKind::Era5,
        }
    }
}

impl RunConfig {
    /// Configuration for parcels released during `month` of `year`
    ///
    /// The backward run starts on the first day of the following month.
    ///
    /// # Errors
    /// Returns `ConvsrcError::Config` for an invalid month
    pub fn for_month(
        year: i32,
        month: u32,
        advect: &str,
        reanalysis: ReanalysisKind,
    ) -> Result<Self, ConvsrcError> {
        let (y, m) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
        let start = NaiveDate::from_ymd_opt(y, m, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(|| ConvsrcError::Config(format!("invalid month {year}-{month}")))?;
        Ok(Self {
            start,
            granules: GranuleLayout::for_advection(advect),
            reanalysis,
            ..Self::default()
        })
    }

    /// Load a JSON configuration; missing keys take the default values
    ///
    /// # Errors
    /// Returns `ConvsrcError::Io` if the file cannot be read and
    /// `ConvsrcError::Config` if it cannot be parsed or is inconsistent
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConvsrcError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self =
            serde_json::from_str(&contents).map_err(|e| ConvsrcError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency
    ///
    /// # Errors
    /// Returns `ConvsrcError::Config` describing the first inconsistency
    pub fn validate(&self) -> Result<(), ConvsrcError> {
        if self.step_hours == 0 || self.slice_hours == 0 {
            return Err(ConvsrcError::Config("step and slice width must be positive".into()));
        }
        if self.step_hours % self.slice_hours != 0 {
            return Err(ConvsrcError::Config(format!(
                "slice width {}h does not divide the output step {}h",
                self.slice_hours, self.step_hours
            )));
        }
        if self.granules.size == 0 || self.granules.step == 0 {
            return Err(ConvsrcError::Config("empty granule layout".into()));
        }
        Ok(())
    }

    pub fn step(&self) -> Duration {
        Duration::hours(i64::from(self.step_hours))
    }

    pub fn slice_width(&self) -> Duration {
        Duration::hours(i64::from(self.slice_hours))
    }

    /// Number of slices per output step
    pub fn slices_per_step(&self) -> usize {
        (self.step_hours / self.slice_hours) as usize
    }

    /// Age limit in seconds, with the quarter-day allowance of the sweep
    pub fn age_limit_seconds(&self) -> f64 {
        (self.age_bound_days - 0.25) * 86400.0
    }

    /// Date of the release month (one day before the start)
    pub fn release_date(&self) -> NaiveDateTime {
        self.start - Duration::days(1)
    }
}

/// Input and output locations derived from the command surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    /// Common stem, e.g. `BACK-EAD-Aug-2017-380K`
    pub run_name: String,
    pub traj_dir: PathBuf,
    /// LZ4-compressed output
    pub out_lz4: PathBuf,
    /// zlib-compressed output
    pub out_zlib: PathBuf,
    /// Log file used in quiet mode
    pub log_file: PathBuf,
}

impl RunPaths {
    /// Build the paths for a run
    pub fn new(
        traj_root: &Path,
        out_root: &Path,
        advect: &str,
        config: &RunConfig,
        level: u32,
        suffix: Option<&str>,
    ) -> Self {
        let release = config.release_date();
        let suffix = suffix.map(|s| format!("-{s}")).unwrap_or_default();
        let run_name = format!(
            "BACK-{advect}-{}-{}-{level}K{suffix}",
            month_abbrev(release.month()),
            release.year()
        );
        let rea = config.reanalysis.tag();
        let out_dir = out_root.join("STC-BACK-DETR-OUT");
        Self {
            traj_dir: traj_root.join(&run_name),
            out_lz4: out_dir.join(format!("{run_name}-{rea}.lz4")),
            out_zlib: out_dir.join(format!("{run_name}-{rea}.zlib")),
            log_file: out_dir.join("out").join(format!("{run_name}-{rea}.out")),
            run_name,
        }
    }
}

fn month_abbrev(month: u32) -> &'static str {
    const NAMES: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    NAMES[(month as usize).saturating_sub(1) % 12]
}
