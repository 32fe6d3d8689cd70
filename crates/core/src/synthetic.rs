//! In-memory collaborators for demos and tests
//!
//! - `SyntheticTrajectories`: snapshots held in memory by output hour
//! - `SyntheticReanalysis`: analytic detrainment rates on a regular grid,
//!   handed over as raw arrays exactly like a decoded archive would be
//! - `DemoScenario`: a seeded release of parcels drifting backward through
//!   two convective regions

use chrono::{NaiveDateTime, Timelike};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::info;

use crate::atmosphere::{
    FieldError, HybridCoefficients, RawReanalysis, ReanalysisField, ReanalysisProvider, R_DRY,
};
use crate::core_types::{Domain, LaunchTable, ParcelState, ReanalysisKind, RunConfig, Snapshot};
use crate::error::ConvsrcError;
use crate::grid::{FieldData, RegionMask};
use crate::simulation::TrajectorySource;

/// Trajectory snapshots keyed by output hour
#[derive(Debug, Clone, Default)]
pub struct SyntheticTrajectories {
    snapshots: FxHashMap<u32, Snapshot>,
    last_hour: u32,
}

impl SyntheticTrajectories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the snapshot for an output hour
    pub fn insert(&mut self, hour: u32, snapshot: Snapshot) {
        self.last_hour = self.last_hour.max(hour);
        self.snapshots.insert(hour, snapshot);
    }

    /// Last output hour available
    pub fn last_hour(&self) -> u32 {
        self.last_hour
    }
}

impl TrajectorySource for SyntheticTrajectories {
    fn snapshot(&mut self, hour: u32) -> Result<Option<Snapshot>, ConvsrcError> {
        if hour > self.last_hour {
            return Ok(None);
        }
        self.snapshots
            .remove(&hour)
            .map(Some)
            .ok_or_else(|| ConvsrcError::TrajectoryUnavailable {
                hour,
                reason: "no snapshot stored for this hour".into(),
            })
    }
}

/// Analytic reanalysis on a regular latitude-longitude grid
///
/// `rate(lon, lat, level_index, valid)` is the detrainment rate per unit mass
/// (s⁻¹). Latitudes are served north to south, as archived.
pub struct SyntheticReanalysis<F> {
    kind: ReanalysisKind,
    lons: Vec<f64>,
    lats: Vec<f64>,
    ai: Vec<f64>,
    bi: Vec<f64>,
    surface_pressure: f64,
    temperature: f64,
    rate: F,
    missing: FxHashSet<NaiveDateTime>,
}

impl<F> SyntheticReanalysis<F>
where
    F: Fn(f64, f64, usize, NaiveDateTime) -> f64,
{
    /// Grid over `domain` at `resolution` degrees, with `nlev` model levels
    pub fn new(kind: ReanalysisKind, domain: Domain, resolution: f64, nlev: usize, rate: F) -> Self {
        let nlon = ((domain.lon_max - domain.lon_min) / resolution).round() as usize + 1;
        let nlat = ((domain.lat_max - domain.lat_min) / resolution).round() as usize + 1;
        let nlev = nlev.max(1);
        // half levels from 2000 Pa at the top down to the surface
        let eta: Vec<f64> = (0..=nlev).map(|i| i as f64 / nlev as f64).collect();
        Self {
            kind,
            lons: (0..nlon).map(|i| domain.lon_min + i as f64 * resolution).collect(),
            lats: (0..nlat).rev().map(|j| domain.lat_min + j as f64 * resolution).collect(),
            ai: eta.iter().map(|e| 2000.0 * (1.0 - e)).collect(),
            bi: eta,
            surface_pressure: 100_000.0,
            temperature: 220.0,
            rate,
            missing: FxHashSet::default(),
        }
    }

    /// Grid matching the source accumulator layout of `kind` over the default domain
    pub fn for_kind(kind: ReanalysisKind, nlev: usize, rate: F) -> Self {
        let domain = Domain::default();
        let (_, cols) = kind.source_shape();
        let resolution = (domain.lon_max - domain.lon_min) / (cols - 1) as f64;
        Self::new(kind, domain, resolution, nlev, rate)
    }

    /// Uniform surface pressure (Pa)
    pub fn with_surface_pressure(mut self, ps: f64) -> Self {
        self.surface_pressure = ps;
        self
    }

    /// Serve the detrainment product as unavailable at `valid`
    pub fn without_detrainment_at(mut self, valid: NaiveDateTime) -> Self {
        self.missing.insert(valid);
        self
    }

    /// (rows, cols) of the grid
    pub fn shape(&self) -> (usize, usize) {
        (self.lats.len(), self.lons.len())
    }

    /// Hybrid coefficients of the model levels
    pub fn hybrid(&self) -> HybridCoefficients {
        HybridCoefficients::from_half_levels(&self.ai, &self.bi)
    }

    fn raw(&self, valid: NaiveDateTime) -> RawReanalysis {
        let hybrid = self.hybrid();
        let nlev = hybrid.levels();
        let plane = self.lats.len() * self.lons.len();
        let detrainment = (!self.missing.contains(&valid)).then(|| {
            let mut udr = Vec::with_capacity(nlev * plane);
            for k in 0..nlev {
                let rho = hybrid.pressure(k + 1, self.surface_pressure) / (R_DRY * self.temperature);
                for &lat in &self.lats {
                    for &lon in &self.lons {
                        udr.push((self.rate)(lon, lat, k, valid) * rho);
                    }
                }
            }
            udr
        });
        RawReanalysis {
            valid,
            lons: self.lons.clone(),
            lats: self.lats.clone(),
            levs: (1..=nlev as i64).collect(),
            ai: self.ai.clone(),
            bi: self.bi.clone(),
            surface_pressure: vec![self.surface_pressure; plane],
            temperature: vec![self.temperature; nlev * plane],
            detrainment,
        }
    }
}

impl<F> ReanalysisProvider for SyntheticReanalysis<F>
where
    F: Fn(f64, f64, usize, NaiveDateTime) -> f64,
{
    fn kind(&self) -> ReanalysisKind {
        self.kind
    }

    fn field(&mut self, valid: NaiveDateTime) -> Result<ReanalysisField, FieldError> {
        ReanalysisField::from_raw(self.raw(valid))
    }
}

/// Convective detrainment of the demo: two Gaussian systems with a diurnal cycle
///
/// Active below the upper quarter of the levels.
pub fn monsoon_rate(nlev: usize) -> impl Fn(f64, f64, usize, NaiveDateTime) -> f64 + Clone {
    move |lon, lat, level, valid| {
        if level < nlev / 4 {
            return 0.0;
        }
        let phase = f64::from(valid.hour()) / 24.0 * std::f64::consts::TAU;
        let diurnal = 0.5 + 0.5 * phase.sin();
        let blob = |lon0: f64, lat0: f64, radius: f64| {
            let d2 = (lon - lon0).powi(2) + (lat - lat0).powi(2);
            (-d2 / (2.0 * radius * radius)).exp()
        };
        4e-4 * diurnal * (blob(88.0, 22.0, 6.0) + 0.6 * blob(125.0, 12.0, 8.0))
    }
}

/// Region mask of the demo: Asian monsoon and western Pacific boxes
pub fn monsoon_regions(kind: ReanalysisKind) -> RegionMask {
    let domain = Domain::default();
    let (rows, cols) = kind.source_shape();
    let dlon = (domain.lon_max - domain.lon_min) / (cols - 1) as f64;
    let dlat = (domain.lat_max - domain.lat_min) / (rows - 1) as f64;
    let mut codes: FieldData<u16> = FieldData::new(rows, cols);
    for row in 0..rows {
        let lat = domain.lat_min + row as f64 * dlat;
        for col in 0..cols {
            let lon = domain.lon_min + col as f64 * dlon;
            *codes.get_mut(row, col) = if (60.0..100.0).contains(&lon) && (5.0..40.0).contains(&lat) {
                1
            } else if (100.0..=160.0).contains(&lon) && (0.0..30.0).contains(&lat) {
                2
            } else {
                0
            };
        }
    }
    RegionMask::new(codes, vec!["Asian monsoon".into(), "Western Pacific".into()])
        .unwrap_or_else(|_| RegionMask::unassigned(rows, cols))
}

/// Seeded release of parcels near 380 K over the Bay of Bengal
pub struct DemoScenario {
    pub launch: LaunchTable,
    pub trajectories: SyntheticTrajectories,
    /// Parcels that never appear in a snapshot
    pub deadborne: Vec<u64>,
}

impl DemoScenario {
    /// Release `numpart` parcels and integrate them backward for `hours`
    ///
    /// # Errors
    /// Returns `ConvsrcError::RecordCount` if the generated tables disagree
    pub fn generate(config: &RunConfig, numpart: usize, hours: u32, seed: u64) -> Result<Self, ConvsrcError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let origin = 1u64;
        let size = config.granules.size.max(1);
        let release_interval = i64::from(config.step_hours) * 3600 / config.granules.step.max(1) as i64;

        let mut states = Vec::with_capacity(numpart);
        let mut launch_time = Vec::with_capacity(numpart);
        for k in 0..numpart {
            states.push(ParcelState {
                x: rng.random_range(82.0..92.0),
                y: rng.random_range(20.0..28.0),
                p: rng.random_range(9000.0..11000.0),
                t: rng.random_range(195.0..205.0),
            });
            launch_time.push(-((k / size) as i64) * release_interval);
        }
        let deadborne: Vec<u64> = (size..numpart)
            .filter(|_| rng.random::<f64>() < 0.01)
            .map(|k| origin + k as u64)
            .collect();
        let never_seen: FxHashSet<u64> = deadborne.iter().copied().collect();

        let launch = LaunchTable::new(origin, states.clone(), launch_time.clone(), vec![0; numpart])?;

        let domain = config.domain;
        let step = config.step_hours.max(1);
        let mut current: Vec<Option<ParcelState>> = vec![None; numpart];
        let mut gone = vec![false; numpart];
        let mut trajectories = SyntheticTrajectories::new();
        let mut previous_itime = 0i64;

        for k in 0..size.min(numpart) {
            current[k] = Some(states[k]);
        }
        for hour in (step..=hours).step_by(step as usize) {
            let itime = -i64::from(hour) * 3600;
            let mut ids = Vec::new();
            let mut snap = Vec::new();
            for k in 0..numpart {
                let id = origin + k as u64;
                if gone[k] || never_seen.contains(&id) || launch_time[k] < itime {
                    continue;
                }
                let next = match current[k] {
                    // westward drift in the monsoon anticyclone, descending backward
                    Some(s) if launch_time[k] >= previous_itime => ParcelState {
                        x: s.x - f64::from(step) * rng.random_range(0.05..0.35),
                        y: s.y + f64::from(step) * rng.random_range(-0.1..0.1),
                        p: s.p + f64::from(step) * rng.random_range(200.0..2000.0),
                        t: s.t + f64::from(step) * rng.random_range(0.0..1.5),
                    },
                    _ => states[k],
                };
                let inside = (domain.lon_min..=domain.lon_max).contains(&next.x)
                    && (domain.lat_min..=domain.lat_max).contains(&next.y)
                    && (config.low_pcut..=config.high_pcut).contains(&next.p);
                if !inside {
                    gone[k] = true;
                    current[k] = None;
                    continue;
                }
                current[k] = Some(next);
                ids.push(id);
                snap.push(next);
            }
            trajectories.insert(hour, Snapshot::new(itime, ids, snap)?);
            previous_itime = itime;
        }
        info!(
            "Generated demo scenario: {} parcels, {} deadborne, {} output hours",
            numpart,
            deadborne.len(),
            trajectories.last_hour()
        );
        Ok(Self {
            launch,
            trajectories,
            deadborne,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn valid() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2017, 8, 31)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_trajectories_exhaust_and_fail() {
        let mut t = SyntheticTrajectories::new();
        t.insert(6, Snapshot::empty(-6 * 3600));
        t.insert(18, Snapshot::empty(-18 * 3600));
        assert!(t.snapshot(6).unwrap().is_some());
        assert!(t.snapshot(12).is_err());
        assert!(t.snapshot(24).unwrap().is_none());
    }

    #[test]
    fn test_reanalysis_rate_recovered() {
        let mut rea = SyntheticReanalysis::new(
            ReanalysisKind::Era5,
            Domain::default(),
            1.0,
            4,
            |lon: f64, _: f64, level: usize, _| if level == 2 { lon * 1e-6 } else { 0.0 },
        );
        assert_eq!(rea.shape(), (51, 171));
        let field = rea.field(valid()).unwrap();
        let cell = field.cell_of(100.0, 30.0);
        let rate = field.detrainment_at(2, cell).unwrap();
        approx::assert_relative_eq!(rate, 1e-4, epsilon = 1e-12);
        assert_eq!(field.detrainment_at(1, cell), Some(0.0));
        approx::assert_relative_eq!(
            field.neg_log_surface_pressure(30.0, 100.0),
            -(100_000.0f64).ln(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_missing_detrainment_unavailable() {
        let mut rea = SyntheticReanalysis::new(ReanalysisKind::EraInterim, Domain::default(), 5.0, 2, |_, _, _, _| 0.0)
            .without_detrainment_at(valid());
        assert!(matches!(rea.field(valid()), Err(FieldError::Unavailable { .. })));
    }

    #[test]
    fn test_for_kind_matches_source_shape() {
        let rea = SyntheticReanalysis::for_kind(ReanalysisKind::Era5, 2, |_, _, _, _| 0.0);
        assert_eq!(rea.shape(), ReanalysisKind::Era5.source_shape());
        let rea = SyntheticReanalysis::for_kind(ReanalysisKind::EraInterim, 2, |_, _, _, _| 0.0);
        assert_eq!(rea.shape(), ReanalysisKind::EraInterim.source_shape());
    }

    #[test]
    fn test_scenario_is_reproducible() {
        let mut config = RunConfig::default();
        config.granules.size = 10;
        config.granules.step = 2;
        let a = DemoScenario::generate(&config, 200, 24, 7).unwrap();
        let b = DemoScenario::generate(&config, 200, 24, 7).unwrap();
        assert_eq!(a.deadborne, b.deadborne);
        assert_eq!(a.launch.numpart(), 200);
        let mut ta = a.trajectories;
        let mut tb = b.trajectories;
        let (sa, sb) = (ta.snapshot(6).unwrap().unwrap(), tb.snapshot(6).unwrap().unwrap());
        assert_eq!(sa.ids(), sb.ids());
        // first granule plus the first release quantum, minus deadborne
        assert!(sa.nact() <= 30);
        assert!(sa.ids().iter().all(|id| !a.deadborne.contains(id)));
        assert!(sa.ids().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_monsoon_regions_codes() {
        let mask = monsoon_regions(ReanalysisKind::EraInterim);
        assert_eq!(mask.slots(), 3);
        // 90E 20N: row 20, col 100 on the 1° grid
        assert_eq!(mask.code(20, 100), 1);
        assert_eq!(mask.code(10, 140), 2);
        assert_eq!(mask.code(45, 0), 0);
    }
}
