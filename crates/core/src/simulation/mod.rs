//! Backward convective-source run
//!
//! `ConvectiveSourceRun` walks the trajectory outputs backward in time, one
//! output step at a time:
//! - reads the next (older) snapshot and pairs it with the previous one
//! - flags the parcels of the latest release quantum that were never seen
//! - terminates parcels that left the trajectory set
//! - scans the time slices of the interval (ground contact, detrainment)
//! - terminates parcels past the age bound
//!
//! Steps and slices are strictly sequential: every slice depends on the
//! flags, survival fractions and ratchets left by the previous one.

mod aging;
pub mod deadborne;
pub mod persistence;
pub mod stats;

pub use aging::age_sweep;
pub use deadborne::{find_missing, mark_deadborne, DeadborneTracker};
pub use persistence::{ArchiveColumns, OutputError, RunProduct};
pub use stats::{Census, RunStats};

use chrono::{Duration, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::atmosphere::{HybridInverter, ReanalysisField, ReanalysisProvider};
use crate::core_types::{LaunchTable, ParcelTable, RunConfig, Snapshot};
use crate::error::ConvsrcError;
use crate::grid::SourceAccumulator;
use crate::solver::{
    detrain, exit_departed, ground_contact, locate_levels, LiveSet, SliceGenerator, SliceWindow,
    TimeSlice,
};

/// Source of trajectory snapshots by output hour
pub trait TrajectorySource {
    /// Active parcels at output `hour` (hours back from the run start)
    ///
    /// Returns `Ok(None)` once the trajectories are exhausted.
    ///
    /// # Errors
    /// Returns `ConvsrcError` when an expected snapshot cannot be read
    fn snapshot(&mut self, hour: u32) -> Result<Option<Snapshot>, ConvsrcError>;
}

/// Reanalysis field kept until the cadence-floored slice time changes
#[derive(Debug, Default)]
struct FieldCache {
    cached: Option<(NaiveDateTime, ReanalysisField)>,
}

impl FieldCache {
    fn get<R>(&mut self, ti: NaiveDateTime, rea: &mut R) -> Result<&ReanalysisField, ConvsrcError>
    where
        R: ReanalysisProvider + ?Sized,
    {
        let key = floor_to(ti, rea.kind().field_step());
        let entry = match self.cached.take() {
            Some((k, field)) if k == key => (k, field),
            _ => {
                debug!("reading {} field for {}", rea.kind(), key);
                (key, rea.field(key)?)
            }
        };
        Ok(&self.cached.insert(entry).1)
    }
}

fn floor_to(t: NaiveDateTime, step: Duration) -> NaiveDateTime {
    let step = step.num_seconds().max(1);
    t - Duration::seconds(t.and_utc().timestamp().rem_euclid(step))
}

/// State of a backward run over one launch roster
pub struct ConvectiveSourceRun {
    config: RunConfig,
    launch: LaunchTable,
    table: ParcelTable,
    acc: SourceAccumulator,
    stats: RunStats,
    deadborne: DeadborneTracker,
    fields: FieldCache,
    /// Most recent snapshot processed (the newer one in real time)
    ante: Snapshot,
    hour: u32,
    current_date: NaiveDateTime,
    census: Census,
}

impl ConvectiveSourceRun {
    /// Prepare a run; the launch snapshot is the first granule of the roster
    ///
    /// # Errors
    /// Returns `ConvsrcError::Config` if the configuration is inconsistent
    pub fn new(config: RunConfig, launch: LaunchTable, acc: SourceAccumulator) -> Result<Self, ConvsrcError> {
        config.validate()?;
        let table = ParcelTable::from_launch(&launch);
        let ante = launch.first_granule(config.granules.size);
        let deadborne = DeadborneTracker::new(config.granules, launch.idx_orgn(), launch.numpart());
        info!(
            "Creating convective-source run: {} parcels from id {}, start {}, {} reanalysis",
            launch.numpart(),
            launch.idx_orgn(),
            config.start,
            config.reanalysis
        );
        let stats = RunStats {
            new_parcels: ante.nact() as u64,
            ..RunStats::default()
        };
        Ok(Self {
            current_date: config.start,
            config,
            launch,
            table,
            acc,
            stats,
            deadborne,
            fields: FieldCache::default(),
            ante,
            hour: 0,
            census: Census::default(),
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn table(&self) -> &ParcelTable {
        &self.table
    }

    pub fn accumulator(&self) -> &SourceAccumulator {
        &self.acc
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Census of the last snapshot read
    pub fn census(&self) -> Census {
        self.census
    }

    /// Last output hour processed
    pub fn hour(&self) -> u32 {
        self.hour
    }

    /// Validity date of the last snapshot read
    pub fn current_date(&self) -> NaiveDateTime {
        self.current_date
    }

    /// Process all output steps up to `hmax` or until the trajectories run out
    ///
    /// # Errors
    /// Any fatal `ConvsrcError` aborts the run
    pub fn run<T, R, H>(&mut self, traj: &mut T, rea: &mut R, hyb: &H) -> Result<(), ConvsrcError>
    where
        T: TrajectorySource + ?Sized,
        R: ReanalysisProvider + ?Sized,
        H: HybridInverter,
    {
        while self.step(traj, rea, hyb)? {}
        info!("run complete at hour {}: {}", self.hour, self.stats);
        Ok(())
    }

    /// Process the next output step
    ///
    /// Returns `false` when there is nothing left to process.
    ///
    /// # Errors
    /// Any fatal `ConvsrcError` aborts the run
    pub fn step<T, R, H>(&mut self, traj: &mut T, rea: &mut R, hyb: &H) -> Result<bool, ConvsrcError>
    where
        T: TrajectorySource + ?Sized,
        R: ReanalysisProvider + ?Sized,
        H: HybridInverter,
    {
        let hour = self.hour + self.config.step_hours;
        if hour > self.config.hmax {
            return Ok(false);
        }
        let Some(post) = traj.snapshot(hour)? else {
            info!("trajectories exhausted after hour {}", self.hour);
            return Ok(false);
        };
        match post.max_pressure() {
            Some(p) => info!("hour {} numact {} max p {:.0}", hour, post.nact(), p),
            None => info!("hour {} numact {}", hour, post.nact()),
        }
        self.current_date -= self.config.step();

        let ante = std::mem::take(&mut self.ante);
        let post_positions = post.positions();
        let ante_positions = ante.positions();
        let kept = post
            .ids()
            .iter()
            .filter(|id| ante_positions.contains_key(id))
            .count();
        let new = post.nact() - kept;
        self.stats.new_parcels += new as u64;
        debug!("kept {} of {}, new {}", kept, ante.nact(), new);

        let dborne = self.deadborne.sweep(&post, &mut self.table, &self.launch)?;
        self.stats.deadborne += dborne as u64;

        if !ante.is_empty() {
            let itime = (ante.itime() + post.itime()) / 2;
            let exits = exit_departed(&mut self.table, &self.config, &ante, &post_positions, itime)?;
            self.stats.exits += exits as u64;
            info!("exits {} (total {}), deadborne {}", exits, self.stats.exits, dborne);
        }

        let live = LiveSet::new(&ante, &post_positions, &self.table)?;
        debug!("{} live parcels", live.len());
        let slices = SliceGenerator::new(
            &ante,
            &post,
            &live,
            self.config.domain,
            self.current_date,
            self.config.step(),
            self.config.slice_width(),
        );
        for slice in slices {
            if let TimeSlice::Window(window) = slice {
                self.process_slice(&window, rea, hyb)?;
            }
        }

        let old = age_sweep(&mut self.table, &self.config, &ante)?;
        self.stats.old += old as u64;

        self.census = Census::of(&self.table, post.ids())?;
        info!("{}", self.census);

        self.ante = post;
        self.hour = hour;
        Ok(true)
    }

    fn process_slice<R, H>(&mut self, window: &SliceWindow<'_>, rea: &mut R, hyb: &H) -> Result<(), ConvsrcError>
    where
        R: ReanalysisProvider + ?Sized,
        H: HybridInverter,
    {
        debug!("slice {} [{}, {}]", window.index, window.ti, window.tf);
        let field = self.fields.get(window.ti, rea)?;

        let sample = locate_levels(window, field, hyb);
        if sample.min_neg_log_sigma < -self.config.sigma_warning.ln() {
            warn!(
                "large sigma {:.4} at {}",
                (-sample.min_neg_log_sigma).exp(),
                window.ti
            );
        }
        if sample.max_neg_log_ps > -self.config.surface_pressure_warning.ln() {
            warn!(
                "small surface pressure {:.0} Pa at {}",
                (-sample.max_neg_log_ps).exp(),
                window.ti
            );
        }

        let grounded = sample.grounded(self.config.hybrid_ceiling);
        if !grounded.is_empty() {
            let n = ground_contact(&mut self.table, window, &grounded) as u64;
            self.stats.grounded += n;
            self.stats.hits[0] += n;
            debug!("{} parcels reached the ground", n);
        }

        let hits = detrain(
            &mut self.table,
            &mut self.acc,
            field,
            &self.config,
            window,
            &sample.levels,
        );
        self.stats.add_hits(&hits);
        Ok(())
    }

    /// Assemble the final product
    pub fn product(&self, run_name: &str) -> RunProduct {
        RunProduct::assemble(run_name, &self.config, &self.table, &self.acc, &self.stats)
    }
}
