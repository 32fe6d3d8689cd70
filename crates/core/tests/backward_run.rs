//! End-to-end backward runs on hand-built trajectories
//!
//! Three parcels over two hourly steps: one crosses the whole ratchet over a
//! detraining column, one sits in clear air, one leaves through the western
//! edge of the domain.

use approx::assert_relative_eq;
use chrono::{Duration, NaiveDateTime};
use convsrc_core::{
    ConvectiveSourceRun, ConvsrcError, Domain, ExitCode, FieldError, GranuleLayout, LaunchTable,
    ParcelFlags, ParcelState, Ratchet, ReanalysisKind, RegionMask, RunConfig, Snapshot,
    SourceAccumulator, SyntheticReanalysis, SyntheticTrajectories,
};

const RATE: f64 = 1e-3;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn state(x: f64, y: f64) -> ParcelState {
    ParcelState {
        x,
        y,
        p: 10000.0,
        t: 200.0,
    }
}

fn hourly_config() -> RunConfig {
    RunConfig {
        step_hours: 1,
        slice_hours: 1,
        hmax: 2,
        granules: GranuleLayout { size: 3, step: 1 },
        ..RunConfig::default()
    }
}

fn column_rate(lon: f64, _: f64, _: usize, _: NaiveDateTime) -> f64 {
    if (70.0..=90.0).contains(&lon) {
        RATE
    } else {
        0.0
    }
}

/// Parcels 1 (80E), 2 (120E) and 3 (8W) at 20N; parcel 3 is gone at hour 2
fn three_parcels() -> (LaunchTable, SyntheticTrajectories) {
    let a = state(80.0, 20.0);
    let b = state(120.0, 20.0);
    let c = state(-8.0, 20.0);
    let launch = LaunchTable::new(1, vec![a, b, c], vec![0; 3], vec![0; 3]).unwrap();
    let mut traj = SyntheticTrajectories::new();
    traj.insert(1, Snapshot::new(-3600, vec![1, 2, 3], vec![a, b, c]).unwrap());
    traj.insert(2, Snapshot::new(-7200, vec![1, 2], vec![a, b]).unwrap());
    (launch, traj)
}

fn one_level_hybrid(_: f64, neg_log_ps: f64) -> f64 {
    if neg_log_ps.is_finite() {
        1.0
    } else {
        f64::NAN
    }
}

fn accumulator() -> SourceAccumulator {
    SourceAccumulator::new((51, 171), (0, 0), RegionMask::unassigned(51, 171)).unwrap()
}

#[test]
fn test_three_parcel_run() {
    init_logging();
    let config = hourly_config();
    let (launch, mut traj) = three_parcels();
    let mut rea = SyntheticReanalysis::new(ReanalysisKind::Era5, Domain::default(), 1.0, 1, column_rate);
    let mut sim = ConvectiveSourceRun::new(config, launch, accumulator()).unwrap();

    sim.run(&mut traj, &mut rea, &one_level_hybrid).unwrap();
    assert_eq!(sim.hour(), 2);
    assert_eq!(sim.current_date(), sim.config().start - Duration::hours(2));

    let table = sim.table();

    // two erosions of one hour each
    let chi_a = (-2.0 * RATE * 3600.0f64).exp();
    assert_relative_eq!(table.chi(0), chi_a, max_relative = 1e-9);
    assert_eq!(table.ratchet(0), Ratchet::EXHAUSTED);
    assert!(table.flags(0).contains(ParcelFlags::HIT));
    assert!(table.flags(0).is_alive());
    assert!(!table.milestone(0, 0).is_filled());
    for k in 1..6 {
        let m = table.milestone(0, k);
        assert_eq!((m.x, m.y, m.age), (80.0, 20.0, 3600.0));
    }

    assert_eq!(table.chi(1), 1.0);
    assert_eq!(table.ratchet(1), Ratchet::INITIAL);
    assert!(table.milestones(1).iter().all(|m| !m.is_filled()));

    let flags_c = table.flags(2);
    assert!(flags_c.contains(ParcelFlags::DEAD | ParcelFlags::CROSSED));
    assert_eq!(flags_c.exit_code(), Some(ExitCode::West));
    let exit = table.milestone(2, 0);
    assert_eq!((exit.x, exit.y, exit.age), (-8.0, 20.0, 5400.0));
    assert_eq!(table.chi(2), 1.0);

    let stats = sim.stats();
    assert_eq!(stats.hits, [0, 1, 1, 1, 1, 1]);
    assert_eq!(stats.exits, 1);
    assert_eq!(stats.new_parcels, 3);
    assert_eq!(stats.deadborne, 0);

    let acc = sim.accumulator();
    assert_relative_eq!(acc.total(), 1.0 - chi_a, max_relative = 1e-9);
    // all of it lands in the cell under parcel 1
    assert_relative_eq!(acc.source().get(20, 90), 1.0 - chi_a, max_relative = 1e-9);
    assert_relative_eq!(acc.regional()[0], 1.0 - chi_a, max_relative = 1e-9);

    let census = sim.census();
    assert_eq!(census.live, 2);
    assert_eq!(census.pristine, 1);
}

#[test]
fn test_run_stops_at_hmax() {
    let config = RunConfig {
        hmax: 1,
        ..hourly_config()
    };
    let (launch, mut traj) = three_parcels();
    let mut rea = SyntheticReanalysis::new(ReanalysisKind::Era5, Domain::default(), 1.0, 1, column_rate);
    let mut sim = ConvectiveSourceRun::new(config, launch, accumulator()).unwrap();

    assert!(sim.step(&mut traj, &mut rea, &one_level_hybrid).unwrap());
    assert!(!sim.step(&mut traj, &mut rea, &one_level_hybrid).unwrap());
    assert_eq!(sim.hour(), 1);
    assert_eq!(sim.stats().exits, 0);
    assert!(sim.table().flags(2).is_alive());
}

#[test]
fn test_missing_detrainment_is_fatal() {
    let config = hourly_config();
    let first_field = config.start - Duration::hours(1);
    let (launch, mut traj) = three_parcels();
    let mut rea = SyntheticReanalysis::new(ReanalysisKind::Era5, Domain::default(), 1.0, 1, column_rate)
        .without_detrainment_at(first_field);
    let mut sim = ConvectiveSourceRun::new(config, launch, accumulator()).unwrap();

    let err = sim.run(&mut traj, &mut rea, &one_level_hybrid).unwrap_err();
    assert!(matches!(
        err,
        ConvsrcError::Field(FieldError::Unavailable { .. })
    ));
}

#[test]
fn test_missing_snapshot_is_fatal() {
    let config = RunConfig {
        hmax: 3,
        ..hourly_config()
    };
    let (launch, _) = three_parcels();
    let mut traj = SyntheticTrajectories::new();
    traj.insert(1, Snapshot::new(-3600, vec![1, 2, 3], vec![state(80.0, 20.0); 3]).unwrap());
    traj.insert(3, Snapshot::empty(-3 * 3600));
    let mut rea = SyntheticReanalysis::new(ReanalysisKind::Era5, Domain::default(), 1.0, 1, column_rate);
    let mut sim = ConvectiveSourceRun::new(config, launch, accumulator()).unwrap();

    let err = sim.run(&mut traj, &mut rea, &one_level_hybrid).unwrap_err();
    assert!(matches!(err, ConvsrcError::TrajectoryUnavailable { hour: 2, .. }));
}

#[test]
fn test_ground_contact_below_valid_levels() {
    let config = hourly_config();
    let (launch, mut traj) = three_parcels();
    let mut rea = SyntheticReanalysis::new(ReanalysisKind::Era5, Domain::default(), 1.0, 1, column_rate);
    // every parcel maps beyond the hybrid ceiling
    let below_ground = |_: f64, _: f64| 150.0;
    let mut sim = ConvectiveSourceRun::new(config, launch, accumulator()).unwrap();

    assert!(sim.step(&mut traj, &mut rea, &below_ground).unwrap());
    let table = sim.table();
    for slot in 0..3 {
        let flags = table.flags(slot);
        assert!(flags.contains(ParcelFlags::DEAD | ParcelFlags::CROSSED));
        assert_eq!(flags.exit_code(), Some(ExitCode::Ground));
        assert_eq!(table.chi(slot), 1.0);
    }
    assert_eq!(sim.stats().grounded, 3);
    assert_eq!(sim.stats().hits[0], 3);
    assert_eq!(sim.accumulator().total(), 0.0);
}

#[test]
fn test_invalid_slice_width_rejected() {
    let config = RunConfig {
        step_hours: 6,
        slice_hours: 4,
        ..hourly_config()
    };
    let (launch, _) = three_parcels();
    assert!(matches!(
        ConvectiveSourceRun::new(config, launch, accumulator()),
        Err(ConvsrcError::Config(_))
    ));
}
