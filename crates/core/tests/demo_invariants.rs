//! Invariants of a seeded demo run, checked after every output step

use approx::assert_relative_eq;
use convsrc_core::synthetic::{monsoon_rate, monsoon_regions};
use convsrc_core::{
    ConvectiveSourceRun, DemoScenario, GranuleLayout, Milestone, ParcelFlags, ParcelTable,
    Ratchet, ReanalysisKind, RunConfig, SourceAccumulator, SyntheticReanalysis,
};

const NLEV: usize = 20;

fn demo_config() -> RunConfig {
    RunConfig {
        hmax: 48,
        granules: GranuleLayout { size: 20, step: 6 },
        reanalysis: ReanalysisKind::EraInterim,
        ..RunConfig::default()
    }
}

fn same_milestone(a: &Milestone, b: &Milestone) -> bool {
    [a.x, a.y, a.p, a.t, a.age]
        .iter()
        .zip([b.x, b.y, b.p, b.t, b.age])
        .all(|(u, v)| u.to_bits() == v.to_bits())
}

struct Before {
    flags: Vec<ParcelFlags>,
    chi: Vec<f64>,
    ratchets: Vec<Ratchet>,
    milestones: Vec<[Milestone; 6]>,
}

impl Before {
    fn of(table: &ParcelTable) -> Self {
        Self {
            flags: table.all_flags().to_vec(),
            chi: table.all_chi().to_vec(),
            ratchets: table.all_ratchets().to_vec(),
            milestones: (0..table.numpart()).map(|s| *table.milestones(s)).collect(),
        }
    }
}

fn check_step(before: &Before, table: &ParcelTable) {
    for slot in 0..table.numpart() {
        let flags = table.flags(slot);
        assert!(before.flags[slot].is_subset_of(flags), "flags cleared on slot {slot}");
        assert!(table.chi(slot) <= before.chi[slot], "chi grew on slot {slot}");
        assert!(table.chi(slot) > 0.0 && table.chi(slot) <= 1.0);
        assert!(table.ratchet(slot) <= before.ratchets[slot]);

        let milestones = table.milestones(slot);
        for k in 0..6 {
            if before.milestones[slot][k].is_filled() {
                assert!(same_milestone(&before.milestones[slot][k], &milestones[k]));
            }
        }
        if before.flags[slot].is_dead() {
            assert_eq!(table.chi(slot), before.chi[slot]);
            for k in 1..6 {
                assert!(same_milestone(&before.milestones[slot][k], &milestones[k]));
            }
        }

        // rung milestones are filled exactly down to the ratchet state
        let passed = Ratchet::INITIAL.value() - table.ratchet(slot).value();
        let filled = milestones[1..].iter().filter(|m| m.is_filled()).count();
        let expected = match passed {
            0 => 0,
            1 => 1,
            p => 1 + usize::from(p - 1) / 2,
        };
        assert_eq!(filled, expected, "slot {slot} ratchet {:?}", table.ratchet(slot));
        assert_eq!(flags.contains(ParcelFlags::HIT), passed > 0);
    }
}

#[test]
fn test_demo_run_invariants() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let config = demo_config();
    let DemoScenario {
        launch,
        mut trajectories,
        deadborne,
    } = DemoScenario::generate(&config, 600, 48, 11).unwrap();
    let mut rea = SyntheticReanalysis::for_kind(ReanalysisKind::EraInterim, NLEV, monsoon_rate(NLEV));
    let hybrid = rea.hybrid();
    let acc = SourceAccumulator::new(rea.shape(), (0, 0), monsoon_regions(ReanalysisKind::EraInterim)).unwrap();
    let mut sim = ConvectiveSourceRun::new(config, launch, acc).unwrap();

    let mut steps = 0;
    loop {
        let before = Before::of(sim.table());
        if !sim.step(&mut trajectories, &mut rea, &hybrid).unwrap() {
            break;
        }
        steps += 1;
        check_step(&before, sim.table());

        let table = sim.table();
        let eroded: f64 = table.all_chi().iter().map(|c| 1.0 - c).sum();
        let acc = sim.accumulator();
        assert_relative_eq!(acc.total(), eroded, epsilon = 1e-9, max_relative = 1e-9);
        let regional: f64 = acc.regional().iter().sum();
        assert_relative_eq!(regional, acc.total(), epsilon = 1e-9, max_relative = 1e-9);
    }
    assert_eq!(steps, 8);
    assert!(sim.accumulator().total() > 0.0);

    let table = sim.table();
    let mut flagged: Vec<u64> = (0..table.numpart())
        .filter(|&slot| table.flags(slot).contains(ParcelFlags::DEADBORNE))
        .map(|slot| table.index().id(slot))
        .collect();
    flagged.sort_unstable();
    assert_eq!(flagged, deadborne);
    assert_eq!(sim.stats().deadborne, deadborne.len() as u64);
    for &id in &deadborne {
        let slot = table.index().slot(id).unwrap();
        assert_eq!(table.milestone(slot, 0).age, 0.0);
        assert_eq!(table.chi(slot), 1.0);
    }

    let stats = sim.stats();
    let hit = table
        .all_flags()
        .iter()
        .filter(|f| f.contains(ParcelFlags::HIT))
        .count() as u64;
    assert_eq!(stats.hits[1], hit);
    assert_eq!(stats.new_parcels, 600 - deadborne.len() as u64);
}
