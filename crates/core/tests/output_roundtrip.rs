//! Final product of a demo run written to both compressed copies and read back

use convsrc_core::synthetic::{monsoon_rate, monsoon_regions};
use convsrc_core::{
    ConvectiveSourceRun, DemoScenario, GranuleLayout, ParcelFlags, ReanalysisKind, RunConfig,
    RunPaths, RunProduct, SourceAccumulator, SyntheticReanalysis,
};
use std::fs;

#[test]
fn test_demo_product_roundtrip() {
    let config = RunConfig {
        hmax: 24,
        granules: GranuleLayout { size: 10, step: 6 },
        reanalysis: ReanalysisKind::EraInterim,
        ..RunConfig::default()
    };
    let out = std::env::temp_dir().join("convsrc_output_roundtrip");
    let _ = fs::remove_dir_all(&out);
    let paths = RunPaths::new(&out.join("traj"), &out, "EIZ", &config, 380, None);

    let DemoScenario {
        launch,
        mut trajectories,
        deadborne,
    } = DemoScenario::generate(&config, 240, 24, 3).unwrap();
    let mut rea = SyntheticReanalysis::for_kind(ReanalysisKind::EraInterim, 12, monsoon_rate(12));
    let hybrid = rea.hybrid();
    let acc = SourceAccumulator::new(rea.shape(), (0, 0), monsoon_regions(ReanalysisKind::EraInterim)).unwrap();
    let mut sim = ConvectiveSourceRun::new(config, launch, acc).unwrap();
    sim.run(&mut trajectories, &mut rea, &hybrid).unwrap();

    let product = sim.product(&paths.run_name);
    assert_eq!(product.save(&paths.out_lz4, &paths.out_zlib).unwrap(), 2);

    let lz4 = RunProduct::load(&paths.out_lz4).unwrap();
    let zlib = RunProduct::load(&paths.out_zlib).unwrap();
    for back in [&lz4, &zlib] {
        assert_eq!(back.run_name, paths.run_name);
        assert_eq!(back.reanalysis, "ERAI");
        assert_eq!(back.numpart, 240);
        assert_eq!(back.flags, product.flags);
        assert_eq!(back.chi, product.chi);
        assert_eq!(back.passed, product.passed);
        assert_eq!(back.source, product.source);
        assert_eq!(back.regional, product.regional);
        assert_eq!(back.region_names, vec!["Asian monsoon", "Western Pacific"]);
        assert_eq!(back.stats, *sim.stats());
        assert_eq!((back.source_rows, back.source_cols), (51, 171));
    }

    for &id in &deadborne {
        let slot = (id - product.idx_orgn) as usize;
        assert!(ParcelFlags::from_bits(lz4.flags[slot]).contains(ParcelFlags::DEADBORNE));
        assert_eq!(lz4.archive.age[lz4.archive_index(slot, 0)], 0.0);
    }
    let _ = fs::remove_dir_all(&out);
}
