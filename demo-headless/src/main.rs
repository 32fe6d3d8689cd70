use clap::Parser;
use convsrc_core::synthetic::{monsoon_rate, monsoon_regions};
use convsrc_core::{
    ConvectiveSourceRun, ConvsrcError, DemoScenario, ReanalysisKind, RunConfig, RunPaths,
    SourceAccumulator, SyntheticReanalysis,
};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Convective sources of a backward trajectory run, on synthetic inputs
#[derive(Parser, Debug)]
#[command(name = "convsrc-demo")]
#[command(about = "Convective-source reconstruction demo", long_about = None)]
struct Args {
    /// Release year
    #[arg(short, long, default_value_t = 2017)]
    year: i32,

    /// Release month (1-12)
    #[arg(short, long, default_value_t = 8, value_parser = clap::value_parser!(u32).range(1..=12))]
    month: u32,

    /// Advection winds of the trajectory run
    #[arg(short, long, default_value = "EAD", value_parser = ["OPZ", "EAD", "EAZ", "EID", "EIZ"])]
    advect: String,

    /// Potential temperature level of the release (K)
    #[arg(short, long, default_value_t = 380)]
    level: u32,

    /// Optional suffix of the run name
    #[arg(short, long)]
    suffix: Option<String>,

    /// Quiet mode: log to the run log file instead of stderr (y/n)
    #[arg(short, long, default_value = "n", value_parser = ["y", "n"])]
    quiet: String,

    /// Reanalysis providing the detrainment rates
    #[arg(short, long, default_value = "ERA5", value_parser = ["ERA5", "ERAI"])]
    reanalysis: String,

    /// Root of the output tree
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// JSON file overriding the run configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Hours to integrate backward
    #[arg(long, default_value_t = 96)]
    hours: u32,

    /// Number of released parcels
    #[arg(long, default_value_t = 20000)]
    parcels: usize,

    /// Seed of the synthetic release
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Model levels of the synthetic reanalysis
    #[arg(long, default_value_t = 20)]
    levels: usize,
}

fn init_logging(quiet: bool, log_file: &Path) -> Result<(), ConvsrcError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if quiet {
        if let Some(parent) = log_file.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(log_file)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

fn run(args: &Args) -> Result<(), ConvsrcError> {
    let kind = ReanalysisKind::from_tag(&args.reanalysis)
        .ok_or_else(|| ConvsrcError::Config(format!("unknown reanalysis {}", args.reanalysis)))?;
    let mut config = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::for_month(args.year, args.month, &args.advect, kind)?,
    };
    config.hmax = args.hours;

    let paths = RunPaths::new(
        &args.out_dir.join("traj"),
        &args.out_dir,
        &args.advect,
        &config,
        args.level,
        args.suffix.as_deref(),
    );
    init_logging(args.quiet == "y", &paths.log_file)?;
    info!("Run {} ({} reanalysis)", paths.run_name, config.reanalysis);

    let DemoScenario {
        launch,
        mut trajectories,
        deadborne,
    } = DemoScenario::generate(&config, args.parcels, args.hours, args.seed)?;
    info!("{} parcels will never be observed", deadborne.len());

    let mut rea = SyntheticReanalysis::for_kind(config.reanalysis, args.levels, monsoon_rate(args.levels));
    let hybrid = rea.hybrid();
    let acc = SourceAccumulator::new(rea.shape(), (0, 0), monsoon_regions(config.reanalysis))?;

    let mut sim = ConvectiveSourceRun::new(config, launch, acc)?;
    sim.run(&mut trajectories, &mut rea, &hybrid)?;

    let product = sim.product(&paths.run_name);
    let total: f64 = product.regional.iter().sum();
    info!("Detrained mass {:.3} parcels", total);
    for (name, mass) in std::iter::once("unassigned")
        .chain(product.region_names.iter().map(String::as_str))
        .zip(&product.regional)
    {
        info!("  {:<16} {:>10.3}", name, mass);
    }

    product.save(&paths.out_lz4, &paths.out_zlib)?;
    Ok(())
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(&args) {
        error!("{}", e);
        eprintln!("convsrc-demo: {e}");
        std::process::exit(1);
    }
}
