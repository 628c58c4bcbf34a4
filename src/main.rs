use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use dose_gamma::{DoseGrid, DoseLoader, Execution, GammaEngine, GammaParameters, OriginPolicy};

#[derive(Parser, Debug)]
#[command(name = "dose-gamma", version)]
#[command(about = "Gamma-index comparison of two RT Dose grids", long_about = None)]
struct Args {
    /// Reference RT Dose file
    #[arg(short, long)]
    reference: PathBuf,

    /// Target RT Dose file
    #[arg(short, long)]
    target: PathBuf,

    /// TOML file with gamma parameters; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dose difference criterion in percent of the local reference dose
    #[arg(long)]
    percent: Option<f64>,

    /// Distance to agreement, defaults to the reference X resolution
    #[arg(long)]
    dta: Option<f64>,

    /// Reference doses below this value are excluded
    #[arg(long)]
    threshold: Option<f64>,

    /// Samples taken towards each neighbouring voxel
    #[arg(long)]
    search_resolution: Option<u32>,

    /// Compare grids with different origins
    #[arg(long)]
    ignore_origin: bool,

    /// Evaluate planes on the current thread only
    #[arg(long)]
    serial: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let reference = DoseLoader::load_from_file(&args.reference)
        .with_context(|| format!("failed to load reference dose {}", args.reference.display()))?;
    let target = DoseLoader::load_from_file(&args.target)
        .with_context(|| format!("failed to load target dose {}", args.target.display()))?;

    let config = args
        .config
        .as_ref()
        .map(|path| {
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
        })
        .transpose()?;
    let parameters = resolve_parameters(&args, config.as_deref(), reference.resolution().0)?;

    let execution = if args.serial {
        Execution::Serial
    } else {
        Execution::Parallel
    };
    let summary = GammaEngine::new(parameters)?
        .with_execution(execution)
        .evaluate(&reference, &target)?;

    println!("Gamma pass rate: {}%", summary.pass_rate());
    println!(
        "Max difference: {} Gy ({}%)",
        summary.max_absolute_difference(),
        summary.max_relative_difference()
    );
    Ok(())
}

/// Layers defaults, the config file and flags, in increasing precedence.
fn resolve_parameters(
    args: &Args,
    config: Option<&str>,
    default_distance: f64,
) -> Result<GammaParameters> {
    let mut parameters = GammaParameters::default().with_distance_to_agreement(default_distance);
    if let Some(source) = config {
        parameters = parameters
            .overlay_toml_str(source)
            .context("failed to parse gamma parameters")?;
    }
    if let Some(percent) = args.percent {
        parameters = parameters.with_dose_difference_fraction(percent / 100.0);
    }
    if let Some(dta) = args.dta {
        parameters = parameters.with_distance_to_agreement(dta);
    }
    if let Some(threshold) = args.threshold {
        parameters = parameters.with_dose_threshold(threshold);
    }
    if let Some(resolution) = args.search_resolution {
        parameters = parameters.with_search_resolution(resolution);
    }
    if args.ignore_origin {
        parameters = parameters.with_origin_policy(OriginPolicy::Ignore);
    }
    Ok(parameters)
}
