//! Sign distance estimation over a labelled dataset.
//!
//! Usage:
//! ```bash
//! RUST_LOG=info cargo run --release -- \
//!   --input samples/labelbox.json --format labelbox --label EXIT_sign \
//!   --profile main_360x640 --models radial,horizontal,pinhole \
//!   --output results.json --csv results.csv
//! ```

use std::path::PathBuf;

use clap::Parser;
use log::info;
use sign_distance::camera::CalibrationProfile;
use sign_distance::dataset::{self, summary::DEFAULT_BINS, DatasetSummary, InputFormat};
use sign_distance::distance::DistanceModel;

/// Camera-to-sign distance estimation from labelled corners
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Label file (JSON array)
    #[arg(short = 'i', long)]
    input: PathBuf,

    /// Layout of the label file (labelbox, corners)
    #[arg(short = 'f', long, default_value = "labelbox")]
    format: InputFormat,

    /// Label name holding the target polygon in Labelbox exports
    #[arg(short = 'l', long, default_value = "EXIT_sign")]
    label: String,

    /// Built-in calibration profile
    #[arg(short = 'p', long, default_value = "main_360x640", conflicts_with = "camera")]
    profile: String,

    /// Calibration profile YAML file, overrides --profile
    #[arg(short = 'c', long)]
    camera: Option<PathBuf>,

    /// Distance models to evaluate; the first one drives the summary
    #[arg(
        short = 'm',
        long,
        value_delimiter = ',',
        default_value = "radial,horizontal,pinhole"
    )]
    models: Vec<DistanceModel>,

    /// Write per-record results as JSON
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Write a bounding-box CSV table
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Class name written to the CSV table
    #[arg(long, default_value = "Exit_sign")]
    class: String,

    /// Number of histogram bins in the summary
    #[arg(short = 'b', long, default_value_t = DEFAULT_BINS)]
    bins: usize,
}

fn path_str(path: &std::path::Path) -> Result<&str, Box<dyn std::error::Error>> {
    Ok(path
        .to_str()
        .ok_or_else(|| format!("Invalid path string: {path:?}"))?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::init();

    let cli = Cli::parse();

    let profile = match &cli.camera {
        Some(path) => {
            info!("Loading calibration profile from: {path:?}");
            CalibrationProfile::load_from_yaml(path_str(path)?)?
        }
        None => CalibrationProfile::preset(&cli.profile)?,
    };
    let camera = profile.camera_model()?;
    info!(
        "Profile {}: {:?} {:?} {:?}",
        profile.name,
        camera.intrinsics(),
        camera.distortion(),
        camera.target()
    );

    let primary = *cli.models.first().ok_or("At least one distance model is required")?;

    let labels = dataset::load_labels(path_str(&cli.input)?, cli.format, &cli.label)?;
    let results = dataset::process_records(&labels.records, &camera, &cli.models);
    let (succeeded, failed) = dataset::partition_results(results);

    let summary = DatasetSummary::from_results(&succeeded, failed.len(), primary, cli.bins);
    info!("Skipped {} unparsable entries", labels.skipped);
    summary.log();

    if let Some(path) = &cli.output {
        dataset::write_json(&succeeded, path_str(path)?)?;
        info!("Wrote {} records to {path:?}", succeeded.len());
    }
    if let Some(path) = &cli.csv {
        dataset::write_bbox_csv(
            &succeeded,
            &profile.resolution,
            primary,
            &cli.class,
            path_str(path)?,
        )?;
        info!("Wrote bounding boxes to {path:?}");
    }

    Ok(())
}
