use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mirset::analyzer::ExtractSummary;
use mirset::config::{AppConfig, ExtractOverrides};
use mirset::scanner::inventory::Inventory;
use mirset::scanner::LabelMode;
use mirset::transform::FeatureKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mirset", version, about = "Labeled audio feature dataset builder")]
struct Cli {
    /// Config file (TOML, or YAML by extension)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract per-segment features from a labeled directory tree
    Extract {
        /// Dataset root (defaults to config dataset_path, then "genres")
        root: Option<PathBuf>,

        /// Output JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory layout: genre/<track> or artist/<album>/<track>
        #[arg(long, value_enum)]
        mode: Option<LabelMode>,

        /// Feature representation to store
        #[arg(long, value_enum)]
        feature: Option<FeatureKind>,

        /// Target sample rate in Hz
        #[arg(long)]
        sample_rate: Option<u32>,

        /// Assumed track length in seconds
        #[arg(long)]
        duration: Option<f64>,

        /// Segments per track
        #[arg(long)]
        segments: Option<usize>,

        /// FFT window size
        #[arg(long)]
        n_fft: Option<usize>,

        /// Hop length between frames
        #[arg(long)]
        hop: Option<usize>,

        /// MFCC coefficients (chroma bins for --feature chroma)
        #[arg(long)]
        coefficients: Option<usize>,

        /// Number of parallel workers (0 = auto-detect)
        #[arg(short = 'j', long)]
        jobs: Option<usize>,

        /// Only process tracks whose path contains this (case-insensitive)
        #[arg(long)]
        filter: Option<String>,
    },

    /// List classes and track counts without decoding audio
    Inventory {
        /// Dataset root (defaults to config dataset_path, then "genres")
        root: Option<PathBuf>,

        /// Directory layout
        #[arg(long, value_enum)]
        mode: Option<LabelMode>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Validate a dataset file and show per-class segment counts
    Inspect {
        /// Dataset JSON file
        dataset: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Explicit config must parse; the default one falls back to defaults
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AppConfig::load(),
    };

    match cli.command {
        Commands::Extract {
            root,
            output,
            mode,
            feature,
            sample_rate,
            duration,
            segments,
            n_fft,
            hop,
            coefficients,
            jobs,
            filter,
        } => {
            let root = config.dataset_root(root);
            let output = config.output(output);
            let mode = config.label_mode(mode);
            let extract = config.extract.with_overrides(&ExtractOverrides {
                feature,
                sample_rate,
                track_duration: duration,
                num_segments: segments,
                n_fft,
                hop_length: hop,
                num_coefficients: coefficients,
                workers: jobs,
            });

            log::info!(
                "Extracting {} ({} mode) from {} into {}",
                extract.feature,
                mode,
                root.display(),
                output.display()
            );

            let result = mirset::analyzer::run(
                &root,
                mode,
                &extract,
                &mirset::analyzer::decode::SymphoniaDecoder,
                filter.as_deref(),
                &output,
            )
            .context("Extraction failed")?;

            print_summary(&result.summary);
            println!("Wrote {}", output.display());
        }

        Commands::Inventory { root, mode, json } => {
            let root = config.dataset_root(root);
            let mode = config.label_mode(mode);
            let inventory = mirset::scanner::inventory::take_inventory(
                &root,
                mode,
                config.extract.track_duration,
            )
            .with_context(|| format!("Failed to read {}", root.display()))?;

            if json {
                let text = serde_json::to_string_pretty(&inventory)
                    .context("Failed to serialize inventory")?;
                println!("{}", text);
            } else {
                print_inventory(&inventory, config.extract.track_duration);
            }
        }

        Commands::Inspect { dataset } => {
            let ds = mirset::dataset::Dataset::load(&dataset)
                .with_context(|| format!("Failed to read {}", dataset.display()))?;
            ds.validate()
                .with_context(|| format!("{} is not a valid dataset", dataset.display()))?;

            println!("Dataset: {}", dataset.display());
            println!("Classes:  {}", ds.mapping.len());
            println!("Segments: {}", ds.len());
            match ds.frame_shape() {
                Some((frames, coeffs)) => {
                    println!("Matrix:   {} frames x {} coefficients", frames, coeffs)
                }
                None => println!("Matrix:   (no segments)"),
            }
            println!();
            println!("{:>5}  {:<30} {:>8}", "Label", "Class", "Segments");
            println!("{}", "-".repeat(45));
            for (label, (name, count)) in ds.class_counts().into_iter().enumerate() {
                println!("{:>5}  {:<30} {:>8}", label, truncate(name, 30), count);
            }
        }
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max - 3).collect();
        format!("{}...", head)
    } else {
        s.to_string()
    }
}

/// Print the counters of an extraction run and the per-class segment table.
fn print_summary(summary: &ExtractSummary) {
    println!("Extraction Summary");
    println!("==================");
    println!("Classes:             {}", summary.classes);
    println!("Tracks found:        {}", summary.tracks_found);
    println!("Unsupported skipped: {}", summary.unsupported);
    println!("Tracks decoded:      {}", summary.decoded);
    println!("Decode failures:     {}", summary.decode_failures);
    println!("Segments kept:       {}", summary.segments_kept);
    println!("Shape mismatches:    {}", summary.shape_mismatches);
    println!("Short segments:      {}", summary.short_segments);
    if summary.transform_failures > 0 {
        println!("Transform failures:  {}", summary.transform_failures);
    }
    println!();

    if !summary.per_class.is_empty() {
        println!("{:>5}  {:<30} {:>8}", "Label", "Class", "Segments");
        println!("{}", "-".repeat(45));
        for (label, (name, count)) in summary.per_class.iter().enumerate() {
            println!("{:>5}  {:<30} {:>8}", label, truncate(name, 30), count);
        }
        println!();
    }
}

/// Print per-class track counts and durations.
fn print_inventory(inventory: &Inventory, track_duration: f64) {
    println!(
        "{:>5}  {:<30} {:>6} {:>8} {:>6} {:>7}",
        "Label", "Class", "Tracks", "Minutes", "Short", "Unknown"
    );
    println!("{}", "-".repeat(68));

    for c in &inventory.classes {
        println!(
            "{:>5}  {:<30} {:>6} {:>8.1} {:>6} {:>7}",
            c.label,
            truncate(&c.name, 30),
            c.tracks,
            c.total_secs / 60.0,
            c.short_tracks,
            c.unknown_duration,
        );
    }

    println!();
    println!(
        "{} tracks in {} classes ({} mode), {} unsupported files skipped",
        inventory.total_tracks(),
        inventory.classes.len(),
        inventory.mode,
        inventory.unsupported
    );
    println!("Short = shorter than {:.1} s", track_duration);
}
