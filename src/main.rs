use clap::{Parser, Subcommand, ValueEnum};
use pattern_detector::config::load_config_or_default;
use pattern_detector::logging::{init_logging, new_correlation_id, LoggingConfig};
use pattern_detector::visualization::{draw_contour, draw_keypoints, to_canvas, CONTOUR_COLOR, KEYPOINT_COLOR};
use pattern_detector::*;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "pattern-detect")]
#[command(about = "Detect registered planar patterns in camera frames")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum RecordFormat {
    Json,
    Toml,
}

impl From<RecordFormat> for FileFormat {
    fn from(format: RecordFormat) -> Self {
        match format {
            RecordFormat::Json => FileFormat::Json,
            RecordFormat::Toml => FileFormat::Toml,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Extract features from reference images and save pattern records
    Register {
        /// Reference images to register
        #[arg(short, long, required = true, num_args = 1..)]
        image: Vec<PathBuf>,

        /// Directory for the pattern records
        #[arg(short, long)]
        out_dir: PathBuf,

        /// Record file format
        #[arg(short, long, value_enum, default_value = "json")]
        format: RecordFormat,

        /// Detector configuration (JSON or TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Find the best-matching pattern in a frame
    Detect {
        /// Pattern records (.json/.toml) or reference images
        #[arg(short, long, required = true, num_args = 1..)]
        pattern: Vec<PathBuf>,

        /// Frame to search
        #[arg(short, long)]
        frame: PathBuf,

        /// Detector configuration (JSON or TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Skip the second refinement pass
        #[arg(long)]
        no_refine: bool,

        /// Accept nearest matches without the ratio test
        #[arg(long)]
        no_ratio_test: bool,

        /// Write the detection report as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Save the frame with its keypoints and the detected contour drawn on it
        #[arg(short, long)]
        annotate: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _guard = init_logging(&LoggingConfig::from_verbosity(cli.verbose))?;

    match cli.command {
        Commands::Register { image, out_dir, format, config } => {
            handle_register(&image, &out_dir, format.into(), config.as_deref())?;
        }
        Commands::Detect {
            pattern,
            frame,
            config,
            no_refine,
            no_ratio_test,
            output,
            annotate,
        } => {
            let mut config = load_config_or_default(config.as_deref());
            if no_refine {
                config.detector.enable_homography_refinement = false;
            }
            if no_ratio_test {
                config.detector.enable_ratio_test = false;
            }
            handle_detect(&pattern, &frame, &config, output.as_deref(), annotate.as_deref())?;
        }
    }

    Ok(())
}

fn handle_register(images: &[PathBuf], out_dir: &Path, format: FileFormat, config: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config_or_default(config);
    let detector = PatternDetector::from_config(&config);
    fs::create_dir_all(out_dir)?;

    let extension = match format {
        FileFormat::Json => "json",
        FileFormat::Toml => "toml",
    };

    for path in images {
        let image = load_image(path)?;
        let pattern = detector.build_pattern_from_image(&image);

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow::anyhow!("Cannot derive a record name from {}", path.display()))?;
        let record_path = out_dir.join(format!("{}.{}", stem, extension));
        pattern.to_record().save(&record_path, format)?;

        println!(
            "Registered {} ({}x{}, {} keypoints) -> {}",
            path.display(),
            pattern.size.width,
            pattern.size.height,
            pattern.keypoints.len(),
            record_path.display()
        );
    }

    Ok(())
}

fn handle_detect(
    patterns: &[PathBuf],
    frame_path: &Path,
    config: &Config,
    output: Option<&Path>,
    annotate: Option<&Path>,
) -> anyhow::Result<()> {
    let mut detector = PatternDetector::from_config(config);
    let patterns = detector.build_patterns_from_files(patterns)?;
    println!("Loaded {} patterns", patterns.len());
    detector.train(patterns);

    let frame = load_image(frame_path)?;
    new_correlation_id();
    let report = detector.detect(&frame, None)?;

    match report.info() {
        Some(info) => {
            println!("Found pattern {} in {:.1}ms", info.pattern_idx, report.elapsed_ms);
            for (i, row) in info.homography.to_rows().iter().enumerate() {
                let label = if i == 0 { "Homography:" } else { "" };
                println!("{:<12}[{:>12.6} {:>12.6} {:>12.6}]", label, row[0], row[1], row[2]);
            }
            for corner in &info.points2d {
                println!("  corner ({:.1}, {:.1})", corner.x, corner.y);
            }
        }
        None => {
            let reason = report.failure().map(|f| f.to_string()).unwrap_or_default();
            println!("No pattern found ({}) in {:.1}ms", reason, report.elapsed_ms);
        }
    }

    if let Some(path) = output {
        fs::write(path, serde_json::to_string_pretty(&report)?)?;
        println!("Report saved to: {}", path.display());
    }

    if let Some(path) = annotate {
        let gray = to_grayscale(&frame);
        let mut canvas = to_canvas(&gray);
        if let Some(features) = detector.extractor().extract(&gray) {
            draw_keypoints(&mut canvas, &features.keypoints, KEYPOINT_COLOR);
        }
        if let Some(info) = report.info() {
            draw_contour(&mut canvas, &info.points2d, CONTOUR_COLOR);
        }
        canvas.save(path)?;
        println!("Annotated frame saved to: {}", path.display());
    }

    Ok(())
}
