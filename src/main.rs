use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tinysqueeze::config::{DEFAULT_CRF, DEFAULT_FIXED_QUALITY, MAX_PDF_BASE_DPI, PDF_BASE_DPI};
use tinysqueeze::request::{BYTES_PER_KB, BYTES_PER_MB};
use tinysqueeze::{CompressionRequest, Compressed, Engine, EngineConfig, MediaKind, TargetSize};

/// Compress images, videos and PDFs to a target size
#[derive(Parser, Debug)]
#[command(name = "tinysqueeze", version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Mode,

    /// ffmpeg binary
    #[arg(long, global = true, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// ffprobe binary
    #[arg(long, global = true, default_value = "ffprobe")]
    ffprobe: PathBuf,

    /// pdftoppm binary
    #[arg(long, global = true, default_value = "pdftoppm")]
    pdftoppm: PathBuf,

    /// Directory for scratch files (defaults to the system temp dir)
    #[arg(long, global = true)]
    scratch_dir: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Re-encode an image as JPEG near a size in KB
    Image {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        target_kb: f64,
        /// Upscale small images to get closer to the target
        #[arg(long)]
        exact: bool,
    },
    /// Re-encode an image as JPEG at a fixed quality
    ImageQuality {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, default_value_t = DEFAULT_FIXED_QUALITY, value_parser = clap::value_parser!(u8).range(10..=95))]
        quality: u8,
    },
    /// Encode a video at the bitrate that fits a size in MB
    Video {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        target_mb: f64,
        /// Assume one second when the duration cannot be probed
        #[arg(long)]
        allow_unknown_duration: bool,
    },
    /// Encode a video at a fixed CRF (lower is better quality)
    VideoCrf {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, default_value_t = DEFAULT_CRF, value_parser = clap::value_parser!(u8).range(18..=40))]
        crf: u8,
    },
    /// Rasterize a PDF and rebuild it near a size in KB
    Pdf {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        target_kb: f64,
        /// Resolution of a full-scale page raster
        #[arg(long, default_value_t = PDF_BASE_DPI, value_parser = parse_dpi)]
        dpi: f32,
    },
    /// Combine images into one PDF, a page per image
    ImagesToPdf {
        output: PathBuf,
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(match args.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .parse_default_env()
        .init();

    let mut config = EngineConfig {
        scratch_dir: args.scratch_dir.clone(),
        ..EngineConfig::default()
    };
    config.video.ffmpeg = args.ffmpeg.clone();
    config.video.ffprobe = args.ffprobe.clone();
    config.pdf.pdftoppm = args.pdftoppm.clone();

    match args.command {
        Mode::Image {
            input,
            output,
            target_kb,
            exact,
        } => {
            config.image.exact_target = exact;
            let target = TargetSize::Kilobytes(target_kb);
            run_targeted(config, &input, &output, MediaKind::Image, target)
        }
        Mode::ImageQuality {
            input,
            output,
            quality,
        } => {
            let data = read_input(&input)?;
            let start = Instant::now();
            let result = Engine::new(config)
                .compress_image_quality(&data, quality)
                .context("Image compression failed")?;
            write_output(&output, &result.bytes)?;
            report(&result, MediaKind::Image, start);
            Ok(())
        }
        Mode::Video {
            input,
            output,
            target_mb,
            allow_unknown_duration,
        } => {
            config.video.allow_unknown_duration = allow_unknown_duration;
            let target = TargetSize::Megabytes(target_mb);
            run_targeted(config, &input, &output, MediaKind::Video, target)
        }
        Mode::VideoCrf { input, output, crf } => {
            let data = read_input(&input)?;
            let start = Instant::now();
            let result = Engine::new(config)
                .compress_video_crf(&data, crf)
                .context("Video compression failed")?;
            write_output(&output, &result.bytes)?;
            report(&result, MediaKind::Video, start);
            Ok(())
        }
        Mode::Pdf {
            input,
            output,
            target_kb,
            dpi,
        } => {
            config.pdf.base_dpi = dpi;
            let target = TargetSize::Kilobytes(target_kb);
            run_targeted(config, &input, &output, MediaKind::Pdf, target)
        }
        Mode::ImagesToPdf { output, inputs } => {
            let images = inputs
                .iter()
                .map(|path| read_input(path))
                .collect::<Result<Vec<_>>>()?;
            let pdf = Engine::new(config)
                .images_to_pdf(&images)
                .context("Failed to convert images to PDF")?;
            write_output(&output, &pdf)?;
            println!(
                "Wrote {} page(s) to {} ({:.2} KB)",
                images.len(),
                output.display(),
                pdf.len() as f64 / BYTES_PER_KB
            );
            Ok(())
        }
    }
}

fn run_targeted(
    config: EngineConfig,
    input: &Path,
    output: &Path,
    kind: MediaKind,
    target: TargetSize,
) -> Result<()> {
    let data = read_input(input)?;
    println!("Compressing {} to {}: {}", kind, target, input.display());
    let start = Instant::now();
    let request = CompressionRequest::new(data, kind, target);
    let result = Engine::new(config)
        .compress(&request)
        .with_context(|| format!("Failed to compress {}", input.display()))?;
    write_output(output, &result.bytes)?;
    report(&result, kind, start);
    Ok(())
}

fn parse_dpi(value: &str) -> std::result::Result<f32, String> {
    let dpi: f32 = value
        .parse()
        .map_err(|_| format!("`{}` is not a number", value))?;
    if dpi > 0.0 && dpi <= MAX_PDF_BASE_DPI {
        Ok(dpi)
    } else {
        Err(format!("must be greater than 0 and at most {}", MAX_PDF_BASE_DPI))
    }
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read input file: {}", path.display()))
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes)
        .with_context(|| format!("Failed to write output file: {}", path.display()))
}

fn report(result: &Compressed, kind: MediaKind, start: Instant) {
    let savings = result.savings();
    let (unit, divisor) = match kind {
        MediaKind::Video => ("MB", BYTES_PER_MB),
        MediaKind::Image | MediaKind::Pdf => ("KB", BYTES_PER_KB),
    };
    println!("Done in {:.2?} using {}", start.elapsed(), result.parameters);
    println!(
        "Original size: {:.2} {}",
        savings.original_bytes as f64 / divisor,
        unit
    );
    println!(
        "New size:      {:.2} {}",
        savings.compressed_bytes as f64 / divisor,
        unit
    );
    println!("{}", savings);
}
