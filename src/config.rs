use std::path::PathBuf;

/// Lowest JPEG quality the image search will try
pub const MIN_QUALITY: u8 = 5;

/// Highest JPEG quality the image search will try
pub const MAX_QUALITY: u8 = 95;

/// Upper bound on trial encodes in the image binary search
pub const MAX_SEARCH_ITERATIONS: usize = 15;

/// Below this fraction of the target the image path starts upscaling
pub const UNDERSHOOT_RATIO: f64 = 0.9;

/// Multiplicative step of the upscale fallback
pub const UPSCALE_STEP: f32 = 1.05;

/// Largest linear upscale factor
pub const MAX_UPSCALE: f32 = 2.0;

/// Bits in one megabyte (2^23)
pub const BITS_PER_MEGABYTE: f64 = 8_388_608.0;

/// Quality range and default of the fixed-quality image mode
pub const MIN_FIXED_QUALITY: u8 = 10;
pub const MAX_FIXED_QUALITY: u8 = 95;
pub const DEFAULT_FIXED_QUALITY: u8 = 60;

/// Duration used when the probe fails and the fallback is allowed
pub const FALLBACK_DURATION_SECS: f64 = 1.0;

/// Fixed audio bitrate layered on top of the video budget
pub const AUDIO_BITRATE_BPS: u32 = 128_000;

pub const DEFAULT_PRESET: &str = "fast";
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
pub const DEFAULT_AUDIO_CODEC: &str = "aac";

/// CRF used by the quality-mode video path
pub const DEFAULT_CRF: u8 = 28;
pub const MIN_CRF: u8 = 18;
pub const MAX_CRF: u8 = 40;

/// Raster scales for PDF pages, largest first
pub const PDF_SCALES: [f32; 5] = [1.0, 0.9, 0.8, 0.7, 0.6];

/// Accepted overshoot for a PDF first-fit result
pub const PDF_TOLERANCE: f64 = 1.02;

/// Resolution that corresponds to a raster scale of 1.0
pub const PDF_BASE_DPI: f32 = 72.0;

/// Highest base resolution the CLI accepts
pub const MAX_PDF_BASE_DPI: f32 = 1200.0;

/// JPEG quality used when converting images to a PDF
pub const IMAGES_TO_PDF_QUALITY: u8 = 75;

/// PDF qualities, highest first: 90, 80, ..., 10
pub fn pdf_qualities() -> Vec<u8> {
    (1..=9).rev().map(|step| step * 10).collect()
}

#[derive(Debug, Clone, Default)]
pub struct ImageOptions {
    /// Upscale when the best quality still lands well under the target
    pub exact_target: bool,
}

#[derive(Debug, Clone)]
pub struct VideoOptions {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub video_codec: String,
    pub audio_codec: String,
    pub audio_bitrate: u32,
    pub preset: String,
    /// Substitute one second for an unprobeable duration instead of failing
    pub allow_unknown_duration: bool,
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            video_codec: DEFAULT_VIDEO_CODEC.to_string(),
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: AUDIO_BITRATE_BPS,
            preset: DEFAULT_PRESET.to_string(),
            allow_unknown_duration: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PdfOptions {
    pub pdftoppm: PathBuf,
    pub base_dpi: f32,
    pub scales: Vec<f32>,
    pub qualities: Vec<u8>,
    pub tolerance: f64,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            pdftoppm: PathBuf::from("pdftoppm"),
            base_dpi: PDF_BASE_DPI,
            scales: PDF_SCALES.to_vec(),
            qualities: pdf_qualities(),
            tolerance: PDF_TOLERANCE,
        }
    }
}

/// Settings shared by every request an `Engine` handles.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Parent directory for scratch files; the system temp dir when unset
    pub scratch_dir: Option<PathBuf>,
    pub image: ImageOptions,
    pub video: VideoOptions,
    pub pdf: PdfOptions,
}
