//! Size-targeting compression for images, videos and PDFs.
//!
//! Each media kind has its own strategy behind [`Compressor`]:
//!
//! * images: binary search over JPEG quality ([`ImageCompressor`])
//! * videos: one encode at a bitrate derived from duration ([`VideoCompressor`])
//! * PDFs: scale/quality grid over rasterized pages ([`PdfCompressor`])
//!
//! Video and PDF go through external tools (`ffmpeg`, `ffprobe`, `pdftoppm`)
//! that work on files; those files live in a per-request scratch directory
//! that is removed before the call returns.

pub mod codec;
pub mod config;
pub mod error;
pub mod jpeg;
pub mod pdf;
pub mod request;
pub mod scratch;
pub mod search;
mod tool;
pub mod video;

use wasm_bindgen::prelude::*;

pub use codec::{ImageCodec, JpegCodec};
pub use config::EngineConfig;
pub use error::{CompressError, Result};
pub use jpeg::ImageCompressor;
pub use pdf::{images_to_pdf, PdfCompressor, PdfEngine, Poppler};
pub use request::{
    CompressionRequest, Compressed, Compressor, MediaKind, Parameters, Savings, TargetSize,
};
pub use video::{target_bitrate, VideoCompressor};

/// Dispatches requests to the strategy for their media kind.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn compress(&self, request: &CompressionRequest) -> Result<Compressed> {
        let compressor: Box<dyn Compressor> = match request.kind {
            MediaKind::Image => Box::new(ImageCompressor::new(self.config.image.clone())),
            MediaKind::Video => Box::new(self.video()),
            MediaKind::Pdf => Box::new(PdfCompressor::new(
                self.config.pdf.clone(),
                self.config.scratch_dir.clone(),
            )),
        };
        compressor.compress(&request.input, request.target)
    }

    /// Fixed-quality JPEG re-encode with no size target.
    pub fn compress_image_quality(&self, input: &[u8], quality: u8) -> Result<Compressed> {
        ImageCompressor::new(self.config.image.clone()).compress_quality(input, quality)
    }

    /// Fixed-CRF video encode with no size target.
    pub fn compress_video_crf(&self, input: &[u8], crf: u8) -> Result<Compressed> {
        self.video().compress_crf(input, crf)
    }

    pub fn images_to_pdf(&self, images: &[Vec<u8>]) -> Result<Vec<u8>> {
        images_to_pdf(&JpegCodec, images, config::IMAGES_TO_PDF_QUALITY)
    }

    fn video(&self) -> VideoCompressor {
        VideoCompressor::new(self.config.video.clone(), self.config.scratch_dir.clone())
    }
}

/// JPEG re-encode of `input` closest to `target_kb`, with default settings.
pub fn compress_image(input: &[u8], target_kb: f64) -> Result<Vec<u8>> {
    compress_with_defaults(input, MediaKind::Image, TargetSize::Kilobytes(target_kb))
}

/// Single-pass bitrate-targeted encode, with default settings.
pub fn compress_video(input: &[u8], target_mb: f64) -> Result<Vec<u8>> {
    compress_with_defaults(input, MediaKind::Video, TargetSize::Megabytes(target_mb))
}

/// Rasterized re-assembly of `input` near `target_kb`, with default settings.
pub fn compress_pdf(input: &[u8], target_kb: f64) -> Result<Vec<u8>> {
    compress_with_defaults(input, MediaKind::Pdf, TargetSize::Kilobytes(target_kb))
}

fn compress_with_defaults(input: &[u8], kind: MediaKind, target: TargetSize) -> Result<Vec<u8>> {
    let request = CompressionRequest::new(input.to_vec(), kind, target);
    Ok(Engine::default().compress(&request)?.bytes)
}

#[wasm_bindgen]
pub fn compress_image_to_target(input: &[u8], target_kb: f64) -> Result<Vec<u8>, JsError> {
    let compressor = ImageCompressor::new(config::ImageOptions::default());
    compressor
        .compress(input, TargetSize::Kilobytes(target_kb))
        .map(|out| out.bytes)
        .map_err(|e| JsError::new(&e.to_string()))
}
