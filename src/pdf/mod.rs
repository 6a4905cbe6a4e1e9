//! PDF size-targeting.
//!
//! Every page is rasterized, re-encoded as a single JPEG and reassembled into
//! a new image-only PDF. Text, vector content and fonts do not survive.
//!
//! Scales are tried largest first and qualities highest first within each
//! scale. The first result within the tolerance of the target wins; if none
//! does, the result closest to the target is returned.

pub mod assemble;
pub mod engine;

use image::RgbImage;
use log::{debug, info};
use rayon::prelude::*;

pub use assemble::{assemble_pdf, images_to_pdf};
pub use engine::{PdfEngine, Poppler};

use crate::codec::{ImageCodec, JpegCodec};
use crate::config::PdfOptions;
use crate::error::{CompressError, Result};
use crate::request::{Compressed, Compressor, Parameters, TargetSize};
use crate::search::{BestResult, Trial};

/// One rendered source page.
#[derive(Clone, Debug)]
pub struct RasterPage {
    pub image: RgbImage,
    pub width_pt: f32,
    pub height_pt: f32,
}

/// A page image ready for assembly.
#[derive(Clone, Debug)]
pub struct EncodedPage {
    pub jpeg: Vec<u8>,
    pub width_px: u32,
    pub height_px: u32,
    pub width_pt: f32,
    pub height_pt: f32,
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct RasterParams {
    scale: f32,
    quality: u8,
}

pub struct PdfCompressor<E = Poppler, C = JpegCodec> {
    engine: E,
    codec: C,
    options: PdfOptions,
}

impl PdfCompressor<Poppler, JpegCodec> {
    pub fn new(options: PdfOptions, scratch_dir: Option<std::path::PathBuf>) -> Self {
        let engine = Poppler::new(options.pdftoppm.clone(), options.base_dpi, scratch_dir);
        Self::with_engine(engine, JpegCodec, options)
    }
}

impl<E: PdfEngine, C: ImageCodec> PdfCompressor<E, C> {
    pub fn with_engine(engine: E, codec: C, options: PdfOptions) -> Self {
        Self {
            engine,
            codec,
            options,
        }
    }

    fn encode_pages(&self, pages: &[RasterPage], quality: u8) -> Result<Vec<EncodedPage>> {
        pages
            .par_iter()
            .map(|page| {
                Ok(EncodedPage {
                    jpeg: self.codec.encode(&page.image, quality)?,
                    width_px: page.image.width(),
                    height_px: page.image.height(),
                    width_pt: page.width_pt,
                    height_pt: page.height_pt,
                })
            })
            .collect()
    }

    /// Every raster resolution the grid will request must be a usable DPI.
    fn check_resolutions(&self) -> Result<()> {
        for &scale in &self.options.scales {
            let dpi = self.options.base_dpi * scale;
            if !dpi.is_finite() || dpi <= 0.0 {
                return Err(CompressError::InvalidResolution(dpi));
            }
        }
        Ok(())
    }

    fn finish(trial: Trial<RasterParams>, trials: usize, original_len: usize) -> Compressed {
        Compressed {
            bytes: trial.bytes,
            parameters: Parameters::Raster {
                scale: trial.params.scale,
                quality: trial.params.quality,
            },
            trials,
            original_len,
        }
    }
}

impl<E: PdfEngine, C: ImageCodec> Compressor for PdfCompressor<E, C> {
    fn compress(&self, input: &[u8], target: TargetSize) -> Result<Compressed> {
        let target_kb = target.validate()?.kilobytes();
        self.check_resolutions()?;
        let accept_kb = target_kb * self.options.tolerance;
        let mut best = BestResult::new(target_kb);
        let mut trials = 0;

        for &scale in &self.options.scales {
            let pages = self.engine.rasterize(input, scale)?;
            info!("Trying scale {:.1} over {} pages", scale, pages.len());

            for &quality in &self.options.qualities {
                let encoded = self.encode_pages(&pages, quality)?;
                let bytes = self.engine.assemble(&encoded)?;
                let trial = Trial::new(RasterParams { scale, quality }, bytes);
                trials += 1;
                debug!("scale={:.1} q={} -> {:.2} KB", scale, quality, trial.size_kb);

                if trial.size_kb <= accept_kb {
                    info!(
                        "Accepted scale {:.1} q={} at {:.2} KB (target {:.2} KB)",
                        scale, quality, trial.size_kb, target_kb
                    );
                    return Ok(Self::finish(trial, trials, input.len()));
                }
                best.offer(trial);
            }
        }

        let best = best.into_inner().ok_or(CompressError::NoCandidates)?;
        info!(
            "No result within tolerance, closest is scale {:.1} q={} at {:.2} KB",
            best.params.scale, best.params.quality, best.size_kb
        );
        Ok(Self::finish(best, trials, input.len()))
    }
}
