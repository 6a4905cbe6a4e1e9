//! Image size-targeting: any decodable image in, JPEG out.
//!
//! Binary search over JPEG quality in `[5, 95]`, keeping the encode closest to
//! the budget. When enabled, an image that stays far below the budget even at
//! the best quality found is upscaled in 5% geometric steps (up to 2x) for as
//! long as the result remains under the budget.
//!
//! Output is always a fresh JPEG, even when the input already fits.

use image::RgbImage;
use log::{debug, info};

use crate::codec::{normalize_rgb, ImageCodec, JpegCodec};
use crate::config::{
    ImageOptions, MAX_FIXED_QUALITY, MAX_QUALITY, MAX_SEARCH_ITERATIONS, MAX_UPSCALE,
    MIN_FIXED_QUALITY, MIN_QUALITY, UNDERSHOOT_RATIO, UPSCALE_STEP,
};
use crate::error::{CompressError, Result};
use crate::request::{Compressed, Compressor, Parameters, TargetSize};
use crate::search::{BestResult, SearchBounds, Trial};

#[derive(Copy, Clone, Debug, PartialEq)]
struct JpegParams {
    quality: u8,
    upscale: f32,
}

pub struct ImageCompressor<C = JpegCodec> {
    codec: C,
    options: ImageOptions,
}

impl ImageCompressor<JpegCodec> {
    pub fn new(options: ImageOptions) -> Self {
        Self::with_codec(JpegCodec, options)
    }
}

impl<C: ImageCodec> ImageCompressor<C> {
    pub fn with_codec(codec: C, options: ImageOptions) -> Self {
        Self { codec, options }
    }

    /// Single re-encode at a caller-chosen quality, ignoring any size budget.
    pub fn compress_quality(&self, input: &[u8], quality: u8) -> Result<Compressed> {
        if !(MIN_FIXED_QUALITY..=MAX_FIXED_QUALITY).contains(&quality) {
            return Err(CompressError::InvalidQuality(quality));
        }
        let image = normalize_rgb(self.codec.decode(input)?);
        info!(
            "Encoding {}x{} image at q={}",
            image.width(),
            image.height(),
            quality
        );

        Ok(Compressed {
            bytes: self.codec.encode(&image, quality)?,
            parameters: Parameters::Jpeg {
                quality,
                upscale: 1.0,
            },
            trials: 1,
            original_len: input.len(),
        })
    }

    fn encode_trial(&self, image: &RgbImage, params: JpegParams) -> Result<Trial<JpegParams>> {
        let bytes = self.codec.encode(image, params.quality)?;
        let trial = Trial::new(params, bytes);
        debug!(
            "q={} upscale={:.3} -> {:.2} KB",
            params.quality, params.upscale, trial.size_kb
        );
        Ok(trial)
    }

    fn search_quality(
        &self,
        image: &RgbImage,
        target_kb: f64,
        best: &mut BestResult<JpegParams>,
    ) -> Result<usize> {
        let mut bounds = SearchBounds::new(MIN_QUALITY, MAX_QUALITY);
        let mut trials = 0;

        while trials < MAX_SEARCH_ITERATIONS && bounds.is_open() {
            let quality = bounds.mid();
            let trial = self.encode_trial(
                image,
                JpegParams {
                    quality,
                    upscale: 1.0,
                },
            )?;
            trials += 1;
            let overshoot = trial.size_kb > target_kb;
            best.offer(trial);
            bounds.narrow(quality, overshoot);
        }

        Ok(trials)
    }

    /// Grows the image while the re-encoded result stays under the target.
    fn upscale_toward_target(
        &self,
        image: &RgbImage,
        target_kb: f64,
        best: &mut BestResult<JpegParams>,
    ) -> Result<usize> {
        let quality = match best.get() {
            Some(trial) => trial.params.quality,
            None => return Ok(0),
        };
        let (width, height) = image.dimensions();
        let mut scale = 1.0f32;
        let mut trials = 0;

        while scale < MAX_UPSCALE {
            scale = (scale * UPSCALE_STEP).min(MAX_UPSCALE);
            let new_width = (width as f32 * scale).round() as u32;
            let new_height = (height as f32 * scale).round() as u32;
            let resized = self.codec.resize(image, new_width, new_height);
            let trial = self.encode_trial(
                &resized,
                JpegParams {
                    quality,
                    upscale: scale,
                },
            )?;
            trials += 1;

            if trial.size_kb >= target_kb {
                break;
            }
            best.replace(trial);
        }

        Ok(trials)
    }
}

impl<C: ImageCodec> Compressor for ImageCompressor<C> {
    fn compress(&self, input: &[u8], target: TargetSize) -> Result<Compressed> {
        let target_kb = target.validate()?.kilobytes();
        let image = normalize_rgb(self.codec.decode(input)?);
        info!(
            "Compressing {}x{} image to {:.2} KB",
            image.width(),
            image.height(),
            target_kb
        );

        let mut best = BestResult::new(target_kb);
        let mut trials = self.search_quality(&image, target_kb, &mut best)?;

        let undershoot = best
            .get()
            .map(|trial| trial.size_kb < target_kb * UNDERSHOOT_RATIO)
            .unwrap_or(false);
        if self.options.exact_target && undershoot {
            info!("Best quality still under target, trying upscale");
            trials += self.upscale_toward_target(&image, target_kb, &mut best)?;
        }

        let best = best.into_inner().ok_or(CompressError::NoCandidates)?;
        info!(
            "Selected q={} upscale={:.3}: {:.2} KB after {} trials",
            best.params.quality, best.params.upscale, best.size_kb, trials
        );

        Ok(Compressed {
            bytes: best.bytes,
            parameters: Parameters::Jpeg {
                quality: best.params.quality,
                upscale: best.params.upscale,
            },
            trials,
            original_len: input.len(),
        })
    }
}
