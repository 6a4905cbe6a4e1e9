use std::fmt;

use crate::error::{CompressError, Result};

pub const BYTES_PER_KB: f64 = 1024.0;
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
    Pdf,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Image => write!(f, "image"),
            MediaKind::Video => write!(f, "video"),
            MediaKind::Pdf => write!(f, "PDF"),
        }
    }
}

/// Output size budget, in the unit the caller chose.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TargetSize {
    Kilobytes(f64),
    Megabytes(f64),
}

impl TargetSize {
    pub fn bytes(&self) -> f64 {
        match *self {
            TargetSize::Kilobytes(kb) => kb * BYTES_PER_KB,
            TargetSize::Megabytes(mb) => mb * BYTES_PER_MB,
        }
    }

    pub fn kilobytes(&self) -> f64 {
        self.bytes() / BYTES_PER_KB
    }

    pub fn megabytes(&self) -> f64 {
        self.bytes() / BYTES_PER_MB
    }

    /// Rejects zero, negative and non-finite budgets.
    pub fn validate(&self) -> Result<Self> {
        let value = match *self {
            TargetSize::Kilobytes(v) | TargetSize::Megabytes(v) => v,
        };
        if value.is_finite() && value > 0.0 {
            Ok(*self)
        } else {
            Err(CompressError::InvalidTarget(value))
        }
    }
}

impl fmt::Display for TargetSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetSize::Kilobytes(kb) => write!(f, "{:.2} KB", kb),
            TargetSize::Megabytes(mb) => write!(f, "{:.2} MB", mb),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CompressionRequest {
    pub input: Vec<u8>,
    pub kind: MediaKind,
    pub target: TargetSize,
}

impl CompressionRequest {
    pub fn new(input: Vec<u8>, kind: MediaKind, target: TargetSize) -> Self {
        Self {
            input,
            kind,
            target,
        }
    }
}

/// Encoder settings that produced a result.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Parameters {
    Jpeg { quality: u8, upscale: f32 },
    Raster { scale: f32, quality: u8 },
    Bitrate { video_bps: u64, audio_bps: u32 },
    Crf { crf: u8 },
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parameters::Jpeg { quality, upscale } if *upscale > 1.0 => {
                write!(f, "JPEG q={} upscaled {:.2}x", quality, upscale)
            }
            Parameters::Jpeg { quality, .. } => write!(f, "JPEG q={}", quality),
            Parameters::Raster { scale, quality } => {
                write!(f, "raster scale={:.1} JPEG q={}", scale, quality)
            }
            Parameters::Bitrate {
                video_bps,
                audio_bps,
            } => write!(f, "video {} bps + audio {} bps", video_bps, audio_bps),
            Parameters::Crf { crf } => write!(f, "CRF {}", crf),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Savings {
    pub original_bytes: u64,
    pub compressed_bytes: u64,
}

impl Savings {
    pub fn new(original_bytes: usize, compressed_bytes: usize) -> Self {
        Self {
            original_bytes: original_bytes as u64,
            compressed_bytes: compressed_bytes as u64,
        }
    }

    /// Share of the original size removed, negative when the output grew.
    pub fn percent_saved(&self) -> f64 {
        if self.original_bytes == 0 {
            return 0.0;
        }
        100.0 - (self.compressed_bytes as f64 / self.original_bytes as f64 * 100.0)
    }
}

impl fmt::Display for Savings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Saved: {:.1}%", self.percent_saved())
    }
}

/// Result of one request.
#[derive(Clone, Debug)]
pub struct Compressed {
    pub bytes: Vec<u8>,
    pub parameters: Parameters,
    /// Encoder invocations spent on the search
    pub trials: usize,
    pub original_len: usize,
}

impl Compressed {
    pub fn size_kb(&self) -> f64 {
        self.bytes.len() as f64 / BYTES_PER_KB
    }

    pub fn savings(&self) -> Savings {
        Savings::new(self.original_len, self.bytes.len())
    }
}

/// A size-targeting strategy over one external encoder.
pub trait Compressor {
    fn compress(&self, input: &[u8], target: TargetSize) -> Result<Compressed>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_units_convert() {
        assert_eq!(TargetSize::Kilobytes(2048.0).megabytes(), 2.0);
        assert_eq!(TargetSize::Megabytes(1.5).kilobytes(), 1536.0);
        assert_eq!(TargetSize::Kilobytes(1.0).bytes(), 1024.0);
    }

    #[test]
    fn invalid_targets_are_rejected() {
        assert!(TargetSize::Kilobytes(0.0).validate().is_err());
        assert!(TargetSize::Megabytes(-3.0).validate().is_err());
        assert!(TargetSize::Kilobytes(f64::NAN).validate().is_err());
        assert!(TargetSize::Kilobytes(f64::INFINITY).validate().is_err());
        assert!(TargetSize::Kilobytes(0.5).validate().is_ok());
    }

    #[test]
    fn savings_percentage() {
        let savings = Savings::new(1000, 250);
        assert!((savings.percent_saved() - 75.0).abs() < 1e-9);
        assert_eq!(savings.to_string(), "Saved: 75.0%");

        let grew = Savings::new(100, 150);
        assert!((grew.percent_saved() + 50.0).abs() < 1e-9);

        assert_eq!(Savings::new(0, 10).percent_saved(), 0.0);
    }

    #[test]
    fn parameters_display() {
        let p = Parameters::Jpeg {
            quality: 50,
            upscale: 1.0,
        };
        assert_eq!(p.to_string(), "JPEG q=50");
        let p = Parameters::Raster {
            scale: 0.8,
            quality: 70,
        };
        assert_eq!(p.to_string(), "raster scale=0.8 JPEG q=70");
    }
}
