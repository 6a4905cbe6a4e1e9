use std::process::ExitStatus;

use thiserror::Error;

use crate::request::MediaKind;

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("Target size must be a positive number, got {0}")]
    InvalidTarget(f64),

    #[error("Input is not a readable {kind}: {message}")]
    Decode { kind: MediaKind, message: String },

    #[error("External tool `{tool}` is not available")]
    EncoderUnavailable { tool: String },

    #[error("External tool `{tool}` failed ({status}): {stderr}")]
    EncoderFailed {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("External tool `{tool}` produced no output")]
    EmptyOutput { tool: String },

    #[error("Could not determine a usable video duration")]
    DegenerateDuration,

    #[error("No encoder parameters to try")]
    NoCandidates,

    #[error("Invalid CRF {0} (expected 18-40)")]
    InvalidCrf(u8),

    #[error("Invalid JPEG quality {0} (expected 10-95)")]
    InvalidQuality(u8),

    #[error("Raster resolution must be a positive number of DPI, got {0}")]
    InvalidResolution(f32),

    #[error("Encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompressError {
    pub(crate) fn decode(kind: MediaKind, message: impl ToString) -> Self {
        CompressError::Decode {
            kind,
            message: message.to_string(),
        }
    }
}

pub type Result<T, E = CompressError> = std::result::Result<T, E>;
