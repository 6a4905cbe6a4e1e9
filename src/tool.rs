use std::io::ErrorKind;
use std::process::{Command, Output};

use log::debug;

use crate::error::{CompressError, Result};

/// Longest stderr excerpt carried in an error
const STDERR_TAIL: usize = 800;

/// Runs an external tool to completion, mapping a missing binary and a
/// non-zero exit to labeled errors.
pub(crate) fn run(mut command: Command, tool: &str) -> Result<Output> {
    debug!("Running {:?}", command);
    let output = command.output().map_err(|e| match e.kind() {
        ErrorKind::NotFound | ErrorKind::PermissionDenied => CompressError::EncoderUnavailable {
            tool: tool.to_string(),
        },
        _ => CompressError::Io(e),
    })?;

    if !output.status.success() {
        return Err(CompressError::EncoderFailed {
            tool: tool.to_string(),
            status: output.status,
            stderr: stderr_tail(&output.stderr),
        });
    }
    Ok(output)
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let skip = text.chars().count().saturating_sub(STDERR_TAIL);
    text.chars().skip(skip).collect()
}
