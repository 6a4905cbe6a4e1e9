//! Video size-targeting.
//!
//! No search: the video bitrate is derived from the budget and the probed
//! duration, and the transcoder runs once. Audio is encoded at a fixed
//! bitrate on top of that budget, so outputs land slightly above the target.

use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{info, warn};

use crate::config::{VideoOptions, BITS_PER_MEGABYTE, FALLBACK_DURATION_SECS, MAX_CRF, MIN_CRF};
use crate::error::{CompressError, Result};
use crate::request::{Compressed, Compressor, MediaKind, Parameters, TargetSize};
use crate::scratch::Scratch;
use crate::tool;

/// Video bits per second that spend `target_mb` over `duration_secs`.
pub fn target_bitrate(target_mb: f64, duration_secs: f64) -> u64 {
    (target_mb * BITS_PER_MEGABYTE / duration_secs).floor() as u64
}

/// Reads a stream duration in seconds. `Ok(None)` means the probe accepted
/// the input but reported no usable duration; an input the probe rejects is a
/// decode failure.
pub trait DurationProbe: Send + Sync {
    fn duration(&self, path: &Path) -> Result<Option<f64>>;
}

pub trait VideoTranscoder: Send + Sync {
    fn transcode(&self, input: &Path, output: &Path, settings: &EncodeSettings) -> Result<()>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RateControl {
    /// Target bitrate, also used as the rate-control buffer size
    Bitrate(u64),
    Crf(u8),
}

#[derive(Clone, Debug, PartialEq)]
pub struct EncodeSettings {
    pub rate: RateControl,
    pub video_codec: String,
    pub audio_codec: String,
    pub audio_bitrate: u32,
    pub preset: String,
}

impl EncodeSettings {
    fn from_options(rate: RateControl, options: &VideoOptions) -> Self {
        Self {
            rate,
            video_codec: options.video_codec.clone(),
            audio_codec: options.audio_codec.clone(),
            audio_bitrate: options.audio_bitrate,
            preset: options.preset.clone(),
        }
    }

    /// ffmpeg command line for this encode.
    pub fn ffmpeg_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), input.into()];
        args.push("-c:v".into());
        args.push(self.video_codec.as_str().into());
        match self.rate {
            RateControl::Bitrate(bps) => {
                args.push("-b:v".into());
                args.push(bps.to_string().into());
                args.push("-bufsize".into());
                args.push(bps.to_string().into());
            }
            RateControl::Crf(crf) => {
                args.push("-crf".into());
                args.push(crf.to_string().into());
            }
        }
        args.push("-preset".into());
        args.push(self.preset.as_str().into());
        // CRF mode leaves audio to ffmpeg's defaults.
        if let RateControl::Bitrate(_) = self.rate {
            args.push("-c:a".into());
            args.push(self.audio_codec.as_str().into());
            args.push("-b:a".into());
            args.push(format!("{}k", self.audio_bitrate / 1000).into());
        }
        args.push(output.into());
        args
    }
}

#[derive(Debug, Clone)]
pub struct Ffprobe {
    binary: PathBuf,
}

impl Ffprobe {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl DurationProbe for Ffprobe {
    fn duration(&self, path: &Path) -> Result<Option<f64>> {
        let mut command = Command::new(&self.binary);
        command
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path);

        match tool::run(command, "ffprobe") {
            Ok(output) => Ok(parse_duration(&String::from_utf8_lossy(&output.stdout))),
            Err(CompressError::EncoderFailed { stderr, .. }) => {
                Err(CompressError::decode(MediaKind::Video, stderr))
            }
            Err(e) => Err(e),
        }
    }
}

/// First line of probe output as positive, finite seconds.
fn parse_duration(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .next()
        .and_then(|line| line.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs > 0.0)
}

#[derive(Debug, Clone)]
pub struct Ffmpeg {
    binary: PathBuf,
}

impl Ffmpeg {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl VideoTranscoder for Ffmpeg {
    fn transcode(&self, input: &Path, output: &Path, settings: &EncodeSettings) -> Result<()> {
        let mut command = Command::new(&self.binary);
        command.args(settings.ffmpeg_args(input, output));
        tool::run(command, "ffmpeg")?;
        Ok(())
    }
}

pub struct VideoCompressor<P = Ffprobe, T = Ffmpeg> {
    probe: P,
    transcoder: T,
    options: VideoOptions,
    scratch_dir: Option<PathBuf>,
}

impl VideoCompressor<Ffprobe, Ffmpeg> {
    pub fn new(options: VideoOptions, scratch_dir: Option<PathBuf>) -> Self {
        let probe = Ffprobe::new(options.ffprobe.clone());
        let transcoder = Ffmpeg::new(options.ffmpeg.clone());
        Self::with_tools(probe, transcoder, options, scratch_dir)
    }
}

impl<P: DurationProbe, T: VideoTranscoder> VideoCompressor<P, T> {
    pub fn with_tools(
        probe: P,
        transcoder: T,
        options: VideoOptions,
        scratch_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            probe,
            transcoder,
            options,
            scratch_dir,
        }
    }

    fn resolve_duration(&self, path: &Path) -> Result<f64> {
        match self.probe.duration(path)? {
            Some(secs) => Ok(secs),
            None if self.options.allow_unknown_duration => {
                warn!(
                    "Video duration unknown, assuming {} s; bitrate will be inaccurate",
                    FALLBACK_DURATION_SECS
                );
                Ok(FALLBACK_DURATION_SECS)
            }
            None => Err(CompressError::DegenerateDuration),
        }
    }

    /// Single encode at a fixed CRF, ignoring any size budget.
    pub fn compress_crf(&self, input: &[u8], crf: u8) -> Result<Compressed> {
        if !(MIN_CRF..=MAX_CRF).contains(&crf) {
            return Err(CompressError::InvalidCrf(crf));
        }
        let scratch = Scratch::new(self.scratch_dir.as_deref())?;
        let input_path = scratch.write("input", input)?;
        let settings = EncodeSettings::from_options(RateControl::Crf(crf), &self.options);
        info!("Encoding video at CRF {}", crf);
        let bytes = self.encode(&scratch, &input_path, &settings)?;
        scratch.close();

        Ok(Compressed {
            bytes,
            parameters: Parameters::Crf { crf },
            trials: 1,
            original_len: input.len(),
        })
    }

    fn encode(
        &self,
        scratch: &Scratch,
        input_path: &Path,
        settings: &EncodeSettings,
    ) -> Result<Vec<u8>> {
        let output_path = scratch.file("output.mp4");
        self.transcoder
            .transcode(input_path, &output_path, settings)?;
        read_output(&output_path)
    }
}

impl<P: DurationProbe, T: VideoTranscoder> Compressor for VideoCompressor<P, T> {
    fn compress(&self, input: &[u8], target: TargetSize) -> Result<Compressed> {
        let target_mb = target.validate()?.megabytes();
        let scratch = Scratch::new(self.scratch_dir.as_deref())?;
        let input_path = scratch.write("input", input)?;

        let duration = self.resolve_duration(&input_path)?;
        let bitrate = target_bitrate(target_mb, duration);
        info!(
            "Encoding {:.2} s of video at {} bps for {:.2} MB",
            duration, bitrate, target_mb
        );

        let settings = EncodeSettings::from_options(RateControl::Bitrate(bitrate), &self.options);
        let bytes = self.encode(&scratch, &input_path, &settings)?;
        scratch.close();

        Ok(Compressed {
            bytes,
            parameters: Parameters::Bitrate {
                video_bps: bitrate,
                audio_bps: settings.audio_bitrate,
            },
            trials: 1,
            original_len: input.len(),
        })
    }
}

fn read_output(path: &Path) -> Result<Vec<u8>> {
    let empty = || CompressError::EmptyOutput {
        tool: "ffmpeg".to_string(),
    };
    match fs::read(path) {
        Ok(bytes) if bytes.is_empty() => Err(empty()),
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(empty()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedProbe(Option<f64>);

    impl DurationProbe for FixedProbe {
        fn duration(&self, path: &Path) -> Result<Option<f64>> {
            assert!(path.exists());
            Ok(self.0)
        }
    }

    #[derive(Default)]
    struct Recorded {
        paths: Vec<PathBuf>,
        settings: Vec<EncodeSettings>,
    }

    enum Behavior {
        Write(usize),
        WriteNothing,
        Fail,
    }

    struct StubTranscoder {
        behavior: Behavior,
        recorded: Mutex<Recorded>,
    }

    impl StubTranscoder {
        fn new(behavior: Behavior) -> Self {
            Self {
                behavior,
                recorded: Mutex::new(Recorded::default()),
            }
        }
    }

    impl VideoTranscoder for StubTranscoder {
        fn transcode(&self, input: &Path, output: &Path, settings: &EncodeSettings) -> Result<()> {
            let mut recorded = self.recorded.lock().unwrap();
            recorded.paths.push(input.to_path_buf());
            recorded.paths.push(output.to_path_buf());
            recorded.settings.push(settings.clone());
            match self.behavior {
                Behavior::Write(len) => {
                    fs::write(output, vec![7u8; len])?;
                    Ok(())
                }
                Behavior::WriteNothing => {
                    fs::write(output, b"")?;
                    Ok(())
                }
                Behavior::Fail => Err(CompressError::EmptyOutput {
                    tool: "stub".to_string(),
                }),
            }
        }
    }

    fn compressor(
        duration: Option<f64>,
        behavior: Behavior,
        options: VideoOptions,
    ) -> VideoCompressor<FixedProbe, StubTranscoder> {
        VideoCompressor::with_tools(
            FixedProbe(duration),
            StubTranscoder::new(behavior),
            options,
            None,
        )
    }

    fn assert_cleaned(compressor: &VideoCompressor<FixedProbe, StubTranscoder>) {
        let recorded = compressor.transcoder.recorded.lock().unwrap();
        assert!(!recorded.paths.is_empty());
        for path in &recorded.paths {
            assert!(!path.exists(), "{} was left behind", path.display());
            assert!(!path.parent().unwrap().exists());
        }
    }

    #[test]
    fn bitrate_formula() {
        assert_eq!(target_bitrate(5.0, 10.0), 4_194_304);
        assert_eq!(target_bitrate(1.0, 1.0), 8_388_608);
        assert_eq!(target_bitrate(2.0, 3.0), 5_592_405);
    }

    #[test]
    fn parses_probe_output() {
        assert_eq!(parse_duration("12.480000\n"), Some(12.48));
        assert_eq!(parse_duration("N/A\n"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("0.000000"), None);
    }

    #[test]
    fn ffmpeg_arguments() {
        let settings =
            EncodeSettings::from_options(RateControl::Bitrate(4_194_304), &VideoOptions::default());
        let args = settings.ffmpeg_args(Path::new("in"), Path::new("out.mp4"));
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            [
                "-y", "-i", "in", "-c:v", "libx264", "-b:v", "4194304", "-bufsize", "4194304",
                "-preset", "fast", "-c:a", "aac", "-b:a", "128k", "out.mp4"
            ]
        );
    }

    #[test]
    fn crf_arguments_leave_audio_alone() {
        let settings = EncodeSettings::from_options(RateControl::Crf(28), &VideoOptions::default());
        let args: Vec<String> = settings
            .ffmpeg_args(Path::new("in"), Path::new("out.mp4"))
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            ["-y", "-i", "in", "-c:v", "libx264", "-crf", "28", "-preset", "fast", "out.mp4"]
        );
    }

    #[test]
    fn encodes_once_at_computed_bitrate() {
        let compressor = compressor(Some(10.0), Behavior::Write(4096), VideoOptions::default());
        let out = compressor
            .compress(b"video", TargetSize::Megabytes(5.0))
            .unwrap();
        assert_eq!(out.bytes.len(), 4096);
        assert_eq!(out.trials, 1);
        assert_eq!(
            out.parameters,
            Parameters::Bitrate {
                video_bps: 4_194_304,
                audio_bps: 128_000
            }
        );
        let recorded = compressor.transcoder.recorded.lock().unwrap();
        assert_eq!(recorded.settings.len(), 1);
        assert_eq!(recorded.settings[0].rate, RateControl::Bitrate(4_194_304));
        drop(recorded);
        assert_cleaned(&compressor);
    }

    #[test]
    fn unknown_duration_fails_by_default() {
        let compressor = compressor(None, Behavior::Write(10), VideoOptions::default());
        let err = compressor
            .compress(b"video", TargetSize::Megabytes(5.0))
            .unwrap_err();
        assert!(matches!(err, CompressError::DegenerateDuration));
        assert!(compressor.transcoder.recorded.lock().unwrap().paths.is_empty());
    }

    #[test]
    fn unknown_duration_falls_back_when_allowed() {
        let options = VideoOptions {
            allow_unknown_duration: true,
            ..VideoOptions::default()
        };
        let compressor = compressor(None, Behavior::Write(10), options);
        let out = compressor
            .compress(b"video", TargetSize::Megabytes(1.0))
            .unwrap();
        assert_eq!(
            out.parameters,
            Parameters::Bitrate {
                video_bps: 8_388_608,
                audio_bps: 128_000
            }
        );
    }

    #[test]
    fn transcoder_failure_cleans_up() {
        let compressor = compressor(Some(10.0), Behavior::Fail, VideoOptions::default());
        assert!(compressor
            .compress(b"video", TargetSize::Megabytes(5.0))
            .is_err());
        assert_cleaned(&compressor);
    }

    #[test]
    fn empty_output_is_failure() {
        let compressor = compressor(Some(10.0), Behavior::WriteNothing, VideoOptions::default());
        let err = compressor
            .compress(b"video", TargetSize::Megabytes(5.0))
            .unwrap_err();
        assert!(matches!(err, CompressError::EmptyOutput { .. }));
        assert_cleaned(&compressor);
    }

    #[test]
    fn crf_mode() {
        let compressor = compressor(None, Behavior::Write(100), VideoOptions::default());
        let out = compressor.compress_crf(b"video", 28).unwrap();
        assert_eq!(out.parameters, Parameters::Crf { crf: 28 });
        assert_eq!(
            compressor.transcoder.recorded.lock().unwrap().settings[0].rate,
            RateControl::Crf(28)
        );
        assert_cleaned(&compressor);

        assert!(matches!(
            compressor.compress_crf(b"video", 51),
            Err(CompressError::InvalidCrf(51))
        ));
    }

    /// Writes an executable `sh` script standing in for an external tool.
    #[cfg(unix)]
    fn stub_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join(name);
        fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    #[test]
    fn ffprobe_duration_is_read_from_stdout() {
        let tools = tempfile::tempdir().unwrap();
        let probe = Ffprobe::new(stub_tool(tools.path(), "ffprobe", "echo 12.480000"));
        assert_eq!(probe.duration(Path::new("input")).unwrap(), Some(12.48));

        let silent = Ffprobe::new(stub_tool(tools.path(), "ffprobe-na", "echo N/A"));
        assert_eq!(silent.duration(Path::new("input")).unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn rejected_input_is_a_video_decode_failure() {
        let tools = tempfile::tempdir().unwrap();
        let probe = stub_tool(
            tools.path(),
            "ffprobe",
            "echo 'input: Invalid data found when processing input' >&2\nexit 1",
        );
        let ffmpeg = stub_tool(tools.path(), "ffmpeg", "exit 1");
        let scratch = tempfile::tempdir().unwrap();

        for allow_unknown_duration in [false, true] {
            let options = VideoOptions {
                ffprobe: probe.clone(),
                ffmpeg: ffmpeg.clone(),
                allow_unknown_duration,
                ..VideoOptions::default()
            };
            let compressor = VideoCompressor::new(options, Some(scratch.path().to_path_buf()));
            match compressor.compress(b"garbage", TargetSize::Megabytes(5.0)) {
                Err(CompressError::Decode {
                    kind: MediaKind::Video,
                    message,
                }) => assert!(message.contains("Invalid data found")),
                other => panic!("unexpected result {:?}", other.map(|c| c.parameters)),
            }
            assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
        }
    }

    #[cfg(unix)]
    #[test]
    fn real_tool_wrappers_encode_and_clean_up() {
        let tools = tempfile::tempdir().unwrap();
        let args_file = tools.path().join("ffmpeg-args");
        let options = VideoOptions {
            ffprobe: stub_tool(tools.path(), "ffprobe", "echo 10.000000"),
            ffmpeg: stub_tool(
                tools.path(),
                "ffmpeg",
                &format!(
                    "echo \"$@\" > \"{}\"\nshift $(($# - 1))\nprintf encoded > \"$1\"",
                    args_file.display()
                ),
            ),
            ..VideoOptions::default()
        };
        let scratch = tempfile::tempdir().unwrap();
        let compressor = VideoCompressor::new(options, Some(scratch.path().to_path_buf()));

        let out = compressor
            .compress(b"video", TargetSize::Megabytes(5.0))
            .unwrap();

        assert_eq!(out.bytes, b"encoded");
        assert_eq!(
            out.parameters,
            Parameters::Bitrate {
                video_bps: 4_194_304,
                audio_bps: 128_000
            }
        );
        let args = fs::read_to_string(&args_file).unwrap();
        assert!(args.contains("-b:v 4194304 -bufsize 4194304 -preset fast"), "{}", args);
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
    }
}
