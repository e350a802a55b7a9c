//! Per-file conversion job
//!
//! Everything one conversion needs is carried by [`FileJob`]; nothing is
//! shared between files.

use std::fmt;
use std::path::{Path, PathBuf};

use super::decoder::MediaSource;
use super::encoder::{AudioEncoder, EncodeTarget};
use super::filter::{FilterChain, FilterChainSpec, SinkConstraints, VolumeAdjust};
use super::muxer::OutputContainer;
use super::pipeline::{StreamProcessor, StreamStats};
use crate::error::{ResampleError, Result};
use crate::format::OutputFormat;
use crate::rate::{rate_suffix, RateRequest};

// helper.
macro_rules! regex {
    ($re:literal $(,)?) => {{
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new($re).unwrap())
    }};
}

/// What the user asked for, parsed and validated up front
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub rate: RateRequest,
    pub format: OutputFormat,
    pub volume: Option<VolumeAdjust>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The output file is already there
    AlreadyConverted,
    /// Maximum mode with a source rate outside both rate families
    UnsupportedSourceRate(u32),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyConverted => write!(f, "output file already exists"),
            SkipReason::UnsupportedSourceRate(rate) => {
                write!(f, "source rate {} Hz is not a multiple of 44100 or 48000", rate)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Converted {
        output: PathBuf,
        stats: StreamStats,
    },
    Skipped {
        output: Option<PathBuf>,
        reason: SkipReason,
    },
}

/// Output path for `input` inside `dir`: the basename with its supported
/// extension replaced by `_ff<kHz>k.<ext>`.
pub fn output_path(dir: &Path, input: &Path, rate: u32, format: OutputFormat) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let replacement = format!("{}.{}", rate_suffix(rate), format.extension());

    let re = regex!(r"\.(?:flac|dsf|dff|wav|aiff|m4a|mp3)$");
    let renamed = if re.is_match(&name) {
        re.replace(&name, regex::NoExpand(&replacement)).into_owned()
    } else {
        format!("{}{}", name, replacement)
    };
    dir.join(renamed)
}

/// One input file and where its output goes
pub struct FileJob<'a> {
    input: &'a Path,
    output_dir: &'a Path,
    request: &'a ConversionRequest,
}

impl<'a> FileJob<'a> {
    pub fn new(input: &'a Path, output_dir: &'a Path, request: &'a ConversionRequest) -> Self {
        Self {
            input,
            output_dir,
            request,
        }
    }

    pub fn run(&self) -> Result<FileOutcome> {
        tracing::info!("Opening input file: {}", self.input.display());
        let mut source = MediaSource::open(self.input)?;

        if self.request.rate.is_maximum() {
            tracing::info!(
                "Maximum sample rate specified for output. Recalculating destination sample rate"
            );
        }
        let rate = match self.request.rate.resolve(source.sample_rate()) {
            Ok(rate) => rate,
            Err(ResampleError::UnsupportedSourceRate(source_rate)) => {
                tracing::warn!("SKIPPING {}: unsupported source rate", self.input.display());
                return Ok(FileOutcome::Skipped {
                    output: None,
                    reason: SkipReason::UnsupportedSourceRate(source_rate),
                });
            }
            Err(e) => return Err(e),
        };

        let output = output_path(self.output_dir, self.input, rate, self.request.format);
        if output.exists() {
            tracing::info!("Output file already exists! SKIPPING {}", output.display());
            return Ok(FileOutcome::Skipped {
                output: Some(output),
                reason: SkipReason::AlreadyConverted,
            });
        }

        tracing::info!("Opening output file: {}", output.display());
        match self.transcode(&mut source, &output, rate) {
            Ok(stats) => {
                tracing::info!(
                    output = %output.display(),
                    samples = stats.samples_emitted,
                    packets = stats.packets_written,
                    "Converted"
                );
                Ok(FileOutcome::Converted { output, stats })
            }
            Err(e) => {
                remove_partial_output(&output);
                Err(e)
            }
        }
    }

    /// All output handles are dropped by the time this returns.
    fn transcode(&self, source: &mut MediaSource, output: &Path, rate: u32) -> Result<StreamStats> {
        let target = EncodeTarget::derive(source.params(), self.request.format, rate);

        let mut container = OutputContainer::create(output)?;
        let mut encoder = AudioEncoder::open(&target, container.requires_global_header())?;
        container.add_stream(&encoder)?;

        let spec = FilterChainSpec::new(
            source.params(),
            SinkConstraints::from_encoder(&encoder),
            self.request.volume.clone(),
        );
        let mut filter = FilterChain::build(&spec, encoder.required_frame_size())?;

        container.write_header()?;

        tracing::info!("Transcoding...");
        StreamProcessor::new(source, &mut filter, &mut encoder, &mut container).run()
    }
}

/// Convert one file into `output_dir`.
pub fn convert_file(
    input: &Path,
    output_dir: &Path,
    request: &ConversionRequest,
) -> Result<FileOutcome> {
    FileJob::new(input, output_dir, request).run()
}

fn remove_partial_output(path: &Path) {
    if !path.exists() {
        return;
    }
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!("Removed partial output {}", path.display()),
        Err(e) => tracing::warn!("Could not remove partial output {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_replaces_extension() {
        let out = output_path(
            Path::new("/out/album"),
            Path::new("/music/album/01 - Intro.flac"),
            44100,
            OutputFormat::Wav,
        );
        assert_eq!(out, PathBuf::from("/out/album/01 - Intro_ff44k.wav"));
    }

    #[test]
    fn test_output_path_suffix_uses_khz() {
        let dir = Path::new("out");
        assert_eq!(
            output_path(dir, Path::new("a.dsf"), 88200, OutputFormat::Flac),
            PathBuf::from("out/a_ff88k.flac")
        );
        assert_eq!(
            output_path(dir, Path::new("a.wav"), 192000, OutputFormat::M4a),
            PathBuf::from("out/a_ff192k.m4a")
        );
    }

    #[test]
    fn test_output_path_only_last_extension() {
        let out = output_path(
            Path::new("out"),
            Path::new("mix.flac.mp3"),
            48000,
            OutputFormat::Aiff,
        );
        assert_eq!(out, PathBuf::from("out/mix.flac_ff48k.aiff"));
    }

    #[test]
    fn test_output_path_unknown_extension_appends() {
        let out = output_path(Path::new("out"), Path::new("take.ogg"), 44100, OutputFormat::Mp3);
        assert_eq!(out, PathBuf::from("out/take.ogg_ff44k.mp3"));
    }

    #[test]
    fn test_output_path_is_deterministic() {
        let a = output_path(Path::new("o"), Path::new("x.m4a"), 96000, OutputFormat::Flac);
        let b = output_path(Path::new("o"), Path::new("x.m4a"), 96000, OutputFormat::Flac);
        assert_eq!(a, b);
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(
            SkipReason::AlreadyConverted.to_string(),
            "output file already exists"
        );
        assert!(SkipReason::UnsupportedSourceRate(22050)
            .to_string()
            .contains("22050"));
    }

    #[test]
    fn test_remove_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("half_ff44k.wav");
        std::fs::write(&path, b"RIFF").unwrap();
        remove_partial_output(&path);
        assert!(!path.exists());
        // Nothing there is fine too
        remove_partial_output(&path);
    }

    #[test]
    fn test_convert_missing_input_is_per_file_error() {
        crate::ffmpeg::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let request = ConversionRequest {
            rate: "44100".parse().unwrap(),
            format: OutputFormat::Wav,
            volume: None,
        };
        let err = convert_file(&dir.path().join("missing.flac"), dir.path(), &request).unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
