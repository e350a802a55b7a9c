//! Command-line arguments

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::config::{BatchConfig, LogFormat, DEFAULT_CONFIG_FILE};
use crate::error::Result;
use crate::format::OutputFormat;
use crate::transcode::{ConversionRequest, VolumeAdjust};

const USAGE_NOTES: &str = "\
The sample rate is given in Hz (e.g. 44100). Append an \"m\" (e.g. 96000m) to
treat it as a maximum: each file keeps its own rate when it is at or below the
maximum, and is otherwise downsampled to the highest multiple of its own base
rate (44100 or 48000) that does not exceed it. In maximum mode the value must
itself be a multiple of 44100 or 48000.

An optional volume adjust (in dB) can be given (positive number for boost,
negative for cut).

Converts every supported file below the input directory into a mirrored tree
under the output directory. Renames file basenames on conversion and doesn't
re-convert already converted files on subsequent runs.

Supported infile types: flac,dsf,dff,wav,aiff,m4a,mp3
Supported outfile types: flac,wav,aiff,m4a(alac),mp3";

/// Batch audio resampler and transcoder.
#[derive(Parser, Debug, Clone)]
#[command(name = "batch-resampler")]
#[command(author, version, about, long_about = None, after_long_help = USAGE_NOTES)]
#[command(allow_negative_numbers = true)]
pub struct Args {
    /// Target sample rate in Hz; append "m" for maximum mode (e.g. 96000m).
    pub sample_rate: String,

    /// Output file type: flac, wav, aiff, m4a or mp3.
    pub outfile_ext: String,

    /// Volume adjustment in dB (e.g. 3 or -1.5).
    pub vol_adjust_db: Option<String>,

    /// Configuration file (TOML). Defaults to ./batch-resampler.toml if present.
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Directory tree to convert (default: current directory).
    #[arg(short = 'i', long)]
    pub input_dir: Option<PathBuf>,

    /// Output root (default: ~/batch_resampled).
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Write a JSON run summary to this file.
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Logging level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log output format (pretty or json).
    #[arg(long)]
    pub log_format: Option<String>,
}

impl Args {
    /// Parse and validate the positional arguments. Any error here is a
    /// configuration error.
    pub fn request(&self) -> Result<ConversionRequest> {
        let volume = match &self.vol_adjust_db {
            Some(text) => VolumeAdjust::parse(text)?,
            None => None,
        };
        Ok(ConversionRequest {
            rate: self.sample_rate.parse()?,
            format: self.outfile_ext.parse::<OutputFormat>()?,
            volume,
        })
    }

    /// Load the configuration file (if any) and apply the command-line
    /// overrides on top of it.
    pub fn load_config(&self) -> Result<BatchConfig> {
        let mut config = match &self.config {
            Some(path) => BatchConfig::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                BatchConfig::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => BatchConfig::default(),
        };
        self.apply_overrides(&mut config)?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut BatchConfig) -> Result<()> {
        if let Some(dir) = &self.input_dir {
            config.input_root = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_root = dir.clone();
        }
        if let Some(report) = &self.report {
            config.report = Some(report.clone());
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.logging.format = format.parse::<LogFormat>()?;
        }
        Ok(())
    }
}
