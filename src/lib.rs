//! Batch audio resampler
//!
//! Converts a directory tree of audio files to a chosen container, codec and
//! sample rate, mirroring the tree under an output root. Files that were
//! already converted are skipped, so re-running a batch is cheap.
//!
//! All decoding, filtering, encoding and muxing goes through FFmpeg.

pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod format;
pub mod rate;
pub mod transcode;

#[cfg(test)]
mod tests;

pub use batch::{run_batch, BatchJob, BatchSummary};
pub use config::BatchConfig;
pub use error::{FfmpegError, ResampleError, Result};
pub use transcode::{convert_file, ConversionRequest, FileOutcome};
