//! Audio transcoding module
//!
//! This module handles the per-file conversion:
//! - Source demuxing and decoding (`decoder`)
//! - Encoder selection and setup (`encoder`)
//! - Resample/gain filter graph (`filter`)
//! - Output container writing (`muxer`)
//! - The decode → filter → encode → mux loop (`pipeline`)
//! - Per-file job orchestration and output naming (`job`)
//!
//! The stage traits below are the seams the stream processor drives. The
//! FFmpeg-backed stages implement them; tests drive the processor with
//! scripted stages.

pub mod decoder;
pub mod encoder;
pub mod filter;
pub mod job;
pub mod muxer;
pub mod pipeline;

use ffmpeg_next as ffmpeg;

use crate::error::Result;
pub use crate::ffmpeg::Pull;

pub use decoder::{MediaSource, SourceParams};
pub use encoder::{AudioEncoder, EncodeTarget};
pub use filter::{FilterChain, FilterChainSpec, SinkConstraints, VolumeAdjust};
pub use job::{convert_file, output_path, ConversionRequest, FileJob, FileOutcome, SkipReason};
pub use muxer::OutputContainer;
pub use pipeline::{PresentationClock, StreamProcessor, StreamState, StreamStats};

/// Compressed packets of the selected audio stream, in file order
pub trait PacketSource {
    fn read_packet(&mut self) -> Result<Pull<ffmpeg::Packet>>;
}

/// Packet → frame stage
pub trait FrameDecoder {
    fn send_packet(&mut self, packet: &ffmpeg::Packet) -> Result<()>;
    fn send_eof(&mut self) -> Result<()>;
    fn receive_frame(&mut self) -> Result<Pull<ffmpeg::frame::Audio>>;
}

/// Frame → frame stage (resample, gain, reframing)
pub trait FrameFilter {
    fn push_frame(&mut self, frame: &ffmpeg::frame::Audio) -> Result<()>;
    fn push_eof(&mut self) -> Result<()>;
    fn pull_frame(&mut self) -> Result<Pull<ffmpeg::frame::Audio>>;
}

/// Frame → packet stage
pub trait FrameEncoder {
    fn send_frame(&mut self, frame: &ffmpeg::frame::Audio) -> Result<()>;
    fn send_eof(&mut self) -> Result<()>;
    fn receive_packet(&mut self) -> Result<Pull<ffmpeg::Packet>>;
}

/// Output container
pub trait PacketMuxer {
    fn write_packet(&mut self, packet: ffmpeg::Packet) -> Result<()>;
    fn write_trailer(&mut self) -> Result<()>;
}
