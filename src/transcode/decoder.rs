//! Source file and audio decoder
//!
//! Opens a source container, selects the best audio stream and opens a
//! decoder bound to that stream's parameters.

use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::sample::Sample;

use super::{FrameDecoder, PacketSource, Pull};
use crate::error::{FfmpegError, ResampleError, Result};
use crate::ffmpeg::helpers;
use crate::format::source_bit_depth;

/// Decoder-side parameters the rest of the pipeline is configured from
#[derive(Debug, Clone, PartialEq)]
pub struct SourceParams {
    pub codec_id: ffmpeg::codec::Id,
    /// Effective bit depth (24 for DSD sources)
    pub bit_depth: u32,
    pub sample_rate: u32,
    pub sample_format: Sample,
    /// Never empty: defaulted from the channel count when the source has none
    pub channel_layout: ChannelLayout,
    pub channels: u16,
    /// Time base of the selected stream
    pub time_base: ffmpeg::Rational,
}

/// An open source file with a decoder for its best audio stream
pub struct MediaSource {
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Audio,
    stream_index: usize,
    params: SourceParams,
    path: PathBuf,
}

impl MediaSource {
    /// Open a source file and its audio decoder.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let input = ffmpeg::format::input(&path)
            .map_err(|e| FfmpegError::OpenInput(format!("Failed to open {:?}: {}", path, e)))?;

        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Audio)
            .ok_or(ResampleError::NoAudioStream)?;
        let stream_index = stream.index();
        let time_base = stream.time_base();

        let context = ffmpeg::codec::Context::from_parameters(stream.parameters()).map_err(|e| {
            FfmpegError::DecoderCreate(format!(
                "Failed to create codec context for stream {}: {}",
                stream_index, e
            ))
        })?;
        let decoder = context.decoder().audio().map_err(|e| {
            FfmpegError::DecoderCreate(format!(
                "Failed to open audio decoder for stream {}: {}",
                stream_index, e
            ))
        })?;

        let codec_id = decoder.id();
        let channels = decoder.channels();
        let channel_layout = if decoder.channel_layout().bits() == 0 {
            ChannelLayout::default(channels as i32)
        } else {
            decoder.channel_layout()
        };
        let params = SourceParams {
            codec_id,
            bit_depth: source_bit_depth(codec_id, helpers::context_bits_per_raw_sample(&decoder)),
            sample_rate: decoder.rate(),
            sample_format: decoder.format(),
            channel_layout,
            channels,
            time_base,
        };

        tracing::debug!(
            path = %path.display(),
            stream_index,
            codec = ?params.codec_id,
            sample_rate = params.sample_rate,
            channels = params.channels,
            bit_depth = params.bit_depth,
            "Opened audio source"
        );

        Ok(Self {
            input,
            decoder,
            stream_index,
            params,
            path: path.to_path_buf(),
        })
    }

    pub fn params(&self) -> &SourceParams {
        &self.params
    }

    pub fn sample_rate(&self) -> u32 {
        self.params.sample_rate
    }

    /// The selected audio stream index
    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PacketSource for MediaSource {
    fn read_packet(&mut self) -> Result<Pull<ffmpeg::Packet>> {
        loop {
            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) if packet.stream() == self.stream_index => return Ok(Pull::Ready(packet)),
                Ok(()) => continue,
                Err(ffmpeg::Error::Eof) => return Ok(Pull::Eof),
                Err(e) => {
                    return Err(FfmpegError::ReadPacket(format!(
                        "read error in {:?}: {}",
                        self.path, e
                    ))
                    .into())
                }
            }
        }
    }
}

impl FrameDecoder for MediaSource {
    fn send_packet(&mut self, packet: &ffmpeg::Packet) -> Result<()> {
        self.decoder.send_packet(packet).map_err(|e| {
            FfmpegError::DecodePacket(format!(
                "send_packet error on stream {}: {}",
                self.stream_index, e
            ))
            .into()
        })
    }

    /// EAGAIN and EOF responses are ignored: the decoder has nothing buffered
    /// or is already finished.
    fn send_eof(&mut self) -> Result<()> {
        match self.decoder.send_eof() {
            Ok(()) => Ok(()),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(()),
            Err(ffmpeg::Error::Eof) => Ok(()),
            Err(e) => Err(FfmpegError::DecodePacket(format!(
                "send_eof error on stream {}: {}",
                self.stream_index, e
            ))
            .into()),
        }
    }

    fn receive_frame(&mut self) -> Result<Pull<ffmpeg::frame::Audio>> {
        let mut frame = ffmpeg::frame::Audio::empty();
        let status = self.decoder.receive_frame(&mut frame);
        Pull::from_status(status, frame).map_err(|e| {
            FfmpegError::DecodePacket(format!(
                "receive_frame error on stream {}: {}",
                self.stream_index, e
            ))
            .into()
        })
    }
}
