//! Output encoder for the transcoding pipeline
//!
//! Wraps an FFmpeg `AVCodecContext` configured from an [`EncodeTarget`]:
//! codec, sample format, rate, channel layout and (for lossy output) a
//! fixed bit rate.

use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::sample::Sample;

use super::decoder::SourceParams;
use super::{FrameEncoder, Pull};
use crate::error::{FfmpegError, Result};
use crate::ffmpeg::helpers;
use crate::format::{OutputFormat, SampleChoice};

/// Everything the encoder is opened with. Derived once per file.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeTarget {
    pub format: OutputFormat,
    pub codec_id: codec::Id,
    pub sample_format: SampleChoice,
    pub sample_rate: u32,
    pub channel_layout: ChannelLayout,
    pub channels: u16,
    pub bit_rate: Option<usize>,
    /// Accept experimental encoder variants
    pub experimental: bool,
}

impl EncodeTarget {
    /// Derive the encoder parameters from the source and the resolved rate.
    ///
    /// The channel layout is the default layout for the source channel count.
    pub fn derive(source: &SourceParams, format: OutputFormat, sample_rate: u32) -> Self {
        Self {
            format,
            codec_id: format.codec_id(source.bit_depth),
            sample_format: format.sample_format(source.bit_depth),
            sample_rate,
            channel_layout: ChannelLayout::default(source.channels as i32),
            channels: source.channels,
            bit_rate: format.bit_rate(),
            experimental: true,
        }
    }

    /// The output stream time base, one tick per sample
    pub fn time_base(&self) -> ffmpeg::Rational {
        ffmpeg::Rational::new(1, self.sample_rate as i32)
    }
}

/// An opened encoder
pub struct AudioEncoder {
    encoder: ffmpeg::encoder::Audio,
    codec_id: codec::Id,
    variable_frame_size: bool,
    time_base: ffmpeg::Rational,
}

impl AudioEncoder {
    /// Open an encoder for the target. `global_header` is set when the
    /// output container wants codec extradata in its header.
    pub fn open(target: &EncodeTarget, global_header: bool) -> Result<Self> {
        let codec = ffmpeg::encoder::find(target.codec_id)
            .ok_or_else(|| FfmpegError::EncoderNotFound(format!("{:?}", target.codec_id)))?;

        let sample_format = match target.sample_format {
            SampleChoice::Fixed(format) => format,
            SampleChoice::EncoderDefault => default_sample_format(codec).ok_or_else(|| {
                FfmpegError::EncoderCreate(format!(
                    "{:?} encoder advertises no sample formats",
                    target.codec_id
                ))
            })?,
        };

        let time_base = target.time_base();
        let mut context = codec::Context::new_with_codec(codec);
        context.set_time_base(time_base);
        if target.experimental {
            context.compliance(codec::Compliance::Experimental);
        }
        if global_header {
            context.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let mut audio_enc = context.encoder().audio().map_err(|e| {
            FfmpegError::EncoderCreate(format!("Cannot get audio encoder handle: {}", e))
        })?;

        audio_enc.set_rate(target.sample_rate as i32);
        audio_enc.set_format(sample_format);
        audio_enc.set_channel_layout(target.channel_layout);
        if let Some(bit_rate) = target.bit_rate {
            audio_enc.set_bit_rate(bit_rate);
        }

        tracing::info!(
            codec = ?target.codec_id,
            format = sample_format.name(),
            rate = target.sample_rate,
            channels = target.channels,
            "Opening the encoder."
        );
        let encoder = audio_enc.open_as(codec).map_err(|e| {
            FfmpegError::EncoderCreate(format!("Failed to open {:?} encoder: {}", target.codec_id, e))
        })?;

        let variable_frame_size = codec
            .capabilities()
            .contains(codec::Capabilities::VARIABLE_FRAME_SIZE);

        Ok(Self {
            encoder,
            codec_id: target.codec_id,
            variable_frame_size,
            time_base,
        })
    }

    /// Samples per channel the encoder requires per frame, or `None` when it
    /// accepts any size.
    pub fn required_frame_size(&self) -> Option<u32> {
        let frame_size = self.encoder.frame_size();
        if frame_size == 0 || self.variable_frame_size {
            None
        } else {
            Some(frame_size)
        }
    }

    pub fn format(&self) -> Sample {
        self.encoder.format()
    }

    pub fn channel_layout(&self) -> ChannelLayout {
        self.encoder.channel_layout()
    }

    pub fn rate(&self) -> u32 {
        self.encoder.rate()
    }

    /// Encoder time base (1 / sample_rate)
    pub fn time_base(&self) -> ffmpeg::Rational {
        self.time_base
    }

    pub fn codec_id(&self) -> codec::Id {
        self.codec_id
    }

    /// Codec parameters for the output stream descriptor
    pub fn codec_parameters(&self) -> Result<ffmpeg::codec::Parameters> {
        helpers::encoder_codec_parameters(&self.encoder)
    }
}

impl FrameEncoder for AudioEncoder {
    fn send_frame(&mut self, frame: &ffmpeg::frame::Audio) -> Result<()> {
        self.encoder.send_frame(frame).map_err(|e| {
            FfmpegError::EncodeFrame(format!("{:?} send_frame error: {}", self.codec_id, e)).into()
        })
    }

    fn send_eof(&mut self) -> Result<()> {
        self.encoder.send_eof().map_err(|e| {
            FfmpegError::EncodeFrame(format!("{:?} send_eof error: {}", self.codec_id, e)).into()
        })
    }

    fn receive_packet(&mut self) -> Result<Pull<ffmpeg::Packet>> {
        let mut packet = ffmpeg::Packet::empty();
        let status = self.encoder.receive_packet(&mut packet);
        Pull::from_status(status, packet).map_err(|e| {
            FfmpegError::EncodeFrame(format!("{:?} receive_packet error: {}", self.codec_id, e))
                .into()
        })
    }
}

/// First sample format the encoder advertises
fn default_sample_format(codec: ffmpeg::codec::Codec) -> Option<Sample> {
    codec.audio().ok()?.formats()?.next()
}
