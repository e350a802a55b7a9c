//! Resample and gain filter graph
//!
//! Builds `abuffer → aresample → [volume] → abuffersink`. The source buffer is
//! tagged with the decoder's actual parameters; the sink only accepts the
//! encoder's sample format, channel layout and rate, and hands out frames of
//! exactly the encoder's frame size when the encoder requires one. The
//! negotiated sink link is checked against those constraints after the graph
//! is configured.

use std::fmt;

use ffmpeg_next as ffmpeg;
use ffmpeg_next::filter;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::sample::Sample;

use super::decoder::SourceParams;
use super::encoder::AudioEncoder;
use super::{FrameFilter, Pull};
use crate::error::{FfmpegError, ResampleError, Result};
use crate::ffmpeg::helpers::{self, LinkParams};

const SOURCE_NAME: &str = "in";
const SINK_NAME: &str = "out";

/// A requested volume change in decibels. Never zero.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeAdjust {
    text: String,
}

impl VolumeAdjust {
    /// Parse the user's adjustment. Empty text or a zero value disables the
    /// gain stage; anything that is not a decibel number is a configuration
    /// error.
    pub fn parse(text: &str) -> Result<Option<Self>> {
        let trimmed = text.trim();
        let number = trimmed
            .strip_suffix("dB")
            .or_else(|| trimmed.strip_suffix("db"))
            .unwrap_or(trimmed)
            .trim();
        if number.is_empty() {
            return if trimmed.is_empty() {
                Ok(None)
            } else {
                Err(ResampleError::InvalidVolume(text.to_string()))
            };
        }

        let value: f64 = number
            .parse()
            .map_err(|_| ResampleError::InvalidVolume(text.to_string()))?;
        if !value.is_finite() {
            return Err(ResampleError::InvalidVolume(text.to_string()));
        }
        if value == 0.0 {
            return Ok(None);
        }
        Ok(Some(Self {
            text: number.trim_start_matches('+').to_string(),
        }))
    }

    /// Adjustment in dB as given by the user
    pub fn db(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for VolumeAdjust {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}dB", self.text)
    }
}

/// What the sink must hand to the encoder
#[derive(Debug, Clone, PartialEq)]
pub struct SinkConstraints {
    pub sample_format: Sample,
    pub channel_layout: ChannelLayout,
    pub sample_rate: u32,
}

impl SinkConstraints {
    pub fn from_encoder(encoder: &AudioEncoder) -> Self {
        Self {
            sample_format: encoder.format(),
            channel_layout: encoder.channel_layout(),
            sample_rate: encoder.rate(),
        }
    }

    /// Layout argument for the sink: the channel mask, or a bare channel
    /// count when the layout has no mask.
    fn layout_arg(&self) -> String {
        match self.channel_layout.bits() {
            0 => format!("{}c", self.channel_layout.channels()),
            mask => format!("0x{:x}", mask),
        }
    }

    /// Check what the graph negotiated on the sink's input link.
    pub fn check(&self, link: &LinkParams) -> Result<()> {
        let layout_ok = match (self.channel_layout.bits(), link.layout_mask) {
            (0, _) | (_, None) => true,
            (mask, Some(negotiated)) => mask == negotiated,
        };
        if link.format == Some(self.sample_format)
            && link.sample_rate == self.sample_rate
            && link.channels as i32 == self.channel_layout.channels()
            && layout_ok
        {
            return Ok(());
        }
        Err(FfmpegError::FilterGraph(format!(
            "sink negotiated {} (layout {:?}), encoder needs srate:{}Hz fmt:{} Channels num: {} (layout 0x{:x})",
            link,
            link.layout_mask,
            self.sample_rate,
            self.sample_format.name(),
            self.channel_layout.channels(),
            self.channel_layout.bits()
        ))
        .into())
    }
}

/// Textual description of the linear chain plus the sink's constraints
#[derive(Debug, Clone, PartialEq)]
pub struct FilterChainSpec {
    pub source_args: String,
    pub resample_rate: u32,
    pub volume: Option<VolumeAdjust>,
    pub sink: SinkConstraints,
}

impl FilterChainSpec {
    pub fn new(source: &SourceParams, sink: SinkConstraints, volume: Option<VolumeAdjust>) -> Self {
        let source_args = format!(
            "time_base={}:sample_rate={}:sample_fmt={}:channel_layout=0x{:x}",
            helpers::rational_arg(source.time_base),
            source.sample_rate,
            source.sample_format.name(),
            source.channel_layout.bits()
        );
        Self {
            source_args,
            resample_rate: sink.sample_rate,
            volume,
            sink,
        }
    }

    /// The stages between the source and sink buffers
    pub fn chain(&self) -> String {
        match &self.volume {
            Some(volume) => format!("aresample={},volume={}", self.resample_rate, volume),
            None => format!("aresample={}", self.resample_rate),
        }
    }

    /// The whole chain, source to sink
    pub fn describe(&self) -> String {
        format!(
            "abuffer@{}={},{},abuffersink@{}",
            SOURCE_NAME,
            self.source_args,
            self.chain(),
            SINK_NAME
        )
    }
}

/// A configured filter graph
pub struct FilterChain {
    graph: filter::Graph,
    frame_size: Option<u32>,
    negotiated: LinkParams,
}

impl FilterChain {
    /// Realize and validate the graph. `frame_size` is the encoder's fixed
    /// frame size, if it has one.
    pub fn build(spec: &FilterChainSpec, frame_size: Option<u32>) -> Result<Self> {
        let mut graph = filter::Graph::new();

        let abuffer = find_filter("abuffer")?;
        let abuffersink = find_filter("abuffersink")?;
        graph
            .add(&abuffer, SOURCE_NAME, &spec.source_args)
            .map_err(|e| graph_error("add abuffer", e))?;
        graph
            .add(&abuffersink, SINK_NAME, "")
            .map_err(|e| graph_error("add abuffersink", e))?;

        {
            let mut sink = graph
                .get(SINK_NAME)
                .ok_or_else(|| FfmpegError::FilterGraph("sink buffer missing".into()))?;
            helpers::constrain_sink(
                &mut sink,
                spec.sink.sample_format,
                spec.sink.sample_rate,
                &spec.sink.layout_arg(),
            )
            .map_err(|e| graph_error("constrain abuffersink", e))?;
        }

        let chain = spec.chain();
        graph
            .output(SOURCE_NAME, 0)
            .and_then(|parser| parser.input(SINK_NAME, 0))
            .and_then(|parser| parser.parse(&chain))
            .map_err(|e| graph_error(&format!("parse {:?}", chain), e))?;
        graph.validate().map_err(|e| graph_error("validate", e))?;

        let input = graph
            .get(SOURCE_NAME)
            .and_then(|source| helpers::output_link(&source))
            .ok_or_else(|| FfmpegError::FilterGraph("source buffer is not linked".into()))?;
        let negotiated = graph
            .get(SINK_NAME)
            .and_then(|sink| helpers::input_link(&sink))
            .ok_or_else(|| FfmpegError::FilterGraph("sink buffer is not linked".into()))?;
        spec.sink.check(&negotiated)?;

        if let Some(frame_size) = frame_size {
            graph
                .get(SINK_NAME)
                .ok_or_else(|| FfmpegError::FilterGraph("sink buffer missing".into()))?
                .sink()
                .set_frame_size(frame_size);
        }

        tracing::info!("Filter chain: {}", spec.describe());
        tracing::info!("Input: {}", input);
        tracing::info!("Output: {}", negotiated);

        Ok(Self {
            graph,
            frame_size,
            negotiated,
        })
    }

    /// Frame size forced on the sink, if any
    pub fn frame_size(&self) -> Option<u32> {
        self.frame_size
    }

    /// What the sink hands out
    pub fn negotiated(&self) -> &LinkParams {
        &self.negotiated
    }

    fn context(&mut self, name: &str) -> Result<filter::Context<'_>> {
        self.graph
            .get(name)
            .ok_or_else(|| FfmpegError::FilterGraph(format!("filter {:?} missing", name)).into())
    }
}

impl FrameFilter for FilterChain {
    fn push_frame(&mut self, frame: &ffmpeg::frame::Audio) -> Result<()> {
        self.context(SOURCE_NAME)?
            .source()
            .add(frame)
            .map_err(|e| graph_error("feeding the audio filtergraph", e).into())
    }

    fn push_eof(&mut self) -> Result<()> {
        self.context(SOURCE_NAME)?
            .source()
            .flush()
            .map_err(|e| graph_error("flushing the audio filtergraph", e).into())
    }

    fn pull_frame(&mut self) -> Result<Pull<ffmpeg::frame::Audio>> {
        let mut frame = ffmpeg::frame::Audio::empty();
        let status = self.context(SINK_NAME)?.sink().frame(&mut frame);
        Pull::from_status(status, frame)
            .map_err(|e| graph_error("getting frame from filtergraph", e).into())
    }
}

fn find_filter(name: &str) -> Result<filter::Filter> {
    filter::find(name)
        .ok_or_else(|| FfmpegError::FilterGraph(format!("{} filter not available", name)).into())
}

fn graph_error(what: &str, e: ffmpeg::Error) -> FfmpegError {
    FfmpegError::FilterGraph(format!("{}: {}", what, e))
}
