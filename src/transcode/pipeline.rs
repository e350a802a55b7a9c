//! Decode → filter → encode → mux loop
//!
//! The processor drives the stages by explicit push/pull. Every drain runs
//! until its stage reports `Again` or `Eof`, so a frame always fully leaves a
//! stage before the next input is fed to it.

use ffmpeg_next as ffmpeg;
use serde::Serialize;

use super::{FrameDecoder, FrameEncoder, FrameFilter, PacketMuxer, PacketSource, Pull};
use crate::error::Result;

/// Running sample counter used as the pts of filtered frames
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PresentationClock {
    next: i64,
}

impl PresentationClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp the frame with the current position and advance past it.
    /// Returns the pts assigned.
    pub fn stamp(&mut self, frame: &mut ffmpeg::frame::Audio) -> i64 {
        let pts = self.next;
        frame.set_pts(Some(pts));
        self.next += frame.samples() as i64;
        pts
    }

    /// Samples stamped so far
    pub fn samples(&self) -> u64 {
        self.next as u64
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Reading,
    Decoding,
    Filtering,
    Encoding,
    Flushing,
    Done,
    Failed,
}

/// Counters for one file
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub packets_read: u64,
    pub frames_decoded: u64,
    pub frames_filtered: u64,
    pub samples_emitted: u64,
    pub packets_written: u64,
}

/// Pumps one file through its stages.
///
/// `I` is both the packet source and the decoder since they share the
/// demuxer's stream.
pub struct StreamProcessor<'a, I, F, E, M> {
    input: &'a mut I,
    filter: &'a mut F,
    encoder: &'a mut E,
    muxer: &'a mut M,
    clock: PresentationClock,
    state: StreamState,
    stats: StreamStats,
}

impl<'a, I, F, E, M> StreamProcessor<'a, I, F, E, M>
where
    I: PacketSource + FrameDecoder,
    F: FrameFilter,
    E: FrameEncoder,
    M: PacketMuxer,
{
    pub fn new(input: &'a mut I, filter: &'a mut F, encoder: &'a mut E, muxer: &'a mut M) -> Self {
        Self {
            input,
            filter,
            encoder,
            muxer,
            clock: PresentationClock::new(),
            state: StreamState::Reading,
            stats: StreamStats::default(),
        }
    }

    /// Run to completion. `Done` is reached only after the trailer is
    /// written; any stage error leaves the processor `Failed`.
    pub fn run(&mut self) -> Result<StreamStats> {
        match self.pump() {
            Ok(()) => {
                self.state = StreamState::Done;
                debug_assert_eq!(self.clock.samples(), self.stats.samples_emitted);
                Ok(self.stats)
            }
            Err(e) => {
                tracing::debug!(state = ?self.state, "Stream processing failed: {}", e);
                self.state = StreamState::Failed;
                Err(e)
            }
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn clock(&self) -> &PresentationClock {
        &self.clock
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    fn pump(&mut self) -> Result<()> {
        loop {
            self.state = StreamState::Reading;
            match self.input.read_packet()? {
                Pull::Ready(packet) => {
                    self.stats.packets_read += 1;
                    self.state = StreamState::Decoding;
                    self.input.send_packet(&packet)?;
                    self.drain_decoder()?;
                }
                Pull::Again => continue,
                Pull::Eof => break,
            }
        }

        self.state = StreamState::Flushing;
        self.input.send_eof()?;
        self.drain_decoder()?;

        self.state = StreamState::Flushing;
        self.filter.push_eof()?;
        self.drain_filter()?;

        self.state = StreamState::Flushing;
        self.encoder.send_eof()?;
        self.drain_encoder()?;

        self.muxer.write_trailer()
    }

    fn drain_decoder(&mut self) -> Result<()> {
        while let Pull::Ready(frame) = self.input.receive_frame()? {
            self.stats.frames_decoded += 1;
            self.state = StreamState::Filtering;
            self.filter.push_frame(&frame)?;
            self.drain_filter()?;
        }
        Ok(())
    }

    fn drain_filter(&mut self) -> Result<()> {
        while let Pull::Ready(mut frame) = self.filter.pull_frame()? {
            self.stats.frames_filtered += 1;
            self.clock.stamp(&mut frame);
            self.stats.samples_emitted += frame.samples() as u64;
            self.state = StreamState::Encoding;
            self.encoder.send_frame(&frame)?;
            self.drain_encoder()?;
        }
        Ok(())
    }

    fn drain_encoder(&mut self) -> Result<()> {
        while let Pull::Ready(packet) = self.encoder.receive_packet()? {
            // The packet is consumed by the write whether or not it succeeds
            self.muxer.write_packet(packet)?;
            self.stats.packets_written += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FfmpegError, ResampleError};
    use ffmpeg_next::util::channel_layout::ChannelLayout;
    use ffmpeg_next::util::format::sample::{Sample, Type};
    use std::collections::VecDeque;

    fn frame(samples: usize) -> ffmpeg::frame::Audio {
        ffmpeg::frame::Audio::new(Sample::I16(Type::Packed), samples, ChannelLayout::MONO)
    }

    fn codec_error(what: &str) -> ResampleError {
        FfmpegError::DecodePacket(what.to_string()).into()
    }

    /// Emits `frames_per_packet` frames of `frame_samples` for every packet,
    /// plus `tail_frames` more after EOF.
    struct ScriptedInput {
        packets: usize,
        frames_per_packet: usize,
        frame_samples: usize,
        tail_frames: usize,
        fail_on_packet: Option<usize>,
        sent: usize,
        pending: VecDeque<usize>,
        eof_sent: bool,
    }

    impl ScriptedInput {
        fn new(packets: usize, frames_per_packet: usize, frame_samples: usize) -> Self {
            Self {
                packets,
                frames_per_packet,
                frame_samples,
                tail_frames: 0,
                fail_on_packet: None,
                sent: 0,
                pending: VecDeque::new(),
                eof_sent: false,
            }
        }
    }

    impl PacketSource for ScriptedInput {
        fn read_packet(&mut self) -> Result<Pull<ffmpeg::Packet>> {
            if self.packets == 0 {
                return Ok(Pull::Eof);
            }
            self.packets -= 1;
            Ok(Pull::Ready(ffmpeg::Packet::copy(&[0u8; 16])))
        }
    }

    impl FrameDecoder for ScriptedInput {
        fn send_packet(&mut self, _packet: &ffmpeg::Packet) -> Result<()> {
            self.sent += 1;
            if self.fail_on_packet == Some(self.sent) {
                return Err(codec_error("corrupt packet"));
            }
            for _ in 0..self.frames_per_packet {
                self.pending.push_back(self.frame_samples);
            }
            Ok(())
        }

        fn send_eof(&mut self) -> Result<()> {
            self.eof_sent = true;
            for _ in 0..self.tail_frames {
                self.pending.push_back(self.frame_samples);
            }
            Ok(())
        }

        fn receive_frame(&mut self) -> Result<Pull<ffmpeg::frame::Audio>> {
            match self.pending.pop_front() {
                Some(samples) => Ok(Pull::Ready(frame(samples))),
                None if self.eof_sent => Ok(Pull::Eof),
                None => Ok(Pull::Again),
            }
        }
    }

    /// Re-cuts the incoming samples into frames of `chunk` samples, emitting
    /// the remainder on EOF. Emits zero, one or many frames per input.
    struct ReframingFilter {
        chunk: usize,
        buffered: usize,
        eof: bool,
    }

    impl ReframingFilter {
        fn new(chunk: usize) -> Self {
            Self {
                chunk,
                buffered: 0,
                eof: false,
            }
        }
    }

    impl FrameFilter for ReframingFilter {
        fn push_frame(&mut self, frame: &ffmpeg::frame::Audio) -> Result<()> {
            self.buffered += frame.samples();
            Ok(())
        }

        fn push_eof(&mut self) -> Result<()> {
            self.eof = true;
            Ok(())
        }

        fn pull_frame(&mut self) -> Result<Pull<ffmpeg::frame::Audio>> {
            if self.buffered >= self.chunk {
                self.buffered -= self.chunk;
                return Ok(Pull::Ready(frame(self.chunk)));
            }
            if self.eof {
                if self.buffered > 0 {
                    let rest = std::mem::take(&mut self.buffered);
                    return Ok(Pull::Ready(frame(rest)));
                }
                return Ok(Pull::Eof);
            }
            Ok(Pull::Again)
        }
    }

    /// One packet per frame, holding back the last frame until EOF
    #[derive(Default)]
    struct DelayingEncoder {
        pts: Vec<i64>,
        held: Option<ffmpeg::Packet>,
        ready: VecDeque<ffmpeg::Packet>,
        eof: bool,
    }

    impl FrameEncoder for DelayingEncoder {
        fn send_frame(&mut self, frame: &ffmpeg::frame::Audio) -> Result<()> {
            let pts = frame.pts().unwrap_or(-1);
            self.pts.push(pts);
            let mut packet = ffmpeg::Packet::copy(&[1u8; 4]);
            packet.set_pts(Some(pts));
            if let Some(previous) = self.held.replace(packet) {
                self.ready.push_back(previous);
            }
            Ok(())
        }

        fn send_eof(&mut self) -> Result<()> {
            self.eof = true;
            if let Some(last) = self.held.take() {
                self.ready.push_back(last);
            }
            Ok(())
        }

        fn receive_packet(&mut self) -> Result<Pull<ffmpeg::Packet>> {
            match self.ready.pop_front() {
                Some(packet) => Ok(Pull::Ready(packet)),
                None if self.eof => Ok(Pull::Eof),
                None => Ok(Pull::Again),
            }
        }
    }

    #[derive(Default)]
    struct RecordingMuxer {
        events: Vec<String>,
        fail_on_write: Option<usize>,
        writes: usize,
    }

    impl PacketMuxer for RecordingMuxer {
        fn write_packet(&mut self, packet: ffmpeg::Packet) -> Result<()> {
            self.writes += 1;
            if self.fail_on_write == Some(self.writes) {
                return Err(FfmpegError::WritePacket("disk full".into()).into());
            }
            self.events.push(format!("packet {}", packet.pts().unwrap_or(-1)));
            Ok(())
        }

        fn write_trailer(&mut self) -> Result<()> {
            self.events.push("trailer".to_string());
            Ok(())
        }
    }

    #[test]
    fn test_clock_stamps_cumulative_pts() {
        let mut clock = PresentationClock::new();
        let mut a = frame(1152);
        let mut b = frame(100);
        assert_eq!(clock.stamp(&mut a), 0);
        assert_eq!(clock.stamp(&mut b), 1152);
        assert_eq!(a.pts(), Some(0));
        assert_eq!(b.pts(), Some(1152));
        assert_eq!(clock.samples(), 1252);
        clock.reset();
        assert_eq!(clock.samples(), 0);
    }

    #[test]
    fn test_clock_matches_emitted_samples() {
        let mut input = ScriptedInput::new(5, 2, 1000);
        input.tail_frames = 1;
        let mut filter = ReframingFilter::new(1152);
        let mut encoder = DelayingEncoder::default();
        let mut muxer = RecordingMuxer::default();

        let mut processor = StreamProcessor::new(&mut input, &mut filter, &mut encoder, &mut muxer);
        let stats = processor.run().unwrap();
        assert_eq!(processor.state(), StreamState::Done);
        assert_eq!(processor.clock().samples(), 11_000);

        assert_eq!(stats.packets_read, 5);
        assert_eq!(stats.frames_decoded, 11);
        assert_eq!(stats.samples_emitted, 11_000);
        // 9 full frames plus the 632 sample remainder from the flush
        assert_eq!(stats.frames_filtered, 10);
        assert_eq!(stats.packets_written, 10);
    }

    #[test]
    fn test_pts_are_cumulative_sample_counts() {
        let mut input = ScriptedInput::new(3, 1, 1000);
        let mut filter = ReframingFilter::new(400);
        let mut encoder = DelayingEncoder::default();
        let mut muxer = RecordingMuxer::default();

        StreamProcessor::new(&mut input, &mut filter, &mut encoder, &mut muxer)
            .run()
            .unwrap();

        assert_eq!(
            encoder.pts,
            vec![0, 400, 800, 1200, 1600, 2000, 2400, 2800]
        );
    }

    #[test]
    fn test_trailer_written_last_after_all_packets() {
        let mut input = ScriptedInput::new(2, 3, 500);
        let mut filter = ReframingFilter::new(500);
        let mut encoder = DelayingEncoder::default();
        let mut muxer = RecordingMuxer::default();

        StreamProcessor::new(&mut input, &mut filter, &mut encoder, &mut muxer)
            .run()
            .unwrap();

        assert_eq!(muxer.events.len(), 7);
        assert_eq!(muxer.events.last().map(String::as_str), Some("trailer"));
        // The held-back packet only arrives through the encoder flush
        assert_eq!(muxer.events[5], "packet 2500");
        assert!(input.eof_sent);
        assert!(filter.eof);
        assert!(encoder.eof);
    }

    #[test]
    fn test_filter_may_emit_nothing_until_flush() {
        let mut input = ScriptedInput::new(4, 1, 10);
        let mut filter = ReframingFilter::new(1_000_000);
        let mut encoder = DelayingEncoder::default();
        let mut muxer = RecordingMuxer::default();

        let stats = StreamProcessor::new(&mut input, &mut filter, &mut encoder, &mut muxer)
            .run()
            .unwrap();

        assert_eq!(stats.frames_decoded, 4);
        assert_eq!(stats.frames_filtered, 1);
        assert_eq!(stats.samples_emitted, 40);
        assert_eq!(muxer.events, vec!["packet 0", "trailer"]);
    }

    #[test]
    fn test_empty_input_still_writes_trailer() {
        let mut input = ScriptedInput::new(0, 1, 10);
        let mut filter = ReframingFilter::new(64);
        let mut encoder = DelayingEncoder::default();
        let mut muxer = RecordingMuxer::default();

        let stats = StreamProcessor::new(&mut input, &mut filter, &mut encoder, &mut muxer)
            .run()
            .unwrap();

        assert_eq!(stats, StreamStats::default());
        assert_eq!(muxer.events, vec!["trailer"]);
    }

    #[test]
    fn test_decoder_failure_is_failed_without_trailer() {
        let mut input = ScriptedInput::new(5, 1, 1000);
        input.fail_on_packet = Some(3);
        let mut filter = ReframingFilter::new(1000);
        let mut encoder = DelayingEncoder::default();
        let mut muxer = RecordingMuxer::default();

        let mut processor = StreamProcessor::new(&mut input, &mut filter, &mut encoder, &mut muxer);
        let err = processor.run().unwrap_err();
        assert_eq!(processor.state(), StreamState::Failed);
        assert_eq!(processor.stats().packets_read, 3);
        assert!(!err.is_fatal());
        assert!(!muxer.events.iter().any(|e| e == "trailer"));
    }

    #[test]
    fn test_write_failure_is_failed() {
        let mut input = ScriptedInput::new(5, 1, 1000);
        let mut filter = ReframingFilter::new(1000);
        let mut encoder = DelayingEncoder::default();
        let mut muxer = RecordingMuxer {
            fail_on_write: Some(2),
            ..Default::default()
        };

        let mut processor = StreamProcessor::new(&mut input, &mut filter, &mut encoder, &mut muxer);
        let err = processor.run().unwrap_err();
        assert_eq!(processor.state(), StreamState::Failed);
        assert!(matches!(
            err,
            ResampleError::Ffmpeg(FfmpegError::WritePacket(_))
        ));
        assert_eq!(muxer.events, vec!["packet 0"]);
    }
}
