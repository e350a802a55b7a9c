//! Output container writer
//!
//! One audio stream per file. The container format is guessed from the output
//! file extension.

use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;

use super::encoder::AudioEncoder;
use super::PacketMuxer;
use crate::error::{FfmpegError, Result};
use crate::ffmpeg::helpers;

/// A file-backed output container with a single audio stream
pub struct OutputContainer {
    output: ffmpeg::format::context::Output,
    path: PathBuf,
    encoder_time_base: ffmpeg::Rational,
    stream_time_base: ffmpeg::Rational,
    stream_added: bool,
    header_written: bool,
}

impl OutputContainer {
    /// Create the output file and guess its container from the extension.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let output = ffmpeg::format::output(&path).map_err(|e| {
            FfmpegError::MuxerCreate(format!("Could not create output context for {:?}: {}", path, e))
        })?;

        Ok(Self {
            output,
            path: path.to_path_buf(),
            encoder_time_base: ffmpeg::Rational::new(0, 1),
            stream_time_base: ffmpeg::Rational::new(0, 1),
            stream_added: false,
            header_written: false,
        })
    }

    /// Whether the container wants codec extradata in its global header
    pub fn requires_global_header(&self) -> bool {
        self.output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER)
    }

    /// Add the single output stream, described by the opened encoder.
    pub fn add_stream(&mut self, encoder: &AudioEncoder) -> Result<()> {
        if self.stream_added {
            return Err(FfmpegError::MuxerCreate("output stream already added".into()).into());
        }

        let parameters = encoder.codec_parameters()?;
        let mut out_stream = self
            .output
            .add_stream(ffmpeg::encoder::find(encoder.codec_id()))
            .map_err(|e| {
                FfmpegError::MuxerCreate(format!("Failed allocating output stream: {}", e))
            })?;

        out_stream.set_time_base(encoder.time_base());
        out_stream.set_parameters(parameters);
        // Let the muxer pick the tag for the target container
        helpers::stream_reset_codec_tag(&mut out_stream);

        self.encoder_time_base = encoder.time_base();
        self.stream_added = true;

        tracing::debug!(
            path = %self.path.display(),
            codec = ?encoder.codec_id(),
            "Added output audio stream"
        );
        Ok(())
    }

    /// Write the container header. The muxer may change the stream time
    /// base here, so it is read back afterwards.
    pub fn write_header(&mut self) -> Result<()> {
        self.output.write_header().map_err(|e| {
            FfmpegError::WriteHeader(format!(
                "Error occurred when opening output file {:?}: {}",
                self.path, e
            ))
        })?;
        self.stream_time_base = self
            .output
            .stream(0)
            .map(|stream| stream.time_base())
            .unwrap_or(self.encoder_time_base);
        self.header_written = true;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stream_time_base(&self) -> ffmpeg::Rational {
        self.stream_time_base
    }
}

impl PacketMuxer for OutputContainer {
    fn write_packet(&mut self, mut packet: ffmpeg::Packet) -> Result<()> {
        if !self.header_written {
            return Err(FfmpegError::WritePacket("header not written".into()).into());
        }
        packet.set_stream(0);
        packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
        packet
            .write_interleaved(&mut self.output)
            .map_err(|e| FfmpegError::WritePacket(format!("{:?}: {}", self.path, e)).into())
    }

    fn write_trailer(&mut self) -> Result<()> {
        self.output
            .write_trailer()
            .map_err(|e| FfmpegError::WriteTrailer(format!("{:?}: {}", self.path, e)).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::OutputFormat;
    use crate::transcode::decoder::SourceParams;
    use crate::transcode::encoder::EncodeTarget;
    use ffmpeg_next::util::channel_layout::ChannelLayout;
    use ffmpeg_next::util::format::sample::{Sample, Type};

    fn stereo_source() -> SourceParams {
        SourceParams {
            codec_id: ffmpeg::codec::Id::PCM_S16LE,
            bit_depth: 16,
            sample_rate: 44100,
            sample_format: Sample::I16(Type::Packed),
            channel_layout: ChannelLayout::STEREO,
            channels: 2,
            time_base: ffmpeg::Rational::new(1, 44100),
        }
    }

    #[test]
    fn test_create_unknown_extension_fails() {
        crate::ffmpeg::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let result = OutputContainer::create(dir.path().join("track.notaformat"));
        assert!(result.is_err());
    }

    #[test]
    fn test_wav_header_and_trailer() {
        crate::ffmpeg::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track_ff44k.wav");

        let target = EncodeTarget::derive(&stereo_source(), OutputFormat::Wav, 44100);
        let mut container = OutputContainer::create(&path).unwrap();
        assert!(!container.requires_global_header());
        let encoder = AudioEncoder::open(&target, false).unwrap();
        container.add_stream(&encoder).unwrap();
        assert!(container.add_stream(&encoder).is_err());

        container.write_header().unwrap();
        container.write_trailer().unwrap();
        drop(container);

        // RIFF header with no data
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.len() >= 44);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
    }

    #[test]
    fn test_packet_before_header_rejected() {
        crate::ffmpeg::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut container = OutputContainer::create(dir.path().join("x.wav")).unwrap();
        let err = container.write_packet(ffmpeg::Packet::empty()).unwrap_err();
        assert!(!err.is_fatal());
    }
}
