//! Output codec and sample format selection
//!
//! Maps an output extension and the source bit depth to a concrete encoder
//! and sample format. The tables are plain data; there is no fallback beyond
//! the defaults listed here.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use ffmpeg_next::codec::Id;
use ffmpeg_next::format::sample::Type;
use ffmpeg_next::format::Sample;

use crate::error::{ResampleError, Result};

/// Input container extensions picked up by the batch driver
pub const SUPPORTED_INPUT_EXTENSIONS: &[&str] = &["flac", "dsf", "dff", "wav", "aiff", "m4a", "mp3"];

/// Encoder bit rate for lossy output (mp3 only)
pub const OUTPUT_BIT_RATE: usize = 320_000;

/// Bit depth assumed for DSD sources
pub const DSD_BIT_DEPTH: u32 = 24;

/// Little-endian PCM codecs for wav, keyed by bit depth
const WAV_PCM: &[(u32, Id)] = &[
    (64, Id::PCM_S64LE),
    (32, Id::PCM_S32LE),
    (24, Id::PCM_S24LE),
    (16, Id::PCM_S16LE),
    (8, Id::PCM_S8),
];

/// Big-endian PCM codecs for aiff, keyed by bit depth
const AIFF_PCM: &[(u32, Id)] = &[
    (64, Id::PCM_S64BE),
    (32, Id::PCM_S32BE),
    (24, Id::PCM_S24BE),
    (16, Id::PCM_S16BE),
    (8, Id::PCM_S8),
];

/// Integer sample layout for flac/alac, keyed by bit depth
const INTEGER_DEPTHS: &[(u32, IntegerWidth)] = &[
    (64, IntegerWidth::I32),
    (32, IntegerWidth::I32),
    (24, IntegerWidth::I32),
    (16, IntegerWidth::I16),
];

/// DSD-family decoders report no useful bit depth
const DSD_CODECS: &[Id] = &[
    Id::DSD_LSBF,
    Id::DSD_MSBF,
    Id::DSD_LSBF_PLANAR,
    Id::DSD_MSBF_PLANAR,
    Id::DST,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntegerWidth {
    I16,
    I32,
}

/// Sample format the encoder should be opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleChoice {
    Fixed(Sample),
    /// First format the encoder advertises
    EncoderDefault,
}

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Flac,
    Wav,
    Aiff,
    /// Apple Lossless in an MPEG-4 audio container
    M4a,
    Mp3,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 5] = [
        OutputFormat::Flac,
        OutputFormat::Wav,
        OutputFormat::Aiff,
        OutputFormat::M4a,
        OutputFormat::Mp3,
    ];

    /// File extension, without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Flac => "flac",
            OutputFormat::Wav => "wav",
            OutputFormat::Aiff => "aiff",
            OutputFormat::M4a => "m4a",
            OutputFormat::Mp3 => "mp3",
        }
    }

    /// Encoder codec for a source of the given bit depth
    pub fn codec_id(&self, bits: u32) -> Id {
        match self {
            OutputFormat::Wav => lookup(WAV_PCM, bits).unwrap_or(Id::PCM_S16LE),
            OutputFormat::Aiff => lookup(AIFF_PCM, bits).unwrap_or(Id::PCM_S16BE),
            OutputFormat::Flac => Id::FLAC,
            OutputFormat::M4a => Id::ALAC,
            OutputFormat::Mp3 => Id::MP3,
        }
    }

    /// Encoder sample format for a source of the given bit depth
    pub fn sample_format(&self, bits: u32) -> SampleChoice {
        let layout = match self {
            OutputFormat::Flac => Type::Packed,
            OutputFormat::M4a => Type::Planar,
            _ => return SampleChoice::EncoderDefault,
        };
        match lookup(INTEGER_DEPTHS, bits) {
            Some(IntegerWidth::I32) => SampleChoice::Fixed(Sample::I32(layout)),
            Some(IntegerWidth::I16) => SampleChoice::Fixed(Sample::I16(layout)),
            None => SampleChoice::EncoderDefault,
        }
    }

    /// Fixed encoder bit rate, if this format uses one
    pub fn bit_rate(&self) -> Option<usize> {
        match self {
            OutputFormat::Mp3 => Some(OUTPUT_BIT_RATE),
            _ => None,
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ResampleError;

    fn from_str(s: &str) -> Result<Self> {
        let ext = s.trim().trim_start_matches('.');
        OutputFormat::ALL
            .iter()
            .copied()
            .find(|f| f.extension() == ext)
            .ok_or_else(|| ResampleError::UnsupportedExtension(s.to_string()))
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

fn lookup<T: Copy>(table: &[(u32, T)], bits: u32) -> Option<T> {
    table
        .iter()
        .find(|(depth, _)| *depth == bits)
        .map(|(_, value)| *value)
}

/// Whether the decoder belongs to the DSD family
pub fn is_dsd_codec(codec_id: Id) -> bool {
    DSD_CODECS.contains(&codec_id)
}

/// Effective source bit depth: the decoder's bits-per-raw-sample, or 24 for DSD
pub fn source_bit_depth(codec_id: Id, bits_per_raw_sample: i32) -> u32 {
    if is_dsd_codec(codec_id) {
        DSD_BIT_DEPTH
    } else {
        bits_per_raw_sample.max(0) as u32
    }
}

/// Whether a path has one of the supported input extensions
pub fn is_supported_input(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_INPUT_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}
