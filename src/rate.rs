//! Target sample rate resolution
//!
//! A rate request is either a literal output rate (`"48000"`) or a maximum
//! (`"96000m"`). In maximum mode a source above the cap is downsampled to the
//! largest multiple of its own rate family (44.1 kHz or 48 kHz) that fits
//! under the cap; a source at or below the cap is never upsampled.

use std::fmt;
use std::str::FromStr;

use crate::error::{ResampleError, Result};

/// Lowest rate reachable in maximum mode
pub const MIN_SAMPLE_RATE: u32 = 44100;

/// Rate families a maximum cap and a source rate may belong to
pub const RATE_FAMILIES: [u32; 2] = [44100, 48000];

/// The user's sample rate request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateRequest {
    /// Convert every file to exactly this rate
    Literal(u32),
    /// Downsample anything above this cap, leave the rest alone
    Maximum(u32),
}

impl RateRequest {
    /// Resolve the output rate for a source with the given native rate.
    ///
    /// Returns [`ResampleError::UnsupportedSourceRate`] in maximum mode when
    /// the source belongs to neither rate family; the caller skips that file.
    pub fn resolve(&self, source_rate: u32) -> Result<u32> {
        let cap = match *self {
            RateRequest::Literal(rate) => return Ok(rate),
            RateRequest::Maximum(cap) => cap,
        };

        let factor =
            lowest_factor(source_rate).ok_or(ResampleError::UnsupportedSourceRate(source_rate))?;
        validate_cap(cap)?;

        if source_rate <= cap {
            tracing::info!(
                source_rate,
                cap,
                "Input sample rate <= output rate. Will not be upsampled."
            );
            Ok(source_rate)
        } else if cap == MIN_SAMPLE_RATE {
            tracing::info!(
                source_rate,
                "No even multiple available below minimum rate of {}, so downsampling to {}.",
                MIN_SAMPLE_RATE,
                MIN_SAMPLE_RATE
            );
            Ok(cap)
        } else {
            tracing::info!(source_rate, cap, "Downsampling to even multiple of {}", factor);
            Ok((cap / factor) * factor)
        }
    }

    /// Whether this is a maximum-mode request
    pub fn is_maximum(&self) -> bool {
        matches!(self, RateRequest::Maximum(_))
    }
}

impl FromStr for RateRequest {
    type Err = ResampleError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let (digits, maximum) = match trimmed.strip_suffix('m') {
            Some(rest) => (rest, true),
            None => (trimmed, false),
        };

        let rate: u32 = digits
            .parse()
            .map_err(|_| ResampleError::InvalidSampleRate(s.to_string()))?;
        // FFmpeg carries rates as C ints
        if rate == 0 || rate > i32::MAX as u32 {
            return Err(ResampleError::InvalidSampleRate(s.to_string()));
        }

        if maximum {
            validate_cap(rate)?;
            Ok(RateRequest::Maximum(rate))
        } else {
            Ok(RateRequest::Literal(rate))
        }
    }
}

impl fmt::Display for RateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateRequest::Literal(rate) => write!(f, "{}", rate),
            RateRequest::Maximum(cap) => write!(f, "{}m", cap),
        }
    }
}

/// The rate family of a source: 44100 if it is a nonzero multiple of 44100,
/// else 48000 if it is a nonzero multiple of 48000.
pub fn lowest_factor(source_rate: u32) -> Option<u32> {
    if source_rate == 0 {
        return None;
    }
    RATE_FAMILIES
        .iter()
        .copied()
        .find(|factor| source_rate % factor == 0)
}

/// Only even multiples of 44100 and 48000 may be used as maximum caps.
fn validate_cap(cap: u32) -> Result<()> {
    if cap == 0 || RATE_FAMILIES.iter().all(|factor| cap % factor != 0) {
        return Err(ResampleError::InvalidSampleRate(format!(
            "{}m: only even multiples of 44100 and 48000 are allowed as maximum output sample rates",
            cap
        )));
    }
    Ok(())
}

/// Filename suffix encoding the output rate in whole kHz (`44100` → `_ff44k`)
pub fn rate_suffix(rate: u32) -> String {
    format!("_ff{}k", rate / 1000)
}
