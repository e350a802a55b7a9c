//! End-to-end tests
//!
//! Real conversions through FFmpeg on generated WAV fixtures:
//! - Naming, codec and rate of converted files
//! - Idempotent re-runs
//! - Maximum-mode rate resolution per file
//! - Gain stage
//! - Sample format changes (packed to planar, 24-bit sources)
//! - Failure handling and partial output cleanup
