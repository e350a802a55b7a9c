//! FFmpeg module - provides wrappers and utilities for FFmpeg library access
//!
//! This module handles:
//! - FFmpeg initialization
//! - Routing FFmpeg's log output into `tracing`
//! - Classifying receive-style results into ready / would-block / end-of-stream

pub mod helpers;

pub use ffmpeg_next as ffmpeg;

/// Initialize FFmpeg library
///
/// This should be called once at application startup.
/// Returns an error if FFmpeg fails to initialize.
pub fn init() -> Result<(), crate::error::FfmpegError> {
    ffmpeg::init().map_err(|e| {
        crate::error::FfmpegError::InitFailed(format!("ffmpeg::init() failed: {}", e))
    })?;

    tracing::debug!("FFmpeg initialized");

    Ok(())
}

/// Install a custom FFmpeg log callback that forwards messages to `tracing`.
///
/// Must be called after `init()` and before any FFmpeg work begins, because
/// the log callback is global state.
pub fn install_log_bridge() {
    // SAFETY: both functions modify global FFmpeg state and are safe to call
    // after `ffmpeg::init()`. They are called once, on the main thread.
    unsafe {
        ffmpeg_next::ffi::av_log_set_level(ffmpeg_next::ffi::AV_LOG_WARNING as i32);
        ffmpeg_next::ffi::av_log_set_callback(Some(ffmpeg_log_callback));
    }
}

unsafe extern "C" fn ffmpeg_log_callback(
    avcl: *mut std::ffi::c_void,
    level: std::ffi::c_int,
    fmt: *const std::ffi::c_char,
    vl: ffmpeg_next::ffi::va_list,
) {
    use std::ffi::CStr;

    if level > unsafe { ffmpeg_next::ffi::av_log_get_level() } {
        return;
    }

    let mut buf = [0 as std::ffi::c_char; 1024];
    let mut print_prefix: std::ffi::c_int = 1;
    ffmpeg_next::ffi::av_log_format_line(
        avcl,
        level,
        fmt,
        vl,
        buf.as_mut_ptr(),
        buf.len() as std::ffi::c_int,
        &mut print_prefix,
    );

    let msg = CStr::from_ptr(buf.as_ptr()).to_string_lossy();
    let msg = msg.trim_end();
    if msg.is_empty() {
        return;
    }

    if level <= ffmpeg_next::ffi::AV_LOG_ERROR as std::ffi::c_int {
        tracing::error!(target: "ffmpeg", "{}", msg);
    } else if level <= ffmpeg_next::ffi::AV_LOG_WARNING as std::ffi::c_int {
        tracing::warn!(target: "ffmpeg", "{}", msg);
    } else {
        tracing::debug!(target: "ffmpeg", "{}", msg);
    }
}

/// Linked libavcodec version, `major.minor.micro`
pub fn version_info() -> String {
    let v = ffmpeg::codec::version();
    format!("libavcodec {}.{}.{}", v >> 16, (v >> 8) & 0xff, v & 0xff)
}

/// Outcome of a receive/pull call on a decoder, filter sink or encoder.
///
/// `Again` (would-block) and `Eof` are sentinels that end a drain loop; they
/// are never errors.
#[derive(Debug, PartialEq, Eq)]
pub enum Pull<T> {
    Ready(T),
    Again,
    Eof,
}

impl<T> Pull<T> {
    /// Classify the status of a call that filled `value` on success.
    pub fn from_status(
        status: Result<(), ffmpeg::Error>,
        value: T,
    ) -> Result<Pull<T>, ffmpeg::Error> {
        match status {
            Ok(()) => Ok(Pull::Ready(value)),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                Ok(Pull::Again)
            }
            Err(ffmpeg::Error::Eof) => Ok(Pull::Eof),
            Err(e) => Err(e),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Pull::Ready(_))
    }
}
