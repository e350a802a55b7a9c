//! Safe wrappers around FFmpeg FFI calls.
//!
//! All `unsafe` field access lives here with explicit safety arguments.
//! Callers outside this module should never need to write `unsafe` for
//! routine FFmpeg access.

use std::ffi::CString;
use std::fmt;
use std::os::raw::c_void;

use ffmpeg_next as ffmpeg;
use ffmpeg_next::util::format::sample::{Sample, Type};

use crate::error::{FfmpegError, Result};

// ── Codec-context field accessors ───────────────────────────────────────────

/// Read `bits_per_raw_sample` from a codec context.
///
/// `ffmpeg-next` does not expose this field through a safe accessor.
pub fn context_bits_per_raw_sample(ctx: &ffmpeg::codec::Context) -> i32 {
    // SAFETY: `ctx.as_ptr()` returns a valid non-null pointer for the
    // lifetime of `ctx`. `bits_per_raw_sample` is a plain i32 field.
    unsafe { (*ctx.as_ptr()).bits_per_raw_sample }
}

/// Allocate a fresh `AVCodecParameters`, copy the opened encoder context into
/// it, and return it as a safe `ffmpeg::codec::Parameters`.
///
/// Used to describe the output stream to the muxer.
pub fn encoder_codec_parameters(
    encoder: &ffmpeg::encoder::Audio,
) -> Result<ffmpeg::codec::Parameters> {
    use std::ops::Deref;
    use std::rc::Rc;
    let ctx: &ffmpeg::codec::Context = encoder.deref();
    // SAFETY: `avcodec_parameters_alloc` returns a valid pointer or null
    // (null only under OOM). `avcodec_parameters_from_context` copies fields
    // from a valid, open encoder context. Once wrapped, the parameters are
    // freed on drop, including on the error path.
    unsafe {
        let params = ffmpeg::ffi::avcodec_parameters_alloc();
        if params.is_null() {
            return Err(
                FfmpegError::MuxerCreate("Could not allocate codec parameters".into()).into(),
            );
        }
        let ret = ffmpeg::ffi::avcodec_parameters_from_context(params, ctx.as_ptr());
        let params = ffmpeg::codec::Parameters::wrap(params, None::<Rc<dyn std::any::Any>>);
        if ret < 0 {
            return Err(FfmpegError::MuxerCreate(format!(
                "Could not copy encoder parameters: {}",
                ffmpeg::Error::from(ret)
            ))
            .into());
        }
        Ok(params)
    }
}

/// Zero out `codec_tag` on the `AVCodecParameters` attached to an output
/// stream, so the muxer picks the correct tag for the target container.
///
/// Must be called after `out_stream.set_parameters(...)` and before
/// `write_header`.
pub fn stream_reset_codec_tag(out_stream: &mut ffmpeg::format::stream::StreamMut) {
    // SAFETY: `codecpar` is set by `set_parameters` and is non-null. Writing 0
    // to `codec_tag` is always safe; it is a plain u32 field.
    unsafe {
        (*(*out_stream.as_mut_ptr()).codecpar).codec_tag = 0;
    }
}

// ── Filter-graph links ──────────────────────────────────────────────────────

/// Every sample format a negotiated link can carry
const SAMPLE_FORMATS: [Sample; 12] = [
    Sample::U8(Type::Packed),
    Sample::I16(Type::Packed),
    Sample::I32(Type::Packed),
    Sample::I64(Type::Packed),
    Sample::F32(Type::Packed),
    Sample::F64(Type::Packed),
    Sample::U8(Type::Planar),
    Sample::I16(Type::Planar),
    Sample::I32(Type::Planar),
    Sample::I64(Type::Planar),
    Sample::F32(Type::Planar),
    Sample::F64(Type::Planar),
];

/// Audio parameters negotiated on one filter link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkParams {
    /// `None` when the link carries a format not in [`SAMPLE_FORMATS`]
    pub format: Option<Sample>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Channel mask, for natively ordered layouts only
    pub layout_mask: Option<u64>,
}

impl fmt::Display for LinkParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "srate:{}Hz fmt:{} Channels num: {}",
            self.sample_rate,
            self.format.map(|s| s.name()).unwrap_or("none"),
            self.channels
        )
    }
}

fn sample_from_raw(raw: i32) -> Option<Sample> {
    SAMPLE_FORMATS
        .iter()
        .copied()
        .find(|sample| ffmpeg::ffi::AVSampleFormat::from(*sample) as i32 == raw)
}

/// # Safety
/// `link` must be null or point to a live `AVFilterLink`.
unsafe fn link_params(link: *const ffmpeg::ffi::AVFilterLink) -> Option<LinkParams> {
    if link.is_null() {
        return None;
    }
    let link = &*link;
    let layout_mask = if link.ch_layout.order == ffmpeg::ffi::AVChannelOrder::AV_CHANNEL_ORDER_NATIVE {
        Some(link.ch_layout.u.mask)
    } else {
        None
    };
    Some(LinkParams {
        format: sample_from_raw(link.format),
        sample_rate: link.sample_rate.max(0) as u32,
        channels: link.ch_layout.nb_channels.max(0) as u16,
        layout_mask,
    })
}

/// Parameters on the first output link of a filter (the source buffer's).
pub fn output_link(ctx: &ffmpeg::filter::Context<'_>) -> Option<LinkParams> {
    // SAFETY: `ctx.as_ptr()` is valid for the lifetime of `ctx`; `outputs`
    // holds `nb_outputs` link pointers owned by the graph.
    unsafe {
        let ctx = &*ctx.as_ptr();
        if ctx.nb_outputs == 0 || ctx.outputs.is_null() {
            return None;
        }
        link_params(*ctx.outputs)
    }
}

/// Parameters on the first input link of a filter (the sink buffer's).
pub fn input_link(ctx: &ffmpeg::filter::Context<'_>) -> Option<LinkParams> {
    // SAFETY: as for `output_link`, with `inputs`/`nb_inputs`.
    unsafe {
        let ctx = &*ctx.as_ptr();
        if ctx.nb_inputs == 0 || ctx.inputs.is_null() {
            return None;
        }
        link_params(*ctx.inputs)
    }
}

fn set_option(
    ctx: &mut ffmpeg::filter::Context<'_>,
    name: &str,
    value: &str,
) -> std::result::Result<(), ffmpeg::Error> {
    let name = CString::new(name).map_err(|_| ffmpeg::Error::InvalidData)?;
    let value = CString::new(value).map_err(|_| ffmpeg::Error::InvalidData)?;
    // SAFETY: both strings are NUL-terminated and outlive the call; the
    // context pointer is valid while `ctx` is borrowed.
    let ret = unsafe {
        ffmpeg::ffi::av_opt_set(
            ctx.as_mut_ptr() as *mut c_void,
            name.as_ptr(),
            value.as_ptr(),
            ffmpeg::ffi::AV_OPT_SEARCH_CHILDREN as i32,
        )
    };
    if ret < 0 {
        Err(ffmpeg::Error::from(ret))
    } else {
        Ok(())
    }
}

fn set_option_bin(
    ctx: &mut ffmpeg::filter::Context<'_>,
    name: &str,
    value: &[u8],
) -> std::result::Result<(), ffmpeg::Error> {
    let name = CString::new(name).map_err(|_| ffmpeg::Error::InvalidData)?;
    // SAFETY: `value` is valid for `value.len()` bytes for the whole call.
    let ret = unsafe {
        ffmpeg::ffi::av_opt_set_bin(
            ctx.as_mut_ptr() as *mut c_void,
            name.as_ptr(),
            value.as_ptr(),
            value.len() as i32,
            ffmpeg::ffi::AV_OPT_SEARCH_CHILDREN as i32,
        )
    };
    if ret < 0 {
        Err(ffmpeg::Error::from(ret))
    } else {
        Ok(())
    }
}

/// Restrict an `abuffersink` to one sample format, rate and channel layout.
///
/// Uses the list options of libavfilter 10.4+ and falls back to the older
/// binary ones when those are not there. Must be called before the graph is
/// configured. `layout` is anything `av_channel_layout_from_string` accepts.
pub fn constrain_sink(
    ctx: &mut ffmpeg::filter::Context<'_>,
    format: Sample,
    sample_rate: u32,
    layout: &str,
) -> std::result::Result<(), ffmpeg::Error> {
    match set_option(ctx, "sample_formats", format.name()) {
        Ok(()) => {
            set_option(ctx, "samplerates", &sample_rate.to_string())?;
            set_option(ctx, "channel_layouts", layout)
        }
        Err(ffmpeg::Error::OptionNotFound) => {
            let raw = ffmpeg::ffi::AVSampleFormat::from(format) as i32;
            set_option_bin(ctx, "sample_fmts", &raw.to_ne_bytes())?;
            set_option_bin(ctx, "sample_rates", &(sample_rate as i32).to_ne_bytes())?;
            set_option(ctx, "ch_layouts", layout)
        }
        Err(e) => Err(e),
    }
}

/// Human-readable `num/den` form used in filter arguments
pub fn rational_arg(value: ffmpeg::Rational) -> String {
    format!("{}/{}", value.numerator(), value.denominator())
}
