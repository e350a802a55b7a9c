use thiserror::Error;

/// Main error type for the batch resampler
#[derive(Error, Debug)]
pub enum ResampleError {
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] FfmpegError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(String),

    #[error("Unsupported output extension: {0}")]
    UnsupportedExtension(String),

    #[error("Invalid volume adjustment: {0}")]
    InvalidVolume(String),

    #[error("Unsupported source sample rate for maximum mode: {0} Hz")]
    UnsupportedSourceRate(u32),

    #[error("No audio stream found in source file")]
    NoAudioStream,

    #[error("Directory walk error: {0}")]
    Walk(String),

    #[error("Report error: {0}")]
    Report(String),
}

impl ResampleError {
    /// Configuration errors abort the whole run before any file is touched.
    /// Everything else is scoped to a single file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ResampleError::Config(_)
                | ResampleError::InvalidSampleRate(_)
                | ResampleError::UnsupportedExtension(_)
                | ResampleError::InvalidVolume(_)
        )
    }
}

/// FFmpeg-specific errors
#[derive(Error, Debug)]
pub enum FfmpegError {
    #[error("FFmpeg initialization failed: {0}")]
    InitFailed(String),

    #[error("Failed to open input file: {0}")]
    OpenInput(String),

    #[error("Failed to create decoder: {0}")]
    DecoderCreate(String),

    #[error("Failed to find encoder: codec_id={0}")]
    EncoderNotFound(String),

    #[error("Failed to create encoder: {0}")]
    EncoderCreate(String),

    #[error("Filter graph error: {0}")]
    FilterGraph(String),

    #[error("Failed to create muxer: {0}")]
    MuxerCreate(String),

    #[error("Failed to write header: {0}")]
    WriteHeader(String),

    #[error("Failed to write packet: {0}")]
    WritePacket(String),

    #[error("Failed to write trailer: {0}")]
    WriteTrailer(String),

    #[error("Failed to decode packet: {0}")]
    DecodePacket(String),

    #[error("Failed to encode frame: {0}")]
    EncodeFrame(String),

    #[error("Failed to read packet: {0}")]
    ReadPacket(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ResampleError>;
