//! batch-resampler command-line entry point

use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use batch_resampler::batch::{run_batch, BatchJob};
use batch_resampler::cli::Args;
use batch_resampler::config::{LogFormat, LoggingConfig};
use batch_resampler::error::ResampleError;
use batch_resampler::ffmpeg;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "batch-resampler";

/// Exit status for bad arguments or configuration
const EXIT_CONFIG: u8 = 2;

fn main() -> ExitCode {
    let args = Args::parse();

    // Everything the user typed is checked before any file is touched
    let request = match args.request() {
        Ok(request) => request,
        Err(e) => return usage_error(&e),
    };
    let config = match args.load_config() {
        Ok(config) => config,
        Err(e) => return usage_error(&e),
    };

    init_logging(&config.logging);
    tracing::info!("{} v{} starting", APP_NAME, VERSION);

    if let Err(e) = ffmpeg::init() {
        tracing::error!("{}", e);
        return ExitCode::FAILURE;
    }
    ffmpeg::install_log_bridge();
    tracing::info!("FFmpeg version: {}", ffmpeg::version_info());

    let job = BatchJob {
        input_root: config.input_root.clone(),
        output_root: config.output_root.clone(),
        request,
    };
    let summary = match run_batch(&job) {
        Ok(summary) => summary,
        Err(e) if e.is_fatal() => {
            tracing::error!("{}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
        Err(e) => {
            tracing::error!("Batch aborted: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(report) = &config.report {
        match summary.write_report(report) {
            Ok(()) => tracing::info!("Report written to {}", report.display()),
            Err(e) => tracing::error!("{}", e),
        }
    }

    if summary.has_failures() {
        tracing::warn!("{} file(s) failed", summary.failed.len());
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn usage_error(e: &ResampleError) -> ExitCode {
    eprintln!("error: {}", e);
    eprintln!();
    let _ = Args::command().print_long_help();
    ExitCode::from(EXIT_CONFIG)
}

fn init_logging(config: &LoggingConfig) {
    let default_filter = format!(
        "batch_resampler={level},ffmpeg={level}",
        level = config.level
    );
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
