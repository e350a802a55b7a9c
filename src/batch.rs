//! Batch driver
//!
//! Walks the input tree, mirrors its directories under the output root and
//! converts every supported file in order. A failing file is recorded and the
//! batch moves on.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use walkdir::WalkDir;

use crate::error::{ResampleError, Result};
use crate::format::is_supported_input;
use crate::transcode::{convert_file, ConversionRequest, FileOutcome, StreamStats};

/// One batch run: where to read, where to write, what to produce
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    pub request: ConversionRequest,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvertedFile {
    pub input: PathBuf,
    pub output: PathBuf,
    pub stats: StreamStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub error: String,
}

/// Result of a batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub converted: Vec<ConvertedFile>,
    pub skipped: Vec<SkippedFile>,
    pub failed: Vec<FailedFile>,
}

impl BatchSummary {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            converted: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Set once any file or directory failed. Decides the exit status.
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Write the summary as pretty JSON.
    pub fn write_report<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ResampleError::Report(format!("Failed to serialize report: {}", e)))?;
        fs::write(path.as_ref(), json).map_err(|e| {
            ResampleError::Report(format!("Failed to write {:?}: {}", path.as_ref(), e))
        })?;
        Ok(())
    }
}

fn is_excluded(path: &Path, exclude: Option<&Path>) -> bool {
    exclude.map(|ex| path.starts_with(ex)).unwrap_or(false)
}

/// Supported files under `root`, sorted, skipping everything below `exclude`.
pub fn discover_inputs(root: &Path, exclude: Option<&Path>) -> Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_excluded(e.path(), exclude))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(ResampleError::Walk(format!("{:?}: {}", root, e)));
            }
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if entry.file_type().is_file() && is_supported_input(entry.path()) {
            inputs.push(entry.into_path());
        }
    }
    Ok(inputs)
}

/// Recreate the directory tree of `root` under `output_root`. Existing
/// directories are fine; anything that cannot be created is returned.
pub fn mirror_directories(
    root: &Path,
    output_root: &Path,
    exclude: Option<&Path>,
) -> Vec<FailedFile> {
    let mut failed = Vec::new();
    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_excluded(e.path(), exclude))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
    {
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let target = output_root.join(relative);
        if let Err(e) = fs::create_dir_all(&target) {
            tracing::warn!("Could not create {}: {}", target.display(), e);
            failed.push(FailedFile {
                path: target,
                error: e.to_string(),
            });
        }
    }
    failed
}

/// Output directory mirroring the directory `input` lives in
pub fn output_dir_for(input_root: &Path, output_root: &Path, input: &Path) -> PathBuf {
    let parent = input.parent().unwrap_or(input_root);
    match parent.strip_prefix(input_root) {
        Ok(relative) => output_root.join(relative),
        Err(_) => output_root.to_path_buf(),
    }
}

/// Run the whole batch. Only configuration-class errors are returned;
/// per-file problems end up in the summary.
pub fn run_batch(job: &BatchJob) -> Result<BatchSummary> {
    let mut summary = BatchSummary::new();

    let input_root = job
        .input_root
        .canonicalize()
        .map_err(|e| ResampleError::Config(format!("input directory {:?}: {}", job.input_root, e)))?;

    if let Err(e) = fs::create_dir_all(&job.output_root) {
        tracing::warn!("Could not create {}: {}", job.output_root.display(), e);
        summary.failed.push(FailedFile {
            path: job.output_root.clone(),
            error: e.to_string(),
        });
    }
    let output_root = job
        .output_root
        .canonicalize()
        .unwrap_or_else(|_| job.output_root.clone());
    let exclude = output_root
        .starts_with(&input_root)
        .then_some(output_root.as_path());

    tracing::info!(
        input = %input_root.display(),
        output = %output_root.display(),
        rate = %job.request.rate,
        format = %job.request.format,
        "Starting batch"
    );

    summary
        .failed
        .extend(mirror_directories(&input_root, &output_root, exclude));

    let inputs = discover_inputs(&input_root, exclude)?;
    tracing::info!("Found {} candidate files", inputs.len());

    for input in inputs {
        let output_dir = output_dir_for(&input_root, &output_root, &input);
        match convert_file(&input, &output_dir, &job.request) {
            Ok(FileOutcome::Converted { output, stats }) => {
                summary.converted.push(ConvertedFile {
                    input,
                    output,
                    stats,
                });
            }
            Ok(FileOutcome::Skipped { output, reason }) => {
                summary.skipped.push(SkippedFile {
                    input,
                    output,
                    reason: reason.to_string(),
                });
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::error!("Failed to convert {}: {}", input.display(), e);
                summary.failed.push(FailedFile {
                    path: input,
                    error: e.to_string(),
                });
            }
        }
    }

    summary.finished_at = Utc::now();
    tracing::info!(
        converted = summary.converted.len(),
        skipped = summary.skipped.len(),
        failed = summary.failed.len(),
        "Batch finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::OutputFormat;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"not really audio").unwrap();
    }

    fn request() -> ConversionRequest {
        ConversionRequest {
            rate: "44100".parse().unwrap(),
            format: OutputFormat::Wav,
            volume: None,
        }
    }

    #[test]
    fn test_discover_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("b.flac"));
        touch(&root.join("a.wav"));
        touch(&root.join("notes.txt"));
        touch(&root.join("cover.jpg"));
        touch(&root.join("disc2/c.dsf"));
        touch(&root.join("disc2/UPPER.FLAC"));

        let found = discover_inputs(root, None).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a.wav"),
                PathBuf::from("b.flac"),
                PathBuf::from("disc2/c.dsf"),
            ]
        );
    }

    #[test]
    fn test_discover_excludes_nested_output() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("a.flac"));
        touch(&root.join("out/a_ff44k.wav"));

        let exclude = root.join("out");
        let found = discover_inputs(root, Some(&exclude)).unwrap();
        assert_eq!(found, vec![root.join("a.flac")]);
    }

    #[test]
    fn test_discover_missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_inputs(&dir.path().join("nope"), None).is_err());
    }

    #[test]
    fn test_mirror_directories_is_idempotent() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("artist/album/cd1")).unwrap();
        fs::create_dir_all(src.path().join("other")).unwrap();

        assert!(mirror_directories(src.path(), dst.path(), None).is_empty());
        assert!(mirror_directories(src.path(), dst.path(), None).is_empty());
        assert!(dst.path().join("artist/album/cd1").is_dir());
        assert!(dst.path().join("other").is_dir());
    }

    #[test]
    fn test_mirror_records_failures() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("album")).unwrap();
        // A plain file where a directory should go
        fs::write(dst.path().join("album"), b"").unwrap();

        let failed = mirror_directories(src.path(), dst.path(), None);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].path, dst.path().join("album"));
    }

    #[test]
    fn test_output_dir_for() {
        let out = output_dir_for(
            Path::new("/music"),
            Path::new("/converted"),
            Path::new("/music/artist/album/01.flac"),
        );
        assert_eq!(out, PathBuf::from("/converted/artist/album"));
        let top = output_dir_for(Path::new("/music"), Path::new("/c"), Path::new("/music/x.wav"));
        assert_eq!(top, PathBuf::from("/c"));
    }

    #[test]
    fn test_run_batch_records_bad_file_and_continues() {
        crate::ffmpeg::init().unwrap();
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        touch(&src.path().join("broken.flac"));
        touch(&src.path().join("sub/also-broken.wav"));

        let job = BatchJob {
            input_root: src.path().to_path_buf(),
            output_root: dst.path().to_path_buf(),
            request: request(),
        };
        let summary = run_batch(&job).unwrap();
        assert!(summary.has_failures());
        assert_eq!(summary.failed.len(), 2);
        assert!(summary.converted.is_empty());
        assert!(dst.path().join("sub").is_dir());
        assert_eq!(fs::read_dir(dst.path().join("sub")).unwrap().count(), 0);
    }

    #[test]
    fn test_run_batch_missing_input_root_is_fatal() {
        let dst = tempfile::tempdir().unwrap();
        let job = BatchJob {
            input_root: dst.path().join("does-not-exist"),
            output_root: dst.path().to_path_buf(),
            request: request(),
        };
        assert!(run_batch(&job).unwrap_err().is_fatal());
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut summary = BatchSummary::new();
        summary.failed.push(FailedFile {
            path: PathBuf::from("x.flac"),
            error: "boom".into(),
        });
        let path = dir.path().join("report.json");
        summary.write_report(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["failed"][0]["error"], "boom");
        assert_eq!(value["converted"].as_array().unwrap().len(), 0);
        assert!(value["started_at"].is_string());
    }
}
