use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Error};
use flate2::read::GzDecoder;
use globset::Glob;
use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::metrics_consts::FILES_PROCESSED;
use crate::stats::RunSummary;

/// Regular files in `dir` whose name matches `pattern`, sorted by name.
pub async fn discover_files(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, Error> {
    let matcher = Glob::new(pattern)
        .with_context(|| format!("invalid file pattern {pattern:?}"))?
        .compile_matcher();

    let mut files = vec![];
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to list {}", dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if matcher.is_match(entry.file_name()) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Lazily decompressed lines of a gzip file. Invalid UTF-8 is replaced rather than rejected, so
/// only I/O and gzip stream errors surface as `Err` items.
pub fn open_gzip_lines(
    path: &Path,
) -> Result<impl Iterator<Item = io::Result<String>> + Send + 'static, PipelineError> {
    let file = File::open(path).map_err(|source| PipelineError::SourceOpen {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(GzDecoder::new(file));
    Ok(reader.split(b'\n').map(|line| {
        line.map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }))
}

/// Hide `path` by prefixing its file name with a dot. Returns the new path.
pub async fn dot_rename(path: &Path) -> io::Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let mut hidden = std::ffi::OsString::from(".");
    hidden.push(name);
    let target = path.with_file_name(hidden);
    tokio::fs::rename(path, &target).await?;
    Ok(target)
}

/// Report a fully drained run and mark its file as consumed, unless in test mode.
///
/// Returns whether the load is acceptable, meaning its error rate stayed below `normal_err_rate`.
/// The file is marked either way: its rows were all attempted, and loading it again would only
/// rewrite the keys that already made it.
pub async fn finalize(
    path: &Path,
    summary: &RunSummary,
    normal_err_rate: f64,
    test_mode: bool,
) -> bool {
    info!(
        "processed {} rows, {} errors: {}",
        summary.processed,
        summary.errors,
        path.display()
    );

    let err_rate = summary.error_rate();
    let acceptable = err_rate < normal_err_rate;
    if acceptable {
        info!(err_rate, "acceptable error rate, successful load");
    } else {
        error!(err_rate, normal_err_rate, "high error rate, failed load");
    }
    let outcome = if acceptable { "success" } else { "failure" };
    metrics::counter!(FILES_PROCESSED, "outcome" => outcome).increment(1);

    if !test_mode {
        if let Err(e) = dot_rename(path).await {
            warn!("failed to mark {} as processed: {}", path.display(), e);
        }
    }
    acceptable
}
