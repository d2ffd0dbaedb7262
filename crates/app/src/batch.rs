use billscan_ocr::{is_supported, short_digest};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use crate::pipeline::{BillPipeline, FileResult};

/// Directory-level problems. These abort the run; per-file problems never do.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Input directory not found: {0}")]
    MissingDirectory(PathBuf),
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("Failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Supported bill files directly inside `dir`, sorted by file name.
pub fn discover_inputs(dir: &Path) -> Result<Vec<PathBuf>, BatchError> {
    if !dir.exists() {
        return Err(BatchError::MissingDirectory(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(BatchError::NotADirectory(dir.to_path_buf()));
    }

    let mut inputs = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|source| BatchError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() && is_supported(entry.path()) {
            inputs.push(entry.into_path());
        }
    }
    Ok(inputs)
}

/// Length of the path digest appended to colliding stems.
const STEM_SUFFIX_LEN: usize = 8;

/// One output stem per input, in the same order. Stems are the base file
/// name without extension; inputs whose stems collide (case-insensitively)
/// get a digest of their full path appended.
pub fn assign_output_stems(inputs: &[PathBuf]) -> Vec<String> {
    let base: Vec<String> = inputs
        .iter()
        .map(|p| {
            p.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "input".to_string())
        })
        .collect();

    let mut counts: HashMap<String, usize> = HashMap::new();
    for stem in &base {
        *counts.entry(stem.to_lowercase()).or_default() += 1;
    }

    let mut taken = HashSet::new();
    inputs
        .iter()
        .zip(base)
        .map(|(path, stem)| {
            let mut candidate = if counts[&stem.to_lowercase()] > 1 {
                let digest = short_digest(path.to_string_lossy().as_bytes(), STEM_SUFFIX_LEN);
                format!("{stem}-{digest}")
            } else {
                stem
            };
            // A real file may already carry the suffixed name.
            let mut n = 2;
            while !taken.insert(candidate.to_lowercase()) {
                candidate = format!("{candidate}-{n}");
                n += 1;
            }
            candidate
        })
        .collect()
}

/// Run every input through `pipeline`, at most `workers` at a time.
/// Results come back in input order, one per input.
pub async fn run_batch(pipeline: &BillPipeline, inputs: &[PathBuf], workers: usize) -> Vec<FileResult> {
    run_batch_with(pipeline, inputs, workers, |_| {}).await
}

/// Like [`run_batch`], handing each result to `on_result` as soon as it is
/// ready (still in input order) so records can be persisted mid-run.
pub async fn run_batch_with<F>(
    pipeline: &BillPipeline,
    inputs: &[PathBuf],
    workers: usize,
    mut on_result: F,
) -> Vec<FileResult>
where
    F: FnMut(&mut FileResult),
{
    let stems = assign_output_stems(inputs);
    let mut pending = std::pin::pin!(stream::iter(inputs.iter().zip(stems.iter()))
        .map(|(path, stem)| pipeline.process_file(path, stem))
        .buffered(workers.max(1)));

    let mut results = Vec::with_capacity(inputs.len());
    while let Some(mut result) = pending.next().await {
        on_result(&mut result);
        results.push(result);
    }
    results
}
