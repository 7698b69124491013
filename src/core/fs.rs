//! File-system helpers: reading outputs, test case IO and problem directories.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::config::ProblemSettings;
use crate::core::domain::{Limits, Overrides, Problem, SourceFile, TestCase, TestcaseIo};
use crate::core::temp::{TempFile, TempPool};

const READ_ATTEMPTS: usize = 3;
const READ_RETRY_DELAY: Duration = Duration::from_millis(50);

fn is_transient(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
    )
}

/// Reads a file as (lossy) UTF-8, retrying a few times on transient errors.
pub async fn read_text(path: &Path) -> std::io::Result<String> {
    let mut attempt = 1;
    loop {
        match tokio::fs::read(path).await {
            Ok(bytes) => return Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if is_transient(e.kind()) && attempt < READ_ATTEMPTS => {
                tracing::debug!("Retrying read of {}: {}", path.display(), e);
                attempt += 1;
                tokio::time::sleep(READ_RETRY_DELAY).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Like [`read_text`] but a missing file reads as empty.
pub async fn read_text_or_empty(path: &Path) -> std::io::Result<String> {
    match read_text(path).await {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        other => other,
    }
}

/// Gives test case data a path on disk. Inline data is written to a pooled
/// temp file which is returned alongside so it lives as long as the path is used.
pub async fn materialize(
    io: &TestcaseIo,
    pool: &Arc<TempPool>,
) -> std::io::Result<(PathBuf, Option<TempFile>)> {
    match io {
        TestcaseIo::File(path) => Ok((path.clone(), None)),
        TestcaseIo::Inline(data) => {
            tokio::fs::create_dir_all(pool.dir()).await?;
            let file = pool.acquire();
            tokio::fs::write(file.path(), data).await?;
            Ok((file.path().to_path_buf(), Some(file)))
        }
    }
}

pub async fn read_io(io: &TestcaseIo) -> std::io::Result<String> {
    match io {
        TestcaseIo::Inline(data) => Ok(data.clone()),
        TestcaseIo::File(path) => read_text(path).await,
    }
}

/// Small outputs are read into memory and their file goes back to the pool.
/// Larger ones are kept on disk.
pub async fn try_inline(file: TempFile, limit: u64) -> std::io::Result<TestcaseIo> {
    let len = match tokio::fs::metadata(file.path()).await {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == ErrorKind::NotFound => 0,
        Err(e) => return Err(e),
    };
    if len <= limit {
        let data = read_text_or_empty(file.path()).await?;
        Ok(TestcaseIo::Inline(data))
    } else {
        Ok(TestcaseIo::File(file.keep()))
    }
}

pub const PROBLEM_MANIFEST: &str = "problem.yaml";

#[derive(Debug, Error)]
pub enum ProblemLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid {path}: {source}")]
    Manifest {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Deserialize)]
struct ProblemManifest {
    name: Option<String>,
    source: PathBuf,
    checker: Option<PathBuf>,
    interactor: Option<PathBuf>,
    generator: Option<PathBuf>,
    brute_force: Option<PathBuf>,
    time_limit_ms: Option<u64>,
    memory_limit_mb: Option<u64>,
    #[serde(default)]
    overrides: Overrides,
}

/// Loads `problem.yaml` and the `*.in` / `*.ans` pairs next to it, ordered by name.
pub async fn load_problem_dir(
    dir: &Path,
    defaults: &ProblemSettings,
) -> Result<Problem, ProblemLoadError> {
    let manifest_path = dir.join(PROBLEM_MANIFEST);
    let raw = read_text(&manifest_path)
        .await
        .map_err(|source| ProblemLoadError::Io {
            path: manifest_path.clone(),
            source,
        })?;
    let manifest: ProblemManifest =
        serde_yaml::from_str(&raw).map_err(|source| ProblemLoadError::Manifest {
            path: manifest_path.clone(),
            source,
        })?;

    let resolve = |path: PathBuf| SourceFile::new(dir.join(path));
    let name = manifest.name.unwrap_or_else(|| {
        dir.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    let limits = Limits {
        time_limit_ms: manifest
            .time_limit_ms
            .unwrap_or(defaults.default_time_limit_ms),
        memory_limit_mb: Some(
            manifest
                .memory_limit_mb
                .unwrap_or(defaults.default_memory_limit_mb),
        ),
    };

    let mut problem = Problem::new(name, resolve(manifest.source), limits);
    problem.checker = manifest.checker.map(resolve);
    problem.interactor = manifest.interactor.map(resolve);
    problem.generator = manifest.generator.map(resolve);
    problem.brute_force = manifest.brute_force.map(resolve);
    problem.overrides = manifest.overrides;
    problem.testcases = load_testcases(dir).await?;
    Ok(problem)
}

async fn load_testcases(dir: &Path) -> Result<Vec<TestCase>, ProblemLoadError> {
    let io_err = |source| ProblemLoadError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut inputs = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "in") {
            inputs.push(path);
        }
    }
    inputs.sort();

    Ok(inputs
        .into_iter()
        .map(|input| {
            let answer = input.with_extension("ans");
            let name = input
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            let answer = if answer.exists() {
                TestcaseIo::File(answer)
            } else {
                TestcaseIo::Inline(String::new())
            };
            TestCase::new(name, TestcaseIo::File(input), answer)
        })
        .collect())
}
