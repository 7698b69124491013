use std::path::{Path, PathBuf};

use tokio::sync::OnceCell;

use crate::{constants::RUNNER_BINARY_NAME, core::execution::ExecutionError};

/// Locates the `cph-runner` supervisor once. Concurrent first callers share
/// the same lookup.
#[derive(Debug, Default)]
pub struct RunnerProvider {
    configured: Option<PathBuf>,
    resolved: OnceCell<PathBuf>,
}

impl RunnerProvider {
    pub fn new(configured: Option<PathBuf>) -> Self {
        Self {
            configured,
            resolved: OnceCell::new(),
        }
    }

    pub async fn resolve(&self) -> Result<&Path, ExecutionError> {
        self.resolved
            .get_or_try_init(|| self.locate())
            .await
            .map(PathBuf::as_path)
    }

    async fn locate(&self) -> Result<PathBuf, ExecutionError> {
        let candidates = match &self.configured {
            Some(path) => vec![path.clone()],
            None => sibling_candidates()?,
        };
        for candidate in &candidates {
            if tokio::fs::try_exists(candidate).await.unwrap_or(false) {
                tracing::debug!("Using runner {}", candidate.display());
                return Ok(candidate.clone());
            }
        }
        Err(ExecutionError::System(format!(
            "Runner binary not found (looked at {:?})",
            candidates
        )))
    }
}

/// Next to the current executable, or one level up for test binaries that
/// live in a `deps` directory.
fn sibling_candidates() -> Result<Vec<PathBuf>, ExecutionError> {
    let exe = std::env::current_exe()
        .map_err(|e| ExecutionError::System(format!("cannot locate current executable: {}", e)))?;
    Ok(exe
        .ancestors()
        .skip(1)
        .take(2)
        .map(|dir| dir.join(RUNNER_BINARY_NAME))
        .collect())
}
