use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::{hard_limit, into_result};
use crate::{
    constants::{REPORT_PATH_ENV, UNLIMITED_STACK_ENV},
    core::{
        cancel::Cancellation,
        execution::{ExecutionContext, ExecutionError, ExecutionResult},
        temp::TempPool,
        traits::executor::{ProcessExecutor, ProcessOptions},
    },
};

#[derive(Debug, Deserialize)]
struct WrapperReport {
    /// Microseconds spent in the solution's own `main`.
    time: f64,
}

/// Runs a wrapper-instrumented binary and trusts its own timing report over
/// the launch-to-exit wall time.
#[derive(Debug)]
pub struct WrapperStrategy {
    executor: Arc<dyn ProcessExecutor>,
    pool: Arc<TempPool>,
    time_addition: Duration,
    unlimited_stack: bool,
}

impl WrapperStrategy {
    pub fn new(
        executor: Arc<dyn ProcessExecutor>,
        pool: Arc<TempPool>,
        time_addition: Duration,
        unlimited_stack: bool,
    ) -> Self {
        Self {
            executor,
            pool,
            time_addition,
            unlimited_stack,
        }
    }

    pub async fn execute(
        &self,
        ctx: &ExecutionContext,
        cancel: &Cancellation,
    ) -> Result<ExecutionResult, ExecutionError> {
        let report = self.pool.acquire();
        // Pooled paths are reused; a stale report must not be mistaken for a new one.
        if let Err(e) = tokio::fs::remove_file(report.path()).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(ExecutionError::System(format!(
                    "cannot reset wrapper report: {}",
                    e
                )));
            }
        }

        let mut options = ProcessOptions::new(ctx.command.clone(), cancel.clone())
            .with_stdin(&ctx.stdin_path)
            .with_timeout(hard_limit(ctx.time_limit_ms, self.time_addition))
            .with_env(REPORT_PATH_ENV, report.path().to_string_lossy());
        if self.unlimited_stack {
            options = options.with_env(UNLIMITED_STACK_ENV, "1");
        }

        let output = self.executor.execute(options).await?;
        let os_time_ms = output.time_ms;
        let mut result = into_result(output, None);
        match read_report(report.path()).await {
            Some(time_ms) => result.time_ms = time_ms,
            None => tracing::debug!(
                "No wrapper report, keeping measured time {:.1}ms",
                os_time_ms
            ),
        }
        Ok(result)
    }
}

async fn read_report(path: &Path) -> Option<f64> {
    let raw = tokio::fs::read_to_string(path).await.ok()?;
    match serde_json::from_str::<WrapperReport>(raw.trim()) {
        Ok(report) => Some(report.time / 1000.0),
        Err(e) => {
            tracing::warn!("Malformed wrapper report {:?}: {}", raw, e);
            None
        }
    }
}
