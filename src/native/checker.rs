//! Runs testlib-style checkers: `checker <input> <output> <answer>`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    core::{
        cancel::{AbortReason, Cancellation},
        execution::{ExecutionError, ExitStatus},
        fs::read_text_or_empty,
        grader::map_testlib_exit_code,
        traits::executor::{ProcessExecutor, ProcessOptions},
        verdict::Verdict,
    },
    native::strategies::hard_limit,
};

#[derive(Debug, Clone, PartialEq)]
pub struct CheckerVerdict {
    pub verdict: Verdict,
    pub msg: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CheckerRunner {
    executor: Arc<dyn ProcessExecutor>,
    time_addition: Duration,
}

impl CheckerRunner {
    /// The checker gets the test's time limit plus `time_addition`, like the solution.
    pub fn new(executor: Arc<dyn ProcessExecutor>, time_addition: Duration) -> Self {
        Self {
            executor,
            time_addition,
        }
    }

    /// `checker` is the command launching the checker, without the file arguments.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn check(
        &self,
        checker: &[String],
        input: &Path,
        output: &Path,
        answer: &Path,
        time_limit_ms: u64,
        cancel: &Cancellation,
    ) -> Result<CheckerVerdict, ExecutionError> {
        let mut command = checker.to_vec();
        command.extend(
            [input, output, answer]
                .iter()
                .map(|path| path.to_string_lossy().into_owned()),
        );

        let output = self
            .executor
            .execute(
                ProcessOptions::new(command, cancel.clone())
                    .with_timeout(hard_limit(time_limit_ms, self.time_addition)),
            )
            .await?;
        match output.abort_reason {
            Some(AbortReason::Timeout) => {
                tracing::error!("Checker did not finish within {}ms", time_limit_ms);
                return Err(ExecutionError::System("Checker timed out".to_string()));
            }
            Some(reason) if reason.is_user_initiated() => {
                return Err(ExecutionError::Rejected("Judging aborted by user".to_string()));
            }
            _ => {}
        }

        let code = match output.status {
            ExitStatus::Code(code) => code,
            ExitStatus::Signal(signal) => {
                tracing::error!("Checker killed by signal {}", signal);
                return Err(ExecutionError::System("Checker run failed".to_string()));
            }
        };

        let stderr = read_text_or_empty(output.stderr.path())
            .await
            .map_err(|e| ExecutionError::System(format!("Failed to read checker output: {}", e)))?;
        let stderr = stderr.trim();

        let (verdict, fallback) = map_testlib_exit_code(code);
        let msg = if stderr.is_empty() {
            fallback
        } else {
            Some(stderr.to_string())
        };
        tracing::debug!("Checker exited with {}: {}", code, verdict);

        Ok(CheckerVerdict { verdict, msg })
    }
}
