use std::sync::Arc;
use std::time::Duration;

use super::{RunnerProvider, hard_limit};
use crate::{
    core::{
        cancel::Cancellation,
        execution::{ExecutionContext, ExecutionError, ExecutionResult, ExitStatus},
        fs::read_text_or_empty,
        temp::TempPool,
        traits::executor::{ProcessExecutor, ProcessOptions},
    },
    native::runner_report::RunnerReport,
};

/// Runs the solution under the `cph-runner` supervisor, which reports CPU
/// time and peak memory.
#[derive(Debug)]
pub struct ExternalRunnerStrategy {
    executor: Arc<dyn ProcessExecutor>,
    pool: Arc<TempPool>,
    provider: Arc<RunnerProvider>,
    time_addition: Duration,
    unlimited_stack: bool,
}

impl ExternalRunnerStrategy {
    pub fn new(
        executor: Arc<dyn ProcessExecutor>,
        pool: Arc<TempPool>,
        provider: Arc<RunnerProvider>,
        time_addition: Duration,
        unlimited_stack: bool,
    ) -> Self {
        Self {
            executor,
            pool,
            provider,
            time_addition,
            unlimited_stack,
        }
    }

    pub async fn execute(
        &self,
        ctx: &ExecutionContext,
        cancel: &Cancellation,
    ) -> Result<ExecutionResult, ExecutionError> {
        let [program] = ctx.command.as_slice() else {
            return Err(ExecutionError::System(
                "External runner only supports a single program without arguments".to_string(),
            ));
        };
        let runner = self.provider.resolve().await?;

        tokio::fs::create_dir_all(self.pool.dir())
            .await
            .map_err(|e| ExecutionError::System(e.to_string()))?;
        let stdout = self.pool.acquire();
        let stderr = self.pool.acquire();

        // The supervisor enforces the limit itself; the executor only steps
        // in if the supervisor hangs. Its stdin stays open for the soft kill,
        // which it passes on to the program.
        let limit = hard_limit(ctx.time_limit_ms, self.time_addition);
        let mut command = vec![
            runner.to_string_lossy().into_owned(),
            program.clone(),
            ctx.stdin_path.to_string_lossy().into_owned(),
            stdout.path().to_string_lossy().into_owned(),
            stderr.path().to_string_lossy().into_owned(),
            "--time-limit".to_string(),
            limit.as_millis().to_string(),
        ];
        if self.unlimited_stack {
            command.push("--unlimited-stack".to_string());
        }

        let output = self
            .executor
            .execute(
                ProcessOptions::new(command, cancel.clone())
                    .with_open_stdin()
                    .with_timeout(limit + self.time_addition),
            )
            .await?;
        let user_aborted = output
            .abort_reason
            .is_some_and(|reason| reason.is_user_initiated());
        let raw = read_text_or_empty(output.stdout.path())
            .await
            .map_err(|e| ExecutionError::System(e.to_string()))?;

        match RunnerReport::parse(&raw) {
            Ok(RunnerReport::Outcome(outcome)) => {
                let status = if outcome.signal != 0 {
                    ExitStatus::Signal(outcome.signal)
                } else {
                    ExitStatus::Code(outcome.exit_code)
                };
                Ok(ExecutionResult {
                    status,
                    stdout,
                    stderr,
                    time_ms: outcome.time / 1000.0,
                    memory_mb: Some(outcome.memory),
                    user_aborted,
                })
            }
            Ok(RunnerReport::Failure(failure)) => Err(ExecutionError::System(failure.to_string())),
            Err(_) if user_aborted => Ok(ExecutionResult {
                status: output.status,
                stdout,
                stderr,
                time_ms: output.time_ms,
                memory_mb: None,
                user_aborted,
            }),
            Err(e) => Err(ExecutionError::System(format!(
                "Malformed runner report {:?}: {}",
                raw.trim(),
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::*;
    use crate::{
        core::{
            cancel::AbortReason,
            domain::Language,
            traits::executor::{MockProcessExecutor, ProcessOutput},
        },
        native::langs::tests::process_output,
    };

    fn ctx(command: Vec<String>) -> ExecutionContext {
        ExecutionContext {
            command,
            stdin_path: PathBuf::from("/tmp/1.in"),
            time_limit_ms: 1000,
            memory_limit_mb: Some(256),
            language: Some(Language::Cpp),
        }
    }

    fn report_output(pool: &Arc<TempPool>, report: &str, abort: Option<AbortReason>) -> ProcessOutput {
        let output = process_output(pool, ExitStatus::Code(0), abort);
        std::fs::write(output.stdout.path(), report).unwrap();
        output
    }

    async fn strategy_with(
        dir: &Path,
        report: &'static str,
        abort: Option<AbortReason>,
    ) -> (ExternalRunnerStrategy, Arc<TempPool>) {
        let runner = dir.join("cph-runner");
        tokio::fs::write(&runner, "").await.unwrap();
        let pool = TempPool::new(dir.join("tmp"));
        std::fs::create_dir_all(pool.dir()).unwrap();

        let mock_pool = pool.clone();
        let mut executor = MockProcessExecutor::new();
        executor
            .expect_execute()
            .withf(|options| {
                options.command[1] == "/bin/sol"
                    && options.command[5] == "--time-limit"
                    && options.command[6] == "1200"
                    && options.command.len() == 7
                    && options.stdin_path.is_none()
                    && options.keep_stdin_open
            })
            .returning(move |_| Ok(report_output(&mock_pool, report, abort)));
        let strategy = ExternalRunnerStrategy::new(
            Arc::new(executor),
            pool.clone(),
            Arc::new(RunnerProvider::new(Some(runner))),
            Duration::from_millis(200),
            false,
        );
        (strategy, pool)
    }

    #[tokio::test]
    async fn test_outcome_is_translated() {
        let dir = tempfile::tempdir().unwrap();
        let (strategy, _pool) = strategy_with(
            dir.path(),
            r#"{"error":false,"killed":false,"time":25000,"memory":3.5,"exitCode":0,"signal":0}"#,
            None,
        )
        .await;

        let result = strategy
            .execute(&ctx(vec!["/bin/sol".into()]), &Cancellation::new())
            .await
            .unwrap();
        assert_eq!(result.status, ExitStatus::Code(0));
        assert_eq!(result.time_ms, 25.0);
        assert_eq!(result.memory_mb, Some(3.5));
        assert!(!result.user_aborted);
    }

    #[tokio::test]
    async fn test_signal_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (strategy, _pool) = strategy_with(
            dir.path(),
            r#"{"error":false,"killed":false,"time":10,"memory":1,"exitCode":139,"signal":11}"#,
            None,
        )
        .await;

        let result = strategy
            .execute(&ctx(vec!["/bin/sol".into()]), &Cancellation::new())
            .await
            .unwrap();
        assert_eq!(result.status, ExitStatus::Signal(11));
    }

    #[tokio::test]
    async fn test_runner_failure_is_system_error() {
        let dir = tempfile::tempdir().unwrap();
        let (strategy, _pool) = strategy_with(
            dir.path(),
            r#"{"error":true,"error_type":0,"error_code":2}"#,
            None,
        )
        .await;

        let result = strategy
            .execute(&ctx(vec!["/bin/sol".into()]), &Cancellation::new())
            .await;
        match result {
            Err(ExecutionError::System(msg)) => assert!(msg.contains("could not open input file")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_report_is_system_error() {
        let dir = tempfile::tempdir().unwrap();
        let (strategy, _pool) = strategy_with(dir.path(), "garbage", None).await;

        let result = strategy
            .execute(&ctx(vec!["/bin/sol".into()]), &Cancellation::new())
            .await;
        assert!(matches!(result, Err(ExecutionError::System(_))));
    }

    #[tokio::test]
    async fn test_aborted_run_without_report_is_user_abort() {
        let dir = tempfile::tempdir().unwrap();
        let (strategy, _pool) =
            strategy_with(dir.path(), "", Some(AbortReason::UserAbort)).await;

        let result = strategy
            .execute(&ctx(vec!["/bin/sol".into()]), &Cancellation::new())
            .await
            .unwrap();
        assert!(result.user_aborted);
    }

    #[tokio::test]
    async fn test_command_with_arguments_is_rejected() {
        let strategy = ExternalRunnerStrategy::new(
            Arc::new(MockProcessExecutor::new()),
            TempPool::new("/tmp/cph-judge-test"),
            Arc::new(RunnerProvider::default()),
            Duration::ZERO,
            false,
        );

        let result = strategy
            .execute(
                &ctx(vec!["python3".into(), "sol.py".into()]),
                &Cancellation::new(),
            )
            .await;
        assert!(matches!(result, Err(ExecutionError::System(_))));
    }
}
