use std::sync::Arc;
use std::time::Duration;

use super::{hard_limit, into_result};
use crate::core::{
    cancel::Cancellation,
    execution::{ExecutionContext, ExecutionError, ExecutionResult},
    traits::executor::{ProcessExecutor, ProcessOptions},
};

/// Plain launch. Memory is not measured.
#[derive(Debug)]
pub struct NormalStrategy {
    executor: Arc<dyn ProcessExecutor>,
    time_addition: Duration,
}

impl NormalStrategy {
    pub fn new(executor: Arc<dyn ProcessExecutor>, time_addition: Duration) -> Self {
        Self {
            executor,
            time_addition,
        }
    }

    pub async fn execute(
        &self,
        ctx: &ExecutionContext,
        cancel: &Cancellation,
    ) -> Result<ExecutionResult, ExecutionError> {
        let options = ProcessOptions::new(ctx.command.clone(), cancel.clone())
            .with_stdin(&ctx.stdin_path)
            .with_timeout(hard_limit(ctx.time_limit_ms, self.time_addition));
        let output = self.executor.execute(options).await?;
        Ok(into_result(output, None))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::{
        core::{
            cancel::AbortReason, domain::Language, execution::ExitStatus, temp::TempPool,
            traits::executor::MockProcessExecutor,
        },
        native::langs::tests::process_output,
    };

    fn ctx() -> ExecutionContext {
        ExecutionContext {
            command: vec!["/bin/sol".into()],
            stdin_path: PathBuf::from("/tmp/1.in"),
            time_limit_ms: 1000,
            memory_limit_mb: Some(256),
            language: Some(Language::Cpp),
        }
    }

    #[tokio::test]
    async fn test_passes_stdin_and_slack() {
        let pool = TempPool::new("/tmp/cph-judge-test");
        let mut executor = MockProcessExecutor::new();
        executor
            .expect_execute()
            .withf(|options| {
                options.command == vec!["/bin/sol".to_string()]
                    && options.stdin_path == Some(PathBuf::from("/tmp/1.in"))
                    && options.timeout == Some(Duration::from_millis(1500))
            })
            .returning(move |_| Ok(process_output(&pool, ExitStatus::Code(0), None)));
        let strategy = NormalStrategy::new(Arc::new(executor), Duration::from_millis(500));

        let result = strategy.execute(&ctx(), &Cancellation::new()).await.unwrap();
        assert_eq!(result.status, ExitStatus::Code(0));
        assert_eq!(result.memory_mb, None);
        assert!(!result.user_aborted);
    }

    #[tokio::test]
    async fn test_user_initiated_stops_are_aborts() {
        for (reason, aborted) in [
            (AbortReason::UserAbort, true),
            (AbortReason::RerunScope, true),
            (AbortReason::Timeout, false),
        ] {
            let pool = TempPool::new("/tmp/cph-judge-test");
            let mut executor = MockProcessExecutor::new();
            executor.expect_execute().returning(move |_| {
                Ok(process_output(&pool, ExitStatus::Signal(9), Some(reason)))
            });
            let strategy = NormalStrategy::new(Arc::new(executor), Duration::ZERO);

            let result = strategy.execute(&ctx(), &Cancellation::new()).await.unwrap();
            assert_eq!(result.user_aborted, aborted);
        }
    }

    #[tokio::test]
    async fn test_launch_error_propagates() {
        let mut executor = MockProcessExecutor::new();
        executor
            .expect_execute()
            .returning(|_| Err(crate::core::execution::LaunchError::EmptyCommand));
        let strategy = NormalStrategy::new(Arc::new(executor), Duration::ZERO);

        let result = strategy.execute(&ctx(), &Cancellation::new()).await;
        assert!(matches!(result, Err(ExecutionError::Launch(_))));
    }
}
