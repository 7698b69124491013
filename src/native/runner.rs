use std::sync::Arc;

use crate::{
    config::Settings,
    core::{
        cancel::Cancellation,
        domain::Language,
        execution::{ExecutionContext, ExecutionError, ExecutionResult, InteractiveExecutionResult},
        temp::TempPool,
        traits::{
            executor::{ProcessExecutor, ProcessOptions},
            runner::SolutionRunner,
        },
    },
    native::strategies::{ExecutionStrategy, RunnerProvider, StrategyKind, hard_limit, into_result},
};

/// Picks the execution strategy from the settings on every run.
#[derive(Debug)]
pub struct StrategyRunner {
    executor: Arc<dyn ProcessExecutor>,
    pool: Arc<TempPool>,
    settings: Arc<Settings>,
    provider: Arc<RunnerProvider>,
}

impl StrategyRunner {
    pub fn new(
        executor: Arc<dyn ProcessExecutor>,
        pool: Arc<TempPool>,
        settings: Arc<Settings>,
    ) -> Self {
        let provider = Arc::new(RunnerProvider::new(settings.runner.runner_path.clone()));
        Self {
            executor,
            pool,
            settings,
            provider,
        }
    }
}

#[async_trait::async_trait]
impl SolutionRunner for StrategyRunner {
    async fn run(
        &self,
        ctx: &ExecutionContext,
        cancel: &Cancellation,
    ) -> Result<ExecutionResult, ExecutionError> {
        let kind = StrategyKind::select(&self.settings, ctx.language)?;
        tracing::debug!(
            "Running {} program {:?} with {:?} strategy",
            ctx.language.map_or("native", Language::name),
            ctx.command,
            kind
        );
        ExecutionStrategy::new(
            kind,
            self.executor.clone(),
            self.pool.clone(),
            &self.settings,
            self.provider.clone(),
        )
        .execute(ctx, cancel)
        .await
    }

    /// Interactive runs always use the plain strategy.
    async fn run_interactive(
        &self,
        ctx: &ExecutionContext,
        interactor: &[String],
        cancel: &Cancellation,
    ) -> Result<InteractiveExecutionResult, ExecutionError> {
        let limit = hard_limit(
            ctx.time_limit_ms,
            std::time::Duration::from_millis(self.settings.runner.time_addition_ms),
        );
        let feedback = self.pool.acquire();

        let mut interactor_command = interactor.to_vec();
        interactor_command.extend([
            ctx.stdin_path.to_string_lossy().into_owned(),
            feedback.path().to_string_lossy().into_owned(),
        ]);

        let (solution, interactor) = self
            .executor
            .execute_with_pipe(
                ProcessOptions::new(ctx.command.clone(), cancel.clone()).with_timeout(limit),
                ProcessOptions::new(interactor_command, cancel.clone()).with_timeout(limit),
            )
            .await;
        let solution = into_result(solution?, None);
        let interactor = into_result(interactor?, None);
        tracing::debug!(
            "Interactive run finished: solution {}, interactor {}",
            solution.status,
            interactor.status
        );

        Ok(InteractiveExecutionResult {
            solution,
            interactor,
            feedback,
        })
    }
}
