//! Execution strategies: how a compiled solution is launched and measured.

mod external;
mod normal;
mod runner_provider;
mod wrapper;

use std::sync::Arc;
use std::time::Duration;

pub use external::ExternalRunnerStrategy;
pub use normal::NormalStrategy;
pub use runner_provider::RunnerProvider;
pub use wrapper::WrapperStrategy;

use crate::{
    config::Settings,
    core::{
        cancel::Cancellation,
        domain::Language,
        execution::{ExecutionContext, ExecutionError, ExecutionResult},
        temp::TempPool,
        traits::executor::{ProcessExecutor, ProcessOutput},
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyKind {
    Normal,
    Wrapper,
    External,
}

impl StrategyKind {
    /// Solutions in languages the wrapper cannot instrument run plainly even
    /// when the wrapper is on.
    pub fn select(settings: &Settings, language: Option<Language>) -> Result<Self, ExecutionError> {
        match (settings.runner.use_runner, settings.compilation.use_wrapper) {
            (true, true) => Err(ExecutionError::Rejected(
                "Cannot use both external runner and wrapper at the same time".to_string(),
            )),
            (true, false) => Ok(StrategyKind::External),
            (false, true) if language.is_some_and(Language::supports_wrapper) => {
                Ok(StrategyKind::Wrapper)
            }
            _ => Ok(StrategyKind::Normal),
        }
    }
}

#[derive(Debug)]
pub enum ExecutionStrategy {
    Normal(NormalStrategy),
    Wrapper(WrapperStrategy),
    External(ExternalRunnerStrategy),
}

impl ExecutionStrategy {
    pub fn new(
        kind: StrategyKind,
        executor: Arc<dyn ProcessExecutor>,
        pool: Arc<TempPool>,
        settings: &Settings,
        provider: Arc<RunnerProvider>,
    ) -> Self {
        let time_addition = Duration::from_millis(settings.runner.time_addition_ms);
        let unlimited_stack = settings.runner.unlimited_stack;
        match kind {
            StrategyKind::Normal => {
                ExecutionStrategy::Normal(NormalStrategy::new(executor, time_addition))
            }
            StrategyKind::Wrapper => ExecutionStrategy::Wrapper(WrapperStrategy::new(
                executor,
                pool,
                time_addition,
                unlimited_stack,
            )),
            StrategyKind::External => ExecutionStrategy::External(ExternalRunnerStrategy::new(
                executor,
                pool,
                provider,
                time_addition,
                unlimited_stack,
            )),
        }
    }

    pub async fn execute(
        &self,
        ctx: &ExecutionContext,
        cancel: &Cancellation,
    ) -> Result<ExecutionResult, ExecutionError> {
        match self {
            ExecutionStrategy::Normal(strategy) => strategy.execute(ctx, cancel).await,
            ExecutionStrategy::Wrapper(strategy) => strategy.execute(ctx, cancel).await,
            ExecutionStrategy::External(strategy) => strategy.execute(ctx, cancel).await,
        }
    }
}

/// The limit after which the executor kills the program. Every strategy adds
/// the same slack so near-limit programs are not cut short.
pub(crate) fn hard_limit(time_limit_ms: u64, time_addition: Duration) -> Duration {
    Duration::from_millis(time_limit_ms) + time_addition
}

pub(crate) fn into_result(output: ProcessOutput, memory_mb: Option<f64>) -> ExecutionResult {
    ExecutionResult {
        status: output.status,
        user_aborted: output
            .abort_reason
            .is_some_and(|reason| reason.is_user_initiated()),
        time_ms: output.time_ms,
        memory_mb,
        stdout: output.stdout,
        stderr: output.stderr,
    }
}
