use crate::core::{
    cancel::Cancellation,
    execution::{ExecutionContext, ExecutionError, ExecutionResult, InteractiveExecutionResult},
};

/// Runs a compiled solution with the configured execution strategy.
#[mockall::automock]
#[async_trait::async_trait]
pub trait SolutionRunner: std::fmt::Debug + Send + Sync {
    async fn run(
        &self,
        ctx: &ExecutionContext,
        cancel: &Cancellation,
    ) -> Result<ExecutionResult, ExecutionError>;

    /// Runs the solution piped together with an interactor. `interactor` is
    /// the command launching it, without the file arguments.
    async fn run_interactive(
        &self,
        ctx: &ExecutionContext,
        interactor: &[String],
        cancel: &Cancellation,
    ) -> Result<InteractiveExecutionResult, ExecutionError>;
}
