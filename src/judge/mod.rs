//! Judging of one test case: running the compiled solution, evaluating its
//! output and reporting progress to a [`JudgeObserver`].

pub mod evaluator;
pub mod interactive;
pub mod traditional;

use std::sync::Arc;
use std::time::Duration;

pub use evaluator::{Interaction, JudgeRequest, ResultEvaluator};
pub use interactive::InteractiveJudge;
pub use traditional::TraditionalJudge;

use crate::{
    config::Settings,
    core::{
        cancel::Cancellation,
        domain::{Artifact, Overrides, Problem},
        execution::{ExecutionContext, ExecutionError, ExecutionResult},
        fs::try_inline,
        grader::CompareOptions,
        temp::TempPool,
        traits::{
            compiler::Compiler,
            executor::ProcessExecutor,
            judge::{Judge, JudgeContext, JudgeError, JudgeObserver},
            runner::SolutionRunner,
        },
        verdict::{FinalResult, Verdict},
    },
    native::{checker::CheckerRunner, runner::StrategyRunner},
};

/// Collaborators shared by both judge kinds.
#[derive(Debug, Clone)]
pub struct JudgeDeps {
    pub compiler: Arc<dyn Compiler>,
    pub runner: Arc<dyn SolutionRunner>,
    pub evaluator: Arc<ResultEvaluator>,
    pub inline_limit_bytes: u64,
}

impl JudgeDeps {
    pub fn native(
        executor: Arc<dyn ProcessExecutor>,
        compiler: Arc<dyn Compiler>,
        pool: Arc<TempPool>,
        settings: Arc<Settings>,
    ) -> Self {
        let evaluator = ResultEvaluator::new(
            CheckerRunner::new(
                executor.clone(),
                Duration::from_millis(settings.runner.time_addition_ms),
            ),
            CompareOptions::from(&settings.comparing),
        );
        Self {
            compiler,
            runner: Arc::new(StrategyRunner::new(executor, pool, settings.clone())),
            evaluator: Arc::new(evaluator),
            inline_limit_bytes: settings.problem.inline_limit_bytes,
        }
    }

    pub fn launch_command(&self, artifact: &Artifact, overrides: &Overrides) -> Vec<String> {
        launch_command(self.compiler.as_ref(), artifact, overrides)
    }

    fn execution_context(&self, ctx: &JudgeContext) -> Result<ExecutionContext, JudgeError> {
        let solution = &ctx.artifacts.solution;
        let Some(language) = solution.language else {
            return Err(ExecutionError::Rejected(format!(
                "Unsupported language: {}",
                ctx.source.path.display()
            ))
            .into());
        };
        Ok(ExecutionContext {
            command: self.launch_command(solution, &ctx.overrides),
            stdin_path: ctx.input_path.clone(),
            time_limit_ms: ctx.limits.time_limit_ms,
            memory_limit_mb: ctx.limits.memory_limit_mb,
            language: Some(language),
        })
    }

    async fn attach_output(
        &self,
        result: FinalResult,
        execution: ExecutionResult,
    ) -> Result<FinalResult, JudgeError> {
        let stdout = try_inline(execution.stdout, self.inline_limit_bytes).await?;
        let stderr = try_inline(execution.stderr, self.inline_limit_bytes).await?;
        Ok(result.with_output(stdout, stderr))
    }
}

/// Artifacts without a language are launched as they are.
pub fn launch_command(
    compiler: &dyn Compiler,
    artifact: &Artifact,
    overrides: &Overrides,
) -> Vec<String> {
    match artifact.language {
        Some(language) => compiler.run_command(language, &artifact.path, overrides),
        None => vec![artifact.path.to_string_lossy().into_owned()],
    }
}

/// Hands the outcome to the observer. Rejections are results, everything
/// else that went wrong is an error.
fn report(observer: &mut dyn JudgeObserver, outcome: Result<FinalResult, JudgeError>) {
    match outcome {
        Ok(result) => observer.on_result(result),
        Err(JudgeError::Execution(ExecutionError::Rejected(msg))) => {
            observer.on_result(FinalResult::new(Verdict::Rejected).with_msg(msg))
        }
        Err(e) => observer.on_error(e),
    }
}

fn ensure_not_cancelled(cancel: &Cancellation) -> Result<(), JudgeError> {
    match cancel.reason() {
        Some(reason) if reason.is_user_initiated() => Err(ExecutionError::Rejected(
            "Judging aborted by user".to_string(),
        )
        .into()),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone)]
pub enum JudgeService {
    Traditional(TraditionalJudge),
    Interactive(InteractiveJudge),
}

impl JudgeService {
    /// Problems with an interactor are judged interactively.
    pub fn for_problem(problem: &Problem, deps: JudgeDeps) -> Self {
        if problem.interactor.is_some() {
            JudgeService::Interactive(InteractiveJudge::new(deps))
        } else {
            JudgeService::Traditional(TraditionalJudge::new(deps))
        }
    }
}

#[async_trait::async_trait]
impl Judge for JudgeService {
    async fn judge(
        &self,
        ctx: &JudgeContext,
        cancel: &Cancellation,
        observer: &mut dyn JudgeObserver,
    ) {
        match self {
            JudgeService::Traditional(judge) => judge.judge(ctx, cancel, observer).await,
            JudgeService::Interactive(judge) => judge.judge(ctx, cancel, observer).await,
        }
    }
}
