use crate::{
    core::{
        cancel::Cancellation,
        domain::Overrides,
        execution::InteractiveExecutionResult,
        traits::judge::{Judge, JudgeContext, JudgeError, JudgeObserver},
        verdict::{FinalResult, Verdict},
    },
    judge::{Interaction, JudgeDeps, JudgeRequest, ensure_not_cancelled, report},
};

/// Runs the solution piped to the interactor. The interactor's exit code and
/// feedback file decide the verdict; the solution's output is not compared.
#[derive(Debug, Clone)]
pub struct InteractiveJudge {
    deps: JudgeDeps,
}

impl InteractiveJudge {
    pub fn new(deps: JudgeDeps) -> Self {
        Self { deps }
    }

    async fn try_judge(
        &self,
        ctx: &JudgeContext,
        cancel: &Cancellation,
        observer: &mut dyn JudgeObserver,
    ) -> Result<FinalResult, JudgeError> {
        ensure_not_cancelled(cancel)?;
        let interactor = ctx.artifacts.interactor.as_ref().ok_or_else(|| {
            JudgeError::System("Interactive problem has no compiled interactor".to_string())
        })?;
        let interactor_command = self.deps.launch_command(interactor, &Overrides::default());
        let exec_ctx = self.deps.execution_context(ctx)?;

        observer.on_status_change(Verdict::Running, None);
        let InteractiveExecutionResult {
            solution,
            interactor,
            feedback,
        } = self
            .deps
            .runner
            .run_interactive(&exec_ctx, &interactor_command, cancel)
            .await?;

        observer.on_status_change(Verdict::Comparing, None);
        let request = JudgeRequest {
            execution: &solution,
            input_path: &ctx.input_path,
            answer_path: &ctx.answer_path,
            checker: None,
            interaction: Some(Interaction {
                status: interactor.status,
                feedback: feedback.path(),
            }),
            limits: ctx.limits,
        };
        let result = self.deps.evaluator.evaluate(&request, cancel).await?;

        self.deps.attach_output(result, solution).await
    }
}

#[async_trait::async_trait]
impl Judge for InteractiveJudge {
    #[tracing::instrument(skip_all, fields(input = %ctx.input_path.display()))]
    async fn judge(
        &self,
        ctx: &JudgeContext,
        cancel: &Cancellation,
        observer: &mut dyn JudgeObserver,
    ) {
        let outcome = self.try_judge(ctx, cancel, observer).await;
        report(observer, outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{
            domain::Language,
            execution::{ExecutionError, ExitStatus},
            temp::TempPool,
            traits::{
                executor::MockProcessExecutor, judge::RecordingObserver,
                runner::MockSolutionRunner,
            },
        },
        judge::tests::{artifact, context, deps, execution},
    };

    fn interactive_runner(
        pool: std::sync::Arc<TempPool>,
        solution: ExitStatus,
        interactor: ExitStatus,
        feedback: &'static str,
    ) -> MockSolutionRunner {
        let mut runner = MockSolutionRunner::new();
        runner
            .expect_run_interactive()
            .withf(|exec_ctx, interactor, _| {
                exec_ctx.command == vec!["/cache/sol".to_string()]
                    && interactor.to_vec() == vec!["/cache/int".to_string()]
            })
            .times(1)
            .returning(move |_, _, _| {
                let feedback_file = pool.acquire();
                std::fs::write(feedback_file.path(), feedback).unwrap();
                Ok(InteractiveExecutionResult {
                    solution: execution(&pool, solution, ""),
                    interactor: execution(&pool, interactor, ""),
                    feedback: feedback_file,
                })
            });
        runner
    }

    #[tokio::test]
    async fn test_interactor_verdict_and_feedback() {
        let dir = tempfile::tempdir().unwrap();
        let pool = TempPool::new(dir.path().join("tmp"));
        std::fs::create_dir_all(pool.dir()).unwrap();
        let mut ctx = context(dir.path(), "");
        ctx.artifacts.interactor = Some(artifact("/cache/int", Some(Language::Cpp)));

        let runner = interactive_runner(
            pool,
            ExitStatus::Code(0),
            ExitStatus::Code(1),
            "too many queries",
        );
        let mut observer = RecordingObserver::default();
        InteractiveJudge::new(deps(runner, MockProcessExecutor::new()))
            .judge(&ctx, &Cancellation::new(), &mut observer)
            .await;

        assert_eq!(observer.statuses, vec![Verdict::Running, Verdict::Comparing]);
        let result = observer.result.unwrap();
        assert_eq!(result.verdict, Verdict::WrongAnswer);
        assert_eq!(result.msg.as_deref(), Some("too many queries"));
    }

    #[tokio::test]
    async fn test_accepted_interaction() {
        let dir = tempfile::tempdir().unwrap();
        let pool = TempPool::new(dir.path().join("tmp"));
        std::fs::create_dir_all(pool.dir()).unwrap();
        let mut ctx = context(dir.path(), "");
        ctx.artifacts.interactor = Some(artifact("/cache/int", Some(Language::Cpp)));

        let runner = interactive_runner(pool, ExitStatus::Code(0), ExitStatus::Code(0), "ok");
        let mut observer = RecordingObserver::default();
        InteractiveJudge::new(deps(runner, MockProcessExecutor::new()))
            .judge(&ctx, &Cancellation::new(), &mut observer)
            .await;

        assert_eq!(observer.verdict(), Some(Verdict::Accepted));
    }

    #[tokio::test]
    async fn test_solution_crash_wins_over_interactor() {
        let dir = tempfile::tempdir().unwrap();
        let pool = TempPool::new(dir.path().join("tmp"));
        std::fs::create_dir_all(pool.dir()).unwrap();
        let mut ctx = context(dir.path(), "");
        ctx.artifacts.interactor = Some(artifact("/cache/int", Some(Language::Cpp)));

        let runner = interactive_runner(pool, ExitStatus::Signal(11), ExitStatus::Code(0), "");
        let mut observer = RecordingObserver::default();
        InteractiveJudge::new(deps(runner, MockProcessExecutor::new()))
            .judge(&ctx, &Cancellation::new(), &mut observer)
            .await;

        assert_eq!(observer.verdict(), Some(Verdict::RuntimeError));
    }

    #[tokio::test]
    async fn test_missing_interactor_is_system_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), "");

        let mut observer = RecordingObserver::default();
        InteractiveJudge::new(deps(MockSolutionRunner::new(), MockProcessExecutor::new()))
            .judge(&ctx, &Cancellation::new(), &mut observer)
            .await;

        assert!(observer.result.is_none());
        assert!(matches!(observer.error, Some(JudgeError::System(_))));
        assert!(observer.statuses.is_empty());
    }

    #[tokio::test]
    async fn test_pipe_failure_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path(), "");
        ctx.artifacts.interactor = Some(artifact("/cache/int", Some(Language::Cpp)));

        let mut runner = MockSolutionRunner::new();
        runner
            .expect_run_interactive()
            .returning(|_, _, _| Err(ExecutionError::System("pipe broke".to_string())));
        let mut observer = RecordingObserver::default();
        InteractiveJudge::new(deps(runner, MockProcessExecutor::new()))
            .judge(&ctx, &Cancellation::new(), &mut observer)
            .await;

        assert_eq!(observer.verdict(), Some(Verdict::SystemError));
        assert!(observer.result.is_none());
    }
}
