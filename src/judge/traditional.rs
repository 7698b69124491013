use crate::{
    core::{
        cancel::Cancellation,
        domain::Overrides,
        traits::judge::{Judge, JudgeContext, JudgeError, JudgeObserver},
        verdict::{FinalResult, Verdict},
    },
    judge::{JudgeDeps, JudgeRequest, ensure_not_cancelled, report},
};

/// Runs the solution once and compares its output with the answer, or lets
/// the checker decide when the problem has one.
#[derive(Debug, Clone)]
pub struct TraditionalJudge {
    deps: JudgeDeps,
}

impl TraditionalJudge {
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
        let exec_ctx = self.deps.execution_context(ctx)?;

        observer.on_status_change(Verdict::Running, None);
        let execution = self.deps.runner.run(&exec_ctx, cancel).await?;

        observer.on_status_change(Verdict::Comparing, None);
        let checker = ctx
            .artifacts
            .checker
            .as_ref()
            .map(|checker| self.deps.launch_command(checker, &Overrides::default()));
        let request = JudgeRequest {
            execution: &execution,
            input_path: &ctx.input_path,
            answer_path: &ctx.answer_path,
            checker: checker.as_deref(),
            interaction: None,
            limits: ctx.limits,
        };
        let result = self.deps.evaluator.evaluate(&request, cancel).await?;

        self.deps.attach_output(result, execution).await
    }
}

#[async_trait::async_trait]
impl Judge for TraditionalJudge {
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
