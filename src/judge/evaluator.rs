//! Turns raw execution results into verdicts.

use std::path::Path;

use crate::{
    core::{
        cancel::Cancellation,
        domain::Limits,
        execution::{ExecutionError, ExecutionResult, ExitStatus},
        fs::{read_text, read_text_or_empty},
        grader::{CompareOptions, compare_strings, map_testlib_exit_code},
        traits::judge::JudgeError,
        verdict::{FinalResult, Verdict},
    },
    native::checker::CheckerRunner,
};

/// What the interactor left behind after an interactive run.
#[derive(Debug, Clone, Copy)]
pub struct Interaction<'a> {
    pub status: ExitStatus,
    pub feedback: &'a Path,
}

#[derive(Debug)]
pub struct JudgeRequest<'a> {
    pub execution: &'a ExecutionResult,
    pub input_path: &'a Path,
    pub answer_path: &'a Path,
    /// Command launching the checker, without its file arguments.
    pub checker: Option<&'a [String]>,
    pub interaction: Option<Interaction<'a>>,
    pub limits: Limits,
}

#[derive(Debug)]
pub struct ResultEvaluator {
    checker: CheckerRunner,
    compare: CompareOptions,
}

impl ResultEvaluator {
    pub fn new(checker: CheckerRunner, compare: CompareOptions) -> Self {
        Self { checker, compare }
    }

    /// Rules apply in order; the first one that matches decides the verdict.
    /// Time and memory are carried into the result whatever it is.
    pub async fn evaluate(
        &self,
        request: &JudgeRequest<'_>,
        cancel: &Cancellation,
    ) -> Result<FinalResult, JudgeError> {
        let execution = request.execution;
        let result = self
            .decide(request, cancel)
            .await?
            .with_stats(execution.time_ms, execution.memory_mb);
        tracing::debug!("Evaluated as {} in {:.1}ms", result.verdict, execution.time_ms);
        Ok(result)
    }

    async fn decide(
        &self,
        request: &JudgeRequest<'_>,
        cancel: &Cancellation,
    ) -> Result<FinalResult, JudgeError> {
        let execution = request.execution;
        let limits = &request.limits;

        if execution.user_aborted {
            return Ok(FinalResult::new(Verdict::Rejected));
        }
        if execution.time_ms > limits.time_limit_ms as f64 {
            return Ok(FinalResult::new(Verdict::TimeLimitExceeded));
        }
        if let (Some(memory), Some(limit)) = (execution.memory_mb, limits.memory_limit_mb) {
            if memory > limit as f64 {
                return Ok(FinalResult::new(Verdict::MemoryLimitExceeded));
            }
        }
        match execution.status {
            ExitStatus::Code(0) => {}
            ExitStatus::Code(code) => {
                return Ok(FinalResult::new(Verdict::RuntimeError)
                    .with_msg(format!("Program exited with code: {}", code)));
            }
            signal @ ExitStatus::Signal(_) => {
                return Ok(FinalResult::new(Verdict::RuntimeError)
                    .with_msg(format!("Program terminated by {}", signal)));
            }
        }

        if let Some(checker) = request.checker {
            let checked = self
                .checker
                .check(
                    checker,
                    request.input_path,
                    execution.stdout.path(),
                    request.answer_path,
                    limits.time_limit_ms,
                    cancel,
                )
                .await?;
            return Ok(with_optional_msg(FinalResult::new(checked.verdict), checked.msg));
        }

        if let Some(interaction) = request.interaction {
            return interaction_result(interaction).await;
        }

        let actual = read_text_or_empty(execution.stdout.path()).await?;
        let expected = read_text_or_empty(request.answer_path).await?;
        let stderr = if self.compare.ignore_error {
            String::new()
        } else {
            read_text_or_empty(execution.stderr.path()).await?
        };
        Ok(FinalResult::new(compare_strings(
            &actual,
            &expected,
            &stderr,
            &self.compare,
        )))
    }
}

async fn interaction_result(interaction: Interaction<'_>) -> Result<FinalResult, JudgeError> {
    let code = match interaction.status {
        ExitStatus::Code(code) => code,
        ExitStatus::Signal(_) => {
            return Err(ExecutionError::System(format!(
                "Interactor terminated by {}",
                interaction.status
            ))
            .into());
        }
    };
    let (verdict, fallback) = map_testlib_exit_code(code);
    let feedback = match read_text(interaction.feedback).await {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            tracing::warn!("Interactor feedback unreadable: {}", e);
            String::new()
        }
    };
    let msg = if feedback.is_empty() {
        fallback
    } else {
        Some(feedback)
    };
    Ok(with_optional_msg(FinalResult::new(verdict), msg))
}

fn with_optional_msg(result: FinalResult, msg: Option<String>) -> FinalResult {
    match msg {
        Some(msg) => result.with_msg(msg),
        None => result,
    }
}
