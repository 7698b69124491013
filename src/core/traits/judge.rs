use std::path::PathBuf;

use thiserror::Error;

use crate::core::{
    cancel::Cancellation,
    domain::{CompileArtifacts, Limits, Overrides, SourceFile},
    execution::ExecutionError,
    verdict::{FinalResult, Verdict},
};

/// Failures that do not map to a verdict.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("{0}")]
    System(String),
    #[error("i/o error while judging: {0}")]
    Io(#[from] std::io::Error),
}

/// Receives progress of a single judging. Exactly one of
/// [`JudgeObserver::on_result`] and [`JudgeObserver::on_error`] is called.
#[mockall::automock]
pub trait JudgeObserver: Send {
    fn on_status_change(&mut self, verdict: Verdict, msg: Option<String>);

    fn on_result(&mut self, result: FinalResult);

    fn on_error(&mut self, error: JudgeError);
}

/// Everything needed to judge the compiled solution on one test case.
#[derive(Clone, Debug)]
pub struct JudgeContext {
    pub source: SourceFile,
    pub overrides: Overrides,
    pub limits: Limits,
    pub input_path: PathBuf,
    pub answer_path: PathBuf,
    pub artifacts: CompileArtifacts,
}

#[async_trait::async_trait]
pub trait Judge: std::fmt::Debug + Send + Sync {
    async fn judge(
        &self,
        ctx: &JudgeContext,
        cancel: &Cancellation,
        observer: &mut dyn JudgeObserver,
    );
}

/// Collects the calls made on it.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub statuses: Vec<Verdict>,
    pub result: Option<FinalResult>,
    pub error: Option<JudgeError>,
}

impl RecordingObserver {
    /// The verdict the judging ended with; internal errors read as system errors.
    pub fn verdict(&self) -> Option<Verdict> {
        match (&self.result, &self.error) {
            (Some(result), _) => Some(result.verdict),
            (None, Some(_)) => Some(Verdict::SystemError),
            (None, None) => None,
        }
    }
}

impl JudgeObserver for RecordingObserver {
    fn on_status_change(&mut self, verdict: Verdict, _msg: Option<String>) {
        self.statuses.push(verdict);
    }

    fn on_result(&mut self, result: FinalResult) {
        self.result = Some(result);
    }

    fn on_error(&mut self, error: JudgeError) {
        tracing::error!("Judging failed: {}", error);
        self.error = Some(error);
    }
}
