use std::path::Path;

use thiserror::Error;

use crate::core::{
    cancel::Cancellation,
    domain::{Artifact, Language, Overrides, SourceFile},
    execution::LaunchError,
    verdict::Verdict,
};

#[derive(Debug, Error)]
pub enum CompileError {
    /// The toolchain rejected the source; carries its diagnostics.
    #[error("{msg}")]
    Failed { msg: String },
    #[error("Compilation aborted by user")]
    Aborted,
    #[error("unsupported source file {0}")]
    Unsupported(String),
    #[error("{msg}")]
    Internal { msg: String },
}

impl CompileError {
    pub fn verdict(&self) -> Verdict {
        match self {
            CompileError::Failed { .. } => Verdict::CompilationError,
            CompileError::Aborted => Verdict::Rejected,
            CompileError::Unsupported(_) | CompileError::Internal { .. } => Verdict::SystemError,
        }
    }
}

impl From<LaunchError> for CompileError {
    fn from(e: LaunchError) -> Self {
        CompileError::Internal { msg: e.to_string() }
    }
}

impl From<std::io::Error> for CompileError {
    fn from(e: std::io::Error) -> Self {
        CompileError::Internal { msg: e.to_string() }
    }
}

#[derive(Clone, Debug, Default)]
pub struct CompileOptions {
    /// Whether the call site lets the timing wrapper be linked in.
    pub allow_wrapper: bool,
    pub overrides: Option<Overrides>,
}

#[mockall::automock]
#[async_trait::async_trait]
pub trait Compiler: std::fmt::Debug + Send + Sync {
    async fn compile(
        &self,
        language: Language,
        source: &SourceFile,
        cancel: &Cancellation,
        force: bool,
        options: &CompileOptions,
    ) -> Result<Artifact, CompileError>;

    fn run_command(&self, language: Language, artifact: &Path, overrides: &Overrides)
    -> Vec<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_mapping() {
        assert_eq!(
            CompileError::Failed { msg: "x".into() }.verdict(),
            Verdict::CompilationError
        );
        assert_eq!(CompileError::Aborted.verdict(), Verdict::Rejected);
        assert_eq!(
            CompileError::Unsupported("a.txt".into()).verdict(),
            Verdict::SystemError
        );
        assert_eq!(
            CompileError::Internal { msg: "x".into() }.verdict(),
            Verdict::SystemError
        );
    }
}
