use std::fmt;

use thiserror::Error;

use crate::core::{domain::Language, temp::TempFile};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitStatus {
    Code(i32),
    Signal(i32),
}

impl ExitStatus {
    pub fn is_success(self) -> bool {
        self == ExitStatus::Code(0)
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        match (status.code(), status.signal()) {
            (Some(code), _) => ExitStatus::Code(code),
            (None, Some(signal)) => ExitStatus::Signal(signal),
            (None, None) => ExitStatus::Code(-1),
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Code(code) => write!(f, "{}", code),
            ExitStatus::Signal(signal) => match nix::sys::signal::Signal::try_from(*signal) {
                Ok(name) => f.write_str(name.as_str()),
                Err(_) => write!(f, "signal {}", signal),
            },
        }
    }
}

/// One fully resolved process launch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionContext {
    pub command: Vec<String>,
    pub stdin_path: std::path::PathBuf,
    pub time_limit_ms: u64,
    pub memory_limit_mb: Option<u64>,
    /// Language of the program, `None` for plain executables.
    pub language: Option<Language>,
}

#[derive(Debug)]
pub struct ExecutionResult {
    pub status: ExitStatus,
    pub stdout: TempFile,
    pub stderr: TempFile,
    pub time_ms: f64,
    pub memory_mb: Option<f64>,
    pub user_aborted: bool,
}

#[derive(Debug)]
pub struct InteractiveExecutionResult {
    pub solution: ExecutionResult,
    pub interactor: ExecutionResult,
    /// Written by the interactor; holds its human readable verdict.
    pub feedback: TempFile,
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("empty command")]
    EmptyCommand,
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("paired process could not be launched")]
    PeerFailed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Launch(#[from] LaunchError),
    /// A precondition of the run is not met; judged as rejected.
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    System(String),
}
