//! JSON report printed by the `cph-runner` supervisor.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum RunnerErrorKind {
    CouldNotOpenInputFile = 0,
    CouldNotCreateOutputFile = 1,
    CreateProcessFailed = 2,
    TerminateProcessFailed = 3,
    WaitForProcessFailed = 4,
    GetProcessTimesFailed = 5,
    GetProcessMemoryInfoFailed = 6,
    GetExitCodeFailed = 7,
    UnknownError = 8,
}

impl RunnerErrorKind {
    pub fn from_code(code: i32) -> Option<Self> {
        use RunnerErrorKind::*;
        [
            CouldNotOpenInputFile,
            CouldNotCreateOutputFile,
            CreateProcessFailed,
            TerminateProcessFailed,
            WaitForProcessFailed,
            GetProcessTimesFailed,
            GetProcessMemoryInfoFailed,
            GetExitCodeFailed,
            UnknownError,
        ]
        .into_iter()
        .find(|kind| *kind as i32 == code)
    }
}

impl fmt::Display for RunnerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RunnerErrorKind::CouldNotOpenInputFile => "could not open input file",
            RunnerErrorKind::CouldNotCreateOutputFile => "could not create output file",
            RunnerErrorKind::CreateProcessFailed => "could not create process",
            RunnerErrorKind::TerminateProcessFailed => "could not terminate process",
            RunnerErrorKind::WaitForProcessFailed => "could not wait for process",
            RunnerErrorKind::GetProcessTimesFailed => "could not get process times",
            RunnerErrorKind::GetProcessMemoryInfoFailed => "could not get process memory",
            RunnerErrorKind::GetExitCodeFailed => "could not get exit code",
            RunnerErrorKind::UnknownError => "unknown error",
        };
        f.write_str(text)
    }
}

/// Time is in microseconds, memory in megabytes. `signal` is 0 when the
/// program exited normally.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerOutcome {
    pub error: bool,
    pub killed: bool,
    pub time: f64,
    pub memory: f64,
    pub exit_code: i32,
    pub signal: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunnerFailure {
    pub error: bool,
    pub error_type: i32,
    pub error_code: i32,
}

impl RunnerFailure {
    pub fn new(kind: RunnerErrorKind, error_code: i32) -> Self {
        Self {
            error: true,
            error_type: kind as i32,
            error_code,
        }
    }
}

impl fmt::Display for RunnerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match RunnerErrorKind::from_code(self.error_type) {
            Some(kind) => write!(f, "Runner error: {} (code {})", kind, self.error_code),
            None => write!(
                f,
                "Runner error: type {} (code {})",
                self.error_type, self.error_code
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RunnerReport {
    Outcome(RunnerOutcome),
    Failure(RunnerFailure),
}

impl RunnerReport {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(raw.trim())?;
        let is_error = value
            .get("error")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        if is_error {
            serde_json::from_value(value).map(RunnerReport::Failure)
        } else {
            serde_json::from_value(value).map(RunnerReport::Outcome)
        }
    }
}
