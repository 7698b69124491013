use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::domain::TestcaseIo;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "AC")]
    Accepted,
    #[serde(rename = "WA")]
    WrongAnswer,
    #[serde(rename = "PE")]
    PresentationError,
    #[serde(rename = "PC")]
    PartiallyCorrect,
    #[serde(rename = "TLE")]
    TimeLimitExceeded,
    #[serde(rename = "MLE")]
    MemoryLimitExceeded,
    #[serde(rename = "OLE")]
    OutputLimitExceeded,
    #[serde(rename = "RE")]
    RuntimeError,
    #[serde(rename = "CE")]
    CompilationError,
    #[serde(rename = "RJ")]
    Rejected,
    #[serde(rename = "SE")]
    SystemError,

    #[serde(rename = "queued")]
    Queued,
    #[serde(rename = "compiling")]
    Compiling,
    #[serde(rename = "compiled")]
    Compiled,
    #[serde(rename = "running")]
    Running,
    #[serde(rename = "comparing")]
    Comparing,
    #[serde(rename = "skipped")]
    Skipped,
}

impl Verdict {
    /// Progress states are reported while a test case is being judged and are
    /// never kept as a final result.
    pub fn is_running(self) -> bool {
        matches!(
            self,
            Verdict::Queued
                | Verdict::Compiling
                | Verdict::Compiled
                | Verdict::Running
                | Verdict::Comparing
        )
    }

    pub fn is_terminal(self) -> bool {
        !self.is_running() && self != Verdict::Skipped
    }

    pub fn abbr(self) -> &'static str {
        match self {
            Verdict::Accepted => "AC",
            Verdict::WrongAnswer => "WA",
            Verdict::PresentationError => "PE",
            Verdict::PartiallyCorrect => "PC",
            Verdict::TimeLimitExceeded => "TLE",
            Verdict::MemoryLimitExceeded => "MLE",
            Verdict::OutputLimitExceeded => "OLE",
            Verdict::RuntimeError => "RE",
            Verdict::CompilationError => "CE",
            Verdict::Rejected => "RJ",
            Verdict::SystemError => "SE",
            Verdict::Queued => "queued",
            Verdict::Compiling => "compiling",
            Verdict::Compiled => "compiled",
            Verdict::Running => "running",
            Verdict::Comparing => "comparing",
            Verdict::Skipped => "skipped",
        }
    }

    pub fn full_name(self) -> &'static str {
        match self {
            Verdict::Accepted => "Accepted",
            Verdict::WrongAnswer => "Wrong Answer",
            Verdict::PresentationError => "Presentation Error",
            Verdict::PartiallyCorrect => "Partially Correct",
            Verdict::TimeLimitExceeded => "Time Limit Exceeded",
            Verdict::MemoryLimitExceeded => "Memory Limit Exceeded",
            Verdict::OutputLimitExceeded => "Output Limit Exceeded",
            Verdict::RuntimeError => "Runtime Error",
            Verdict::CompilationError => "Compilation Error",
            Verdict::Rejected => "Rejected",
            Verdict::SystemError => "System Error",
            Verdict::Queued => "Queued",
            Verdict::Compiling => "Compiling",
            Verdict::Compiled => "Compiled",
            Verdict::Running => "Running",
            Verdict::Comparing => "Comparing",
            Verdict::Skipped => "Skipped",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbr())
    }
}

/// Terminal outcome of judging one test case.
#[derive(Clone, Debug, Serialize)]
pub struct FinalResult {
    pub verdict: Verdict,
    pub time_ms: Option<f64>,
    pub memory_mb: Option<f64>,
    pub msg: Option<String>,
    pub stdout: Option<TestcaseIo>,
    pub stderr: Option<TestcaseIo>,
    pub judged_at: DateTime<Utc>,
}

impl FinalResult {
    pub fn new(verdict: Verdict) -> Self {
        Self {
            verdict,
            time_ms: None,
            memory_mb: None,
            msg: None,
            stdout: None,
            stderr: None,
            judged_at: Utc::now(),
        }
    }

    pub fn with_msg<T: Into<String>>(mut self, msg: T) -> Self {
        self.msg = Some(msg.into());
        self
    }

    pub fn with_stats(mut self, time_ms: f64, memory_mb: Option<f64>) -> Self {
        self.time_ms = Some(time_ms);
        self.memory_mb = memory_mb;
        self
    }

    pub fn with_output(mut self, stdout: TestcaseIo, stderr: TestcaseIo) -> Self {
        self.stdout = Some(stdout);
        self.stderr = Some(stderr);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_states_are_not_terminal() {
        for verdict in [
            Verdict::Queued,
            Verdict::Compiling,
            Verdict::Compiled,
            Verdict::Running,
            Verdict::Comparing,
        ] {
            assert!(verdict.is_running());
            assert!(!verdict.is_terminal());
        }
        assert!(!Verdict::Skipped.is_terminal());
        assert!(Verdict::Accepted.is_terminal());
        assert!(Verdict::Rejected.is_terminal());
    }

    #[test]
    fn test_serializes_as_abbreviation() {
        let json = serde_json::to_string(&Verdict::TimeLimitExceeded).unwrap();
        assert_eq!(json, "\"TLE\"");
        assert_eq!(Verdict::WrongAnswer.to_string(), "WA");
    }

    #[test]
    fn test_final_result_builders() {
        let result = FinalResult::new(Verdict::RuntimeError)
            .with_stats(12.5, Some(3.0))
            .with_msg("Program exited with code: 1");
        assert_eq!(result.time_ms, Some(12.5));
        assert_eq!(result.memory_mb, Some(3.0));
        assert_eq!(result.msg.as_deref(), Some("Program exited with code: 1"));
    }
}
