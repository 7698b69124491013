use std::path::PathBuf;
use std::time::Duration;

use crate::core::{
    cancel::{AbortReason, Cancellation},
    execution::{ExitStatus, LaunchError},
    temp::TempFile,
};

#[derive(Clone, Debug, Default)]
pub struct ProcessOptions {
    pub command: Vec<String>,
    /// Fed to the process, then its stdin is closed. Without a file stdin
    /// stays open for [`ProcessHandle::write_stdin`] or a paired process.
    pub stdin_path: Option<PathBuf>,
    /// Keeps stdin open through [`ProcessExecutor::execute`] even without a
    /// file, so the soft kill can still reach the process.
    pub keep_stdin_open: bool,
    /// Hard limit after which the process is killed with [`AbortReason::Timeout`].
    pub timeout: Option<Duration>,
    pub env: Vec<(String, String)>,
    pub cancel: Cancellation,
}

impl ProcessOptions {
    pub fn new(command: Vec<String>, cancel: Cancellation) -> Self {
        Self {
            command,
            cancel,
            ..Default::default()
        }
    }

    pub fn with_stdin<T: Into<PathBuf>>(mut self, path: T) -> Self {
        self.stdin_path = Some(path.into());
        self
    }

    pub fn with_open_stdin(mut self) -> Self {
        self.keep_stdin_open = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: TempFile,
    pub stderr: TempFile,
    /// Wall time from spawn to exit.
    pub time_ms: f64,
    /// Set when the process was stopped before it exited on its own.
    pub abort_reason: Option<AbortReason>,
}

#[mockall::automock]
#[async_trait::async_trait]
pub trait ProcessHandle: std::fmt::Debug + Send + Sync {
    fn pid(&self) -> Option<u32>;

    async fn write_stdin(&self, data: &[u8]) -> std::io::Result<()>;

    async fn close_stdin(&self);

    /// Kills the process right away, skipping the soft kill.
    fn kill(&self);

    /// Waits for the process to finish. Only the first call yields the output.
    async fn wait(&mut self) -> Result<ProcessOutput, LaunchError>;
}

#[mockall::automock]
#[async_trait::async_trait]
pub trait ProcessExecutor: std::fmt::Debug + Send + Sync {
    async fn execute(&self, options: ProcessOptions) -> Result<ProcessOutput, LaunchError>;

    async fn spawn(&self, options: ProcessOptions)
    -> Result<Box<dyn ProcessHandle>, LaunchError>;

    /// Runs two processes with the stdout of each one feeding the stdin of the other.
    async fn execute_with_pipe(
        &self,
        first: ProcessOptions,
        second: ProcessOptions,
    ) -> (
        Result<ProcessOutput, LaunchError>,
        Result<ProcessOutput, LaunchError>,
    );
}
