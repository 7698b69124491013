use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;

use crate::{
    constants::SOFT_KILL_SENTINEL,
    core::{
        cancel::{AbortReason, Cancellation},
        execution::{ExitStatus, LaunchError},
        temp::{TempFile, TempPool},
        traits::executor::{ProcessExecutor, ProcessHandle, ProcessOptions, ProcessOutput},
    },
};

const PIPE_CHUNK: usize = 64 * 1024;

/// Write end of a child's stdin, shared by the stdin feeder, the paired
/// process' stdout pump and the soft kill. `None` once closed.
type StdinSlot = Arc<Mutex<Option<ChildStdin>>>;

type Outcome = Result<ProcessOutput, LaunchError>;

/// Runs processes with tokio. Stdout and stderr always go to pooled temp files.
#[derive(Clone, Debug)]
pub struct NativeExecutor {
    pool: Arc<TempPool>,
    grace: Duration,
}

struct Launched {
    child: Child,
    started: Instant,
    stdin: StdinSlot,
    stdin_source: Option<File>,
    child_stdout: ChildStdout,
    stdout_sink: File,
    stdout: TempFile,
    stderr: TempFile,
}

enum Stop {
    Exited(std::io::Result<std::process::ExitStatus>),
    Kill,
    Abort(AbortReason),
}

impl NativeExecutor {
    /// `grace` is how long a soft-killed process gets before it is killed for real.
    pub fn new(pool: Arc<TempPool>, grace: Duration) -> Self {
        NativeExecutor { pool, grace }
    }

    pub fn pool(&self) -> &Arc<TempPool> {
        &self.pool
    }

    async fn start(&self, options: &ProcessOptions) -> Result<Launched, LaunchError> {
        let (program, args) = options
            .command
            .split_first()
            .ok_or(LaunchError::EmptyCommand)?;

        let stdin_source = match &options.stdin_path {
            Some(path) => Some(File::open(path).await?),
            None => None,
        };

        tokio::fs::create_dir_all(self.pool.dir()).await?;
        let stdout = self.pool.acquire();
        let stderr = self.pool.acquire();
        let stdout_sink = File::create(stdout.path()).await?;
        let stderr_sink = std::fs::File::create(stderr.path())?;

        let mut command = Command::new(program);
        command
            .args(args)
            .envs(options.env.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::from(stderr_sink))
            .kill_on_drop(true);

        tracing::info!("Launching {:?}", options.command);
        let mut child = command.spawn().map_err(|source| LaunchError::Spawn {
            program: program.clone(),
            source,
        })?;
        let started = Instant::now();

        let child_stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("child stdout is not captured"))?;
        let stdin = Arc::new(Mutex::new(child.stdin.take()));

        Ok(Launched {
            child,
            started,
            stdin,
            stdin_source,
            child_stdout,
            stdout_sink,
            stdout,
            stderr,
        })
    }

    /// Starts the background tasks that feed, drain and supervise a launched child.
    fn drive(
        &self,
        launched: Launched,
        options: ProcessOptions,
        forward: Option<StdinSlot>,
    ) -> NativeProcess {
        let Launched {
            mut child,
            started,
            stdin,
            stdin_source,
            child_stdout,
            stdout_sink,
            stdout,
            stderr,
        } = launched;

        let pid = child.id();
        let kill = CancellationToken::new();
        let grace = self.grace;

        let feeder = stdin_source.map(|source| tokio::spawn(feed_stdin(source, stdin.clone())));
        let mut pump = tokio::spawn(pump_stdout(child_stdout, stdout_sink, forward));

        let (tx, rx) = oneshot::channel();
        let slot = stdin.clone();
        let hard_kill = kill.clone();
        tokio::spawn(async move {
            let supervised = supervise(
                &mut child,
                &slot,
                options.timeout,
                &options.cancel,
                &hard_kill,
                grace,
            )
            .await;
            let time_ms = started.elapsed().as_secs_f64() * 1000.0;

            if let Some(feeder) = feeder {
                feeder.abort();
            }
            if tokio::time::timeout(grace, &mut pump).await.is_err() {
                tracing::warn!("Output of pid {:?} is still open after exit", pid);
                pump.abort();
            }

            let outcome = supervised
                .map(|(status, abort_reason)| ProcessOutput {
                    status: status.into(),
                    stdout,
                    stderr,
                    time_ms,
                    abort_reason,
                })
                .map_err(LaunchError::from);
            if let Ok(output) = &outcome {
                tracing::debug!(
                    "Process {:?} finished with {} in {:.1}ms ({:?})",
                    pid,
                    output.status,
                    output.time_ms,
                    output.abort_reason
                );
            }
            let _ = tx.send(outcome);
        });

        NativeProcess {
            pid,
            stdin,
            kill,
            done: Some(rx),
        }
    }
}

/// Waits for the child, a cancellation or the deadline, whichever comes first.
/// Stopping goes through a soft kill, then a hard kill once `grace` runs out.
async fn supervise(
    child: &mut Child,
    stdin: &StdinSlot,
    timeout: Option<Duration>,
    cancel: &Cancellation,
    hard_kill: &CancellationToken,
    grace: Duration,
) -> std::io::Result<(std::process::ExitStatus, Option<AbortReason>)> {
    let deadline = async {
        match timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending().await,
        }
    };

    let stop = tokio::select! {
        biased;
        status = child.wait() => Stop::Exited(status),
        _ = hard_kill.cancelled() => Stop::Kill,
        _ = cancel.cancelled() => Stop::Abort(cancel.reason().unwrap_or(AbortReason::UserAbort)),
        _ = deadline => Stop::Abort(AbortReason::Timeout),
    };

    let reason = match stop {
        Stop::Exited(status) => return Ok((status?, None)),
        Stop::Kill => {
            if let Err(e) = child.start_kill() {
                tracing::debug!("Kill failed: {}", e);
            }
            return Ok((child.wait().await?, Some(AbortReason::Killed)));
        }
        Stop::Abort(reason) => reason,
    };

    tracing::debug!("Stopping pid {:?} ({:?})", child.id(), reason);
    soft_kill(stdin, grace).await;
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => Ok((status?, Some(reason))),
        Err(_) => {
            tracing::warn!("Pid {:?} ignored the soft kill, killing it", child.id());
            if let Err(e) = child.start_kill() {
                tracing::debug!("Kill failed: {}", e);
            }
            Ok((child.wait().await?, Some(reason)))
        }
    }
}

async fn soft_kill(stdin: &StdinSlot, grace: Duration) {
    let request = async {
        let mut slot = stdin.lock().await;
        if let Some(mut pipe) = slot.take() {
            let _ = pipe.write_all(SOFT_KILL_SENTINEL).await;
        }
    };
    if tokio::time::timeout(grace, request).await.is_err() {
        tracing::debug!("Stdin is busy, soft kill skipped");
    }
}

async fn feed_stdin(mut source: File, stdin: StdinSlot) {
    let mut buf = vec![0u8; PIPE_CHUNK];
    loop {
        let n = match source.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("Failed to read stdin file: {}", e);
                break;
            }
        };
        let mut slot = stdin.lock().await;
        let Some(pipe) = slot.as_mut() else {
            return;
        };
        if let Err(e) = pipe.write_all(&buf[..n]).await {
            tracing::debug!("Process closed its stdin early: {}", e);
            slot.take();
            return;
        }
    }
    stdin.lock().await.take();
}

/// Copies the child's stdout into its file and, for piped pairs, into the
/// other process' stdin. The peer's stdin is closed when the stream ends.
async fn pump_stdout(mut source: ChildStdout, mut sink: File, forward: Option<StdinSlot>) {
    let mut buf = vec![0u8; PIPE_CHUNK];
    loop {
        let n = match source.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("Failed to read process output: {}", e);
                break;
            }
        };
        if let Err(e) = sink.write_all(&buf[..n]).await {
            tracing::error!("Failed to save process output: {}", e);
        }
        if let Some(peer) = &forward {
            let mut slot = peer.lock().await;
            if let Some(pipe) = slot.as_mut() {
                if let Err(e) = pipe.write_all(&buf[..n]).await {
                    tracing::debug!("Peer stopped reading: {}", e);
                    slot.take();
                }
            }
        }
    }
    if let Err(e) = sink.flush().await {
        tracing::error!("Failed to flush process output: {}", e);
    }
    if let Some(peer) = forward {
        peer.lock().await.take();
    }
}

#[derive(Debug)]
pub struct NativeProcess {
    pid: Option<u32>,
    stdin: StdinSlot,
    kill: CancellationToken,
    done: Option<oneshot::Receiver<Outcome>>,
}

#[async_trait::async_trait]
impl ProcessHandle for NativeProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    async fn write_stdin(&self, data: &[u8]) -> std::io::Result<()> {
        let mut slot = self.stdin.lock().await;
        match slot.as_mut() {
            Some(pipe) => pipe.write_all(data).await,
            None => Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "stdin is closed",
            )),
        }
    }

    async fn close_stdin(&self) {
        self.stdin.lock().await.take();
    }

    fn kill(&self) {
        self.kill.cancel();
    }

    async fn wait(&mut self) -> Result<ProcessOutput, LaunchError> {
        let Some(done) = self.done.take() else {
            return Err(std::io::Error::other("process output was already taken").into());
        };
        done.await
            .unwrap_or_else(|_| Err(std::io::Error::other("process supervisor stopped").into()))
    }
}

#[async_trait::async_trait]
impl ProcessExecutor for NativeExecutor {
    #[tracing::instrument(skip_all, fields(command = ?options.command))]
    async fn execute(&self, options: ProcessOptions) -> Result<ProcessOutput, LaunchError> {
        let launched = self.start(&options).await?;
        let keep_stdin_open = options.stdin_path.is_some() || options.keep_stdin_open;
        let mut process = self.drive(launched, options, None);
        if !keep_stdin_open {
            process.close_stdin().await;
        }
        process.wait().await
    }

    async fn spawn(
        &self,
        options: ProcessOptions,
    ) -> Result<Box<dyn ProcessHandle>, LaunchError> {
        let launched = self.start(&options).await?;
        Ok(Box::new(self.drive(launched, options, None)))
    }

    #[tracing::instrument(skip_all, fields(first = ?first.command, second = ?second.command))]
    async fn execute_with_pipe(&self, first: ProcessOptions, second: ProcessOptions) -> (Outcome, Outcome) {
        let first_launched = match self.start(&first).await {
            Ok(launched) => launched,
            Err(e) => return (Err(e), Err(LaunchError::PeerFailed)),
        };
        let second_launched = match self.start(&second).await {
            Ok(launched) => launched,
            Err(e) => return (Err(LaunchError::PeerFailed), Err(e)),
        };

        let first_stdin = first_launched.stdin.clone();
        let second_stdin = second_launched.stdin.clone();
        let mut first = self.drive(first_launched, first, Some(second_stdin));
        let mut second = self.drive(second_launched, second, Some(first_stdin));
        tokio::join!(first.wait(), second.wait())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["/bin/sh".into(), "-c".into(), script.into()]
    }

    fn executor(dir: &std::path::Path) -> NativeExecutor {
        NativeExecutor::new(TempPool::new(dir), Duration::from_millis(200))
    }

    async fn read(file: &TempFile) -> String {
        tokio::fs::read_to_string(file.path()).await.unwrap()
    }

    #[tokio::test]
    async fn test_execute_feeds_stdin_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.txt");
        tokio::fs::write(&input, "1 2 3\n").await.unwrap();
        let executor = executor(&dir.path().join("pool"));

        let output = executor
            .execute(ProcessOptions::new(vec!["cat".into()], Cancellation::new()).with_stdin(&input))
            .await
            .unwrap();

        assert_eq!(output.status, ExitStatus::Code(0));
        assert_eq!(output.abort_reason, None);
        assert_eq!(read(&output.stdout).await, "1 2 3\n");
        assert_eq!(read(&output.stderr).await, "");
    }

    #[tokio::test]
    async fn test_execute_reports_exit_code_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor(dir.path());

        let output = executor
            .execute(ProcessOptions::new(sh("echo oops >&2; exit 3"), Cancellation::new()))
            .await
            .unwrap();

        assert_eq!(output.status, ExitStatus::Code(3));
        assert_eq!(read(&output.stderr).await, "oops\n");
    }

    #[tokio::test]
    async fn test_execute_passes_env() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor(dir.path());

        let output = executor
            .execute(
                ProcessOptions::new(sh("printf %s \"$JUDGE_VALUE\""), Cancellation::new())
                    .with_env("JUDGE_VALUE", "42"),
            )
            .await
            .unwrap();

        assert_eq!(read(&output.stdout).await, "42");
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor(dir.path());

        let output = executor
            .execute(
                ProcessOptions::new(vec!["sleep".into(), "5".into()], Cancellation::new())
                    .with_timeout(Duration::from_millis(100)),
            )
            .await
            .unwrap();

        assert_eq!(output.abort_reason, Some(AbortReason::Timeout));
        assert!(!output.status.is_success());
        assert!(output.time_ms >= 100.0);
        assert!(output.time_ms < 5000.0);
    }

    #[tokio::test]
    async fn test_soft_kill_lets_process_exit_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor(dir.path());

        let mut process = executor
            .spawn(
                ProcessOptions::new(sh("read line; echo \"got $line\""), Cancellation::new())
                    .with_timeout(Duration::from_millis(100)),
            )
            .await
            .unwrap();
        let output = process.wait().await.unwrap();

        assert_eq!(output.abort_reason, Some(AbortReason::Timeout));
        assert_eq!(output.status, ExitStatus::Code(0));
        assert_eq!(read(&output.stdout).await, "got k\n");
    }

    #[tokio::test]
    async fn test_cancel_records_reason() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor(dir.path());
        let cancel = Cancellation::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel(AbortReason::UserAbort);
        });
        let output = executor
            .execute(ProcessOptions::new(vec!["sleep".into(), "5".into()], cancel))
            .await
            .unwrap();

        assert_eq!(output.abort_reason, Some(AbortReason::UserAbort));
        assert!(output.time_ms < 5000.0);
    }

    #[tokio::test]
    async fn test_cancel_racing_exit_yields_one_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor(dir.path());
        let cancel = Cancellation::new();

        let mut process = executor
            .spawn(ProcessOptions::new(vec!["true".into()], cancel.clone()))
            .await
            .unwrap();
        cancel.cancel(AbortReason::UserAbort);

        let output = process.wait().await.unwrap();
        assert!(matches!(
            output.abort_reason,
            None | Some(AbortReason::UserAbort)
        ));
        assert!(process.wait().await.is_err());
    }

    #[tokio::test]
    async fn test_write_stdin_through_handle() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor(dir.path());

        let mut process = executor
            .spawn(ProcessOptions::new(vec!["cat".into()], Cancellation::new()))
            .await
            .unwrap();
        assert!(process.pid().is_some());
        process.write_stdin(b"hello").await.unwrap();
        process.close_stdin().await;
        assert!(process.write_stdin(b"more").await.is_err());

        let output = process.wait().await.unwrap();
        assert_eq!(read(&output.stdout).await, "hello");
    }

    #[tokio::test]
    async fn test_hard_kill_through_handle() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor(dir.path());

        let mut process = executor
            .spawn(ProcessOptions::new(vec!["sleep".into(), "5".into()], Cancellation::new()))
            .await
            .unwrap();
        process.kill();

        let output = process.wait().await.unwrap();
        assert_eq!(output.status, ExitStatus::Signal(9));
        assert_eq!(output.abort_reason, Some(AbortReason::Killed));
    }

    #[tokio::test]
    async fn test_soft_kill_reaches_process_without_stdin_file() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor(dir.path());
        let cancel = Cancellation::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel(AbortReason::UserAbort);
        });
        let output = executor
            .execute(
                ProcessOptions::new(sh("read line; echo \"got $line\""), cancel).with_open_stdin(),
            )
            .await
            .unwrap();

        assert_eq!(output.abort_reason, Some(AbortReason::UserAbort));
        assert_eq!(output.status, ExitStatus::Code(0));
        assert_eq!(read(&output.stdout).await, "got k\n");
    }

    #[tokio::test]
    async fn test_closed_stdin_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor(dir.path());

        let output = executor
            .execute(ProcessOptions::new(sh("cat; echo done"), Cancellation::new()))
            .await
            .unwrap();

        assert_eq!(output.abort_reason, None);
        assert_eq!(read(&output.stdout).await, "done\n");
    }

    #[tokio::test]
    async fn test_runs_in_judge_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor(dir.path());

        let output = executor
            .execute(ProcessOptions::new(sh("pwd -P"), Cancellation::new()))
            .await
            .unwrap();

        let cwd = std::env::current_dir().unwrap().canonicalize().unwrap();
        assert_eq!(read(&output.stdout).await.trim_end(), cwd.to_string_lossy());
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor(dir.path());

        let result = executor
            .execute(ProcessOptions::new(
                vec!["/definitely/not/here".into()],
                Cancellation::new(),
            ))
            .await;
        assert!(matches!(result, Err(LaunchError::Spawn { .. })));

        let result = executor
            .execute(ProcessOptions::new(vec![], Cancellation::new()))
            .await;
        assert!(matches!(result, Err(LaunchError::EmptyCommand)));
    }

    #[tokio::test]
    async fn test_missing_stdin_file_is_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor(dir.path());

        let result = executor
            .execute(
                ProcessOptions::new(vec!["cat".into()], Cancellation::new())
                    .with_stdin(dir.path().join("absent.in")),
            )
            .await;
        assert!(matches!(result, Err(LaunchError::Io(_))));
    }

    #[tokio::test]
    async fn test_execute_with_pipe_crosses_streams() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor(dir.path());
        let cancel = Cancellation::new();
        let timeout = Duration::from_secs(5);

        let (solution, interactor) = executor
            .execute_with_pipe(
                ProcessOptions::new(sh("read a; echo $((a + 1))"), cancel.clone())
                    .with_timeout(timeout),
                ProcessOptions::new(sh("echo 41; read b; echo \"got $b\" >&2"), cancel)
                    .with_timeout(timeout),
            )
            .await;
        let solution = solution.unwrap();
        let interactor = interactor.unwrap();

        assert_eq!(solution.status, ExitStatus::Code(0));
        assert_eq!(interactor.status, ExitStatus::Code(0));
        assert_eq!(read(&solution.stdout).await, "42\n");
        assert_eq!(read(&interactor.stdout).await, "41\n");
        assert_eq!(read(&interactor.stderr).await, "got 42\n");
    }

    #[tokio::test]
    async fn test_execute_with_pipe_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor(dir.path());

        let (first, second) = executor
            .execute_with_pipe(
                ProcessOptions::new(vec!["cat".into()], Cancellation::new()),
                ProcessOptions::new(vec!["/definitely/not/here".into()], Cancellation::new()),
            )
            .await;
        assert!(matches!(first, Err(LaunchError::PeerFailed)));
        assert!(matches!(second, Err(LaunchError::Spawn { .. })));
    }
}
