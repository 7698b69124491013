//! Supervisor used by the external runner strategy.
//!
//! Runs one program with its stdio redirected to files, kills it once the
//! time limit is over or `k` arrives on our own stdin, and prints a single
//! JSON report with CPU time and peak memory taken from `getrusage`.
//!
//! The program runs in its own process group, which is killed as a whole,
//! and gets SIGKILL if the supervisor dies first.

use std::fs::File;
use std::io::Read;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Child, Command};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use nix::sys::prctl::set_pdeathsig;
use nix::sys::resource::{Resource, UsageWho, getrlimit, getrusage, setrlimit};
use nix::sys::signal::{Signal, killpg};
use nix::sys::time::TimeVal;
use nix::unistd::{Pid, getpid, getppid};
use tracing_subscriber::EnvFilter;

use cph_judge::native::runner_report::{RunnerErrorKind, RunnerFailure, RunnerOutcome};

const POLL_INTERVAL: Duration = Duration::from_millis(2);

#[derive(Debug, Parser)]
#[command(name = "cph-runner", about = "Run a program and report its time and memory as JSON")]
struct Args {
    program: PathBuf,
    stdin: PathBuf,
    stdout: PathBuf,
    stderr: PathBuf,
    /// Milliseconds of wall time before the program is killed.
    #[arg(long, value_name = "MS")]
    time_limit: u64,
    #[arg(long)]
    unlimited_stack: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let abort = Arc::new(AtomicBool::new(false));
    watch_stdin(abort.clone());

    let report = match supervise(&args, &abort) {
        Ok(outcome) => serde_json::to_string(&outcome),
        Err(failure) => {
            tracing::error!("{}", failure);
            serde_json::to_string(&failure)
        }
    };
    match report {
        Ok(json) => println!("{}", json),
        Err(e) => {
            tracing::error!("Cannot serialize report: {}", e);
            std::process::exit(1);
        }
    }
}

/// Flags a soft kill request written to our stdin.
fn watch_stdin(abort: Arc<AtomicBool>) {
    thread::spawn(move || {
        let mut stdin = std::io::stdin();
        let mut byte = [0u8; 1];
        loop {
            match stdin.read(&mut byte) {
                Ok(0) | Err(_) => break,
                Ok(_) if byte[0] == b'k' => {
                    abort.store(true, Ordering::SeqCst);
                    break;
                }
                Ok(_) => {}
            }
        }
    });
}

fn failure(kind: RunnerErrorKind, error: &std::io::Error) -> RunnerFailure {
    RunnerFailure::new(kind, error.raw_os_error().unwrap_or(-1))
}

fn micros(time: TimeVal) -> f64 {
    time.tv_sec() as f64 * 1_000_000.0 + time.tv_usec() as f64
}

fn supervise(args: &Args, abort: &AtomicBool) -> Result<RunnerOutcome, RunnerFailure> {
    let stdin = File::open(&args.stdin)
        .map_err(|e| failure(RunnerErrorKind::CouldNotOpenInputFile, &e))?;
    let stdout = File::create(&args.stdout)
        .map_err(|e| failure(RunnerErrorKind::CouldNotCreateOutputFile, &e))?;
    let stderr = File::create(&args.stderr)
        .map_err(|e| failure(RunnerErrorKind::CouldNotCreateOutputFile, &e))?;

    let mut command = Command::new(&args.program);
    command
        .stdin(stdin)
        .stdout(stdout)
        .stderr(stderr)
        .process_group(0);
    let supervisor = getpid();
    let unlimited_stack = args.unlimited_stack;
    unsafe {
        command.pre_exec(move || {
            set_pdeathsig(Signal::SIGKILL)?;
            // We may have died before the death signal was armed.
            if getppid() != supervisor {
                return Err(std::io::Error::other("supervisor exited"));
            }
            if unlimited_stack {
                let (_, hard) = getrlimit(Resource::RLIMIT_STACK)?;
                setrlimit(Resource::RLIMIT_STACK, hard, hard)?;
            }
            Ok(())
        });
    }

    let start = Instant::now();
    let mut child = command
        .spawn()
        .map_err(|e| failure(RunnerErrorKind::CreateProcessFailed, &e))?;
    tracing::debug!("Started {} as {}", args.program.display(), child.id());

    let limit = Duration::from_millis(args.time_limit);
    let mut killed = false;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => return Err(failure(RunnerErrorKind::WaitForProcessFailed, &e)),
        }
        if !killed && (abort.load(Ordering::SeqCst) || start.elapsed() > limit) {
            kill_group(&mut child)?;
            killed = true;
        }
        thread::sleep(POLL_INTERVAL);
    };
    let wall = start.elapsed();

    let usage = getrusage(UsageWho::RUSAGE_CHILDREN)
        .map_err(|e| RunnerFailure::new(RunnerErrorKind::GetProcessTimesFailed, e as i32))?;
    let cpu = micros(usage.user_time()) + micros(usage.system_time());

    Ok(RunnerOutcome {
        error: false,
        killed,
        // CPU time says nothing about a program that was stopped while blocked.
        time: if killed { wall.as_micros() as f64 } else { cpu },
        memory: usage.max_rss() as f64 / 1024.0,
        exit_code: status.code().unwrap_or(0),
        signal: status.signal().unwrap_or(0),
    })
}

/// Kills everything the program started along with it.
fn kill_group(child: &mut Child) -> Result<(), RunnerFailure> {
    let group = Pid::from_raw(child.id() as i32);
    match killpg(group, Signal::SIGKILL) {
        Ok(()) => Ok(()),
        Err(errno) => {
            tracing::debug!("Cannot kill process group {}: {}", group, errno);
            child
                .kill()
                .map_err(|e| failure(RunnerErrorKind::TerminateProcessFailed, &e))
        }
    }
}
