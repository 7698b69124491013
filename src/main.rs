use std::panic;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use itertools::Itertools;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use cph_judge::{
    config::Settings,
    core::{
        cancel::{AbortReason, Cancellation},
        domain::{Problem, TestCase, TestcaseIo},
        fs::{load_problem_dir, read_io},
        pipeline::{
            compiling::CompilerOrchestrator,
            running::{BatchControl, BatchRunner, TestcaseUpdate},
            stress::{StressOutcome, StressTester},
        },
        temp::TempPool,
        traits::{compiler::Compiler, executor::ProcessExecutor, judge::Judge},
    },
    judge::{JudgeDeps, JudgeService},
    native::{executor::NativeExecutor, langs::Toolchain},
};

#[derive(Debug, Parser)]
#[command(name = "cph-judge", version, about = "Compile, run and judge solutions locally")]
struct Cli {
    /// YAML settings file; defaults are used when omitted.
    #[arg(long, env = "CPH_JUDGE_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Judge every test case of a problem directory.
    Run {
        problem: PathBuf,
        /// Rebuild even when the sources did not change.
        #[arg(long)]
        force: bool,
    },
    /// Look for a counter-example with the generator and the brute force solution.
    Stress {
        problem: PathBuf,
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    set_panic_hook();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::from_yaml_file(path).await?,
        None => Settings::default(),
    };
    let settings = Arc::new(settings);

    let pool = TempPool::new(settings.cache.directory.join("tmp"));
    let executor: Arc<dyn ProcessExecutor> = Arc::new(NativeExecutor::new(
        pool.clone(),
        Duration::from_millis(settings.runner.soft_kill_grace_ms),
    ));
    let compiler: Arc<dyn Compiler> = Arc::new(Toolchain::new(executor.clone(), settings.clone()));

    let (dir, force) = match &cli.command {
        Command::Run { problem, force } | Command::Stress { problem, force } => (problem, *force),
    };
    let mut problem = load_problem_dir(dir, &settings.problem)
        .await
        .with_context(|| format!("cannot load problem from {}", dir.display()))?;
    tracing::info!(
        "Loaded {} with {} test cases",
        problem.name,
        problem.testcases.len()
    );

    let deps = JudgeDeps::native(executor.clone(), compiler.clone(), pool.clone(), settings.clone());
    let judge: Arc<dyn Judge> = Arc::new(JudgeService::for_problem(&problem, deps));
    let orchestrator = CompilerOrchestrator::new(compiler);

    match cli.command {
        Command::Run { .. } => {
            let runner = BatchRunner::new(orchestrator, judge, pool);
            run(&runner, &mut problem, force).await;
            print_summary(&problem);
        }
        Command::Stress { .. } => {
            let tester = StressTester::new(
                orchestrator,
                executor,
                judge,
                settings.stress_test.clone(),
                settings.problem.inline_limit_bytes,
            );
            stress(&tester, &mut problem, dir, force).await?;
        }
    }

    Ok(())
}

async fn run(runner: &BatchRunner, problem: &mut Problem, force: bool) {
    let control = Arc::new(BatchControl::new());
    let stopper = control.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping the run");
            stopper.stop_all();
        }
    });

    let names = problem
        .testcases
        .iter()
        .map(|case| (case.id, case.name.clone()))
        .collect::<std::collections::HashMap<_, _>>();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let progress = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            match update {
                TestcaseUpdate::Status { id, verdict, .. } => {
                    tracing::debug!("{}: {}", names.get(&id).map_or("?", String::as_str), verdict)
                }
                TestcaseUpdate::Result { id, result } => tracing::info!(
                    "{}: {}",
                    names.get(&id).map_or("?", String::as_str),
                    result.verdict.full_name()
                ),
            }
        }
    });

    runner.run_all(problem, force, &control, &tx).await;
    drop(tx);
    if let Err(e) = progress.await {
        tracing::warn!("Progress reporting stopped: {}", e);
    }
    interrupt.abort();
}

fn print_summary(problem: &Problem) {
    for case in &problem.testcases {
        let status = case.status.map_or("-", |verdict| verdict.abbr());
        let time = case
            .result
            .as_ref()
            .and_then(|result| result.time_ms)
            .map_or(String::new(), |time| format!("{:.0}ms", time));
        let msg = case.status_msg.as_deref().unwrap_or_default();
        println!("{:<16} {:<4} {:>8} {}", case.name, status, time, msg);
    }

    let counts = problem
        .testcases
        .iter()
        .filter_map(|case| case.result.as_ref().map(|result| result.verdict))
        .counts();
    let summary = counts
        .iter()
        .sorted_by_key(|(verdict, _)| verdict.abbr())
        .map(|(verdict, count)| format!("{} {}", count, verdict.abbr()))
        .join(", ");
    println!("{}", summary);
}

async fn stress(
    tester: &StressTester,
    problem: &mut Problem,
    dir: &Path,
    force: bool,
) -> anyhow::Result<()> {
    let cancel = Cancellation::new();
    let stopper = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping the stress test");
            stopper.cancel(AbortReason::UserAbort);
        }
    });

    let mut state = tester.subscribe();
    let watcher = tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let state = state.borrow_and_update().clone();
            tracing::debug!("Stress test {:?} after {} iterations", state.stage, state.iterations);
        }
    });

    let outcome = tester.run(problem, force, &cancel).await;
    watcher.abort();
    interrupt.abort();

    match outcome? {
        StressOutcome::Cancelled { iterations } => {
            println!("No difference found in {} iterations", iterations);
        }
        StressOutcome::FoundDifference {
            iterations,
            testcase,
        } => {
            let verdict = testcase
                .result
                .as_ref()
                .map_or("-", |result| result.verdict.abbr());
            println!("{} after {} iterations", verdict, iterations);
            let input = save_testcase(dir, &testcase).await?;
            println!("Counter-example saved to {}", input.display());
        }
    }
    Ok(())
}

/// Writes a test case next to the others so later runs pick it up. Existing
/// files are never overwritten: the name gets a `-2`, `-3`, ... suffix until
/// both the input and the answer file are free.
async fn save_testcase(dir: &Path, testcase: &TestCase) -> anyhow::Result<PathBuf> {
    let input_data = read_io(&testcase.input).await?;
    let answer_data = read_io(&testcase.answer).await?;

    let mut attempt = 1;
    let input = loop {
        let stem = match attempt {
            1 => testcase.name.clone(),
            n => format!("{}-{}", testcase.name, n),
        };
        attempt += 1;
        let input = dir.join(format!("{}.in", stem));
        let answer = dir.join(format!("{}.ans", stem));
        let Some(mut input_file) = create_new(&input).await? else {
            continue;
        };
        let Some(mut answer_file) = create_new(&answer).await? else {
            drop(input_file);
            tokio::fs::remove_file(&input)
                .await
                .with_context(|| format!("cannot remove {}", input.display()))?;
            continue;
        };
        for (file, data, path) in [
            (&mut input_file, &input_data, &input),
            (&mut answer_file, &answer_data, &answer),
        ] {
            file.write_all(data.as_bytes())
                .await
                .with_context(|| format!("cannot write {}", path.display()))?;
            file.flush().await?;
        }
        break input;
    };

    for io in [&testcase.input, &testcase.answer] {
        if let TestcaseIo::File(temp) = io {
            if let Err(e) = tokio::fs::remove_file(temp).await {
                tracing::debug!("Cannot remove {}: {}", temp.display(), e);
            }
        }
    }
    Ok(input)
}

/// Creates `path` only if nothing is there yet.
async fn create_new(path: &Path) -> anyhow::Result<Option<tokio::fs::File>> {
    match tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
    {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(e).with_context(|| format!("cannot create {}", path.display())),
    }
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
