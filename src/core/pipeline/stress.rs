//! Generate, solve by brute force, judge, repeat: until the solution
//! disagrees with the brute force or the user stops the loop.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;

use crate::{
    config::StressTestSettings,
    core::{
        cancel::Cancellation,
        domain::{Overrides, Problem, TestCase},
        execution::LaunchError,
        fs::try_inline,
        pipeline::compiling::CompilerOrchestrator,
        traits::{
            compiler::CompileError,
            executor::{ProcessExecutor, ProcessOptions, ProcessOutput},
            judge::{Judge, JudgeContext, RecordingObserver},
        },
        verdict::Verdict,
    },
    judge::launch_command,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StressStage {
    Inactive,
    Compiling,
    Generating,
    RunningBruteForce,
    RunningSolution,
    FoundDifference,
    CompilationError,
    InternalError,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StressState {
    pub stage: StressStage,
    pub iterations: u64,
    pub msg: Option<String>,
}

impl Default for StressState {
    fn default() -> Self {
        Self {
            stage: StressStage::Inactive,
            iterations: 0,
            msg: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum StressError {
    #[error("stress testing needs both a generator and a brute force solution")]
    MissingPrograms,
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error("{0}")]
    Program(String),
    #[error("judging the solution failed: {0}")]
    Judge(String),
    #[error("the solution was rejected: {0}")]
    Rejected(String),
    #[error("failed to keep the counter-example: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
pub enum StressOutcome {
    /// The loop was stopped before a difference showed up.
    Cancelled { iterations: u64 },
    /// The counter-example, also appended to the problem's test cases.
    FoundDifference { iterations: u64, testcase: TestCase },
}

#[derive(Debug)]
pub struct StressTester {
    orchestrator: CompilerOrchestrator,
    executor: Arc<dyn ProcessExecutor>,
    judge: Arc<dyn Judge>,
    settings: StressTestSettings,
    inline_limit_bytes: u64,
    state: watch::Sender<StressState>,
}

enum Step {
    Output(ProcessOutput),
    Stopped,
}

impl StressTester {
    pub fn new(
        orchestrator: CompilerOrchestrator,
        executor: Arc<dyn ProcessExecutor>,
        judge: Arc<dyn Judge>,
        settings: StressTestSettings,
        inline_limit_bytes: u64,
    ) -> Self {
        let (state, _) = watch::channel(StressState::default());
        Self {
            orchestrator,
            executor,
            judge,
            settings,
            inline_limit_bytes,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StressState> {
        self.state.subscribe()
    }

    fn set_stage(&self, stage: StressStage, msg: Option<String>) {
        self.state.send_modify(|state| {
            state.stage = stage;
            state.msg = msg;
        });
    }

    #[tracing::instrument(skip_all, fields(problem = %problem.name))]
    pub async fn run(
        &self,
        problem: &mut Problem,
        force: bool,
        cancel: &Cancellation,
    ) -> Result<StressOutcome, StressError> {
        self.state.send_replace(StressState {
            stage: StressStage::Compiling,
            ..StressState::default()
        });
        let outcome = self.run_loop(problem, force, cancel).await;
        match &outcome {
            Ok(StressOutcome::Cancelled { .. }) => self.set_stage(StressStage::Inactive, None),
            Ok(StressOutcome::FoundDifference { .. }) => {
                self.set_stage(StressStage::FoundDifference, None)
            }
            Err(e @ StressError::Compile(_)) => {
                self.set_stage(StressStage::CompilationError, Some(e.to_string()))
            }
            Err(e) => {
                tracing::error!("Stress test stopped: {}", e);
                self.set_stage(StressStage::InternalError, Some(e.to_string()))
            }
        }
        outcome
    }

    async fn run_loop(
        &self,
        problem: &mut Problem,
        force: bool,
        cancel: &Cancellation,
    ) -> Result<StressOutcome, StressError> {
        let artifacts = self.orchestrator.compile_all(problem, force, cancel).await?;
        let stress = artifacts
            .stress_test
            .clone()
            .ok_or(StressError::MissingPrograms)?;
        let compiler = self.orchestrator.compiler().as_ref();
        let generator = launch_command(compiler, &stress.generator, &Overrides::default());
        let brute_force = launch_command(compiler, &stress.brute_force, &Overrides::default());

        let mut iterations = 0;
        loop {
            if cancel.is_cancelled() {
                return Ok(StressOutcome::Cancelled { iterations });
            }
            iterations += 1;
            self.state.send_modify(|state| state.iterations = iterations);

            self.set_stage(StressStage::Generating, None);
            let options = ProcessOptions::new(generator.clone(), cancel.clone())
                .with_timeout(Duration::from_millis(self.settings.generator_time_limit_ms));
            let Step::Output(generated) = self.run_program("Generator", options).await? else {
                return Ok(StressOutcome::Cancelled { iterations });
            };

            self.set_stage(StressStage::RunningBruteForce, None);
            let options = ProcessOptions::new(brute_force.clone(), cancel.clone())
                .with_stdin(generated.stdout.path())
                .with_timeout(Duration::from_millis(self.settings.brute_force_time_limit_ms));
            let Step::Output(expected) = self.run_program("Brute force", options).await? else {
                return Ok(StressOutcome::Cancelled { iterations });
            };

            self.set_stage(StressStage::RunningSolution, None);
            let ctx = JudgeContext {
                source: problem.source.clone(),
                overrides: problem.overrides.clone(),
                limits: problem.limits,
                input_path: generated.stdout.path().to_path_buf(),
                answer_path: expected.stdout.path().to_path_buf(),
                artifacts: artifacts.clone(),
            };
            let mut observer = RecordingObserver::default();
            self.judge.judge(&ctx, cancel, &mut observer).await;

            let result = match (observer.result, observer.error) {
                (Some(result), _) => result,
                (None, Some(e)) => return Err(StressError::Judge(e.to_string())),
                (None, None) => return Err(StressError::Judge("no verdict".to_string())),
            };
            tracing::debug!("Iteration {}: {}", iterations, result.verdict);

            match result.verdict {
                Verdict::Accepted => continue,
                Verdict::Rejected if cancel.is_cancelled() => {
                    return Ok(StressOutcome::Cancelled { iterations });
                }
                Verdict::Rejected => {
                    return Err(StressError::Rejected(
                        result.msg.unwrap_or_else(|| "no reason given".to_string()),
                    ));
                }
                verdict => {
                    tracing::info!("Found a difference after {} iterations: {}", iterations, verdict);
                    let input = try_inline(generated.stdout, self.inline_limit_bytes).await?;
                    let answer = try_inline(expected.stdout, self.inline_limit_bytes).await?;
                    let mut testcase =
                        TestCase::new(format!("stress-{}", iterations), input, answer);
                    testcase.apply_result(result);
                    problem.testcases.push(testcase.clone());
                    return Ok(StressOutcome::FoundDifference {
                        iterations,
                        testcase,
                    });
                }
            }
        }
    }

    /// Runs a helper program to completion. Anything short of a clean exit
    /// stops the loop, except a user abort which only ends it.
    async fn run_program(&self, name: &str, options: ProcessOptions) -> Result<Step, StressError> {
        let output = self.executor.execute(options).await?;
        if let Some(reason) = output.abort_reason {
            if reason.is_user_initiated() {
                return Ok(Step::Stopped);
            }
            return Err(StressError::Program(format!("{} timed out", name)));
        }
        if !output.status.is_success() {
            return Err(StressError::Program(format!(
                "{} exited with {}",
                name, output.status
            )));
        }
        Ok(Step::Output(output))
    }
}
