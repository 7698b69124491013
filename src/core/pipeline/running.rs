use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::core::{
    cancel::{AbortReason, Cancellation},
    domain::{Problem, TestCase},
    fs::materialize,
    pipeline::compiling::CompilerOrchestrator,
    temp::{TempFile, TempPool},
    traits::judge::{Judge, JudgeContext, JudgeError, JudgeObserver},
    verdict::{FinalResult, Verdict},
};

/// Progress of a single test case, in the order it happened.
#[derive(Clone, Debug)]
pub enum TestcaseUpdate {
    Status {
        id: Uuid,
        verdict: Verdict,
        msg: Option<String>,
    },
    Result {
        id: Uuid,
        result: FinalResult,
    },
}

/// Stops a batch as a whole or just the test case being judged.
#[derive(Debug, Default)]
pub struct BatchControl {
    batch: Cancellation,
    current: Mutex<Cancellation>,
}

impl BatchControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch(&self) -> &Cancellation {
        &self.batch
    }

    /// No further test case starts; the running one is rejected.
    pub fn stop_all(&self) {
        self.batch.cancel(AbortReason::UserAbort);
    }

    /// Rejects the running test case; the rest of the batch goes on.
    pub fn stop_current(&self) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel(AbortReason::RerunScope);
    }

    fn begin_case(&self) -> Cancellation {
        let cancel = self.batch.child();
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = cancel.clone();
        cancel
    }
}

fn notify(updates: &UnboundedSender<TestcaseUpdate>, update: TestcaseUpdate) {
    if updates.send(update).is_err() {
        tracing::trace!("Nobody listens to test case updates");
    }
}

fn set_status(
    case: &mut TestCase,
    verdict: Verdict,
    msg: Option<String>,
    updates: &UnboundedSender<TestcaseUpdate>,
) {
    case.set_status(verdict, msg.clone());
    notify(
        updates,
        TestcaseUpdate::Status {
            id: case.id,
            verdict,
            msg,
        },
    );
}

fn set_result(case: &mut TestCase, result: FinalResult, updates: &UnboundedSender<TestcaseUpdate>) {
    case.apply_result(result.clone());
    notify(updates, TestcaseUpdate::Result { id: case.id, result });
}

/// Records what the judge reports on the test case and forwards it.
struct CaseObserver<'a> {
    case: &'a mut TestCase,
    updates: &'a UnboundedSender<TestcaseUpdate>,
}

impl JudgeObserver for CaseObserver<'_> {
    fn on_status_change(&mut self, verdict: Verdict, msg: Option<String>) {
        set_status(self.case, verdict, msg, self.updates);
    }

    fn on_result(&mut self, result: FinalResult) {
        set_result(self.case, result, self.updates);
    }

    fn on_error(&mut self, error: JudgeError) {
        tracing::error!("Judging {} failed: {}", self.case.name, error);
        set_result(
            self.case,
            FinalResult::new(Verdict::SystemError).with_msg(error.to_string()),
            self.updates,
        );
    }
}

/// Compiles a problem once and judges its enabled test cases in order.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    orchestrator: CompilerOrchestrator,
    judge: Arc<dyn Judge>,
    pool: Arc<TempPool>,
}

impl BatchRunner {
    pub fn new(orchestrator: CompilerOrchestrator, judge: Arc<dyn Judge>, pool: Arc<TempPool>) -> Self {
        Self {
            orchestrator,
            judge,
            pool,
        }
    }

    #[tracing::instrument(skip_all, fields(problem = %problem.name))]
    pub async fn run_all(
        &self,
        problem: &mut Problem,
        force: bool,
        control: &BatchControl,
        updates: &UnboundedSender<TestcaseUpdate>,
    ) {
        for case in problem.testcases.iter_mut().filter(|case| case.enabled) {
            case.reset();
            set_status(case, Verdict::Queued, None, updates);
        }
        for case in problem.testcases.iter_mut().filter(|case| case.enabled) {
            set_status(case, Verdict::Compiling, None, updates);
        }

        let artifacts = match self
            .orchestrator
            .compile_all(problem, force, control.batch())
            .await
        {
            Ok(artifacts) => artifacts,
            Err(e) => {
                tracing::info!("Compilation failed: {}", e);
                let result = FinalResult::new(e.verdict()).with_msg(e.to_string());
                for case in problem.testcases.iter_mut().filter(|case| case.enabled) {
                    set_result(case, result.clone(), updates);
                }
                return;
            }
        };

        for case in problem.testcases.iter_mut().filter(|case| case.enabled) {
            set_status(case, Verdict::Compiled, None, updates);
        }

        let template = JudgeContext {
            source: problem.source.clone(),
            overrides: problem.overrides.clone(),
            limits: problem.limits,
            input_path: Default::default(),
            answer_path: Default::default(),
            artifacts,
        };

        for case in problem.testcases.iter_mut().filter(|case| case.enabled) {
            if control.batch().is_cancelled() {
                set_status(case, Verdict::Skipped, None, updates);
                continue;
            }
            let cancel = control.begin_case();
            self.judge_case(case, &template, &cancel, updates).await;
        }
    }

    async fn judge_case(
        &self,
        case: &mut TestCase,
        template: &JudgeContext,
        cancel: &Cancellation,
        updates: &UnboundedSender<TestcaseUpdate>,
    ) {
        // Inline data is written to temp files that must outlive the judging.
        let staged = match self.stage(case).await {
            Ok(staged) => staged,
            Err(e) => {
                tracing::error!("Cannot prepare {}: {}", case.name, e);
                let result = FinalResult::new(Verdict::SystemError).with_msg(e.to_string());
                set_result(case, result, updates);
                return;
            }
        };
        let ctx = JudgeContext {
            input_path: staged.input,
            answer_path: staged.answer,
            ..template.clone()
        };

        let mut observer = CaseObserver { case, updates };
        self.judge.judge(&ctx, cancel, &mut observer).await;
        drop(staged.temps);
    }

    async fn stage(&self, case: &TestCase) -> std::io::Result<Staged> {
        let (input, input_temp) = materialize(&case.input, &self.pool).await?;
        let (answer, answer_temp) = materialize(&case.answer, &self.pool).await?;
        Ok(Staged {
            input,
            answer,
            temps: [input_temp, answer_temp].into_iter().flatten().collect(),
        })
    }
}

struct Staged {
    input: std::path::PathBuf,
    answer: std::path::PathBuf,
    temps: Vec<TempFile>,
}
