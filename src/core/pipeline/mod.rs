//! Orchestration above single judgings: compiling everything a problem
//! needs, batch runs over its test cases and the stress test loop.

pub mod compiling;
pub mod running;
pub mod stress;

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use crate::core::{
        cancel::Cancellation,
        domain::{Artifact, Language},
        traits::judge::{Judge, JudgeContext, JudgeObserver},
        verdict::{FinalResult, Verdict},
    };

    pub(crate) fn built(source: &Path, language: Language) -> Artifact {
        Artifact {
            path: PathBuf::from("/cache").join(source.file_stem().unwrap()),
            hash: Some(format!("hash-{}", source.display())),
            language: Some(language),
        }
    }

    type Hook = Box<dyn Fn(usize) + Send + Sync>;

    /// Hands out queued verdicts (then accepted) and remembers every input it saw.
    /// A cancelled judging is rejected without using up a verdict; a scripted
    /// rejection carries the message of a conflicting configuration.
    pub(crate) struct ScriptedJudge {
        verdicts: Mutex<VecDeque<Verdict>>,
        inputs: Mutex<Vec<String>>,
        hook: Option<Hook>,
    }

    impl std::fmt::Debug for ScriptedJudge {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("ScriptedJudge")
                .field("verdicts", &self.verdicts)
                .finish()
        }
    }

    impl ScriptedJudge {
        pub(crate) fn new(verdicts: Vec<Verdict>) -> Self {
            Self {
                verdicts: Mutex::new(verdicts.into()),
                inputs: Mutex::new(Vec::new()),
                hook: None,
            }
        }

        /// Called with the call number before each judging.
        pub(crate) fn on_judge<F: Fn(usize) + Send + Sync + 'static>(mut self, hook: F) -> Self {
            self.hook = Some(Box::new(hook));
            self
        }

        pub(crate) fn inputs(&self) -> Vec<String> {
            self.inputs.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Judge for ScriptedJudge {
        async fn judge(
            &self,
            ctx: &JudgeContext,
            cancel: &Cancellation,
            observer: &mut dyn JudgeObserver,
        ) {
            let call = {
                let mut inputs = self.inputs.lock().unwrap();
                inputs.push(std::fs::read_to_string(&ctx.input_path).unwrap());
                inputs.len() - 1
            };
            if let Some(hook) = &self.hook {
                hook(call);
            }

            observer.on_status_change(Verdict::Running, None);
            observer.on_status_change(Verdict::Comparing, None);
            if cancel.is_cancelled() {
                observer.on_result(FinalResult::new(Verdict::Rejected));
                return;
            }
            let verdict = self
                .verdicts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Verdict::Accepted);
            let result = match verdict {
                Verdict::Rejected => FinalResult::new(verdict)
                    .with_msg("Cannot use both external runner and wrapper at the same time"),
                verdict => FinalResult::new(verdict).with_stats(5.0, None),
            };
            observer.on_result(result);
        }
    }
}
