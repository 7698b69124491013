//! Language toolchains: hash-checked incremental builds and run commands.

mod java;
mod javascript;
mod native;
mod python;
mod rust;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::{
    config::Settings,
    constants::{COMPILE_OUTPUT_MISSING_MSG, COMPILE_TIMED_OUT_MSG},
    core::{
        cancel::{AbortReason, Cancellation},
        domain::{Artifact, Language, Overrides, SourceFile},
        fs::read_text_or_empty,
        traits::{
            compiler::{CompileError, CompileOptions, Compiler},
            executor::{ProcessExecutor, ProcessOptions},
        },
    },
};

/// Compiles sources with the configured toolchains. Outputs live in the cache
/// directory next to a `.sha256` file holding the hash they were built from.
#[derive(Clone, Debug)]
pub struct Toolchain {
    executor: Arc<dyn ProcessExecutor>,
    settings: Arc<Settings>,
}

struct HashCheck {
    skip: bool,
    hash: String,
}

pub(crate) fn split_args(args: &str) -> impl Iterator<Item = String> + '_ {
    args.split_whitespace().map(str::to_string)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn sidecar(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".sha256");
    PathBuf::from(name)
}

impl Toolchain {
    pub fn new(executor: Arc<dyn ProcessExecutor>, settings: Arc<Settings>) -> Self {
        Toolchain { executor, settings }
    }

    fn cache_dir(&self) -> &Path {
        &self.settings.cache.directory
    }

    /// Deterministic output location. Sources sharing a file name in different
    /// directories get different outputs.
    fn output_path(&self, source: &Path, suffix: &str) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "source".to_string());
        let tag = hex::encode(Sha256::digest(source.as_os_str().as_encoded_bytes()));
        self.cache_dir()
            .join(format!("{}-{}{}", stem, &tag[..8], suffix))
    }

    async fn check_hash(
        &self,
        source: &SourceFile,
        output: &Path,
        extra: &str,
        force: bool,
    ) -> Result<HashCheck, CompileError> {
        let mut hasher = Sha256::new();
        hasher.update(tokio::fs::read(&source.path).await.map_err(|e| {
            CompileError::Internal {
                msg: format!("cannot read {}: {}", source.path.display(), e),
            }
        })?);
        hasher.update(extra.as_bytes());
        let hash = hex::encode(hasher.finalize());

        let output_exists = tokio::fs::try_exists(output).await.unwrap_or(false);
        let built_from = match &source.hash {
            Some(hash) => Some(hash.clone()),
            None => tokio::fs::read_to_string(sidecar(output))
                .await
                .ok()
                .map(|content| content.trim().to_string()),
        };
        if output_exists && !force && built_from.as_deref() == Some(hash.as_str()) {
            tracing::debug!(
                "Skipping compilation of {}, hash unchanged",
                source.path.display()
            );
            return Ok(HashCheck { skip: true, hash });
        }

        if output_exists {
            tokio::fs::remove_file(output).await?;
        }
        tracing::debug!("Compiling {} ({})", source.path.display(), hash);
        Ok(HashCheck { skip: false, hash })
    }

    async fn record_hash(&self, output: &Path, hash: &str) {
        if let Err(e) = tokio::fs::write(sidecar(output), hash).await {
            tracing::warn!("Failed to record build hash for {}: {}", output.display(), e);
        }
    }

    /// Runs one compiler command under the compile timeout.
    async fn execute_compiler(
        &self,
        command: Vec<String>,
        cancel: &Cancellation,
    ) -> Result<(), CompileError> {
        let timeout = Duration::from_millis(self.settings.compilation.timeout_ms);
        let output = self
            .executor
            .execute(ProcessOptions::new(command, cancel.clone()).with_timeout(timeout))
            .await?;

        match output.abort_reason {
            Some(AbortReason::Timeout) => {
                return Err(CompileError::Failed {
                    msg: COMPILE_TIMED_OUT_MSG.to_string(),
                });
            }
            Some(_) => return Err(CompileError::Aborted),
            None => {}
        }

        let mut diagnostics = read_text_or_empty(output.stdout.path()).await?;
        diagnostics.push_str(&read_text_or_empty(output.stderr.path()).await?);
        if !output.status.is_success() {
            if diagnostics.trim().is_empty() {
                diagnostics = format!("Compiler exited with {}", output.status);
            }
            return Err(CompileError::Failed { msg: diagnostics });
        }
        if !diagnostics.trim().is_empty() {
            tracing::debug!("Compiler output: {}", diagnostics.trim_end());
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Compiler for Toolchain {
    #[tracing::instrument(skip(self, cancel, options), fields(source = %source.path.display()))]
    async fn compile(
        &self,
        language: Language,
        source: &SourceFile,
        cancel: &Cancellation,
        force: bool,
        options: &CompileOptions,
    ) -> Result<Artifact, CompileError> {
        tokio::fs::create_dir_all(self.cache_dir()).await?;

        let artifact = match language {
            Language::C | Language::Cpp => {
                native::compile(self, language, source, cancel, force, options).await
            }
            Language::Rust => rust::compile(self, source, cancel, force, options).await,
            Language::Java => java::compile(self, source, cancel, force, options).await,
            Language::Python => python::compile(self, source, cancel, force, options).await,
            Language::JavaScript => javascript::compile(source),
        };
        let artifact = match artifact {
            Ok(artifact) => artifact,
            Err(e) => {
                tracing::warn!("Compilation of {} failed: {}", source.path.display(), e);
                return Err(e);
            }
        };

        if !tokio::fs::try_exists(&artifact.path).await.unwrap_or(false) {
            return Err(CompileError::Failed {
                msg: COMPILE_OUTPUT_MISSING_MSG.to_string(),
            });
        }
        Ok(artifact)
    }

    fn run_command(&self, language: Language, artifact: &Path, overrides: &Overrides) -> Vec<String> {
        let compilation = &self.settings.compilation;
        match language {
            Language::C | Language::Cpp | Language::Rust => vec![path_arg(artifact)],
            Language::Java => java::run_command(compilation, artifact, overrides),
            Language::Python => python::run_command(compilation, artifact, overrides),
            Language::JavaScript => javascript::run_command(compilation, artifact, overrides),
        }
    }
}
