use std::sync::Arc;

use crate::core::{
    cancel::Cancellation,
    domain::{Artifact, CompileArtifacts, Language, Problem, SourceFile, StressTestArtifacts},
    traits::compiler::{CompileError, CompileOptions, Compiler},
};

/// Compiles everything a problem needs, one program at a time.
#[derive(Debug, Clone)]
pub struct CompilerOrchestrator {
    compiler: Arc<dyn Compiler>,
}

impl CompilerOrchestrator {
    pub fn new(compiler: Arc<dyn Compiler>) -> Self {
        Self { compiler }
    }

    pub fn compiler(&self) -> &Arc<dyn Compiler> {
        &self.compiler
    }

    /// Compiles the solution, then the checker, the interactor and the
    /// stress test programs. The first failure aborts the whole call. Build
    /// hashes of the compiled sources are written back into `problem`.
    #[tracing::instrument(skip_all, fields(problem = %problem.name, force))]
    pub async fn compile_all(
        &self,
        problem: &mut Problem,
        force: bool,
        cancel: &Cancellation,
    ) -> Result<CompileArtifacts, CompileError> {
        let language = Language::from_path(&problem.source.path).ok_or_else(|| {
            CompileError::Unsupported(problem.source.path.display().to_string())
        })?;
        let options = CompileOptions {
            allow_wrapper: true,
            overrides: Some(problem.overrides.clone()),
        };
        let solution = self
            .compiler
            .compile(language, &problem.source, cancel, force, &options)
            .await?;
        problem.source.hash = solution.hash.clone();
        tracing::debug!("Solution compiled to {}", solution.path.display());

        let checker = self.compile_optional(problem.checker.as_mut(), force, cancel).await?;
        let interactor = self
            .compile_optional(problem.interactor.as_mut(), force, cancel)
            .await?;

        let stress_test = match (problem.generator.as_mut(), problem.brute_force.as_mut()) {
            (Some(generator), Some(brute_force)) => Some(StressTestArtifacts {
                generator: self.compile_auxiliary(generator, force, cancel).await?,
                brute_force: self.compile_auxiliary(brute_force, force, cancel).await?,
            }),
            _ => None,
        };

        Ok(CompileArtifacts {
            solution,
            checker,
            interactor,
            stress_test,
        })
    }

    async fn compile_optional(
        &self,
        source: Option<&mut SourceFile>,
        force: bool,
        cancel: &Cancellation,
    ) -> Result<Option<Artifact>, CompileError> {
        match source {
            Some(source) => Ok(Some(self.compile_auxiliary(source, force, cancel).await?)),
            None => Ok(None),
        }
    }

    /// Sources in no known language are taken to be runnable already.
    async fn compile_auxiliary(
        &self,
        source: &mut SourceFile,
        force: bool,
        cancel: &Cancellation,
    ) -> Result<Artifact, CompileError> {
        let Some(language) = Language::from_path(&source.path) else {
            tracing::debug!("Using {} as it is", source.path.display());
            return Ok(Artifact::passthrough(source));
        };
        let artifact = self
            .compiler
            .compile(language, source, cancel, force, &CompileOptions::default())
            .await?;
        source.hash = artifact.hash.clone();
        Ok(artifact)
    }
}
