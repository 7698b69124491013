use std::path::Path;

use super::{path_arg, split_args};
use crate::{
    config::CompilationSettings,
    core::{
        domain::{Artifact, Overrides, SourceFile},
        traits::compiler::CompileError,
    },
};

/// Scripts run as they are.
pub(super) fn compile(source: &SourceFile) -> Result<Artifact, CompileError> {
    Ok(Artifact::passthrough(source))
}

pub(super) fn run_command(
    settings: &CompilationSettings,
    artifact: &Path,
    overrides: &Overrides,
) -> Vec<String> {
    let runner = overrides
        .runner
        .clone()
        .unwrap_or_else(|| settings.javascript_runner.clone());
    let run_args = overrides
        .runner_args
        .clone()
        .unwrap_or_else(|| settings.javascript_run_args.clone());

    let mut command = vec![runner];
    command.extend(split_args(&run_args));
    command.push(path_arg(artifact));
    command
}
