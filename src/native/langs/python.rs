use std::path::Path;

use super::{Toolchain, path_arg, split_args};
use crate::{
    config::CompilationSettings,
    core::{
        cancel::Cancellation,
        domain::{Artifact, Language, Overrides, SourceFile},
        traits::compiler::{CompileError, CompileOptions},
    },
};

/// Byte-compiles the script, which also catches syntax errors up front.
pub(super) async fn compile(
    toolchain: &Toolchain,
    source: &SourceFile,
    cancel: &Cancellation,
    force: bool,
    options: &CompileOptions,
) -> Result<Artifact, CompileError> {
    let settings = &toolchain.settings.compilation;
    let overrides = options.overrides.as_ref();
    let compiler = overrides
        .and_then(|o| o.compiler.clone())
        .unwrap_or_else(|| settings.python_compiler.clone());
    let args = overrides
        .and_then(|o| o.compiler_args.clone())
        .unwrap_or_else(|| settings.python_args.clone());

    let output = toolchain.output_path(&source.path, ".pyc");
    let check = toolchain
        .check_hash(source, &output, &format!("{}{}", compiler, args), force)
        .await?;
    if !check.skip {
        let mut command = vec![
            compiler,
            "-c".to_string(),
            format!(
                "import py_compile; py_compile.compile(r'{}', cfile=r'{}', doraise=True)",
                path_arg(&source.path),
                path_arg(&output)
            ),
        ];
        command.extend(split_args(&args));
        toolchain.execute_compiler(command, cancel).await?;
        toolchain.record_hash(&output, &check.hash).await;
    }

    Ok(Artifact {
        path: output,
        hash: Some(check.hash),
        language: Some(Language::Python),
    })
}

pub(super) fn run_command(
    settings: &CompilationSettings,
    artifact: &Path,
    overrides: &Overrides,
) -> Vec<String> {
    let runner = overrides
        .runner
        .clone()
        .unwrap_or_else(|| settings.python_runner.clone());
    let run_args = overrides
        .runner_args
        .clone()
        .unwrap_or_else(|| settings.python_run_args.clone());

    let mut command = vec![runner];
    command.extend(split_args(&run_args));
    command.push(path_arg(artifact));
    command
}
