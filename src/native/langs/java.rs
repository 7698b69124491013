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

/// Classes go to a directory of their own per source, since the class file
/// name has to match the public class.
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
        .unwrap_or_else(|| settings.java_compiler.clone());
    let args = overrides
        .and_then(|o| o.compiler_args.clone())
        .unwrap_or_else(|| settings.java_args.clone());

    let class_dir = toolchain.output_path(&source.path, ".classes");
    let class_name = source
        .path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let output = class_dir.join(format!("{}.class", class_name));

    tokio::fs::create_dir_all(&class_dir).await?;
    let check = toolchain
        .check_hash(source, &output, &format!("{}{}", compiler, args), force)
        .await?;
    if !check.skip {
        let mut command = vec![compiler];
        command.extend(split_args(&args));
        command.extend(["-d".to_string(), path_arg(&class_dir), path_arg(&source.path)]);
        toolchain.execute_compiler(command, cancel).await?;
        toolchain.record_hash(&output, &check.hash).await;
    }

    Ok(Artifact {
        path: output,
        hash: Some(check.hash),
        language: Some(Language::Java),
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
        .unwrap_or_else(|| settings.java_runner.clone());
    let run_args = overrides
        .runner_args
        .clone()
        .unwrap_or_else(|| settings.java_run_args.clone());

    let class_dir = artifact.parent().unwrap_or(Path::new("."));
    let class_name = artifact
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut command = vec![runner];
    command.extend(split_args(&run_args));
    command.extend(["-cp".to_string(), path_arg(class_dir), class_name]);
    command
}
