use super::{Toolchain, path_arg, split_args};
use crate::core::{
    cancel::Cancellation,
    domain::{Artifact, Language, SourceFile},
    traits::compiler::{CompileError, CompileOptions},
};

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
        .unwrap_or_else(|| settings.rust_compiler.clone());
    let args = overrides
        .and_then(|o| o.compiler_args.clone())
        .unwrap_or_else(|| settings.rust_args.clone());

    let output = toolchain.output_path(&source.path, "");
    let check = toolchain
        .check_hash(source, &output, &format!("{}{}", compiler, args), force)
        .await?;
    if !check.skip {
        let mut command = vec![compiler, path_arg(&source.path)];
        command.extend(split_args(&args));
        command.extend(["-o".to_string(), path_arg(&output)]);
        toolchain.execute_compiler(command, cancel).await?;
        toolchain.record_hash(&output, &check.hash).await;
    }

    Ok(Artifact {
        path: output,
        hash: Some(check.hash),
        language: Some(Language::Rust),
    })
}
