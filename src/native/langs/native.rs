//! C and C++, optionally relinked behind the timing wrapper.

use futures::future::try_join_all;

use super::{Toolchain, path_arg, split_args};
use crate::{
    constants::{HOOK_SOURCE, RENAMED_MAIN_SYMBOL, WRAPPER_SOURCE},
    core::{
        cancel::Cancellation,
        domain::{Artifact, Language, SourceFile},
        traits::compiler::{CompileError, CompileOptions},
    },
};

pub(super) async fn compile(
    toolchain: &Toolchain,
    language: Language,
    source: &SourceFile,
    cancel: &Cancellation,
    force: bool,
    options: &CompileOptions,
) -> Result<Artifact, CompileError> {
    let settings = &toolchain.settings.compilation;
    let (default_compiler, default_args) = match language {
        Language::C => (&settings.c_compiler, &settings.c_args),
        _ => (&settings.cpp_compiler, &settings.cpp_args),
    };
    let overrides = options.overrides.as_ref();
    let compiler = overrides
        .and_then(|o| o.compiler.clone())
        .unwrap_or_else(|| default_compiler.clone());
    let args = overrides
        .and_then(|o| o.compiler_args.clone())
        .unwrap_or_else(|| default_args.clone());
    let use_wrapper = options.allow_wrapper && settings.use_wrapper;
    let use_hook = use_wrapper && settings.use_hook;

    let output = toolchain.output_path(&source.path, "");
    let check = toolchain
        .check_hash(
            source,
            &output,
            &format!("{}{}{}{}", compiler, args, use_wrapper, use_hook),
            force,
        )
        .await?;
    if !check.skip {
        if use_wrapper {
            build_wrapped(toolchain, language, source, &compiler, &args, use_hook, &output, cancel)
                .await?;
        } else {
            let mut command = vec![compiler, path_arg(&source.path)];
            command.extend(split_args(&args));
            command.extend(["-o".to_string(), path_arg(&output)]);
            toolchain.execute_compiler(command, cancel).await?;
        }
        toolchain.record_hash(&output, &check.hash).await;
    }

    Ok(Artifact {
        path: output,
        hash: Some(check.hash),
        language: Some(language),
    })
}

/// Compiles the solution to an object, renames its `main`, and links it with
/// the wrapper (and the hook) into the final executable.
#[allow(clippy::too_many_arguments)]
async fn build_wrapped(
    toolchain: &Toolchain,
    language: Language,
    source: &SourceFile,
    compiler: &str,
    args: &str,
    use_hook: bool,
    output: &std::path::Path,
    cancel: &Cancellation,
) -> Result<(), CompileError> {
    let settings = &toolchain.settings.compilation;
    // The wrapper is C++ and needs the C++ runtime at link time.
    let cxx = &settings.cpp_compiler;
    let out = path_arg(output);

    let solution_obj = format!("{}.o", out);
    let mut compile_commands = vec![];
    let mut solution_cmd = vec![compiler.to_string(), path_arg(&source.path)];
    solution_cmd.extend(split_args(args));
    solution_cmd.extend(["-c".to_string(), "-o".to_string(), solution_obj.clone()]);
    compile_commands.push(solution_cmd);
    let mut objects = vec![solution_obj.clone()];

    let mut support = vec![("wrapper", WRAPPER_SOURCE)];
    if use_hook {
        support.push(("hook", HOOK_SOURCE));
    }
    for (name, code) in support {
        let src = toolchain.cache_dir().join(format!("{}.cpp", name));
        tokio::fs::write(&src, code).await?;
        let obj = format!("{}.{}.o", out, name);
        compile_commands.push(vec![
            cxx.clone(),
            "-fPIC".to_string(),
            "-c".to_string(),
            path_arg(&src),
            "-o".to_string(),
            obj.clone(),
        ]);
        objects.push(obj);
    }

    try_join_all(
        compile_commands
            .into_iter()
            .map(|command| toolchain.execute_compiler(command, cancel)),
    )
    .await?;

    toolchain
        .execute_compiler(
            vec![
                settings.objcopy.clone(),
                "--redefine-sym".to_string(),
                format!("main={}", RENAMED_MAIN_SYMBOL),
                solution_obj,
            ],
            cancel,
        )
        .await?;

    let mut link = vec![cxx.clone()];
    link.extend(objects);
    if language == Language::Cpp {
        link.extend(split_args(args));
    }
    link.extend(["-o".to_string(), out, "-ldl".to_string()]);
    toolchain.execute_compiler(link, cancel).await
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{
        config::Settings,
        core::{
            execution::ExitStatus,
            temp::TempPool,
            traits::{compiler::Compiler, executor::MockProcessExecutor},
        },
        native::{
            executor::NativeExecutor,
            langs::tests::{fake_build, process_output},
        },
    };

    fn settings(dir: &Path, use_wrapper: bool, use_hook: bool) -> Arc<Settings> {
        let mut settings = Settings::default();
        settings.cache.directory = dir.join("cache");
        settings.compilation.use_wrapper = use_wrapper;
        settings.compilation.use_hook = use_hook;
        Arc::new(settings)
    }

    async fn recorded_commands(
        dir: &Path,
        settings: Arc<Settings>,
        allow_wrapper: bool,
    ) -> Vec<Vec<String>> {
        let source_path = dir.join("a.cpp");
        tokio::fs::write(&source_path, "int main() {}").await.unwrap();
        let pool = TempPool::new(dir.join("tmp"));

        let commands = Arc::new(Mutex::new(Vec::new()));
        let recorded = commands.clone();
        let mut executor = MockProcessExecutor::new();
        executor.expect_execute().returning(move |options| {
            fake_build(&options.command);
            recorded.lock().unwrap().push(options.command.clone());
            Ok(process_output(&pool, ExitStatus::Code(0), None))
        });
        let toolchain = Toolchain::new(Arc::new(executor), settings);

        toolchain
            .compile(
                Language::Cpp,
                &SourceFile::new(&source_path),
                &Cancellation::new(),
                false,
                &CompileOptions {
                    allow_wrapper,
                    overrides: None,
                },
            )
            .await
            .unwrap();
        let commands = commands.lock().unwrap().clone();
        commands
    }

    #[tokio::test]
    async fn test_plain_build_is_single_command() {
        let dir = tempfile::tempdir().unwrap();
        let commands = recorded_commands(dir.path(), settings(dir.path(), false, false), true).await;

        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0][0], "g++");
        assert!(commands[0].contains(&"-O2".to_string()));
        assert!(!commands[0].contains(&"-c".to_string()));
    }

    #[tokio::test]
    async fn test_wrapper_needs_call_site_permission() {
        let dir = tempfile::tempdir().unwrap();
        let commands = recorded_commands(dir.path(), settings(dir.path(), true, false), false).await;
        assert_eq!(commands.len(), 1);
    }

    #[tokio::test]
    async fn test_wrapper_build_renames_main_and_links() {
        let dir = tempfile::tempdir().unwrap();
        let commands = recorded_commands(dir.path(), settings(dir.path(), true, true), true).await;

        // solution, wrapper and hook objects, then objcopy, then the link
        assert_eq!(commands.len(), 5);
        let objcopy = &commands[3];
        assert_eq!(objcopy[0], "objcopy");
        assert_eq!(objcopy[1], "--redefine-sym");
        assert_eq!(objcopy[2], "main=original_main");

        let link = &commands[4];
        assert_eq!(link.iter().filter(|arg| arg.ends_with(".o")).count(), 3);
        assert_eq!(link.last().map(String::as_str), Some("-ldl"));
        assert!(dir.path().join("cache/wrapper.cpp").exists());
        assert!(dir.path().join("cache/hook.cpp").exists());
    }

    fn gxx_available() -> bool {
        std::process::Command::new("g++")
            .arg("--version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
            && std::process::Command::new("objcopy")
                .arg("--version")
                .output()
                .map(|out| out.status.success())
                .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_real_wrapper_build_runs() {
        if !gxx_available() {
            eprintln!("g++ not found, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let source_path = dir.path().join("sum.cpp");
        tokio::fs::write(
            &source_path,
            "#include <iostream>\nint main() { int a, b; std::cin >> a >> b; std::cout << a + b << std::endl; }\n",
        )
        .await
        .unwrap();
        let pool = TempPool::new(dir.path().join("tmp"));
        let executor = Arc::new(NativeExecutor::new(
            pool.clone(),
            std::time::Duration::from_millis(200),
        ));
        let toolchain = Toolchain::new(executor, settings(dir.path(), true, false));

        let artifact = toolchain
            .compile(
                Language::Cpp,
                &SourceFile::new(&source_path),
                &Cancellation::new(),
                false,
                &CompileOptions {
                    allow_wrapper: true,
                    overrides: None,
                },
            )
            .await
            .unwrap();

        let report = dir.path().join("report.json");
        let output = std::process::Command::new(&artifact.path)
            .env(crate::constants::REPORT_PATH_ENV, &report)
            .stdin(std::fs::File::open({
                let input = dir.path().join("in.txt");
                std::fs::write(&input, "2 3\n").unwrap();
                input
            })
            .unwrap())
            .output()
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout), "5\n");
        let report = std::fs::read_to_string(report).unwrap();
        assert!(report.starts_with("{\"time\":"));
    }

    #[tokio::test]
    async fn test_hook_redirects_stream_opens_to_stdin() {
        if !gxx_available() {
            eprintln!("g++ not found, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let secret = dir.path().join("secret.txt");
        std::fs::write(&secret, "SECRET\n").unwrap();
        let source_path = dir.path().join("peek.cpp");
        tokio::fs::write(
            &source_path,
            format!(
                "#include <fstream>\n#include <iostream>\n#include <string>\n\
                 int main() {{ std::ifstream in(\"{}\"); std::string line; \
                 std::getline(in, line); std::cout << line << std::endl; }}\n",
                secret.display()
            ),
        )
        .await
        .unwrap();
        let pool = TempPool::new(dir.path().join("tmp"));
        let executor = Arc::new(NativeExecutor::new(
            pool.clone(),
            std::time::Duration::from_millis(200),
        ));
        let toolchain = Toolchain::new(executor, settings(dir.path(), true, true));

        let artifact = toolchain
            .compile(
                Language::Cpp,
                &SourceFile::new(&source_path),
                &Cancellation::new(),
                false,
                &CompileOptions {
                    allow_wrapper: true,
                    overrides: None,
                },
            )
            .await
            .unwrap();

        let input = dir.path().join("in.txt");
        std::fs::write(&input, "FROM-STDIN\n").unwrap();
        let report = dir.path().join("report.json");
        let output = std::process::Command::new(&artifact.path)
            .env(crate::constants::REPORT_PATH_ENV, &report)
            .stdin(std::fs::File::open(&input).unwrap())
            .output()
            .unwrap();

        assert_eq!(String::from_utf8_lossy(&output.stdout), "FROM-STDIN\n");
        // The wrapper's own report still reaches the disk.
        let report = std::fs::read_to_string(report).unwrap();
        assert!(report.starts_with("{\"time\":"));
    }
}
