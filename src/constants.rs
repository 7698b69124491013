/// Environment variable naming the file the wrapper writes its timing report to.
pub const REPORT_PATH_ENV: &str = "CPH_JUDGE_REPORT_PATH";
/// Environment variable asking the wrapper to lift the stack size limit.
pub const UNLIMITED_STACK_ENV: &str = "CPH_JUDGE_UNLIMITED_STACK";

/// Written to a process' stdin to ask it to exit before it is killed.
pub const SOFT_KILL_SENTINEL: &[u8] = b"k\n";

/// The solution's `main` is renamed to this symbol when the wrapper is linked in.
pub const RENAMED_MAIN_SYMBOL: &str = "original_main";

pub const WRAPPER_SOURCE: &str = include_str!("../res/wrapper.cpp");
pub const HOOK_SOURCE: &str = include_str!("../res/hook.cpp");

pub const RUNNER_BINARY_NAME: &str = "cph-runner";

pub const COMPILE_TIMED_OUT_MSG: &str = "Compilation timed out";
pub const COMPILE_OUTPUT_MISSING_MSG: &str = "Compilation output does not exist";
