//! Judge settings.
//!
//! Every field has a default so a partial (or missing) YAML file is valid.
//! Settings are read once at startup and shared as `Arc<Settings>`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub compilation: CompilationSettings,
    pub runner: RunnerSettings,
    pub comparing: ComparingSettings,
    pub stress_test: StressTestSettings,
    pub cache: CacheSettings,
    pub problem: ProblemSettings,
}

impl Settings {
    pub fn from_yaml_str(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    pub async fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_yaml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CompilationSettings {
    pub c_compiler: String,
    pub c_args: String,
    pub cpp_compiler: String,
    pub cpp_args: String,
    pub rust_compiler: String,
    pub rust_args: String,
    pub java_compiler: String,
    pub java_args: String,
    pub java_runner: String,
    pub java_run_args: String,
    pub python_compiler: String,
    pub python_args: String,
    pub python_runner: String,
    pub python_run_args: String,
    pub javascript_runner: String,
    pub javascript_run_args: String,
    pub objcopy: String,
    pub use_wrapper: bool,
    pub use_hook: bool,
    pub timeout_ms: u64,
}

impl Default for CompilationSettings {
    fn default() -> Self {
        Self {
            c_compiler: "gcc".to_string(),
            c_args: "-O2".to_string(),
            cpp_compiler: "g++".to_string(),
            cpp_args: "-O2 -std=c++17".to_string(),
            rust_compiler: "rustc".to_string(),
            rust_args: "-O".to_string(),
            java_compiler: "javac".to_string(),
            java_args: String::new(),
            java_runner: "java".to_string(),
            java_run_args: String::new(),
            python_compiler: "python3".to_string(),
            python_args: String::new(),
            python_runner: "python3".to_string(),
            python_run_args: String::new(),
            javascript_runner: "node".to_string(),
            javascript_run_args: String::new(),
            objcopy: "objcopy".to_string(),
            use_wrapper: false,
            use_hook: false,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    /// Slack added to every time limit before the process is killed.
    pub time_addition_ms: u64,
    pub use_runner: bool,
    pub unlimited_stack: bool,
    /// How long a soft-killed process gets before it is killed for real.
    pub soft_kill_grace_ms: u64,
    /// Explicit path of the `cph-runner` supervisor.
    pub runner_path: Option<PathBuf>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            time_addition_ms: 1_000,
            use_runner: false,
            unlimited_stack: false,
            soft_kill_grace_ms: 500,
            runner_path: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ComparingSettings {
    pub ignore_error: bool,
    /// Output longer than `expected * ole_size` is output-limit-exceeded. 0 disables the check.
    pub ole_size: f64,
    pub regard_pe_as_ac: bool,
}

impl Default for ComparingSettings {
    fn default() -> Self {
        Self {
            ignore_error: true,
            ole_size: 3.0,
            regard_pe_as_ac: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StressTestSettings {
    pub generator_time_limit_ms: u64,
    pub brute_force_time_limit_ms: u64,
}

impl Default for StressTestSettings {
    fn default() -> Self {
        Self {
            generator_time_limit_ms: 2_000,
            brute_force_time_limit_ms: 5_000,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub directory: PathBuf,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            directory: std::env::temp_dir().join("cph-judge"),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ProblemSettings {
    pub default_time_limit_ms: u64,
    pub default_memory_limit_mb: u64,
    /// Outputs up to this size are kept in memory on the result record.
    pub inline_limit_bytes: u64,
}

impl Default for ProblemSettings {
    fn default() -> Self {
        Self {
            default_time_limit_ms: 1_000,
            default_memory_limit_mb: 512,
            inline_limit_bytes: 4 * 1024,
        }
    }
}
