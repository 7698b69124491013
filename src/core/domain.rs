use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::verdict::{FinalResult, Verdict};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Language {
    C,
    Cpp,
    Rust,
    Java,
    Python,
    JavaScript,
}

impl Language {
    pub const ALL: [Language; 6] = [
        Language::C,
        Language::Cpp,
        Language::Rust,
        Language::Java,
        Language::Python,
        Language::JavaScript,
    ];

    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|lang| lang.extensions().contains(&ext.as_str()))
    }

    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Language::C => &["c"],
            Language::Cpp => &["cpp", "cc", "cxx", "c++"],
            Language::Rust => &["rs"],
            Language::Java => &["java"],
            Language::Python => &["py"],
            Language::JavaScript => &["js"],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Language::C => "C",
            Language::Cpp => "C++",
            Language::Rust => "Rust",
            Language::Java => "Java",
            Language::Python => "Python",
            Language::JavaScript => "JavaScript",
        }
    }

    /// Only toolchains producing relinkable object files can take the
    /// timing wrapper.
    pub fn supports_wrapper(self) -> bool {
        matches!(self, Language::C | Language::Cpp)
    }
}

/// A tracked source file. `hash` is the build hash of the last successful
/// compilation, if any.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: PathBuf,
    #[serde(default)]
    pub hash: Option<String>,
}

impl SourceFile {
    pub fn new<T: AsRef<Path>>(path: T) -> Self {
        Self {
            path: path.as_ref().into(),
            hash: None,
        }
    }
}

/// Per-problem replacements for the configured toolchain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Overrides {
    pub compiler: Option<String>,
    pub compiler_args: Option<String>,
    pub runner: Option<String>,
    pub runner_args: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    pub time_limit_ms: u64,
    pub memory_limit_mb: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub hash: Option<String>,
    /// Language whose runner launches the artifact; `None` for programs
    /// that are executed directly.
    pub language: Option<Language>,
}

impl Artifact {
    /// A script that is run as it is.
    pub fn passthrough(source: &SourceFile) -> Self {
        Self {
            path: source.path.clone(),
            hash: source.hash.clone(),
            language: Language::from_path(&source.path),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StressTestArtifacts {
    pub generator: Artifact,
    pub brute_force: Artifact,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompileArtifacts {
    pub solution: Artifact,
    pub checker: Option<Artifact>,
    pub interactor: Option<Artifact>,
    pub stress_test: Option<StressTestArtifacts>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestcaseIo {
    Inline(String),
    File(PathBuf),
}

impl Default for TestcaseIo {
    fn default() -> Self {
        TestcaseIo::Inline(String::new())
    }
}

#[derive(Clone, Debug)]
pub struct TestCase {
    pub id: Uuid,
    pub name: String,
    pub input: TestcaseIo,
    pub answer: TestcaseIo,
    pub enabled: bool,
    pub status: Option<Verdict>,
    pub status_msg: Option<String>,
    pub result: Option<FinalResult>,
}

impl TestCase {
    pub fn new<T: Into<String>>(name: T, input: TestcaseIo, answer: TestcaseIo) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            input,
            answer,
            enabled: true,
            status: None,
            status_msg: None,
            result: None,
        }
    }

    pub fn reset(&mut self) {
        self.status = None;
        self.status_msg = None;
        self.result = None;
    }

    /// Records a progress state. The last retained result is left alone.
    pub fn set_status(&mut self, verdict: Verdict, msg: Option<String>) {
        self.status = Some(verdict);
        self.status_msg = msg;
    }

    /// Records an outcome. Only terminal verdicts are retained as the result.
    pub fn apply_result(&mut self, result: FinalResult) {
        self.status = Some(result.verdict);
        self.status_msg = result.msg.clone();
        if result.verdict.is_terminal() {
            self.result = Some(result);
        }
    }
}

#[derive(Clone, Debug)]
pub struct Problem {
    pub name: String,
    pub source: SourceFile,
    pub checker: Option<SourceFile>,
    pub interactor: Option<SourceFile>,
    pub generator: Option<SourceFile>,
    pub brute_force: Option<SourceFile>,
    pub overrides: Overrides,
    pub limits: Limits,
    pub testcases: Vec<TestCase>,
}

impl Problem {
    pub fn new<T: Into<String>>(name: T, source: SourceFile, limits: Limits) -> Self {
        Self {
            name: name.into(),
            source,
            checker: None,
            interactor: None,
            generator: None,
            brute_force: None,
            overrides: Overrides::default(),
            limits,
            testcases: Vec::new(),
        }
    }
}
