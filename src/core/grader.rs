//! Output comparison and testlib exit-code mapping.

use crate::{config::ComparingSettings, core::verdict::Verdict};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompareOptions {
    /// Ignore anything the program printed to stderr.
    pub ignore_error: bool,
    /// Output longer than `expected * ole_size` is rejected. Zero disables the check.
    pub ole_size: f64,
    pub regard_pe_as_ac: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            ignore_error: true,
            ole_size: 0.0,
            regard_pe_as_ac: false,
        }
    }
}

impl From<&ComparingSettings> for CompareOptions {
    fn from(settings: &ComparingSettings) -> Self {
        Self {
            ignore_error: settings.ignore_error,
            ole_size: settings.ole_size,
            regard_pe_as_ac: settings.regard_pe_as_ac,
        }
    }
}

fn normalize(text: &str) -> String {
    text.trim_end()
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

fn compress(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

pub fn compare_strings(
    actual: &str,
    expected: &str,
    stderr: &str,
    options: &CompareOptions,
) -> Verdict {
    if !options.ignore_error && !stderr.trim().is_empty() {
        return Verdict::RuntimeError;
    }

    let fixed_actual = normalize(actual);
    let fixed_expected = normalize(expected);

    if options.ole_size > 0.0
        && fixed_actual.len() as f64 > fixed_expected.len() as f64 * options.ole_size
    {
        return Verdict::OutputLimitExceeded;
    }

    if compress(actual) != compress(expected) {
        return Verdict::WrongAnswer;
    }

    if fixed_actual != fixed_expected && !options.regard_pe_as_ac {
        return Verdict::PresentationError;
    }

    Verdict::Accepted
}

/// Maps a checker or interactor exit code following the testlib convention.
pub fn map_testlib_exit_code(code: i32) -> (Verdict, Option<String>) {
    match code {
        0 => (Verdict::Accepted, None),
        1 => (Verdict::WrongAnswer, None),
        2 => (Verdict::PresentationError, None),
        3 => (Verdict::SystemError, None),
        4 => (Verdict::WrongAnswer, Some("Unexpected EOF".to_string())),
        7 => (Verdict::PartiallyCorrect, None),
        other => (
            Verdict::SystemError,
            Some(format!("Unknown testlib code: {}", other)),
        ),
    }
}
