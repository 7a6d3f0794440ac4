use std::borrow::Cow;
use std::time::Duration;

use serde_json::Value;

/// Untrusted program text that passed admission by
/// [`ResourceLimits::admit`](crate::core::limits::ResourceLimits::admit).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceProgram(String);

impl SourceProgram {
    pub(crate) fn admitted(code: String) -> Self {
        SourceProgram(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// What came out of one execution unit. Built once by the executor and only
/// read afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub truncated_stdout: bool,
    pub truncated_stderr: bool,
    pub duration_ms: u64,
    pub launch_error: Option<String>,
}

impl ExecutionOutcome {
    pub fn launch_failed(msg: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            duration_ms,
            launch_error: Some(msg.into()),
            ..Self::default()
        }
    }

    /// Partial output is dropped on purpose: a killed unit reports only the
    /// timeout.
    pub fn timed_out(limit: Duration, duration_ms: u64) -> Self {
        Self {
            stderr: timeout_message(limit),
            timed_out: true,
            duration_ms,
            ..Self::default()
        }
    }

    /// Stderr as the caller sees it. A unit that never launched reports its
    /// launch error here.
    pub fn effective_stderr(&self) -> Cow<'_, str> {
        match &self.launch_error {
            Some(msg) if self.stderr.is_empty() => Cow::Owned(format!("Execution error: {}", msg)),
            _ => Cow::Borrowed(&self.stderr),
        }
    }

    /// Stderr present while stdout is empty. Any stdout at all, even unrelated,
    /// means the program counts as having run.
    pub fn failed_to_run(&self) -> bool {
        !self.effective_stderr().is_empty() && self.stdout.is_empty()
    }
}

pub fn timeout_message(limit: Duration) -> String {
    format!(
        "Execution timeout ({} seconds exceeded)",
        limit.as_secs_f64()
    )
}

#[derive(Clone, Debug, PartialEq)]
pub struct TestSpec {
    pub description: Option<String>,
    pub check: Check,
}

impl TestSpec {
    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or("Test")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Check {
    Output { expected: Value },
    VariableExists { variable: String },
    /// `expected_type` is echoed back as sent; only a known type name can match.
    VariableType { variable: String, expected_type: Value },
    VariableValue { variable: String, expected: Value },
    FunctionCall { expected: Value },
    ListContains { variable: String, expected: Value },
    ListLength { variable: String, expected: Value },
    /// Unrecognised or non-string `type`, `Null` when absent.
    Unknown { kind: Value },
}

#[derive(Clone, Debug, PartialEq)]
pub struct TestVerdict {
    pub description: String,
    pub passed: bool,
    pub expected: Option<Value>,
    pub actual: Option<Value>,
    pub error: Option<String>,
}

impl TestVerdict {
    pub fn judged(
        description: &str,
        passed: bool,
        expected: impl Into<Value>,
        actual: impl Into<Value>,
    ) -> Self {
        Self {
            description: description.to_string(),
            passed,
            expected: Some(expected.into()),
            actual: Some(actual.into()),
            error: None,
        }
    }

    pub fn errored(description: &str, error: impl Into<String>) -> Self {
        Self {
            description: description.to_string(),
            passed: false,
            expected: None,
            actual: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub test_results: Vec<TestVerdict>,
    pub execution_time_ms: u64,
    pub all_passed: bool,
}
