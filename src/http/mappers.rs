use serde_json::Value;

use crate::{
    core::domain::{Check, RunResult, TestSpec, TestVerdict},
    http::models::{RunResponse, TestSpecPayload, TestVerdictPayload},
};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },
}

impl TryFrom<TestSpecPayload> for TestSpec {
    type Error = ConversionError;

    fn try_from(payload: TestSpecPayload) -> Result<Self, ConversionError> {
        let TestSpecPayload {
            kind,
            description,
            variable,
            expected,
            expected_type,
        } = payload;

        let require_variable = || {
            variable.clone().ok_or_else(|| ConversionError::MissingField {
                field: "variable".to_string(),
            })
        };
        // stdout checks compare against empty text when nothing was given
        let expected_text = || expected.clone().unwrap_or_else(|| Value::from(""));
        let expected_value = || expected.clone().unwrap_or(Value::Null);

        let check = match kind.as_ref().and_then(Value::as_str) {
            Some("output") => Check::Output {
                expected: expected_text(),
            },
            Some("variable_exists") => Check::VariableExists {
                variable: require_variable()?,
            },
            Some("variable_type") => Check::VariableType {
                variable: require_variable()?,
                expected_type: expected_type.unwrap_or(Value::Null),
            },
            Some("variable_value") => Check::VariableValue {
                variable: require_variable()?,
                expected: expected_value(),
            },
            Some("function_call") => Check::FunctionCall {
                expected: expected_text(),
            },
            Some("list_contains") => Check::ListContains {
                variable: require_variable()?,
                expected: expected_value(),
            },
            Some("list_length") => Check::ListLength {
                variable: require_variable()?,
                expected: expected_value(),
            },
            _ => Check::Unknown {
                kind: kind.clone().unwrap_or(Value::Null),
            },
        };

        let description = match description {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(text),
            Some(other) => Some(other.to_string()),
        };

        Ok(TestSpec { description, check })
    }
}

impl From<TestVerdict> for TestVerdictPayload {
    fn from(verdict: TestVerdict) -> Self {
        Self {
            description: verdict.description,
            passed: verdict.passed,
            expected: verdict.expected,
            actual: verdict.actual,
            error: verdict.error,
        }
    }
}

impl From<RunResult> for RunResponse {
    fn from(result: RunResult) -> Self {
        Self {
            success: result.success,
            stdout: result.stdout,
            stderr: result.stderr,
            test_results: result.test_results.into_iter().map(Into::into).collect(),
            execution_time_ms: result.execution_time_ms,
            all_passed: result.all_passed,
        }
    }
}
