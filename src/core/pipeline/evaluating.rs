use serde_json::Value;

use crate::core::{
    domain::{Check, ExecutionOutcome, TestSpec, TestVerdict},
    inspect::{
        LiteralType, count_list_items, first_assignment, first_list_literal, has_assignment,
        infer_literal_type,
    },
    render::{display_text, dumps_text},
};

/// One verdict per test, in input order. Every test sees the same outcome and
/// none depends on another.
#[tracing::instrument(skip_all, fields(tests = tests.len()))]
pub fn evaluate_all(source: &str, outcome: &ExecutionOutcome, tests: &[TestSpec]) -> Vec<TestVerdict> {
    tests
        .iter()
        .map(|test| evaluate(source, outcome, test))
        .collect()
}

pub fn evaluate(source: &str, outcome: &ExecutionOutcome, test: &TestSpec) -> TestVerdict {
    if outcome.failed_to_run() {
        return TestVerdict {
            actual: Some(Value::from("Execution error")),
            ..TestVerdict::errored(test.description(), outcome.effective_stderr())
        };
    }

    let description = test.description();
    let stdout = outcome.stdout.as_str();

    match &test.check {
        Check::Output { expected } => check_output(description, stdout, expected),
        Check::VariableExists { variable } => check_variable_exists(description, source, variable),
        Check::VariableType {
            variable,
            expected_type,
        } => check_variable_type(description, source, variable, expected_type),
        Check::VariableValue { variable, expected } => {
            check_variable_value(description, source, variable, expected)
        }
        Check::FunctionCall { expected } => check_function_call(description, stdout, expected),
        Check::ListContains { variable, expected } => {
            check_list_contains(description, source, variable, expected)
        }
        Check::ListLength { variable, expected } => {
            check_list_length(description, source, variable, expected)
        }
        Check::Unknown { kind } => TestVerdict::errored(
            description,
            format!("Unknown test type: {}", display_text(kind)),
        ),
    }
}

fn check_output(description: &str, stdout: &str, expected: &Value) -> TestVerdict {
    let expected = display_text(expected);
    let expected = expected.trim();
    let actual = stdout.trim();

    TestVerdict::judged(description, actual == expected, expected, actual)
}

fn check_variable_exists(description: &str, source: &str, variable: &str) -> TestVerdict {
    let exists = has_assignment(source, variable);

    TestVerdict::judged(
        description,
        exists,
        format!("Variable '{}' should exist", variable),
        if exists { "Found" } else { "Not found" },
    )
}

fn check_variable_type(
    description: &str,
    source: &str,
    variable: &str,
    expected_type: &Value,
) -> TestVerdict {
    let Some(value) = first_assignment(source, variable) else {
        return TestVerdict::judged(
            description,
            false,
            expected_type.clone(),
            "Variable not found",
        );
    };

    let actual = infer_literal_type(value);
    let passed = expected_type.as_str().and_then(LiteralType::parse) == Some(actual);

    TestVerdict::judged(description, passed, expected_type.clone(), actual.name())
}

fn check_variable_value(
    description: &str,
    source: &str,
    variable: &str,
    expected: &Value,
) -> TestVerdict {
    let Some(actual) = first_assignment(source, variable) else {
        return TestVerdict::judged(description, false, expected.clone(), "Variable not found");
    };

    let wanted = display_text(expected);
    let passed = actual == wanted
        || actual == format!("\"{}\"", wanted)
        || actual == format!("'{}'", wanted);

    TestVerdict::judged(description, passed, expected.clone(), actual)
}

fn check_function_call(description: &str, stdout: &str, expected: &Value) -> TestVerdict {
    let expected = display_text(expected);
    let expected = expected.trim();
    let passed = stdout.split('\n').any(|line| line.trim() == expected);

    TestVerdict::judged(description, passed, expected, stdout)
}

fn check_list_contains(
    description: &str,
    source: &str,
    variable: &str,
    expected: &Value,
) -> TestVerdict {
    let Some(content) = first_list_literal(source, variable) else {
        return TestVerdict::judged(description, false, expected.clone(), "List not found");
    };

    let wanted = display_text(expected);
    let passed = content.contains(&dumps_text(expected))
        || content.contains(&format!("'{}'", wanted))
        || content.contains(&format!("\"{}\"", wanted));

    TestVerdict::judged(
        description,
        passed,
        format!("List should contain {}", wanted),
        content,
    )
}

fn check_list_length(
    description: &str,
    source: &str,
    variable: &str,
    expected: &Value,
) -> TestVerdict {
    let Some(content) = first_list_literal(source, variable) else {
        return TestVerdict::judged(description, false, expected.clone(), "List not found");
    };

    let count = count_list_items(content);
    let passed = numeric_value(expected) == Some(count as f64);

    TestVerdict::judged(description, passed, expected.clone(), count)
}

/// Numeric reading used for count comparison: `3`, `3.0` and `true` (as 1)
/// all compare equal to the matching count. Strings never do.
fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}
