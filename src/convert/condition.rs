//! Template condition expressions.
//!
//! Conditions are parsed by a restricted pest grammar: exactly one `a == b`
//! or `a != b` comparison between bare values. Anything richer is an error;
//! there is no dynamic evaluation of any kind.

use pest::Parser;
use pest_derive::Parser;
use thiserror::Error;

#[derive(Parser)]
#[grammar = "convert/condition.pest"]
struct ConditionParser;

/// A condition the restricted grammar rejects.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed condition `{condition}`: {reason}")]
pub struct ConditionError {
    pub condition: String,
    pub reason: String,
}

/// Evaluate a substituted condition string.
pub fn evaluate(condition: &str) -> Result<bool, ConditionError> {
    let mut pairs = ConditionParser::parse(Rule::expression, condition).map_err(|e| {
        ConditionError {
            condition: condition.to_string(),
            reason: e.to_string(),
        }
    })?;

    let comparison = pairs.next().expect("expression holds one comparison");
    let mut inner = comparison.into_inner();
    let left = inner.next().expect("comparison has a left value").as_str();
    let op = inner.next().expect("comparison has an operator").as_str();
    let right = inner.next().expect("comparison has a right value").as_str();

    Ok(match op {
        "==" => left == right,
        "!=" => left != right,
        _ => unreachable!("grammar admits only == and !="),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_and_inequality() {
        assert_eq!(evaluate("recycle == recycle"), Ok(true));
        assert_eq!(evaluate("gas != coal"), Ok(true));
        assert_eq!(evaluate("gas == coal"), Ok(false));
    }

    #[test]
    fn richer_expressions_are_rejected() {
        for condition in [
            "a == b == c",
            "a < b",
            "a == b && c == d",
            "__import__('os')",
            "a ==",
            "",
        ] {
            assert!(evaluate(condition).is_err(), "should reject `{condition}`");
        }
    }
}
