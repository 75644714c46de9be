//! Shape validation for extracted replies.
//!
//! Validation is all-or-nothing: one malformed question invalidates the
//! whole quiz, and nothing is repaired. Checks run in a fixed order so the
//! reported failure is deterministic:
//!
//! 1. the value is an array
//! 2. its length equals the requested count (`cardinality-mismatch`)
//! 3. each element is a well-formed question (`schema-mismatch`, first
//!    offending index and field)

use crate::error::PipelineFailure;
use crate::model::{Question, Quiz, Review, OPTION_COUNT};
use serde_json::{Map, Value};

/// Validate an extracted value as a quiz of exactly `expected` questions.
pub fn validate_quiz(value: Value, expected: usize) -> Result<Quiz, PipelineFailure> {
    let items = match value {
        Value::Array(items) => items,
        // A non-array reply carries zero questions.
        _ => {
            return Err(PipelineFailure::CardinalityMismatch {
                expected,
                actual: 0,
            })
        }
    };

    if items.len() != expected {
        return Err(PipelineFailure::CardinalityMismatch {
            expected,
            actual: items.len(),
        });
    }

    let questions = items
        .iter()
        .enumerate()
        .map(|(i, item)| question_from_value(i, item))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Quiz::new_unchecked(questions))
}

/// Decode and check a single question element.
pub fn question_from_value(index: usize, value: &Value) -> Result<Question, PipelineFailure> {
    let obj = value
        .as_object()
        .ok_or_else(|| PipelineFailure::schema(Some(index), "question", "element is not an object"))?;

    let question = string_field(obj, index, "question")?;

    let options = match obj.get("options") {
        Some(Value::Array(opts)) => opts
            .iter()
            .map(|o| {
                o.as_str().map(str::to_string).ok_or_else(|| {
                    PipelineFailure::schema(Some(index), "options", "contains a non-string entry")
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => {
            return Err(PipelineFailure::schema(Some(index), "options", "is not an array"))
        }
        None => return Err(PipelineFailure::schema(Some(index), "options", "is missing")),
    };

    let answer = string_field(obj, index, "answer")?;

    let q = Question {
        question,
        options,
        answer,
    };
    check_question(index, &q)?;
    Ok(q)
}

/// Enforce the per-question invariants on an already-typed question.
pub fn check_question(index: usize, q: &Question) -> Result<(), PipelineFailure> {
    if q.question.trim().is_empty() {
        return Err(PipelineFailure::schema(Some(index), "question", "is empty"));
    }
    if q.options.len() != OPTION_COUNT {
        return Err(PipelineFailure::schema(
            Some(index),
            "options",
            format!(
                "must have exactly {OPTION_COUNT} entries, found {}",
                q.options.len()
            ),
        ));
    }
    if !q.options.iter().any(|o| o == &q.answer) {
        return Err(PipelineFailure::schema(
            Some(index),
            "answer",
            format!("'{}' is not one of the options", q.answer),
        ));
    }
    Ok(())
}

/// Validate an extracted value as a review with two non-empty strings.
pub fn validate_review(value: Value) -> Result<Review, PipelineFailure> {
    let obj = value
        .as_object()
        .ok_or_else(|| PipelineFailure::schema(None, "review", "reply is not an object"))?;

    let review = non_empty(obj, "review")?;
    let recommendations = non_empty(obj, "recommendations")?;

    Ok(Review {
        review,
        recommendations,
    })
}

fn string_field(obj: &Map<String, Value>, index: usize, field: &str) -> Result<String, PipelineFailure> {
    match obj.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(PipelineFailure::schema(Some(index), field, "is not a string")),
        None => Err(PipelineFailure::schema(Some(index), field, "is missing")),
    }
}

fn non_empty(obj: &Map<String, Value>, field: &str) -> Result<String, PipelineFailure> {
    match obj.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::String(_)) => Err(PipelineFailure::schema(None, field, "is empty")),
        Some(_) => Err(PipelineFailure::schema(None, field, "is not a string")),
        None => Err(PipelineFailure::schema(None, field, "is missing")),
    }
}
