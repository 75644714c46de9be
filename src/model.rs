//! Value types flowing through the pipeline.
//!
//! Every type here is immutable once built. The types whose invariants matter
//! ([`EncodedDocument`], [`GenerationRequest`], [`Quiz`], [`ReviewRequest`])
//! keep their fields private so they can only be produced by the stage that
//! checks those invariants.

use crate::error::PipelineFailure;
use crate::pipeline::validate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of options every question carries.
pub const OPTION_COUNT: usize = 4;

/// Upper bound on questions per quiz.
pub const MAX_QUESTION_COUNT: usize = 20;

/// Sentinel stored for a question the user left unanswered.
pub const NO_ANSWER: &str = "No answer";

// ── Documents ────────────────────────────────────────────────────────────

/// A user upload ready to be embedded in a prompt.
///
/// Produced by [`crate::pipeline::encode::encode_document`]; `payload` is the
/// standard base64 encoding of the raw bytes.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedDocument {
    name: String,
    media_type: String,
    payload: String,
}

impl EncodedDocument {
    pub(crate) fn new(name: String, media_type: String, payload: String) -> Self {
        Self {
            name,
            media_type,
            payload,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Short human label for the media type, used when the document is
    /// rendered into a text prompt.
    pub fn kind_label(&self) -> &str {
        match self.media_type.as_str() {
            "application/pdf" => "PDF",
            other => other,
        }
    }
}

// Payloads are megabytes of base64; keep them out of logs.
impl fmt::Debug for EncodedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedDocument")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("payload", &format_args!("<{} base64 chars>", self.payload.len()))
            .finish()
    }
}

// ── Generation ───────────────────────────────────────────────────────────

/// How hard the generated questions should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// Parse a caller-supplied level, falling back to [`Difficulty::Medium`]
    /// when it is absent or unrecognised.
    pub fn or_default(raw: Option<&str>) -> Self {
        raw.and_then(|s| s.parse().ok()).unwrap_or_default()
    }
}

impl FromStr for Difficulty {
    type Err = PipelineFailure;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(PipelineFailure::invalid_input(format!(
                "unknown difficulty '{other}' (expected easy, medium or hard)"
            ))),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One quiz-generation job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    document: EncodedDocument,
    question_count: usize,
    difficulty: Difficulty,
}

impl GenerationRequest {
    /// Build a request. `question_count` must already be clamped to
    /// `1..=MAX_QUESTION_COUNT`; anything else is rejected.
    pub fn new(
        document: EncodedDocument,
        question_count: usize,
        difficulty: Difficulty,
    ) -> Result<Self, PipelineFailure> {
        if !(1..=MAX_QUESTION_COUNT).contains(&question_count) {
            return Err(PipelineFailure::invalid_input(format!(
                "question count must be between 1 and {MAX_QUESTION_COUNT}, got {question_count}"
            )));
        }
        Ok(Self {
            document,
            question_count,
            difficulty,
        })
    }

    pub fn document(&self) -> &EncodedDocument {
        &self.document
    }

    pub fn question_count(&self) -> usize {
        self.question_count
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }
}

// ── Quiz ─────────────────────────────────────────────────────────────────

/// A single multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
}

impl Question {
    pub fn is_correct(&self, given: &str) -> bool {
        self.answer == given
    }
}

/// A validated quiz: exactly the requested number of well-formed questions.
///
/// Only [`crate::pipeline::validate`] and [`Quiz::from_questions`] build one,
/// so holding a `Quiz` means every invariant has been checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Quiz(Vec<Question>);

impl Quiz {
    pub(crate) fn new_unchecked(questions: Vec<Question>) -> Self {
        Self(questions)
    }

    /// Validate caller-held questions (for example a quiz sent back for
    /// review) against the per-question shape rules.
    pub fn from_questions(questions: Vec<Question>) -> Result<Self, PipelineFailure> {
        if questions.is_empty() {
            return Err(PipelineFailure::invalid_input("a quiz needs at least one question"));
        }
        for (i, q) in questions.iter().enumerate() {
            validate::check_question(i, q)?;
        }
        Ok(Self(questions))
    }

    pub fn questions(&self) -> &[Question] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_questions(self) -> Vec<Question> {
        self.0
    }
}

/// A growing prefix of a quiz observed while the model is still replying.
///
/// Not a [`Quiz`]: its questions have not passed cardinality validation and
/// later questions may still be missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialQuiz {
    pub questions: Vec<Question>,
    pub expected: usize,
}

impl PartialQuiz {
    /// Fraction of the requested questions received so far, in `0.0..=1.0`.
    pub fn progress(&self) -> f32 {
        if self.expected == 0 {
            return 0.0;
        }
        (self.questions.len() as f32 / self.expected as f32).min(1.0)
    }
}

// ── Review ───────────────────────────────────────────────────────────────

/// A completed quiz plus the user's answers, one per question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRequest {
    questions: Quiz,
    user_answers: Vec<String>,
}

impl ReviewRequest {
    /// Pair answers with questions. Missing, empty or surplus entries are
    /// normalised so there is exactly one answer per question, with
    /// [`NO_ANSWER`] standing in for unanswered ones.
    pub fn new(questions: Quiz, answers: Vec<Option<String>>) -> Self {
        let user_answers = (0..questions.len())
            .map(|i| {
                answers
                    .get(i)
                    .and_then(|a| a.as_deref())
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .unwrap_or(NO_ANSWER)
                    .to_string()
            })
            .collect();
        Self {
            questions,
            user_answers,
        }
    }

    pub fn questions(&self) -> &Quiz {
        &self.questions
    }

    pub fn user_answers(&self) -> &[String] {
        &self.user_answers
    }

    /// Number of questions answered correctly.
    pub fn score(&self) -> usize {
        self.questions
            .questions()
            .iter()
            .zip(&self.user_answers)
            .filter(|(q, a)| q.is_correct(a))
            .count()
    }
}

/// Free-text feedback on a completed quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub review: String,
    pub recommendations: String,
}

impl Review {
    /// The value returned whenever the model's review cannot be used.
    pub fn fallback() -> Self {
        Self {
            review: "Could not parse OpenAI's response.".to_string(),
            recommendations: "Try again.".to_string(),
        }
    }
}
