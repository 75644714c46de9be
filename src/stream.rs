//! Streaming quiz generation: emit partial quizzes as questions arrive.
//!
//! [`generate_quiz_stream`] drives the state machine
//!
//! ```text
//! idle ─▶ requesting ─▶ streaming-partial* ─▶ validated | failed
//! ```
//!
//! and surfaces it as a stream of `Result<QuizEvent, PipelineFailure>`:
//! zero or more [`QuizEvent::Partial`] items, then exactly one terminal
//! item — [`QuizEvent::Validated`] or an `Err`. After the terminal item the
//! stream ends.
//!
//! Partials are strictly growing prefixes: a partial is forwarded only when
//! it holds more well-formed questions than the previous one, and questions
//! are never guessed or filled in. Arrival order is trusted as-is; the
//! transport is assumed not to reorder or retract elements.
//!
//! Cancellation is checked around every await on the transport. Once the
//! token fires the stream yields `Err(PipelineFailure::Cancelled)` and drops
//! the underlying completion stream, which releases the HTTP connection.
//! Dropping the returned stream early has the same effect.

use crate::client::{CompletionChunk, CompletionClient, CompletionStream, Message, OutputSchema, RequestOptions};
use crate::config::QuizConfig;
use crate::error::PipelineFailure;
use crate::generate::finish_quiz;
use crate::model::{GenerationRequest, PartialQuiz, Question, Quiz};
use crate::pipeline::validate::question_from_value;
use crate::progress::ProgressCallback;
use crate::prompts;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One observation of a streaming quiz generation.
#[derive(Debug, Clone, PartialEq)]
pub enum QuizEvent {
    /// A growing prefix; more questions may follow.
    Partial(PartialQuiz),
    /// The terminal, fully validated quiz.
    Validated(Quiz),
}

/// A boxed stream of quiz events.
pub type QuizStream = Pin<Box<dyn Stream<Item = Result<QuizEvent, PipelineFailure>> + Send>>;

enum Phase {
    Requesting,
    Streaming { inner: CompletionStream, emitted: usize },
    Finished,
}

struct Run {
    client: Arc<dyn CompletionClient>,
    messages: Vec<Message>,
    options: RequestOptions,
    expected: usize,
    cancel: CancellationToken,
    progress: Option<ProgressCallback>,
    phase: Phase,
}

impl Run {
    fn fail(&self, failure: PipelineFailure) -> Result<QuizEvent, PipelineFailure> {
        warn!("Quiz stream failed at {}: {}", failure.stage(), failure);
        if let Some(cb) = &self.progress {
            cb.on_generation_error(&failure.to_string());
        }
        Err(failure)
    }
}

/// Generate a quiz, streaming partial progress.
///
/// The request is not sent until the stream is first polled.
///
/// # Example
/// ```rust,no_run
/// use futures::StreamExt;
/// use quizforge::{generate_quiz_stream, AzureChatClient, QuizConfig, QuizEvent};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run(request: quizforge::GenerationRequest) -> Result<(), Box<dyn std::error::Error>> {
/// let client = Arc::new(AzureChatClient::from_env()?);
/// let mut events = generate_quiz_stream(client, request, &QuizConfig::default(), CancellationToken::new());
/// while let Some(event) = events.next().await {
///     match event? {
///         QuizEvent::Partial(p) => eprintln!("{} of {} questions", p.questions.len(), p.expected),
///         QuizEvent::Validated(quiz) => println!("{}", serde_json::to_string_pretty(&quiz)?),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn generate_quiz_stream(
    client: Arc<dyn CompletionClient>,
    request: GenerationRequest,
    config: &QuizConfig,
    cancel: CancellationToken,
) -> QuizStream {
    info!(
        "Streaming {} {} questions from '{}' via {}",
        request.question_count(),
        request.difficulty(),
        request.document().name(),
        client.name()
    );

    let run = Run {
        client,
        messages: prompts::quiz_messages(&request),
        options: config.quiz_options(),
        expected: request.question_count(),
        cancel,
        progress: config.progress_callback.clone(),
        phase: Phase::Requesting,
    };

    Box::pin(stream::unfold(run, |mut run| async move {
        loop {
            match std::mem::replace(&mut run.phase, Phase::Finished) {
                Phase::Finished => return None,

                Phase::Requesting => {
                    if let Some(cb) = &run.progress {
                        cb.on_generation_start(run.expected);
                    }
                    let opened = tokio::select! {
                        biased;
                        _ = run.cancel.cancelled() => Err(PipelineFailure::Cancelled),
                        opened = run.client.complete_streaming(&run.messages, OutputSchema::Array, &run.options) => opened,
                    };
                    match opened {
                        Ok(inner) => run.phase = Phase::Streaming { inner, emitted: 0 },
                        Err(e) => {
                            let item = run.fail(e);
                            return Some((item, run));
                        }
                    }
                }

                Phase::Streaming { mut inner, emitted } => {
                    let next = tokio::select! {
                        biased;
                        _ = run.cancel.cancelled() => Some(Err(PipelineFailure::Cancelled)),
                        next = inner.next() => next,
                    };

                    match next {
                        Some(Ok(CompletionChunk::Partial(value))) => {
                            let questions = prefix_questions(&value, run.expected);
                            if questions.len() <= emitted {
                                debug!("Ignoring partial with {} questions", questions.len());
                                run.phase = Phase::Streaming { inner, emitted };
                                continue;
                            }
                            if let Some(cb) = &run.progress {
                                for i in emitted..questions.len() {
                                    cb.on_question_ready(i, run.expected);
                                }
                            }
                            let now = questions.len();
                            run.phase = Phase::Streaming { inner, emitted: now };
                            let partial = PartialQuiz {
                                questions,
                                expected: run.expected,
                            };
                            return Some((Ok(QuizEvent::Partial(partial)), run));
                        }
                        Some(Ok(CompletionChunk::Final(text))) => {
                            drop(inner);
                            let item = match finish_quiz(&text, run.expected) {
                                Ok(quiz) => {
                                    info!("Quiz ready: {} questions", quiz.len());
                                    if let Some(cb) = &run.progress {
                                        cb.on_generation_complete(quiz.len());
                                    }
                                    Ok(QuizEvent::Validated(quiz))
                                }
                                Err(e) => run.fail(e),
                            };
                            return Some((item, run));
                        }
                        Some(Err(e)) => {
                            drop(inner);
                            let item = run.fail(e);
                            return Some((item, run));
                        }
                        None => {
                            let item = run.fail(PipelineFailure::transport(
                                None,
                                "completion stream ended without a final reply",
                            ));
                            return Some((item, run));
                        }
                    }
                }
            }
        }
    }))
}

/// The leading well-formed questions of a partial decoding, capped at
/// `expected`. Stops at the first element that is not a valid question.
fn prefix_questions(value: &serde_json::Value, expected: usize) -> Vec<Question> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .take(expected)
                .enumerate()
                .map_while(|(i, item)| question_from_value(i, item).ok())
                .collect()
        })
        .unwrap_or_default()
}
