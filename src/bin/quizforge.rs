//! CLI binary for quizforge.
//!
//! A thin shim over the library crate that maps CLI flags to `QuizConfig`,
//! picks a completion backend and prints JSON results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use quizforge::api::{self, ReviewBody};
use quizforge::{
    generate_quiz_stream, load_document, AzureChatClient, AzureCredentials, CompletionClient, Difficulty,
    GenerationRequest, ProgressCallback, ProviderClient, Question, QuizConfig, QuizEvent,
    QuizProgressCallback,
};
use serde_json::json;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress bar: a spinner until the request is sent, then a bar
/// that advances as each question completes in the streamed reply.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading document…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl QuizProgressCallback for CliProgressCallback {
    fn on_generation_start(&self, expected: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:30.green/238}] {pos}/{len}  {msg}  ⏱ {elapsed}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(expected as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Generating");
        self.bar.set_message("waiting for the model…");
    }

    fn on_question_ready(&self, index: usize, expected: usize) {
        self.bar.set_position((index + 1) as u64);
        let next = (index + 2).min(expected);
        self.bar
            .set_message(format!("Generating question {next} of {expected}"));
    }

    fn on_generation_complete(&self, question_count: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} questions generated",
            green("✔"),
            bold(&question_count.to_string())
        );
    }

    fn on_generation_error(&self, error: &str) {
        self.bar.finish_and_clear();
        eprintln!("{} {}", red("✘"), red(error));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Four medium questions from a local PDF (Azure OpenAI)
  quizforge generate lecture.pdf

  # Ten hard questions from a URL, with a title, 90s deadline
  quizforge generate --count 10 --difficulty hard --title --timeout 90 https://example.com/notes.pdf

  # Also accept plain-text notes served over HTTP, against a pinned API version
  quizforge --api-version 2024-10-21 generate --accept-type text/plain https://example.com/notes.txt

  # Use any edgequake-llm provider instead of Azure
  quizforge --backend provider --provider openai --model gpt-4.1-mini generate lecture.pdf

  # Review answers against a generated quiz
  quizforge review quiz.json answers.json

  # Short title from a filename
  quizforge title biology-chapter-3.pdf

ENVIRONMENT VARIABLES:
  AZURE_OPENAI_API_KEY        Azure OpenAI key (backend azure)
  AZURE_OPENAI_ENDPOINT       e.g. https://my-resource.openai.azure.com
  AZURE_OPENAI_DEPLOYMENT_ID  Deployment name
  AZURE_OPENAI_API_VERSION    Optional, default 2025-01-01-preview
  OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY   (backend provider)
  RUST_LOG                    Override log filter
"#;

/// Generate and review multiple-choice quizzes from documents using LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "quizforge",
    version,
    about = "Generate and review multiple-choice quizzes from PDF documents using LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Completion backend.
    #[arg(long, global = true, env = "QUIZFORGE_BACKEND", value_enum, default_value = "azure")]
    backend: BackendArg,

    /// edgequake-llm provider name (backend `provider`): openai, anthropic, gemini, ollama.
    #[arg(long, global = true, env = "QUIZFORGE_PROVIDER")]
    provider: Option<String>,

    /// Azure OpenAI API version (overrides AZURE_OPENAI_API_VERSION).
    #[arg(long, global = true)]
    api_version: Option<String>,

    /// Model ID for backend `provider`.
    #[arg(long, global = true, env = "QUIZFORGE_MODEL")]
    model: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "QUIZFORGE_TEMPERATURE", default_value_t = 0.7)]
    temperature: f32,

    /// Enable DEBUG-level tracing logs (includes raw model replies).
    #[arg(short, long, global = true, env = "QUIZFORGE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "QUIZFORGE_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a quiz from a local PDF or an HTTP/HTTPS URL.
    Generate {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        /// Number of questions (1–20).
        #[arg(short = 'n', long, env = "QUIZFORGE_COUNT", default_value_t = 4)]
        count: u32,

        /// Question difficulty: easy, medium, hard.
        #[arg(short, long, env = "QUIZFORGE_DIFFICULTY", default_value = "medium")]
        difficulty: String,

        /// Give up after this many seconds.
        #[arg(long, env = "QUIZFORGE_TIMEOUT")]
        timeout: Option<u64>,

        /// Also generate a short title for the quiz.
        #[arg(long)]
        title: bool,

        /// Maximum document size in MiB.
        #[arg(long, env = "QUIZFORGE_MAX_MB", default_value_t = 5)]
        max_mb: usize,

        /// Accept another media type besides PDF (repeatable), e.g. `text/plain`.
        #[arg(long = "accept-type", value_name = "MEDIA_TYPE")]
        accept_types: Vec<String>,

        /// HTTP download timeout in seconds.
        #[arg(long, env = "QUIZFORGE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
        download_timeout: u64,

        /// Disable progress bar.
        #[arg(long, env = "QUIZFORGE_NO_PROGRESS")]
        no_progress: bool,
    },

    /// Review answers to a quiz.
    Review {
        /// JSON file holding the quiz (array of questions).
        quiz: PathBuf,
        /// JSON file holding the answers (array of strings or nulls).
        answers: PathBuf,
    },

    /// Suggest a short quiz title for a filename.
    Title {
        filename: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    /// Azure OpenAI chat completions, with streamed partial quizzes.
    Azure,
    /// Any edgequake-llm provider (no partial streaming).
    Provider,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active.
    let show_progress = !cli.quiet
        && matches!(cli.command, Command::Generate { no_progress: false, .. });
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let client = build_client(&cli)?;

    // Ctrl-C cancels whatever is in flight.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    match &cli.command {
        Command::Generate {
            input,
            count,
            difficulty,
            timeout,
            title,
            max_mb,
            download_timeout,
            accept_types,
            ..
        } => {
            if let Some(secs) = *timeout {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(secs)).await;
                    cancel.cancel();
                });
            }

            let progress: Option<ProgressCallback> = if show_progress {
                Some(CliProgressCallback::new() as Arc<dyn QuizProgressCallback>)
            } else {
                None
            };

            let mut builder = QuizConfig::builder()
                .temperature(cli.temperature)
                .max_document_bytes(max_mb.saturating_mul(1024 * 1024))
                .download_timeout_secs(*download_timeout);
            for media_type in accept_types {
                builder = builder.accept_media_type(media_type.as_str());
            }
            if let Some(cb) = progress {
                builder = builder.progress_callback(cb);
            }
            let config = builder.build().context("Invalid configuration")?;

            let difficulty: Difficulty = difficulty.parse().context("Invalid --difficulty")?;
            let count = config.clamp_question_count(Some(f64::from(*count)));

            let document = load_document(input, &config)
                .await
                .with_context(|| format!("Failed to load '{input}'"))?;
            let name = document.name().to_string();
            let request = GenerationRequest::new(document, count, difficulty)
                .context("Invalid request")?;

            let mut events = generate_quiz_stream(client.clone(), request, &config, cancel.clone());
            let mut quiz = None;
            while let Some(event) = events.next().await {
                match event {
                    Ok(QuizEvent::Partial(partial)) => {
                        if !show_progress && !cli.quiet {
                            eprintln!(
                                "{}/{} questions received ({:.0}%)",
                                partial.questions.len(),
                                partial.expected,
                                partial.progress() * 100.0
                            );
                        }
                    }
                    Ok(QuizEvent::Validated(q)) => quiz = Some(q),
                    Err(e) => {
                        println!("{}", json!({ "error": api::error_message(&e) }));
                        std::process::exit(1);
                    }
                }
            }
            let quiz = quiz.context("Generation ended without a result")?;

            let output = if *title {
                let title = api::quiz_title(client.as_ref(), &config, &name, &cancel).await;
                json!({ "title": title, "questions": quiz })
            } else {
                serde_json::to_value(&quiz).context("Failed to serialise quiz")?
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&output).context("Failed to serialise output")?
            );
        }

        Command::Review { quiz, answers } => {
            let config = QuizConfig::builder()
                .temperature(cli.temperature)
                .build()
                .context("Invalid configuration")?;

            let questions: Vec<Question> = read_json(quiz).await?;
            let user_answers: Vec<Option<String>> = read_json(answers).await?;

            let reply = api::review_quiz(
                client.as_ref(),
                &config,
                ReviewBody {
                    questions,
                    user_answers,
                },
                &cancel,
            )
            .await;
            println!(
                "{}",
                serde_json::to_string_pretty(&reply).context("Failed to serialise review")?
            );
            if !reply.is_success() {
                std::process::exit(1);
            }
        }

        Command::Title { filename } => {
            let config = QuizConfig::builder()
                .temperature(cli.temperature)
                .build()
                .context("Invalid configuration")?;
            println!("{}", api::quiz_title(client.as_ref(), &config, filename, &cancel).await);
        }
    }

    Ok(())
}

/// Construct the completion backend selected by `--backend`.
fn build_client(cli: &Cli) -> Result<Arc<dyn CompletionClient>> {
    let client: Arc<dyn CompletionClient> = match cli.backend {
        BackendArg::Azure => {
            let mut credentials =
                AzureCredentials::from_env().context("Azure OpenAI backend is not configured")?;
            if let Some(version) = &cli.api_version {
                credentials = credentials.with_api_version(version.as_str());
            }
            Arc::new(AzureChatClient::new(credentials).context("Invalid Azure OpenAI settings")?)
        }
        BackendArg::Provider => match cli.provider.as_deref() {
            Some(name) => Arc::new(
                ProviderClient::from_name(name, cli.model.as_deref())
                    .context("Failed to create LLM provider")?,
            ),
            None => Arc::new(ProviderClient::from_env().context("Failed to create LLM provider")?),
        },
    };
    Ok(client)
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}
