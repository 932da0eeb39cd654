//! Summarize a transcript, or ask questions about it, from the command line.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable.
//!
//! # Examples
//!
//! ```sh
//! # Summarize a transcript file
//! recap summarize --file talk.txt --style bullet-points
//!
//! # Pipe a transcript in and get the full result as JSON
//! cat talk.txt | recap summarize --stdin --json
//!
//! # Ask a question, continuing a saved conversation
//! recap chat --file talk.txt --history chat.json --save-history \
//!   --message "What was the second argument?"
//!
//! # Transcript statistics (no API key needed)
//! recap stats --file talk.txt
//! ```

use clap::{Args, Parser, Subcommand};
use recap_rs::api::retry::RetryConfig;
use recap_rs::context::{ChatTurn, ModelProfile, TokenEstimator, load_profiles};
use recap_rs::pipeline::{
    ChatContextAssembler, CompositeEventHandler, EventObserver, LoggingHandler, PipelineConfig,
    PipelineEvent, SummarizationPlanner, SummaryStyle,
};
use recap_rs::transcript::SourceText;
use recap_rs::{DEFAULT_MODEL, OpenRouterClient};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Summarize a transcript, or ask questions about it.
///
/// Reads the API key from the OPENROUTER_KEY environment variable.
#[derive(Parser)]
#[command(name = "recap", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    // ── Backend ────────────────────────────────────────────────
    /// Model to use
    #[arg(long, global = true, default_value = DEFAULT_MODEL)]
    model: String,

    /// JSON file mapping model ids to context profiles
    #[arg(long, global = true)]
    profile_file: Option<PathBuf>,

    /// Per-call timeout in seconds
    #[arg(long, global = true, default_value_t = 60)]
    timeout_secs: u64,

    /// Maximum chunk summaries in flight at once
    #[arg(long, global = true, default_value_t = 5)]
    concurrency: usize,

    /// Retries for transient backend errors (429, 5xx, network)
    #[arg(long, global = true, default_value_t = 0)]
    retries: u32,

    /// Bytes per estimated token; lower is more conservative
    #[arg(long, global = true, default_value_t = 3)]
    chars_per_token: usize,

    // ── Output ─────────────────────────────────────────────────
    /// Print the full result as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log pipeline decisions to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Summarize a transcript
    Summarize {
        #[command(flatten)]
        input: InputArgs,

        /// standard, detailed, or bullet-points (unknown values mean standard)
        #[arg(long, default_value = "standard")]
        style: String,
    },
    /// Ask a question about a transcript
    Chat {
        #[command(flatten)]
        input: InputArgs,

        /// The question to ask
        #[arg(long)]
        message: String,

        /// JSON array of previous {role, content} turns
        #[arg(long)]
        history: Option<PathBuf>,

        /// Append the question and reply to the history file
        #[arg(long, requires = "history")]
        save_history: bool,
    },
    /// Print transcript statistics as JSON
    Stats {
        #[command(flatten)]
        input: InputArgs,
    },
}

#[derive(Args)]
struct InputArgs {
    /// Transcript file: plain text or a JSON array of segments
    #[arg(long, conflicts_with = "stdin")]
    file: Option<PathBuf>,

    /// Read the transcript from stdin
    #[arg(long)]
    stdin: bool,
}

// ── Helpers ────────────────────────────────────────────────────────

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn read_source(input: &InputArgs) -> Result<SourceText, String> {
    match (&input.file, input.stdin) {
        (Some(path), _) => SourceText::load(path),
        (None, true) => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| format!("failed to read stdin: {e}"))?;
            Ok(SourceText::parse(&buf))
        }
        (None, false) => Err("provide --file or --stdin".to_string()),
    }
}

fn resolve_profile(cli: &Cli) -> Result<ModelProfile, String> {
    let Some(path) = &cli.profile_file else {
        return Ok(ModelProfile::for_model(&cli.model));
    };
    let profiles = load_profiles(path)?;
    match profiles.get(&cli.model) {
        Some(profile) => Ok(profile.clone()),
        None => {
            warn!(
                "No profile for '{}' in {}, using built-in defaults",
                cli.model,
                path.display()
            );
            Ok(ModelProfile::for_model(&cli.model))
        }
    }
}

fn build_config(cli: &Cli) -> Result<PipelineConfig, String> {
    let config = PipelineConfig::for_model(&cli.model)
        .with_profile(resolve_profile(cli)?)
        .with_estimator(TokenEstimator::with_chars_per_token(cli.chars_per_token))
        .with_call_timeout(Duration::from_secs(cli.timeout_secs.max(1)))
        .with_max_concurrency(cli.concurrency);
    config.validate()?;
    Ok(config)
}

fn build_client(cli: &Cli) -> Result<OpenRouterClient, String> {
    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "OPENROUTER_KEY environment variable is not set".to_string())?;
    Ok(OpenRouterClient::new(api_key)?
        .with_model(&cli.model)
        .with_retry(RetryConfig::with_retries(cli.retries)))
}

fn load_history(path: &Path) -> Result<Vec<ChatTurn>, String> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read history '{}': {e}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content)
        .map_err(|e| format!("failed to parse history '{}': {e}", path.display()))
}

fn save_history(path: &Path, history: &[ChatTurn]) -> Result<(), String> {
    let json = serde_json::to_string_pretty(history)
        .map_err(|e| format!("failed to serialize history: {e}"))?;
    std::fs::write(path, json)
        .map_err(|e| format!("failed to write history '{}': {e}", path.display()))
}

fn to_json(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("failed to serialize result: {e}"))
}

/// Prints chunk progress to stderr.
fn progress_observer() -> EventObserver<impl Fn(&PipelineEvent<'_>) + Send + Sync> {
    EventObserver::new(|event| {
        if let PipelineEvent::ChunkCompleted { index, total } = event {
            eprintln!("  [section {}/{total}]", index + 1);
        }
    })
}

async fn run(cli: &Cli) -> Result<String, String> {
    let handler = CompositeEventHandler::new()
        .with(LoggingHandler)
        .with_if(cli.verbose, progress_observer());

    match &cli.command {
        Command::Stats { input } => {
            let source = read_source(input)?;
            to_json(&source.stats())
        }
        Command::Summarize { input, style } => {
            let source = read_source(input)?;
            let style: SummaryStyle = style.parse().unwrap_or_default();
            let client = build_client(cli)?;
            let result = SummarizationPlanner::new(&client, build_config(cli)?)
                .with_event_handler(&handler)
                .summarize(source.text(), style)
                .await
                .map_err(|e| e.to_string())?;

            if cli.json {
                to_json(&result)
            } else {
                Ok(format!("{}\n", result.text))
            }
        }
        Command::Chat {
            input,
            message,
            history,
            save_history: save,
        } => {
            let source = read_source(input)?;
            let mut turns = match history {
                Some(path) => load_history(path)?,
                None => Vec::new(),
            };
            let client = build_client(cli)?;
            let result = ChatContextAssembler::new(&client, build_config(cli)?)
                .with_event_handler(&handler)
                .chat(source.text(), &turns, message)
                .await;

            if *save && let Some(path) = history {
                turns.push(ChatTurn::user(message).stamped());
                turns.push(ChatTurn::assistant(&result.reply).stamped());
                save_history(path, &turns)?;
            }

            if cli.json {
                to_json(&result)
            } else {
                Ok(format!("{}\n", result.reply))
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli).await {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
