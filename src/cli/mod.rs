//! CLI for replaying recorded provider streams.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use tokio::io::BufReader;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use crate::aggregate::UpdateCallback;
use crate::config::{PipelineConfig, TagPreset};
use crate::error::{Result, ThoughtlineError};
use crate::normalize::Dialect;
use crate::pipeline::StreamPipeline;
use crate::source::{decode_json_lines, decode_sse, FragmentStream};

/// Thoughtline CLI
#[derive(Parser, Debug)]
#[command(
    name = "thoughtline",
    version,
    about = "Split recorded LLM streams into answer, reasoning and tool calls"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a recorded stream through the pipeline and print the aggregate
    Replay(ReplayArgs),
    /// Print the canonical event sequence of a recorded stream, one JSON per line
    Events(ReplayArgs),
}

/// How the recorded stream is framed on disk.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// Server-sent events (`data: {...}` lines)
    Sse,
    /// One JSON fragment per line
    Jsonl,
}

impl InputFormat {
    /// Guess from the file extension; SSE unless it looks like JSON lines.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("jsonl" | "ndjson") => Self::Jsonl,
            _ => Self::Sse,
        }
    }
}

/// Arguments shared by `replay` and `events`.
#[derive(Parser, Debug)]
pub struct ReplayArgs {
    /// Recorded stream to read
    pub file: PathBuf,

    /// Input framing (default: from the file extension)
    #[arg(short, long, value_enum)]
    pub format: Option<InputFormat>,

    /// Provider dialect (auto, openai_chat, anthropic)
    #[arg(short, long)]
    pub dialect: Option<Dialect>,

    /// Delimiter preset (think, thinking, thought, reasoning, response_header)
    #[arg(short, long)]
    pub preset: Option<TagPreset>,

    /// Opening reasoning tag
    #[arg(long)]
    pub opening_tag: Option<String>,

    /// Closing reasoning tag
    #[arg(long)]
    pub closing_tag: Option<String>,

    /// Separator discarded after the closing tag
    #[arg(long)]
    pub separator: Option<String>,

    /// Disable delimiter-based reasoning extraction
    #[arg(long)]
    pub no_reasoning: bool,

    /// TOML config file (environment and flags override it)
    #[arg(short, long, env = "THOUGHTLINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Echo answer text to stderr as it arrives
    #[arg(long)]
    pub live: bool,
}

impl ReplayArgs {
    /// Layer config file, environment and flags (later wins).
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let base = match &self.config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        };
        let _ = dotenvy::dotenv();
        let mut config = base.with_env_overrides(|key| std::env::var(key).ok())?;

        if let Some(dialect) = self.dialect {
            config.dialect = dialect;
        }
        if let Some(preset) = self.preset {
            config.delimiters = crate::config::DelimiterConfig {
                enabled: config.delimiters.enabled,
                ..preset.config()
            };
        }
        if let Some(tag) = &self.opening_tag {
            config.delimiters.opening_tag = tag.clone();
        }
        if let Some(tag) = &self.closing_tag {
            config.delimiters.closing_tag = tag.clone();
        }
        if let Some(separator) = &self.separator {
            config.delimiters.separator = unescape(separator);
        }
        if self.no_reasoning {
            config.delimiters.enabled = false;
        }
        config.delimiters.validate()?;
        Ok(config)
    }

    async fn open(&self) -> Result<FragmentStream> {
        let file = tokio::fs::File::open(&self.file).await?;
        let format = self
            .format
            .unwrap_or_else(|| InputFormat::from_path(&self.file));
        Ok(match format {
            InputFormat::Sse => decode_sse(ReaderStream::new(file)),
            InputFormat::Jsonl => decode_json_lines(BufReader::new(file)),
        })
    }
}

/// `\n`, `\r` and `\t` escapes, so separators can be given on the command line.
fn unescape(raw: &str) -> String {
    raw.replace("\\n", "\n")
        .replace("\\r", "\r")
        .replace("\\t", "\t")
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: &CancellationToken) {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("ctrl-c received, cancelling");
            token.cancel();
        }
    });
}

/// Echoes newly received answer text to stderr.
fn live_echo() -> UpdateCallback {
    let printed = Arc::new(Mutex::new(0usize));
    Arc::new(move |content: &str, _reasoning: Option<&str>| {
        let Ok(mut printed) = printed.lock() else {
            return;
        };
        if let Some(new) = content.get(*printed..) {
            let mut stderr = std::io::stderr();
            let _ = stderr.write_all(new.as_bytes());
            let _ = stderr.flush();
        }
        *printed = content.len();
    })
}

/// `thoughtline replay`: print the aggregate (or the partial one) as JSON.
pub async fn handle_replay(args: ReplayArgs) -> Result<()> {
    let config = args.pipeline_config()?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);

    let pipeline = StreamPipeline::builder()
        .config(config.delimiters)
        .dialect(config.dialect)
        .cancellation(cancel)
        .maybe_on_update(args.live.then(live_echo))
        .build();

    let stream = args.open().await?;
    match pipeline.run_stream(stream).await {
        Ok(result) => {
            if args.live {
                eprintln!();
            }
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(ThoughtlineError::Interrupted { source, partial }) => {
            let report = serde_json::json!({ "partial": true, "error": source.to_string(), "aggregate": partial });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Err(*source)
        }
        Err(e) => Err(e),
    }
}

/// `thoughtline events`: print canonical events as JSON lines.
pub async fn handle_events(args: ReplayArgs) -> Result<()> {
    let config = args.pipeline_config()?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);

    let pipeline = StreamPipeline::builder()
        .config(config.delimiters)
        .dialect(config.dialect)
        .cancellation(cancel)
        .build();

    let mut events = pipeline.events(args.open().await?);
    while let Some(event) = events.next().await {
        println!("{}", serde_json::to_string(&event?)?);
    }
    Ok(())
}
