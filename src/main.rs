// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Result, anyhow, Context};
use log::{error, warn, info, debug, LevelFilter, Log, Metadata, Record, Level, SetLoggerError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use chrono::Utc;
use clap::{Parser, ValueEnum, CommandFactory, Subcommand};
use clap_complete::{generate, Shell};
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader};

use fisher_subs::app_config::{self, Config};
use fisher_subs::bridge::relay_channel;
use fisher_subs::file_utils::FileManager;
use fisher_subs::http::ReqwestHttpClient;
use fisher_subs::language_utils;
use fisher_subs::interceptor::{
    FetchRequest, InterceptedToken, PageContext, TokenLookup, TokenStore, XhrPrimitive,
};
use fisher_subs::platforms::SubtitleOrchestrator;
use fisher_subs::errors::SubtitleError;
use fisher_subs::subtitle_format::{OutputFormat, SubtitleDocument};

/// CLI Wrapper for OutputFormat to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliOutputFormat {
    Srt,
    Text,
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(cli_format: CliOutputFormat) -> Self {
        match cli_format {
            CliOutputFormat::Srt => OutputFormat::Srt,
            CliOutputFormat::Text => OutputFormat::Text,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download subtitles for one or more video URLs
    #[command(alias = "get")]
    Fetch(FetchArgs),

    /// Run a page interceptor over request URLs read from stdin
    Observe(ObserveArgs),

    /// Generate shell completions for fisher-subs
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug)]
struct FetchArgs {
    /// Video page URLs (YouTube or Bilibili)
    #[arg(value_name = "URL", required = true)]
    urls: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<CliOutputFormat>,

    /// Save into this directory instead of printing to stdout
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Bilibili session cookie header (e.g. 'SESSDATA=...')
    #[arg(long, env = "FISHER_BILIBILI_COOKIE")]
    cookie: Option<String>,

    /// Preferred YouTube caption language (e.g. 'en', 'zh-Hans')
    #[arg(short = 'L', long)]
    language: Option<String>,

    /// Known caption token, as VIDEO_ID=TOKEN (repeatable)
    #[arg(long = "pot", value_name = "VIDEO_ID=TOKEN", value_parser = parse_pot_arg)]
    pots: Vec<(String, String)>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

#[derive(Parser, Debug)]
struct ObserveArgs {
    /// URL of the page the requests originate from
    #[arg(short, long)]
    page_url: String,

    /// Issue each request through fetch instead of only opening it
    #[arg(long)]
    fetch: bool,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

/// fisher-subs - subtitles for the FisherAI assistant
#[derive(Parser, Debug)]
#[command(name = "fisher-subs")]
#[command(version)]
#[command(about = "Fetch YouTube and Bilibili subtitles as SRT or plain text")]
#[command(long_about = "fisher-subs resolves a video page URL to its caption track and prints it as SRT or plain text.

EXAMPLES:
    fisher-subs fetch 'https://www.youtube.com/watch?v=dQw4w9WgXcQ'
    fisher-subs fetch -f text 'https://www.bilibili.com/video/BV1xx411c7mD'
    fisher-subs fetch -o subs/ URL1 URL2             # Save each result to a timestamped file
    fisher-subs fetch --pot VIDEO_ID=TOKEN URL       # Reuse a captured caption token
    fisher-subs observe -p 'https://www.youtube.com/watch?v=abc' < requests.txt
    fisher-subs completions bash > fisher-subs.bash

OBSERVE INPUT:
    One request URL per line. A line 'nav <url>' moves the page to a new address.

CONFIGURATION:
    Configuration is stored in conf.json by default. If the config file doesn't
    exist, a default one will be created automatically.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,
}

fn parse_pot_arg(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((video_id, token)) if !video_id.trim().is_empty() && !token.trim().is_empty() => {
            Ok((video_id.trim().to_string(), token.trim().to_string()))
        }
        _ => Err(format!("expected VIDEO_ID=TOKEN, got '{}'", value)),
    }
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI colour and emoji for log level
    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("1;31", "❌ "),
            Level::Warn => ("1;33", "🚧 "),
            Level::Info => ("1;32", " "),
            Level::Debug => ("1;36", "🔍 "),
            Level::Trace => ("1;35", "📋 "),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (colour, emoji) = Self::style_for_level(record.level());

            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "\x1B[{}m{} {} {}\x1B[0m",
                colour, now, emoji, record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn level_filter(level: &app_config::LogLevel) -> LevelFilter {
    match level {
        app_config::LogLevel::Error => LevelFilter::Error,
        app_config::LogLevel::Warn => LevelFilter::Warn,
        app_config::LogLevel::Info => LevelFilter::Info,
        app_config::LogLevel::Debug => LevelFilter::Debug,
        app_config::LogLevel::Trace => LevelFilter::Trace,
    }
}

// Command line level wins over the config file.
fn load_config(config_path: &str, cli_level: &Option<CliLogLevel>) -> Result<Config> {
    if let Some(level) = cli_level {
        log::set_max_level(level_filter(&level.clone().into()));
    }

    let mut config = Config::load_or_create(config_path)?;
    match cli_level {
        Some(level) => config.log_level = level.clone().into(),
        None => log::set_max_level(level_filter(&config.log_level)),
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Info until the config tells otherwise
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    match cli.command {
        Commands::Fetch(args) => run_fetch(args).await,
        Commands::Observe(args) => run_observe(args).await,
        Commands::Completions { shell } => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "fisher-subs", &mut std::io::stdout());
            Ok(())
        }
    }
}

async fn run_fetch(options: FetchArgs) -> Result<()> {
    let mut config = load_config(&options.config_path, &options.log_level)?;

    if let Some(format) = &options.format {
        config.output_format = format.clone().into();
    }
    if let Some(cookie) = &options.cookie {
        config.bilibili.cookie = cookie.clone();
    }
    if let Some(language) = &options.language {
        config.youtube.preferred_language = Some(language.clone());
    }

    config.validate()
        .context("Configuration validation failed")?;

    match &config.youtube.preferred_language {
        Some(code) => match language_utils::get_language_name(code) {
            Ok(name) => info!("Preferred YouTube caption language: {} ({})", name, code),
            Err(_) => info!("Preferred YouTube caption language: {}", code),
        },
        None => info!("Taking the first available YouTube caption track"),
    }

    let tokens = TokenStore::new();
    for (video_id, token) in &options.pots {
        tokens.insert(InterceptedToken {
            identifier: video_id.clone(),
            token: token.clone(),
            source_url: "command-line".to_string(),
            captured_at: Utc::now(),
        });
    }
    let lookup: Option<Arc<dyn TokenLookup>> = if tokens.is_empty() {
        None
    } else {
        debug!("Seeded {} caption token(s) from the command line", tokens.len());
        Some(Arc::new(tokens))
    };

    let orchestrator = SubtitleOrchestrator::from_config(&config, lookup);
    let format = config.output_format;

    let progress_bar = ProgressBar::new(options.urls.len() as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] {pos}/{len} videos {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    progress_bar.set_style(style);
    progress_bar.set_message("Fetching subtitles");

    // Independent requests; each one runs its own chain
    let results = join_all(options.urls.iter().map(|url| {
        let orchestrator = &orchestrator;
        let progress_bar = &progress_bar;
        async move {
            let result = orchestrator.retrieve(url, format).await;
            progress_bar.inc(1);
            (url, result)
        }
    }))
    .await;
    progress_bar.finish_and_clear();

    let failures = emit_results(
        results.into_iter().map(|(url, result)| (url.as_str(), result)),
        options.output_dir.as_deref(),
        format,
    );

    if failures > 0 {
        return Err(anyhow!("{} of {} video(s) failed", failures, options.urls.len()));
    }

    Ok(())
}

/// Print or save each retrieved document and return how many videos failed.
///
/// A failed save counts like a failed retrieval; later videos are still emitted.
fn emit_results<'a>(
    results: impl IntoIterator<Item = (&'a str, Result<Option<SubtitleDocument>, SubtitleError>)>,
    output_dir: Option<&Path>,
    format: OutputFormat,
) -> usize {
    let mut failures = 0;
    for (url, result) in results {
        match result {
            Ok(Some(document)) => {
                if document.is_empty() {
                    warn!("Subtitles for {} contain no cues", url);
                }
                let content = document.render();
                match output_dir {
                    Some(output_dir) => match FileManager::save_subtitles(output_dir, &content, format) {
                        Ok(path) => info!("Saved {} subtitles to {}", url, path.display()),
                        Err(e) => {
                            error!("{}: {:#}", url, e);
                            failures += 1;
                        }
                    },
                    None => println!("{}", content),
                }
            }
            Ok(None) => warn!("Unsupported video URL: {}", url),
            Err(e) => {
                error!("{}: {}", url, e);
                failures += 1;
            }
        }
    }
    failures
}

// @struct: XHR primitive that only records the target
struct LoggingXhr;

impl XhrPrimitive for LoggingXhr {
    fn open(&self, method: &str, url: &str) {
        debug!("XHR {} {}", method, url);
    }
}

async fn run_observe(options: ObserveArgs) -> Result<()> {
    let config = load_config(&options.config_path, &options.log_level)?;
    config.validate()
        .context("Configuration validation failed")?;

    let http = Arc::new(ReqwestHttpClient::new(None, Some(config.user_agent.clone())));
    let mut page = PageContext::new(&options.page_url, http, Arc::new(LoggingXhr));

    let (relay, receiver) = relay_channel();
    let registry = receiver.registry();
    let relay_task = receiver.spawn();
    page.install(Arc::new(relay));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(target) = line.strip_prefix("nav ") {
            match page.location().navigate(target.trim()) {
                Some(event) => debug!("Page now on video {}", event.current),
                None => debug!("Navigation to {} kept the current video", target.trim()),
            }
            continue;
        }

        if options.fetch {
            match page.fetch(FetchRequest::get(line)).await {
                Ok(response) => info!("{} -> {}", line, response.status),
                Err(e) => warn!("Request to {} failed: {}", line, e),
            }
        } else {
            page.xhr_open("GET", line);
        }
    }

    let captured = page
        .interceptor()
        .map(|interceptor| interceptor.store().snapshot())
        .unwrap_or_default();

    // Closing the page closes the relay
    drop(page);
    let relayed = relay_task.await.context("Relay receiver task failed")?;

    println!("{}", serde_json::to_string_pretty(&captured)?);
    info!(
        "Captured {} token(s), relayed {} message(s), {} video(s) known to the extension",
        captured.len(),
        relayed,
        registry.len()
    );

    Ok(())
}
