// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{error, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use lingodeck::app_config::{self, BackendKind, Config, UsageNotes};
use lingodeck::app_controller::{self, Controller};

/// CLI Wrapper for BackendKind to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliBackend {
    #[value(name = "openai")]
    OpenAI,
    Google,
}

impl From<CliBackend> for BackendKind {
    fn from(cli_backend: CliBackend) -> Self {
        match cli_backend {
            CliBackend::OpenAI => BackendKind::OpenAI,
            CliBackend::Google => BackendKind::Google,
        }
    }
}

/// CLI Wrapper for UsageNotes to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliUsageNotes {
    Auto,
    Always,
    Never,
}

impl From<CliUsageNotes> for UsageNotes {
    fn from(cli_notes: CliUsageNotes) -> Self {
        match cli_notes {
            CliUsageNotes::Auto => UsageNotes::Auto,
            CliUsageNotes::Always => UsageNotes::Always,
            CliUsageNotes::Never => UsageNotes::Never,
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
    /// Build a deck from a word list (default command)
    Build(BuildArgs),

    /// Generate shell completions for lingodeck
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug, Clone)]
struct BuildArgs {
    /// Word list: .txt with one word per line, or .csv using the first column
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    #[command(flatten)]
    options: BuildOptions,
}

#[derive(clap::Args, Debug, Clone)]
struct BuildOptions {
    /// Configuration file path
    #[arg(short, long, default_value = "config.json")]
    config_path: PathBuf,

    /// Usage-notes mode for generated cards
    #[arg(short, long, value_enum)]
    usage_notes: Option<CliUsageNotes>,

    /// Generation backend to use
    #[arg(short, long, value_enum)]
    backend: Option<CliBackend>,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Re-synthesize audio even when the clip already exists
    #[arg(short, long)]
    force_audio: bool,

    /// Ignore the generation cache
    #[arg(long)]
    no_cache: bool,

    /// Ignore and do not update the resume state
    #[arg(long)]
    no_resume: bool,
}

/// lingodeck - vocabulary flashcards from a word list
///
/// Generates a translation, an example sentence pair, audio and new-word
/// hints for every word, and writes them as an importable deck.
#[derive(Parser, Debug)]
#[command(name = "lingodeck")]
#[command(version)]
#[command(about = "Turn a word list into an audio flashcard deck")]
#[command(long_about = "lingodeck generates flashcards (translation, example sentences, audio and new words) for every word in a list.

EXAMPLES:
    lingodeck words.txt                       # Build using config.json
    lingodeck -b google -u always words.csv   # Use Gemini and always add usage notes
    lingodeck -f --no-cache words.txt         # Regenerate audio and ignore the cache
    lingodeck completions bash > lingodeck.bash

CONFIGURATION:
    Configuration is stored in config.json by default. If the file doesn't
    exist, a default one is created. API keys may also come from the
    OPENAI_API_KEY and GOOGLE_API_KEY environment variables.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Word list: .txt with one word per line, or .csv using the first column
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    #[command(flatten)]
    options: BuildOptions,
}

// Levels are atomics so they can change after the logger is installed
static APP_LEVEL: AtomicUsize = AtomicUsize::new(LevelFilter::Info as usize);
static THIRD_PARTY_LEVEL: AtomicUsize = AtomicUsize::new(LevelFilter::Warn as usize);

fn level_from_usize(value: usize) -> LevelFilter {
    match value {
        0 => LevelFilter::Off,
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

// @struct: Custom logger implementation
struct CustomLogger;

impl CustomLogger {
    // @initializes: Global logger
    fn init() -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CustomLogger))?;
        Self::set_levels(LevelFilter::Info, LevelFilter::Warn);
        Ok(())
    }

    // @updates: Levels for this crate and for everything else
    fn set_levels(app: LevelFilter, third_party: LevelFilter) {
        APP_LEVEL.store(app as usize, Ordering::Relaxed);
        THIRD_PARTY_LEVEL.store(third_party as usize, Ordering::Relaxed);
        log::set_max_level(app.max(third_party));
    }

    // @returns: Prefix for log level
    fn get_tag_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "ERROR",
            Level::Warn => "WARN ",
            Level::Info => "INFO ",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    // @returns: ANSI color for log level
    fn get_color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        let limit = if metadata.target().starts_with("lingodeck") {
            &APP_LEVEL
        } else {
            &THIRD_PARTY_LEVEL
        };
        let limit = level_from_usize(limit.load(Ordering::Relaxed));
        metadata.level() <= limit
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let color = Self::get_color_for_level(record.level());
            let tag = Self::get_tag_for_level(record.level());

            app_controller::suspend_progress(|| {
                let mut stderr = std::io::stderr();
                let _ = writeln!(stderr, "{}{} {} {}\x1B[0m", color, now, tag, record.args());
            });
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = CustomLogger::init() {
        eprintln!("Failed to initialize logger: {}", e);
    }

    if let Err(e) = run_cli().await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<()> {
    let cli = CommandLineOptions::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "lingodeck", &mut std::io::stdout());
            Ok(())
        }
        Some(Commands::Build(args)) => run_build(args).await,
        None => {
            let input = cli
                .input
                .ok_or_else(|| anyhow!("INPUT is required when no subcommand is specified"))?;
            run_build(BuildArgs {
                input,
                options: cli.options,
            })
            .await
        }
    }
}

async fn run_build(args: BuildArgs) -> Result<()> {
    let options = args.options;

    // Apply the CLI log level right away so config loading is covered too
    if let Some(level) = &options.log_level {
        let level: app_config::LogLevel = level.clone().into();
        CustomLogger::set_levels(level.to_level_filter(), LevelFilter::Warn);
    }

    let mut config = Config::load_or_create(&options.config_path)?;

    if let Some(backend) = options.backend {
        config.backend = backend.into();
    }
    if let Some(usage_notes) = options.usage_notes {
        config.usage_notes_def = usage_notes.into();
    }
    if let Some(level) = options.log_level {
        config.log_level = level.into();
    }
    if options.force_audio {
        config.regenerate_audio_always = true;
    }
    if options.no_cache {
        config.enable_cache = false;
    }
    if options.no_resume {
        config.resume_enabled = false;
    }

    CustomLogger::set_levels(
        config.log_level.to_level_filter(),
        config.third_party_log_level.to_level_filter(),
    );

    let controller = Controller::with_config(config)?;
    controller.run(&args.input).await?;
    Ok(())
}
