//! SignFlow Command Line Interface
//!
//! Terminal front end for SignFlow. Plays transcripts read from stdin as sign
//! sequences, manages the sign library, and edits persisted configuration.

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde_json::json;
use signflow_common::config::CONFIG_KEYS;
use signflow_engine::config::{load_config, save_config, Config};
use signflow_engine::speech::{
    CaptureExit, CaptureSettings, CaptureSupervisor, SpeechError, SpeechEvent, SpeechSource,
};
use signflow_engine::text::normalize_key;
use signflow_engine::{
    Asset, AssetPayload, DisplayItem, JsonLibraryStore, LibraryStore, ReviewState, Session,
    SessionCallback,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "signflow")]
#[command(author = "SignFlow")]
#[command(version)]
#[command(about = "Speech-to-sign playback CLI", long_about = None)]
struct Cli {
    /// Output format
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Increase verbosity
    #[arg(short, long)]
    verbose: bool,

    /// Sign library file (overrides the configured location)
    #[arg(long, global = true)]
    library: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Play transcript lines from stdin as signs
    ///
    /// Each line is one finalized speech segment. Lines starting with '~' are
    /// shown as interim text only.
    Play {
        /// Simulated video length in milliseconds
        #[arg(long, default_value_t = 2000)]
        video_ms: u64,
    },

    /// Manage the sign library
    #[command(alias = "lib")]
    Library {
        #[command(subcommand)]
        action: LibraryAction,
    },

    /// Read or write persisted configuration values
    #[command(alias = "cfg")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum LibraryAction {
    /// List every sign in the library
    #[command(alias = "ls")]
    List,

    /// Add or replace a sign from a media file
    Add {
        /// Word or phrase the sign shows
        key: String,

        /// Image or video file
        file: PathBuf,
    },

    /// Remove a sign
    #[command(alias = "rm")]
    Remove {
        /// Word or phrase to remove
        key: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Display all persisted configuration values
    Show,

    /// Get the value of a configuration key
    Get {
        /// Configuration key (display_dwell_ms, max_phrase_words, ...)
        key: String,
    },

    /// Set the value of a configuration key
    Set {
        /// Configuration key (display_dwell_ms, max_phrase_words, ...)
        key: String,

        /// Value to set
        value: String,
    },
}

/// Error with an associated exit code.
struct CliError {
    message: String,
    exit_code: i32,
}

impl CliError {
    fn new(message: impl Into<String>, exit_code: i32) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    fn general(message: impl Into<String>) -> Self {
        Self::new(message, 1)
    }

    fn usage(message: impl Into<String>) -> Self {
        Self::new(message, 64)
    }
}

impl From<String> for CliError {
    fn from(message: String) -> Self {
        Self::general(message)
    }
}

impl From<&str> for CliError {
    fn from(message: &str) -> Self {
        Self::general(message.to_string())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{}: {}", "Error".red().bold(), e.message);
        std::process::exit(e.exit_code);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    if matches!(cli.command, Commands::Version) {
        println!("signflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let _log_guard = signflow_engine::logging::init_logging(cli.verbose);

    let mut config = load_config();
    if let Some(path) = &cli.library {
        config.library_path = Some(path.clone());
    }

    match &cli.command {
        Commands::Play { video_ms } => {
            handle_play(&cli, &config, Duration::from_millis(*video_ms)).await
        }
        Commands::Library { action } => handle_library(&cli, &config, action),
        Commands::Config { action } => handle_config(&cli, action),
        Commands::Version => Ok(()),
    }
}

// === play ===

/// Session events forwarded to the render loop.
enum UiEvent {
    Display(Option<DisplayItem>),
    Review(ReviewState, Vec<String>),
    Interim(String),
    StorageWarning(String),
    CaptureError(String),
}

/// Forwards session callbacks over a channel so rendering happens in one place.
struct ChannelCallback {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl SessionCallback for ChannelCallback {
    fn on_display(&self, item: Option<&DisplayItem>) {
        let _ = self.tx.send(UiEvent::Display(item.cloned()));
    }

    fn on_review_changed(&self, state: ReviewState, missing: &[String]) {
        let _ = self.tx.send(UiEvent::Review(state, missing.to_vec()));
    }

    fn on_transcript(&self, _transcript: &str, interim: &str) {
        let _ = self.tx.send(UiEvent::Interim(interim.to_string()));
    }

    fn on_storage_warning(&self, message: &str) {
        let _ = self.tx.send(UiEvent::StorageWarning(message.to_string()));
    }

    fn on_capture_error(&self, message: &str) {
        let _ = self.tx.send(UiEvent::CaptureError(message.to_string()));
    }
}

/// Speech source backed by stdin lines. Lines read while stopped are dropped.
struct StdinSource {
    active: Arc<AtomicBool>,
}

impl SpeechSource for StdinSource {
    fn start(&mut self, language: &str) -> Result<(), String> {
        debug!("[Play] Reading stdin as {} speech", language);
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Read stdin until EOF, turning lines into speech events.
async fn read_stdin(active: Arc<AtomicBool>, tx: mpsc::Sender<SpeechEvent>) {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                let _ = tx
                    .send(SpeechEvent::Error(SpeechError::Other(e.to_string())))
                    .await;
                break;
            }
        };
        if !active.load(Ordering::SeqCst) {
            continue;
        }
        let event = match line.strip_prefix('~') {
            Some(interim) => SpeechEvent::Interim(interim.to_string()),
            None => SpeechEvent::Final(line),
        };
        if tx.send(event).await.is_err() {
            break;
        }
    }
    debug!("[Play] stdin closed");
}

async fn handle_play(cli: &Cli, config: &Config, video_length: Duration) -> Result<(), CliError> {
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
    let session = signflow_engine::open_session(config, Arc::new(ChannelCallback { tx: ui_tx }));

    if !cli.quiet && matches!(cli.format, OutputFormat::Text) {
        eprintln!(
            "{} ({} sign(s) in {})",
            "Reading transcript from stdin".green(),
            session.library().len(),
            config.library_file().display()
        );
        eprintln!("Press Ctrl+C to stop");
    }

    let active = Arc::new(AtomicBool::new(true));
    let (speech_tx, speech_rx) = mpsc::channel(64);
    tokio::spawn(read_stdin(active.clone(), speech_tx));

    let supervisor = CaptureSupervisor::new(
        StdinSource { active },
        session.clone(),
        CaptureSettings::from(config),
    );
    let mut capture = tokio::spawn(supervisor.run(speech_rx));

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut input_done = false;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                session.stop();
                if !cli.quiet {
                    eprintln!("\n{}", "Interrupted".yellow());
                }
                break;
            }
            exit = &mut capture, if !input_done => {
                input_done = true;
                match exit {
                    Ok(CaptureExit::Fatal(e)) => return Err(format!("Speech capture failed: {}", e).into()),
                    Ok(CaptureExit::StartFailed(message)) => return Err(message.into()),
                    Ok(exit) => info!("[Play] Capture ended: {:?}", exit),
                    Err(e) => return Err(format!("Capture task failed: {}", e).into()),
                }
                if session.is_settled() {
                    break;
                }
            }
            event = ui_rx.recv() => {
                let Some(event) = event else {
                    break;
                };
                let settled_review = matches!(
                    &event,
                    UiEvent::Review(state, _) if *state != ReviewState::Sequencing
                );
                render(cli, &session, event, video_length)?;
                if input_done && settled_review && session.is_settled() {
                    break;
                }
            }
        }
    }

    while let Ok(event) = ui_rx.try_recv() {
        render(cli, &session, event, video_length)?;
    }

    Ok(())
}

fn render(
    cli: &Cli,
    session: &Session,
    event: UiEvent,
    video_length: Duration,
) -> Result<(), CliError> {
    let json = matches!(cli.format, OutputFormat::Json);
    match event {
        UiEvent::Display(Some(item)) => {
            if item.completes_on_media_end() {
                // Stand-in for the renderer reporting the end of the clip.
                let session = session.clone();
                let seq = item.unit.seq;
                tokio::spawn(async move {
                    tokio::time::sleep(video_length).await;
                    session.display_complete(seq);
                });
            }

            if json {
                let kind = item.asset.as_ref().map(|a| a.kind().as_str());
                print_json(&json!({
                    "event": "display",
                    "seq": item.unit.seq,
                    "key": item.unit.key,
                    "kind": kind,
                }))?;
            } else {
                let badge = match &item.asset {
                    Some(asset) if asset.is_video() => "[video]".magenta(),
                    Some(_) => "[image]".cyan(),
                    None => "[text] ".yellow(),
                };
                println!("{} {}", badge, item.unit.key.bold());
            }
        }
        UiEvent::Display(None) => {
            if json {
                print_json(&json!({ "event": "display", "key": null }))?;
            }
        }
        UiEvent::Review(state, missing) => {
            if json {
                print_json(&json!({
                    "event": "review",
                    "state": state,
                    "missing": missing,
                }))?;
            } else if state == ReviewState::Reviewing {
                println!(
                    "{} {} not in library: {}",
                    missing.len().to_string().yellow().bold(),
                    if missing.len() == 1 { "word" } else { "words" },
                    missing.join(", ")
                );
            } else if cli.verbose {
                eprintln!("{}", format!("[{}]", state).dimmed());
            }
        }
        UiEvent::Interim(text) => {
            if cli.verbose && !text.is_empty() {
                eprintln!("{}", format!("... {}", text).dimmed());
            }
        }
        UiEvent::StorageWarning(message) => {
            eprintln!("{}: {}", "Warning".yellow().bold(), message);
        }
        UiEvent::CaptureError(message) => {
            eprintln!("{}: {}", "Capture error".red(), message);
        }
    }
    Ok(())
}

fn print_json(value: &serde_json::Value) -> Result<(), CliError> {
    println!("{}", serde_json::to_string(value).map_err(|e| e.to_string())?);
    Ok(())
}

// === library ===

fn handle_library(cli: &Cli, config: &Config, action: &LibraryAction) -> Result<(), CliError> {
    let store = JsonLibraryStore::open(config.library_file());

    match action {
        LibraryAction::List => {
            let entries = store.get_all().map_err(|e| e.to_string())?;
            let mut keys: Vec<&String> = entries.keys().collect();
            keys.sort();

            if matches!(cli.format, OutputFormat::Json) {
                let listing: Vec<_> = keys
                    .iter()
                    .map(|key| {
                        let asset = &entries[*key];
                        json!({
                            "key": key,
                            "kind": asset.kind(),
                            "mime": asset.mime(),
                            "size": asset.payload().len(),
                        })
                    })
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&listing).map_err(|e| e.to_string())?
                );
            } else if keys.is_empty() {
                println!("No signs in {}", store.path().display());
            } else {
                println!(
                    "{} {} in {}:\n",
                    keys.len().to_string().green().bold(),
                    if keys.len() == 1 { "sign" } else { "signs" },
                    store.path().display()
                );
                for key in keys {
                    let asset = &entries[key];
                    let badge = if asset.is_video() {
                        "[video]".magenta()
                    } else {
                        "[image]".cyan()
                    };
                    println!("  {} {}", badge, key);
                    println!(
                        "    {}",
                        format!("{}, {} bytes", asset.mime(), asset.payload().len()).dimmed()
                    );
                }
            }
        }

        LibraryAction::Add { key, file } => {
            let normalized = normalize_key(key);
            if normalized.is_empty() {
                return Err(CliError::usage(format!("Invalid sign key '{}'", key)));
            }
            let bytes = std::fs::read(file)
                .map_err(|e| format!("Failed to read {}: {}", file.display(), e))?;
            if bytes.is_empty() {
                return Err(CliError::usage(format!("{} is empty", file.display())));
            }

            let asset = Asset::from_payload(AssetPayload::Bytes(bytes));
            store
                .put(&normalized, &asset)
                .map_err(|e| format!("Failed to save sign: {}", e))?;

            if !cli.quiet {
                println!(
                    "{} '{}' ({})",
                    "Saved".green(),
                    normalized,
                    asset.kind()
                );
            }
        }

        LibraryAction::Remove { key } => {
            let normalized = normalize_key(key);
            let entries = store.get_all().map_err(|e| e.to_string())?;
            if !entries.contains_key(&normalized) {
                return Err(CliError::general(format!("No sign for '{}'", key)));
            }
            store
                .delete(&normalized)
                .map_err(|e| format!("Failed to remove sign: {}", e))?;

            if !cli.quiet {
                println!("{} '{}'", "Removed".green(), normalized);
            }
        }
    }

    Ok(())
}

// === config ===

fn handle_config(cli: &Cli, action: &ConfigAction) -> Result<(), CliError> {
    // Reload without the --library override so it is never persisted.
    let mut config = Config::load();

    match action {
        ConfigAction::Show => {
            if matches!(cli.format, OutputFormat::Json) {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&config).map_err(|e| e.to_string())?
                );
            } else {
                for key in CONFIG_KEYS {
                    let value = config
                        .get_value(key)
                        .unwrap_or_else(|| "(default)".to_string());
                    println!("{}: {}", key.bold(), value);
                }
            }
        }

        ConfigAction::Get { key } => {
            validate_config_key(key)?;
            let value = config.get_value(key);
            if matches!(cli.format, OutputFormat::Json) {
                print_json(&json!({ key.as_str(): value }))?;
            } else {
                println!("{}", value.unwrap_or_else(|| "(default)".to_string()));
            }
        }

        ConfigAction::Set { key, value } => {
            validate_config_key(key)?;
            config.set_value(key, value).map_err(CliError::usage)?;
            save_config(&config)
                .map_err(|e| CliError::general(format!("Failed to save config: {}", e)))?;
            if !cli.quiet {
                println!("{} {} = {}", "Set".green(), key, value);
            }
        }
    }

    Ok(())
}

/// Validate that a config key name is recognized.
fn validate_config_key(key: &str) -> Result<(), CliError> {
    if CONFIG_KEYS.contains(&key) {
        Ok(())
    } else {
        Err(CliError::usage(format!(
            "Unknown configuration key '{}'. Valid keys: {}",
            key,
            CONFIG_KEYS.join(", ")
        )))
    }
}
