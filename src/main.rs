use std::error::Error;
use std::sync::Arc;

use chatster::bot::SimulatedParticipants;
use chatster::config::{self, AppConfig};
use chatster::identity::{IdentityStore, PreferenceFile};
use chatster::room::{RoomChannel, SqliteBackend};
use chatster::summarizer::{GeminiClient, SkipReason, Summarizer, SummaryOutcome};
use chatster::ui::ChatApp;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "chatster", version, about = "Real-time group chat with live summaries")]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// Room database file (overrides config and CHATSTER_DB)
    #[arg(long, value_name = "FILE")]
    db: Option<String>,
    /// Shared room identifier
    #[arg(long)]
    room: Option<String>,
    /// Display name for this session (persisted)
    #[arg(long)]
    name: Option<String>,
    /// Avatar color, #RRGGBB or a color name (persisted)
    #[arg(long)]
    color: Option<String>,
    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Delete every message in the room
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Post a summary of the current conversation and exit
    Summarize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let config = resolve_config(&cli);

    let backend = Arc::new(SqliteBackend::open(&config.database_path, config.room.clone())?);
    let room = RoomChannel::with_poll_interval(backend, config.poll_interval());

    let mut identity = IdentityStore::load(PreferenceFile::new(&config.preferences_path));
    if let Some(name) = &cli.name {
        identity.set_display_name(name)?;
    }
    if let Some(color) = &cli.color {
        identity.set_avatar_color(color)?;
    }

    let participant_id = room.connect().await?;
    identity.assign_participant_id(participant_id);

    let generator = Arc::new(GeminiClient::new(
        config.gemini.api_key.clone(),
        config.gemini.base_url.clone(),
        config.gemini.model.clone(),
    )?);
    let summarizer = Arc::new(Summarizer::new(room.clone(), generator, config.retry_policy()));

    match cli.mode {
        Some(Mode::Clear { yes }) => run_clear(&room, yes).await,
        Some(Mode::Summarize) => run_summarize(&room, &summarizer, identity.participant_id()).await,
        None => {
            log::info!("Joining room `{}` as {}", config.room, identity.identity().display_name);
            let bot = SimulatedParticipants::new(room.clone(), config.bot_interval());
            let app = ChatApp::new(identity, room, bot, summarizer, config.retry_policy());
            app.run(BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;
            Ok(())
        }
    }
}

fn resolve_config(cli: &Cli) -> AppConfig {
    let mut config = config::load_config(&cli.config);
    config.apply_env();
    if let Some(db) = &cli.db {
        config.database_path = db.clone();
    }
    if let Some(room) = &cli.room {
        config.room = room.clone();
    }
    config
}

async fn run_clear(room: &RoomChannel, yes: bool) -> Result<(), Box<dyn Error>> {
    if !yes {
        println!("Clear all messages? [y/N]");
        let mut answer = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut answer).await?;
        if !matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
            println!("Clear cancelled");
            return Ok(());
        }
    }

    let count = room.clear_all().await?;
    println!("Cleared {count} messages");
    Ok(())
}

async fn run_summarize(
    room: &RoomChannel,
    summarizer: &Summarizer,
    participant_id: &str,
) -> Result<(), Box<dyn Error>> {
    let messages = room.snapshot().await?;
    match summarizer.summarize(&messages, participant_id).await {
        SummaryOutcome::Posted(message) => println!("{}", message.text),
        SummaryOutcome::Failed => {
            log::error!("Summary could not be generated");
            println!("Error generating summary. Please try again.");
        }
        SummaryOutcome::Skipped(SkipReason::Empty) => println!("Nothing to summarize yet"),
        SummaryOutcome::Skipped(SkipReason::NotConfigured) => {
            println!("Set GEMINI_API_KEY to enable summaries")
        }
        SummaryOutcome::Skipped(SkipReason::InFlight) => println!("Summary already in progress"),
    }
    Ok(())
}
