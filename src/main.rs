pub mod audio;
pub mod auth;
pub mod client;
mod config;
pub mod conversation;
pub mod error;
pub mod session;

#[cfg(test)]
mod tests;

use audio::analysis::LevelTap;
use auth::{ApiKeyStore, mask_key, resolve_api_key};
use clap::{Parser, Subcommand};
use client::github::{DEFAULT_REPO_NAME, GitHubClient, RepoFile};
use config::{AppConfig, Voice};
use conversation::{Conversation, Role};
use session::backend::LiveBackend;
use session::controller::SessionController;
use session::{SessionEvent, SessionSetup, SessionState, UiEvent};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "live-voice")]
#[command(about = "Real-time voice conversation with a Gemini Live assistant", long_about = None)]
struct Args {
    /// Log debug detail (per-fragment scheduling, audio levels)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a live voice session (default)
    Talk(TalkArgs),
    /// Show or change persisted settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Push files to a GitHub repository
    Share {
        /// Repository name under the token's account
        #[arg(long, default_value = DEFAULT_REPO_NAME)]
        repo: String,
        /// GitHub token with `repo` permissions
        #[arg(long)]
        token: String,
        /// Files to push, relative to the current directory
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List the available voices
    Voices,
}

#[derive(clap::Args, Debug, Default)]
struct TalkArgs {
    #[arg(long, value_enum)]
    voice: Option<Voice>,
    /// System instruction for this session only
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long)]
    model: Option<String>,
    /// API key for this session only
    #[arg(long)]
    api_key: Option<String>,
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    Show,
    SetKey { key: String },
    SetPrompt { prompt: String },
    SetVoice {
        #[arg(value_enum)]
        voice: Voice,
    },
    ResetPrompt,
    /// Delete every persisted setting, including the API key
    Reset,
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "live_voice=debug"
    } else {
        "live_voice=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command.unwrap_or(Command::Talk(TalkArgs::default())) {
        Command::Talk(talk_args) => talk(talk_args).await,
        Command::Settings { action } => settings(action),
        Command::Share { repo, token, files } => share(&repo, &token, &files).await,
        Command::Voices => {
            for voice in Voice::ALL {
                println!("{:<8} {:<16} {}", voice.id(), voice.label(), voice.description());
            }
            Ok(())
        }
    }
}

async fn talk(args: TalkArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load();
    let store = ApiKeyStore::open_default().ok();

    let setup = SessionSetup {
        api_key: resolve_api_key(args.api_key.as_deref(), store.as_ref()),
        model: args.model.unwrap_or(config.session.model),
        voice: args.voice.unwrap_or(config.session.voice),
        system_instruction: args.prompt.unwrap_or(config.session.system_prompt),
    };

    let input_level = LevelTap::new();
    let output_level = LevelTap::new();
    let backend = Arc::new(LiveBackend::new(input_level.clone(), output_level.clone()));

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
    let controller = SessionController::new(backend, setup, events_tx.clone(), ui_tx);
    let controller_task = tokio::spawn(controller.run(events_rx));
    let _ = events_tx.send(SessionEvent::Start);

    let mut conversation = Conversation::new();
    let mut meter = tokio::time::interval(Duration::from_secs(1));
    let mut connected = false;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("stopping session");
                break;
            }
            _ = meter.tick(), if connected => {
                tracing::debug!(
                    input = input_level.level(),
                    output = output_level.level(),
                    "levels"
                );
            }
            event = ui_rx.recv() => match event {
                Some(UiEvent::StateChanged(state)) => {
                    println!("[{state}]");
                    match state {
                        SessionState::Connected => {
                            connected = true;
                            println!("Listening. Press Ctrl+C to stop.");
                        }
                        SessionState::Disconnected if connected => break,
                        _ => {}
                    }
                }
                Some(UiEvent::CredentialRequired) => {
                    println!(
                        "No API key set. Run `live-voice settings set-key <KEY>` \
                         or set GEMINI_API_KEY."
                    );
                    break;
                }
                Some(UiEvent::Transcript(entry)) => {
                    if !entry.text.is_empty() {
                        println!("{:>9}: {}", entry.role, entry.text);
                    }
                    conversation.push(entry);
                }
                Some(UiEvent::Failure(message)) => {
                    println!("Session error: {message}");
                    break;
                }
                None => break,
            }
        }
    }

    let _ = events_tx.send(SessionEvent::Shutdown);
    let _ = controller_task.await;
    let turns = conversation
        .entries()
        .iter()
        .filter(|e| e.role == Role::User)
        .count();
    tracing::info!(turns, entries = conversation.len(), "session ended");
    Ok(())
}

fn settings(action: SettingsAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load();
    let store = ApiKeyStore::open_default()?;

    match action {
        SettingsAction::Show => {
            let key = store.read()?.map(|k| mask_key(&k));
            let voice = config.session.voice;
            println!("voice:  {} ({})", voice.label(), voice.description());
            println!("model:  {}", config.session.model);
            println!("key:    {}", key.as_deref().unwrap_or("<not set>"));
            println!("prompt: {}", config.session.system_prompt);
            if let Some(dir) = config::config_dir() {
                println!("stored in {}", dir.display());
            }
        }
        SettingsAction::SetKey { key } => {
            store.save(&key)?;
            println!("API key saved.");
        }
        SettingsAction::SetPrompt { prompt } => {
            config.session.system_prompt = prompt;
            config.save()?;
            println!("System prompt saved.");
        }
        SettingsAction::SetVoice { voice } => {
            config.session.voice = voice;
            config.save()?;
            println!("Voice set to {}.", voice.label());
        }
        SettingsAction::ResetPrompt => {
            config.reset_prompt();
            config.save()?;
            println!("System prompt restored to default.");
        }
        SettingsAction::Reset => {
            config::reset_all()?;
            println!("All settings cleared.");
        }
    }
    Ok(())
}

async fn share(
    repo: &str,
    token: &str,
    paths: &[PathBuf],
) -> Result<(), Box<dyn std::error::Error>> {
    let files = paths
        .iter()
        .map(|p| RepoFile::read(p))
        .collect::<Result<Vec<_>, _>>()?;

    let mut github = GitHubClient::new(token)?;
    let existed = github.ensure_repo_exists(repo).await?;
    github.push_files(repo, &files).await?;

    let owner = github.authenticated_user().await?;
    let verb = if existed { "Updated" } else { "Created" };
    println!("{verb} {owner}/{repo} with {} file(s).", files.len());
    Ok(())
}
