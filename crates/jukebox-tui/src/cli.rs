use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Subcommand;
use colored::*;
use jukebox_core::{
    download_artifact, ApiClient, AttachedFile, ChatRole, Config, ConversationMessage,
    ConversationSession, ExportFormat, Exporter, PlainTextExtractor, StreamEnd,
};

#[derive(Subcommand)]
pub enum Commands {
    /// List conversations
    List,
    /// Start a conversation from a goal
    New {
        /// What the conversation should produce
        goal: String,
        /// Attach a text file (repeatable)
        #[arg(short, long = "file")]
        files: Vec<PathBuf>,
    },
    /// Print a conversation's messages and latest artifact
    Show {
        /// Conversation ID
        id: String,
    },
    /// Send a message and wait for the reply
    Send {
        /// Conversation ID
        id: String,
        /// Message text
        message: String,
        /// Attach a text file (repeatable)
        #[arg(short, long = "file")]
        files: Vec<PathBuf>,
    },
    /// Save the latest artifact of a conversation
    Download {
        /// Conversation ID
        id: String,
        /// Output format (markdown, docx, pdf)
        #[arg(short, long, default_value = "markdown")]
        format: String,
        /// Directory to write to (defaults to the configured download directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Read or change saved settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Save the API base URL
    SetUrl { url: String },
    /// Print the settings in effect
    Show,
}

pub async fn run(command: Commands, client: ApiClient, config: &Config) -> Result<()> {
    match command {
        Commands::List => list_conversations(&client).await,
        Commands::New { goal, files } => new_conversation(&client, &goal, &files).await,
        Commands::Show { id } => show_conversation(&client, &id).await,
        Commands::Send { id, message, files } => send_message(client, id, &message, &files).await,
        Commands::Download { id, format, out } => {
            let dir = out.unwrap_or_else(|| config.download_dir());
            download(&client, &id, &format, dir).await
        }
        Commands::Config { action } => match action {
            ConfigAction::SetUrl { url } => set_url(&url),
            ConfigAction::Show => {
                show_config(&client, config);
                Ok(())
            }
        },
    }
}

async fn read_files(paths: &[PathBuf]) -> Result<Vec<AttachedFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let file = AttachedFile::from_path(path, &PlainTextExtractor)
            .await
            .map_err(|e| anyhow!("{}: {}", path.display(), e))?;
        println!("📎 {} ({} chars)", file.name.magenta(), file.contents.chars().count());
        files.push(file);
    }
    Ok(files)
}

async fn list_conversations(client: &ApiClient) -> Result<()> {
    let conversations = client.list_conversations().await?;

    println!("\n{}", "💬 Conversations".bold().blue());
    println!("{}", "=".repeat(40).dimmed());

    if conversations.is_empty() {
        println!("{}", "No conversations yet. Start one with: jukebox new <goal>".yellow());
        return Ok(());
    }

    for conversation in conversations {
        println!("  {}  {}", conversation.id.dimmed(), conversation.goal);
    }

    Ok(())
}

async fn new_conversation(client: &ApiClient, goal: &str, paths: &[PathBuf]) -> Result<()> {
    if goal.trim().is_empty() {
        return Err(anyhow!("Goal cannot be empty"));
    }

    let files = read_files(paths).await?;
    let id = client.create_conversation(goal.trim(), &files).await?;

    println!("{} {}", "Created conversation".green(), id.bold());
    println!("Open it with: {}", format!("jukebox show {}", id).bold());
    Ok(())
}

fn print_message(message: &ConversationMessage) {
    let label = match message.role {
        ChatRole::User => "You:".bold().cyan(),
        ChatRole::Assistant => "Assistant:".bold().yellow(),
    };
    println!("\n{}", label);
    println!("{}", message.content);
    for file in &message.files {
        println!("📎 {}", file.name.magenta());
    }
}

fn print_artifact(artifact: &str) {
    println!("\n{}", "📄 Artifact".bold().green());
    println!("{}", "=".repeat(50).dimmed());
    println!("{}", artifact);
    println!("{}", "=".repeat(50).dimmed());
}

async fn show_conversation(client: &ApiClient, id: &str) -> Result<()> {
    let detail = client.get_conversation(id).await?;
    let messages = client.list_messages(id).await?;

    println!("\n{}", format!("🎯 {}", detail.goal).bold().blue());
    for file in &detail.files {
        println!("📎 {}", file.name.magenta());
    }

    if messages.is_empty() {
        println!("{}", "No messages yet".dimmed());
        return Ok(());
    }

    for stored in &messages {
        print_message(&stored.message);
    }

    match messages.last().and_then(|m| m.artifact.as_deref()) {
        Some(artifact) if !artifact.is_empty() => print_artifact(artifact),
        _ => println!("\n{}", "No artifact yet".dimmed()),
    }

    Ok(())
}

async fn send_message(
    client: ApiClient,
    id: String,
    message: &str,
    paths: &[PathBuf],
) -> Result<()> {
    let files = read_files(paths).await?;
    let session = ConversationSession::new(id, Arc::new(client));

    println!("{}", "Waiting for reply...".dimmed());
    let outcome = session.send_message(message, files).await?;

    let state = session.snapshot();
    match state.messages.last() {
        Some(reply) if reply.role == ChatRole::Assistant => print_message(reply),
        _ => println!("\n{}", "No reply received".yellow()),
    }
    if !state.artifact.is_empty() {
        print_artifact(&state.artifact);
    }
    if outcome.end == StreamEnd::Interrupted {
        println!("{}", "⚠️  The reply stream was interrupted".yellow());
    }

    Ok(())
}

async fn download(client: &ApiClient, id: &str, format: &str, dir: PathBuf) -> Result<()> {
    let format = ExportFormat::from_str(format).ok_or_else(|| {
        let known: Vec<&str> = ExportFormat::all().iter().map(|f| f.as_str()).collect();
        anyhow!("Unknown format '{}' (expected one of: {})", format, known.join(", "))
    })?;

    let download = download_artifact(client, id, format, &Exporter::new()).await?;
    let path = download.save_to(&dir).await?;

    println!("{} {}", "Saved".green(), path.display().to_string().bold());
    Ok(())
}

fn set_url(url: &str) -> Result<()> {
    let url = url.trim();
    if url.is_empty() {
        return Err(anyhow!("URL cannot be empty"));
    }
    Config::save_api_url(url)?;
    println!("{} {}", "API URL saved:".green(), url.bold());
    Ok(())
}

fn show_config(client: &ApiClient, config: &Config) {
    println!("{} {}", "API URL:".bold(), client.base_url());
    println!(
        "{} {}",
        "Download directory:".bold(),
        config.download_dir().display()
    );
    if let Ok(dir) = Config::config_dir() {
        println!("{} {}", "Config file:".bold(), dir.join("config.json").display());
    }
}
