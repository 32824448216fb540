use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use feed_client::{
    auth::{file::FileSession, TokenProviderRegistry},
    config::Config,
    feed::FeedClient,
};
use serde::Serialize;
use tracing::info;

/// Talk to the feed API from the command line.
#[derive(Debug, Parser)]
#[command(name = "feed-client", version)]
struct Cli {
    /// API base URL, overrides FEED_API_BASE_URL.
    #[arg(long)]
    api_base_url: Option<String>,
    /// Where the session tokens are kept, overrides FEED_SESSION_FILE.
    #[arg(long)]
    session_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Login { username: String, password: String },
    Register { username: String, password: String },
    Logout,
    Feed,
    Post { content: String },
    Follow { user_id: i64 },
    Unfollow { user_id: i64 },
    Search { query: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env().context("reading configuration")?;
    if let Some(api_base_url) = cli.api_base_url {
        config.api_base_url = Some(api_base_url);
    }
    if let Some(session_file) = cli.session_file {
        config.session_file = session_file;
    }

    let session = FileSession::load(&config.session_file)
        .await
        .with_context(|| format!("loading session from {}", config.session_file.display()))?;
    info!(message = "Using session file", path = %session.path().display());

    let registry = TokenProviderRegistry::new();
    registry.register(Arc::new(session));

    let feed = FeedClient::new(config.api_client()?, registry);

    match cli.command {
        Command::Login { username, password } => {
            feed.login(&username, &password).await?;
            println!("logged in as {username}");
        }
        Command::Register { username, password } => print(&feed.register(&username, &password).await?)?,
        Command::Logout => {
            feed.logout().await;
            println!("logged out");
        }
        Command::Feed => print(&feed.feed().await?)?,
        Command::Post { content } => {
            feed.create_post(&content).await?;
            println!("posted");
        }
        Command::Follow { user_id } => print(&feed.follow(user_id).await?)?,
        Command::Unfollow { user_id } => print(&feed.unfollow(user_id).await?)?,
        Command::Search { query } => print(&feed.search_users(&query).await?)?,
    }

    Ok(())
}

fn print<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
