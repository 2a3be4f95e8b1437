use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reader_sync::{Article, Config, Folder, MemoryFeedStore, Reader, SyncTrigger};
use std::path::PathBuf;
use std::sync::Arc;

/// Get the config directory path (~/.config/reader-sync/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("reader-sync"))
}

#[derive(Parser, Debug)]
#[command(
    name = "reader-sync",
    about = "Sync client for Google Reader compatible feed services"
)]
struct Args {
    /// Config file (default: ~/.config/reader-sync/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List remote subscriptions
    Subscriptions,
    /// Subscribe to a feed
    Subscribe { url: String },
    /// Unsubscribe from a feed
    Unsubscribe { url: String },
    /// File a feed under a folder
    Label {
        url: String,
        name: String,
        /// Remove the feed from the folder instead
        #[arg(long)]
        remove: bool,
    },
    /// Refresh one or more feeds
    Refresh {
        #[arg(required = true)]
        urls: Vec<String>,
        /// Fetch every available article instead of the configured limit
        #[arg(long)]
        all_articles: bool,
    },
    /// Mark an article read
    MarkRead {
        feed: String,
        guid: String,
        /// Mark unread instead
        #[arg(long)]
        unread: bool,
    },
    /// Mark every article of a feed read
    MarkAllRead { feed: String },
    /// Star an article
    Star {
        feed: String,
        guid: String,
        /// Remove the star instead
        #[arg(long)]
        remove: bool,
    },
    /// Authenticate and fetch a fresh action token
    Token,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => get_config_dir()?.join("config.toml"),
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from '{}'", config_path.display()))?;

    let store = Arc::new(MemoryFeedStore::new());
    let reader = Reader::from_config(&config, store.clone()).context("Invalid configuration")?;

    let result = run(&reader, &store, args.command).await;
    reader.shutdown();
    result
}

async fn run(reader: &Reader, store: &MemoryFeedStore, command: Command) -> Result<()> {
    match command {
        Command::Subscriptions => {
            let count = reader
                .load_subscriptions(SyncTrigger::ApplicationReady)
                .await
                .context("Failed to load subscriptions")?;
            for sub in store.subscriptions() {
                if sub.labels.is_empty() {
                    println!("{}  <{}>", sub.title, sub.feed_url);
                } else {
                    println!("{}  <{}>  [{}]", sub.title, sub.feed_url, sub.labels.join(", "));
                }
            }
            println!("{} subscriptions", count);
        }
        Command::Subscribe { url } => {
            let feed_url = reader.subscribe(&url).await?;
            println!("Subscribed to {}", feed_url);
        }
        Command::Unsubscribe { url } => {
            reader.unsubscribe(&url).await?;
            println!("Unsubscribed from {}", url.trim());
        }
        Command::Label { url, name, remove } => {
            reader.set_folder_name(&name, &url, !remove).await?;
            if remove {
                println!("Removed {} from '{}'", url.trim(), name.trim());
            } else {
                println!("Filed {} under '{}'", url.trim(), name.trim());
            }
        }
        Command::Refresh { urls, all_articles } => {
            let folders = urls
                .iter()
                .enumerate()
                .map(|(i, url)| Folder::new(i as i64 + 1, url.trim(), url.trim()))
                .collect();
            let report = reader.refresh_all(folders, all_articles).await;
            for feed in &report.results {
                match &feed.result {
                    Ok(new) => println!("{}: {} new articles", feed.feed_url, new),
                    Err(e) => eprintln!("{}: {}", feed.feed_url, e),
                }
            }
            println!("{} new articles in total", reader.count_of_new_articles());
            report.into_result()?;
        }
        Command::MarkRead { feed, guid, unread } => {
            reader
                .mark_read(&Article::new(guid, feed), !unread)
                .await
                .context("Failed to update read state")?;
        }
        Command::MarkAllRead { feed } => {
            reader
                .mark_all_read(&feed)
                .await
                .context("Failed to mark feed read")?;
        }
        Command::Star { feed, guid, remove } => {
            reader
                .mark_starred(&Article::new(guid, feed), !remove)
                .await
                .context("Failed to update starred state")?;
        }
        Command::Token => {
            reader.get_token().await.context("Failed to fetch token")?;
            println!("Authenticated; action token refreshed");
        }
    }
    Ok(())
}
