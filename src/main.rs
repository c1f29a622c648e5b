use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use emojiart::{Background, ElementId, FetchStatus, Session, SessionConfig};
use url::Url;

/// Inspect or edit an EmojiArt document
#[derive(Parser)]
#[command(name = "emojiart", version)]
struct Cli {
    /// Document file (defaults to the per-user autosave file)
    #[arg(long, global = true)]
    file: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print the background and elements
    Show {
        /// Wait for the background to finish resolving and report its status
        #[arg(long)]
        wait: bool,
    },
    /// Place a new element
    Add {
        content: String,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        x: i32,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        y: i32,
        #[arg(long, default_value_t = 40)]
        size: i32,
    },
    /// Offset an element
    Move {
        id: u64,
        #[arg(allow_negative_numbers = true)]
        dx: i32,
        #[arg(allow_negative_numbers = true)]
        dy: i32,
    },
    /// Scale an element's size
    Resize { id: u64, scale: f64 },
    /// Delete an element
    Remove { id: u64 },
    /// Replace the background
    Background {
        #[command(subcommand)]
        source: BackgroundSource,
    },
}

#[derive(Subcommand)]
enum BackgroundSource {
    /// No background
    Blank,
    /// Remote image, fetched when the document is opened
    Url { url: Url },
    /// Embed an image file's bytes in the document
    Embed { path: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let path = match cli.file {
        Some(path) => path,
        None => emojiart::default_autosave_path()
            .context("No documents directory found; pass --file")?,
    };

    let session = Session::open(SessionConfig::with_autosave_path(&path)).await?;

    match cli.command {
        Cmd::Show { wait } => {
            if wait {
                let mut rx = session.subscribe();
                rx.wait_for(|s| s.fetch_status != FetchStatus::Fetching)
                    .await
                    .context("Session stopped while resolving the background")?;
            }
            print_document(&session, wait);
        }
        Cmd::Add { content, x, y, size } => {
            let id = session.add_element(content, (x, y), size).await?;
            println!("added #{}", id);
        }
        Cmd::Move { id, dx, dy } => {
            session.move_element(ElementId(id), (dx, dy)).await?;
        }
        Cmd::Resize { id, scale } => {
            session.resize_element(ElementId(id), scale).await?;
        }
        Cmd::Remove { id } => {
            if !session.remove_element(ElementId(id)).await? {
                bail!("No element with id {}", id);
            }
        }
        Cmd::Background { source } => {
            let background = match source {
                BackgroundSource::Blank => Background::Blank,
                BackgroundSource::Url { url } => Background::Url(url),
                BackgroundSource::Embed { path } => {
                    let bytes = tokio::fs::read(&path)
                        .await
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    Background::ImageData(bytes)
                }
            };
            session.set_background(background).await?;
        }
    }

    session.close().await?;
    Ok(())
}

fn print_document(session: &Session, with_status: bool) {
    let snapshot = session.snapshot();
    println!("background: {}", snapshot.document.background());
    if with_status {
        match &snapshot.fetch_status {
            FetchStatus::Failed(url) => println!("status: failed ({})", url),
            _ => match &snapshot.background_image {
                Some(img) => println!("status: ready ({}x{})", img.width, img.height),
                None => println!("status: idle"),
            },
        }
    }
    for e in snapshot.document.elements() {
        println!(
            "#{} {} at ({}, {}) size {}",
            e.id(),
            e.content(),
            e.position().x,
            e.position().y,
            e.size()
        );
    }
}
