//! DriveDeck CLI — cloud drive folder browser
//!
//! Usage:
//!   drivedeck-cli ls [folder-id]            List a folder page by page
//!   drivedeck-cli perms [folder-id]         List a folder with sharing grants
//!   drivedeck-cli get <item-id> <local>     Download a file
//!
//! The bearer token is read from the DRIVEDECK_TOKEN environment variable.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use drivedeck::{
    Entry, FolderBrowser, GraphConfig, GraphGateway, ListingGateway, RowCount, Session,
    ROOT_FOLDER_ID,
};

#[derive(Parser)]
#[command(
    name = "drivedeck-cli",
    about = "DriveDeck CLI — cloud drive folder browser",
    version
)]
struct Cli {
    /// Log filter (e.g. warn, info, drivedeck=debug)
    #[arg(long, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List a folder's entries
    Ls {
        /// Folder id (default: drive root)
        #[arg(default_value = ROOT_FOLDER_ID)]
        folder: String,
        /// Maximum number of pages to fetch (0 = all)
        #[arg(long, default_value_t = 0)]
        pages: usize,
    },
    /// List a folder's entries with their sharing grants
    Perms {
        /// Folder id (default: drive root)
        #[arg(default_value = ROOT_FOLDER_ID)]
        folder: String,
    },
    /// Download a file by item id
    Get {
        /// Item id
        item: String,
        /// Local destination path
        local: String,
    },
}

fn session_from_env() -> Result<Session> {
    let token = std::env::var("DRIVEDECK_TOKEN")
        .context("DRIVEDECK_TOKEN is not set; export a bearer token first")?;
    if token.trim().is_empty() {
        bail!("DRIVEDECK_TOKEN is empty");
    }
    let (handle, session) = Session::with_token(token);
    // The CLI never rotates the token, so the supplier can live for the
    // whole process.
    std::mem::forget(handle);
    Ok(session)
}

fn browser_from_env() -> Result<FolderBrowser> {
    let session = session_from_env()?;
    let gateway = Arc::new(GraphGateway::new(session.clone(), GraphConfig::default()));
    Ok(FolderBrowser::new(gateway, session))
}

/// Load pages until the listing is exhausted or the page limit is reached.
/// Stops early when a page fails to advance the row count.
async fn load_pages(browser: &FolderBrowser, pages: usize) -> Result<()> {
    let mut fetched = 0;
    loop {
        let count = match browser.row_count().await {
            RowCount::Exact(_) => break,
            RowCount::AtLeast(n) => n,
        };
        if pages != 0 && fetched >= pages {
            break;
        }
        browser.load_next_page().await;
        fetched += 1;
        if let RowCount::AtLeast(after) = browser.row_count().await {
            if after == count && fetched > 1 {
                bail!("listing stalled after {after} entries; see logs");
            }
        }
    }
    Ok(())
}

async fn enter(browser: &FolderBrowser, folder: &str) {
    if folder != ROOT_FOLDER_ID {
        let target = Entry {
            id: folder.to_string(),
            name: folder.to_string(),
            is_folder: true,
            download_url: None,
        };
        browser.navigate(drivedeck::NavTarget::Child(&target)).await;
    }
}

fn print_entry(entry: &Entry) {
    let marker = if entry.is_folder { "d" } else { "-" };
    println!("{marker} {:<40} {}", entry.id, entry.name);
}

async fn cmd_ls(folder: &str, pages: usize) -> Result<()> {
    let browser = browser_from_env()?;
    enter(&browser, folder).await;
    load_pages(&browser, pages).await?;

    let entries = browser.entries().await;
    for entry in &entries {
        print_entry(entry);
    }
    match browser.row_count().await {
        RowCount::Exact(n) => println!("{n} entries"),
        RowCount::AtLeast(n) => println!("{n} entries (more available, raise --pages)"),
    }
    Ok(())
}

async fn cmd_perms(folder: &str) -> Result<()> {
    let browser = browser_from_env()?;
    enter(&browser, folder).await;
    load_pages(&browser, 1).await?;

    for entry in browser.entries().await {
        print_entry(&entry);
        match browser.permissions_for(&entry.id).await {
            Some(grants) if grants.is_empty() => println!("    (no extra grants)"),
            Some(grants) => {
                for grant in grants {
                    println!("    shared: {}", grant.label());
                }
            }
            None => println!("    (permissions pending)"),
        }
    }
    Ok(())
}

async fn cmd_get(item: &str, local: &str) -> Result<()> {
    let session = session_from_env()?;
    let gateway = GraphGateway::new(session, GraphConfig::default());

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .context("progress template")?,
    );
    spinner.set_message(format!("downloading {item} ..."));
    spinner.enable_steady_tick(Duration::from_millis(80));

    let mut file = tokio::fs::File::create(local)
        .await
        .with_context(|| format!("creating {local}"))?;
    let written = gateway.download(item, &mut file).await?;
    spinner.finish_with_message(format!("wrote {written} bytes to {local}"));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Ls { folder, pages } => cmd_ls(folder, *pages).await,
        Commands::Perms { folder } => cmd_perms(folder).await,
        Commands::Get { item, local } => cmd_get(item, local).await,
    }
}
