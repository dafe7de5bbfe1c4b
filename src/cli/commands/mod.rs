//! CLI commands implementation.

mod fetch;
mod locate;
mod plan;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions, Settings};
use crate::scrapers::{CasePage, HttpClient};

#[derive(Parser)]
#[command(name = "casedocs")]
#[command(about = "Save a court case's documents for offline reading")]
#[command(version)]
pub struct Cli {
    /// Config file (default: discovered casedocs.toml/.yaml/.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory case folders are created in
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    /// Cookie header carrying the court site session
    #[arg(long, global = true, env = "CASEDOCS_COOKIE", hide_env_values = true)]
    cookie: Option<String>,

    /// User agent ("browser" for a desktop browser agent)
    #[arg(long, global = true)]
    user_agent: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape a case documents page, probe every document and save the case
    Fetch {
        /// Page URL or saved HTML file
        source: String,
        /// Original URL of a saved page, for resolving its links
        #[arg(long)]
        base_url: Option<String>,
        /// Print notifications and the summary as JSON lines
        #[arg(long)]
        json: bool,
        /// Keep completed downloads in the download history
        #[arg(long)]
        keep_history: bool,
        /// Put all documents directly in the case folder
        #[arg(long)]
        flat: bool,
    },

    /// Show what would be saved without downloading anything
    Plan {
        /// Page URL or saved HTML file
        source: String,
        /// Original URL of a saved page, for resolving its links
        #[arg(long)]
        base_url: Option<String>,
        /// Probe documents to learn their file extensions
        #[arg(long)]
        probe: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Find the case documents link on a case page
    Locate {
        /// Page URL or saved HTML file
        source: String,
        /// Original URL of a saved page, for resolving its links
        #[arg(long)]
        base_url: Option<String>,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (mut settings, _config) = load_settings_with_options(LoadOptions {
        config_path: cli.config.clone(),
    })
    .await?;

    if let Some(output_dir) = cli.output_dir {
        settings.output_dir = output_dir;
    }
    if cli.cookie.is_some() {
        settings.cookie = cli.cookie;
    }
    if cli.user_agent.is_some() {
        settings.user_agent = cli.user_agent;
    }

    match cli.command {
        Commands::Fetch {
            source,
            base_url,
            json,
            keep_history,
            flat,
        } => {
            if keep_history {
                settings.erase_completed = false;
            }
            if flat {
                settings.use_subdirectories = false;
            }
            fetch::cmd_fetch(&settings, &source, base_url.as_deref(), json).await
        }
        Commands::Plan {
            source,
            base_url,
            probe,
            json,
        } => plan::cmd_plan(&settings, &source, base_url.as_deref(), probe, json).await,
        Commands::Locate { source, base_url } => {
            locate::cmd_locate(&settings, &source, base_url.as_deref()).await
        }
    }
}

/// Build the shared HTTP client and load the page.
async fn open_page(
    settings: &Settings,
    source: &str,
    base_url: Option<&str>,
) -> anyhow::Result<(HttpClient, CasePage)> {
    let client = HttpClient::new(&settings.client_options())?;
    let page = CasePage::load(source, base_url, &client).await?;
    Ok((client, page))
}
