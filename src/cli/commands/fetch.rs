//! Scrape a case and save all of its documents.

use std::sync::Arc;

use console::style;
use tokio::sync::mpsc;

use crate::cli::progress::{progress_println, CaseProgress};
use crate::config::Settings;
use crate::contexts::{BackgroundContext, PageContext};
use crate::messaging::{Channel, LocalChannel, Notification, Notifier, Request, Response};
use crate::models::DownloadState;
use crate::services::download::FsDownloader;
use crate::services::enrich::CancellationToken;

use super::open_page;

pub async fn cmd_fetch(
    settings: &Settings,
    source: &str,
    base_url: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    let (client, page) = open_page(settings, source, base_url).await?;

    if !json {
        println!(
            "{} Saving case from {} into {}",
            style("→").cyan(),
            page.base_url(),
            settings.output_dir.display()
        );
    }

    // Event channel for progress updates
    let (note_tx, mut note_rx) = mpsc::channel::<Notification>(256);
    let notifier = Notifier::new(note_tx);

    let downloader = Arc::new(FsDownloader::new(
        client.clone(),
        settings.output_dir.clone(),
        settings.download_timeout(),
    ));
    let background = BackgroundContext::new(
        downloader.clone(),
        notifier.clone(),
        settings.download_config(),
    );
    let background_channel: Arc<dyn Channel> = Arc::new(LocalChannel::spawn(
        Arc::new(background),
        notifier.clone(),
        settings.channel_timeout(),
    ));

    let cancel = CancellationToken::new();
    let page_context = PageContext::new(
        page,
        Arc::new(client),
        background_channel,
        notifier.clone(),
        settings.page_config(),
    )
    .with_cancellation(cancel.clone());
    let page_channel = LocalChannel::spawn(
        Arc::new(page_context),
        notifier.clone(),
        settings.channel_timeout(),
    );
    drop(notifier);

    // Ctrl-C stops probing; downloads already started run to completion.
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            progress_println(&format!("{} Cancelling...", style("!").yellow()));
            cancel.cancel();
        }
    });

    // Spawn event handler task (UI layer)
    let progress = if json {
        None
    } else {
        Some(Arc::new(CaseProgress::new()))
    };
    let progress_clone = progress.clone();
    let event_handler = tokio::spawn(async move {
        while let Some(note) = note_rx.recv().await {
            if json {
                if let Ok(line) = serde_json::to_string(&note) {
                    println!("{}", line);
                }
                continue;
            }
            let Some(ref progress) = progress_clone else {
                continue;
            };
            match note {
                Notification::CourtDocumentDownloadUpdated { id, state } => {
                    if state.is_terminal() {
                        progress.finish_document(&id, state);
                    } else {
                        progress.start_document(&id);
                    }
                }
                Notification::OverallStatus { state } => progress.set_overall(state),
                Notification::SessionExpired { login_url } => {
                    progress.println(&format!(
                        "{} Session expired. Log in again at {} and retry.",
                        style("✗").red(),
                        login_url
                    ));
                }
            }
        }
    });

    let response = page_channel.request(Request::ScrapeAndDownload).await;

    // Closing the page channel tears down both contexts and their notifiers.
    drop(page_channel);
    interrupt.abort();
    if let Err(e) = event_handler.await {
        tracing::warn!("Event handler task failed: {}", e);
    }
    if let Some(ref progress) = progress {
        progress.finish();
    }

    let summary = match response? {
        Response::Outcome {
            success: true,
            summary: Some(summary),
            ..
        } => summary,
        Response::Outcome { error, .. } => {
            anyhow::bail!(error.unwrap_or_else(|| "Saving the case failed".to_string()))
        }
        other => anyhow::bail!("Unexpected response: {:?}", other),
    };

    if json {
        println!("{}", serde_json::to_string(&summary)?);
        return Ok(());
    }

    println!(
        "{} Saved {} of {} documents to {}",
        style("✓").green(),
        summary.completed(),
        summary.documents.len(),
        settings.output_dir.join(&summary.root_dir).display()
    );
    if summary.interrupted() > 0 {
        println!(
            "  {} {} documents could not be downloaded",
            style("!").yellow(),
            summary.interrupted()
        );
    }
    if summary.stylesheet == Some(DownloadState::Interrupted) {
        println!("  {} Stylesheet could not be saved", style("!").yellow());
    }
    if summary.index != Some(DownloadState::Complete) {
        println!("  {} Index page could not be saved", style("!").yellow());
    }

    let kept = downloader.history().await.len();
    if kept > 0 {
        println!("  {} {} downloads kept in history", style("→").dim(), kept);
    }

    Ok(())
}
