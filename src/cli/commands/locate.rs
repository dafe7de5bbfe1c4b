//! Find the case documents page linked from a case page.

use std::sync::Arc;

use crate::config::Settings;
use crate::contexts::{BackgroundContext, PageContext};
use crate::messaging::{Channel, LocalChannel, Notifier, Request, Response};
use crate::services::download::FsDownloader;

use super::open_page;

pub async fn cmd_locate(
    settings: &Settings,
    source: &str,
    base_url: Option<&str>,
) -> anyhow::Result<()> {
    let (client, page) = open_page(settings, source, base_url).await?;

    // Nothing is downloaded, but the page context always has a peer.
    let downloader = Arc::new(FsDownloader::new(
        client.clone(),
        settings.output_dir.clone(),
        settings.download_timeout(),
    ));
    let background: Arc<dyn Channel> = Arc::new(LocalChannel::spawn(
        Arc::new(BackgroundContext::new(
            downloader,
            Notifier::disconnected(),
            settings.download_config(),
        )),
        Notifier::disconnected(),
        settings.channel_timeout(),
    ));
    let page_context = PageContext::new(
        page,
        Arc::new(client),
        background,
        Notifier::disconnected(),
        settings.page_config(),
    );
    let channel = LocalChannel::spawn(
        Arc::new(page_context),
        Notifier::disconnected(),
        settings.channel_timeout(),
    );

    match channel.request(Request::GetCaseDocumentsUrl).await? {
        Response::CaseDocumentsUrl {
            success: true,
            url: Some(url),
            ..
        } => {
            println!("{}", url);
            Ok(())
        }
        Response::CaseDocumentsUrl { error, .. } => {
            anyhow::bail!(error.unwrap_or_else(|| "No case documents link found".to_string()))
        }
        other => anyhow::bail!("Unexpected response: {:?}", other),
    }
}
