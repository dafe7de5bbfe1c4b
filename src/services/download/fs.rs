//! Downloader that writes into a directory on the local filesystem.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::types::{ConflictAction, DownloadError, DownloadHandle, DownloadRequest, DownloadSource};
use super::Downloader;
use crate::models::DownloadState;
use crate::scrapers::HttpClient;

/// A download as the history remembers it.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadRecord {
    pub handle: DownloadHandle,
    pub source: String,
    pub destination: String,
    pub path: Option<PathBuf>,
    pub state: DownloadState,
    pub started_at: DateTime<Utc>,
}

struct Entry {
    record: DownloadRecord,
    task: Option<JoinHandle<Result<PathBuf, DownloadError>>>,
}

/// Saves downloads under `root`, one spawned task per download.
pub struct FsDownloader {
    client: HttpClient,
    root: PathBuf,
    timeout: Duration,
    next_handle: AtomicU64,
    history: Mutex<BTreeMap<DownloadHandle, Entry>>,
}

impl FsDownloader {
    pub fn new(client: HttpClient, root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            client,
            root: root.into(),
            timeout,
            next_handle: AtomicU64::new(1),
            history: Mutex::new(BTreeMap::new()),
        }
    }

    /// Downloads still in the history, oldest first.
    pub async fn history(&self) -> Vec<DownloadRecord> {
        self.history
            .lock()
            .await
            .values()
            .map(|entry| entry.record.clone())
            .collect()
    }
}

/// Join a `/`-separated relative destination onto `root`.
///
/// Absolute paths and `..` are rejected so nothing lands outside the root.
pub fn resolve_destination(root: &Path, destination: &str) -> Result<PathBuf, DownloadError> {
    let relative = Path::new(destination);
    let escapes = destination.is_empty()
        || relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(DownloadError::InvalidDestination(destination.to_string()));
    }

    let mut path = root.to_path_buf();
    for part in destination.split('/').filter(|p| !p.is_empty() && *p != ".") {
        path.push(part);
    }
    Ok(path)
}

/// First free path among `name.ext`, `name (1).ext`, `name (2).ext`, ...
pub async fn uniquify_path(path: &Path) -> PathBuf {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());

    let mut n = 1;
    loop {
        let name = match &extension {
            Some(ext) => format!("{} ({}).{}", stem, n, ext),
            None => format!("{} ({})", stem, n),
        };
        let candidate = path.with_file_name(name);
        if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }
        n += 1;
    }
}

async fn save(
    client: HttpClient,
    source: DownloadSource,
    path: PathBuf,
    conflict: ConflictAction,
) -> Result<PathBuf, DownloadError> {
    let content = match source {
        DownloadSource::Url(url) => client.get(&url).await?.bytes().await?.to_vec(),
        DownloadSource::Inline { bytes, .. } => bytes,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let path = match conflict {
        ConflictAction::Overwrite => path,
        ConflictAction::Uniquify => uniquify_path(&path).await,
    };

    tokio::fs::write(&path, &content).await?;
    debug!("Wrote {} bytes to {}", content.len(), path.display());
    Ok(path)
}

#[async_trait]
impl Downloader for FsDownloader {
    async fn download(&self, request: DownloadRequest) -> Result<DownloadHandle, DownloadError> {
        let path = resolve_destination(&self.root, &request.destination)?;
        let handle = DownloadHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));

        let record = DownloadRecord {
            handle,
            source: request.source.describe().to_string(),
            destination: request.destination.clone(),
            path: None,
            state: DownloadState::InProgress,
            started_at: Utc::now(),
        };

        let client = self.client.clone();
        let timeout = self.timeout;
        let task = tokio::spawn(async move {
            match tokio::time::timeout(timeout, save(client, request.source, path, request.conflict))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(DownloadError::Timeout(timeout)),
            }
        });

        self.history.lock().await.insert(
            handle,
            Entry {
                record,
                task: Some(task),
            },
        );
        Ok(handle)
    }

    async fn await_terminal(&self, handle: DownloadHandle) -> DownloadState {
        let task = {
            let mut history = self.history.lock().await;
            match history.get_mut(&handle) {
                Some(entry) => match entry.task.take() {
                    Some(task) => task,
                    None => return entry.record.state,
                },
                None => {
                    warn!("{}", DownloadError::UnknownHandle(handle));
                    return DownloadState::Interrupted;
                }
            }
        };

        let (state, path) = match task.await {
            Ok(Ok(path)) => (DownloadState::Complete, Some(path)),
            Ok(Err(e)) => {
                warn!("Download {} failed: {}", handle, e);
                (DownloadState::Interrupted, None)
            }
            Err(e) => {
                warn!("Download {} task failed: {}", handle, e);
                (DownloadState::Interrupted, None)
            }
        };

        if let Some(entry) = self.history.lock().await.get_mut(&handle) {
            entry.record.state = state;
            entry.record.path = path;
        }
        state
    }

    async fn erase(&self, handle: DownloadHandle) {
        let mut history = self.history.lock().await;
        match history.get(&handle).map(|entry| entry.task.is_none()) {
            Some(true) => {
                history.remove(&handle);
            }
            Some(false) => debug!("Not erasing {} while it is still running", handle),
            None => {}
        }
    }

    async fn reveal(&self, handle: DownloadHandle) {
        let history = self.history.lock().await;
        match history.get(&handle).and_then(|e| e.record.path.as_ref()) {
            Some(path) => info!("Saved {}", path.display()),
            None => debug!("Nothing to reveal for {}", handle),
        }
    }
}
