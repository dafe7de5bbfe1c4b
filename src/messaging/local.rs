//! In-process channel backed by tokio mpsc and oneshot.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::{Channel, ChannelError, Notification, Request, RequestHandler, Response};

struct Envelope {
    request: Request,
    reply: oneshot::Sender<Response>,
}

/// Fire-and-forget sender for [`Notification`]s.
///
/// A full or closed receiver drops the notification; senders never wait
/// on the UI.
#[derive(Clone, Default)]
pub struct Notifier {
    tx: Option<mpsc::Sender<Notification>>,
}

impl Notifier {
    pub fn new(tx: mpsc::Sender<Notification>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A notifier nobody listens to.
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    pub fn notify(&self, notification: Notification) {
        let Some(ref tx) = self.tx else {
            return;
        };
        match tx.try_send(notification) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                debug!("Notification queue full, dropping {:?}", dropped);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Request kinds currently awaiting a reply.
#[derive(Default)]
struct InFlight(Mutex<HashSet<&'static str>>);

impl InFlight {
    fn claim(self: &Arc<Self>, kind: &'static str) -> Option<InFlightGuard> {
        let mut kinds = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if kinds.insert(kind) {
            Some(InFlightGuard {
                set: Arc::clone(self),
                kind,
            })
        } else {
            None
        }
    }
}

struct InFlightGuard {
    set: Arc<InFlight>,
    kind: &'static str,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut kinds = self.set.0.lock().unwrap_or_else(|e| e.into_inner());
        kinds.remove(self.kind);
    }
}

/// A [`Channel`] to a [`RequestHandler`] running on the same runtime.
///
/// Every request is bounded by a timeout, and at most one request of each
/// kind may be awaiting a reply at a time.
pub struct LocalChannel {
    requests: mpsc::Sender<Envelope>,
    notifier: Notifier,
    timeout: Duration,
    in_flight: Arc<InFlight>,
}

impl LocalChannel {
    /// Spawn a task serving `handler` and return the sending side.
    ///
    /// The task exits once the channel is dropped.
    pub fn spawn<H: RequestHandler>(handler: Arc<H>, notifier: Notifier, timeout: Duration) -> Self {
        let (tx, mut rx) = mpsc::channel::<Envelope>(16);

        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    let kind = envelope.request.kind();
                    let response = handler.handle(envelope.request).await;
                    if envelope.reply.send(response).is_err() {
                        debug!("Requester for {} went away before the reply", kind);
                    }
                });
            }
        });

        Self {
            requests: tx,
            notifier,
            timeout,
            in_flight: Arc::new(InFlight::default()),
        }
    }
}

#[async_trait]
impl Channel for LocalChannel {
    async fn request(&self, request: Request) -> Result<Response, ChannelError> {
        let kind = request.kind();
        let _guard = self.in_flight.claim(kind).ok_or(ChannelError::Busy(kind))?;

        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Envelope { request, reply })
            .await
            .map_err(|_| ChannelError::Closed)?;

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ChannelError::Closed),
            Err(_) => {
                warn!("{} request timed out after {:?}", kind, self.timeout);
                Err(ChannelError::Timeout {
                    kind,
                    timeout: self.timeout,
                })
            }
        }
    }

    fn notify(&self, notification: Notification) {
        self.notifier.notify(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentIdentifier, DownloadState};
    use crate::messaging::OverallState;

    struct Echo;

    #[async_trait]
    impl RequestHandler for Echo {
        async fn handle(&self, request: Request) -> Response {
            match request {
                Request::GetCaseDocumentsUrl => Response::CaseDocumentsUrl {
                    success: true,
                    url: Some("https://example.org/CaseDocuments".to_string()),
                    error: None,
                },
                _ => Response::failed("unsupported"),
            }
        }
    }

    struct Slow;

    #[async_trait]
    impl RequestHandler for Slow {
        async fn handle(&self, _request: Request) -> Response {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Response::failed("too late")
        }
    }

    #[tokio::test]
    async fn test_request_gets_single_reply() {
        let channel =
            LocalChannel::spawn(Arc::new(Echo), Notifier::disconnected(), Duration::from_secs(1));

        let response = channel.request(Request::GetCaseDocumentsUrl).await.unwrap();
        match response {
            Response::CaseDocumentsUrl { success, url, .. } => {
                assert!(success);
                assert_eq!(url.as_deref(), Some("https://example.org/CaseDocuments"));
            }
            other => panic!("unexpected response: {:?}", other),
        }

        let response = channel.request(Request::ScrapeAndDownload).await.unwrap();
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_request_times_out() {
        let channel = LocalChannel::spawn(
            Arc::new(Slow),
            Notifier::disconnected(),
            Duration::from_millis(20),
        );

        let err = channel.request(Request::ScrapeAndDownload).await.unwrap_err();
        assert!(matches!(
            err,
            ChannelError::Timeout {
                kind: "scrapeAndDownload",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_one_request_per_kind_in_flight() {
        let channel = Arc::new(LocalChannel::spawn(
            Arc::new(Slow),
            Notifier::disconnected(),
            Duration::from_millis(200),
        ));

        let first = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.request(Request::ScrapeAndDownload).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = channel.request(Request::ScrapeAndDownload).await;
        assert!(matches!(second, Err(ChannelError::Busy("scrapeAndDownload"))));

        // A different kind is not blocked.
        let other = channel.request(Request::GetCaseDocumentsUrl).await;
        assert!(matches!(other, Err(ChannelError::Timeout { .. })));

        assert!(first.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_notifier_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let notifier = Notifier::new(tx);

        notifier.notify(Notification::OverallStatus {
            state: OverallState::Downloading,
        });
        notifier.notify(Notification::CourtDocumentDownloadUpdated {
            id: DocumentIdentifier::new("Review", 1),
            state: DownloadState::Complete,
        });

        assert_eq!(
            rx.recv().await,
            Some(Notification::OverallStatus {
                state: OverallState::Downloading
            })
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_disconnected_notifier_is_silent() {
        Notifier::disconnected().notify(Notification::OverallStatus {
            state: OverallState::Done,
        });
    }
}
