//! Per-page session state.
//!
//! A session lives as long as the page context that owns it. It carries an
//! id for log correlation and a single-flight flag so a second trigger
//! while a scrape is running is refused instead of starting a duplicate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("A scrape is already running in session {0}")]
    AlreadyActive(Uuid),
}

#[derive(Debug)]
pub struct CaseSession {
    id: Uuid,
    active: AtomicBool,
}

impl CaseSession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            active: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether a scrape currently holds the session.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Claim the session for one scrape. Released when the guard drops.
    pub fn begin(self: &Arc<Self>) -> Result<ActiveScrape, SessionError> {
        self.active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| SessionError::AlreadyActive(self.id))?;
        debug!("Session {} active", self.id);
        Ok(ActiveScrape {
            session: Arc::clone(self),
        })
    }
}

/// Proof that this caller owns the running scrape.
#[derive(Debug)]
pub struct ActiveScrape {
    session: Arc<CaseSession>,
}

impl ActiveScrape {
    pub fn session_id(&self) -> Uuid {
        self.session.id
    }
}

impl Drop for ActiveScrape {
    fn drop(&mut self) {
        self.session.active.store(false, Ordering::SeqCst);
        debug!("Session {} idle", self.session.id);
    }
}
