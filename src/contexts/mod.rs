//! The two cooperating contexts of a case save.
//!
//! [`PageContext`] owns the loaded page: it scrapes, probes and answers UI
//! requests. [`BackgroundContext`] owns the downloader and saves whatever a
//! page hands it. They only talk through a [`Channel`](crate::messaging::Channel).

mod background;
mod page;

pub use background::BackgroundContext;
pub use page::{PageConfig, PageContext, PageError};
