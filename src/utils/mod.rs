//! Shared utility functions.
//!
//! - `naming`: event normalization and filesystem-safe path segments
//! - `html`: HTML escaping and attribute decoding

mod html;
mod naming;

pub use html::{html_escape, html_unescape_attr};
pub use naming::{
    normalize_event, sanitize_filename, sanitize_segment, DateSeparator, UNKNOWN_EVENT,
};
