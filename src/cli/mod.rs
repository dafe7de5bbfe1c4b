//! Command-line interface for casedocs.

mod commands;
pub mod progress;

pub use commands::{is_verbose, run};
pub use progress::progress_println;
