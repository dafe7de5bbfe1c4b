//! casedocs - save a court case's documents for offline reading.
//!
//! Scrapes a case documents page, probes each document for its file type,
//! then downloads everything into a folder per case alongside a rewritten
//! copy of the page that links to the local files.

pub mod cli;
pub mod config;
pub mod contexts;
pub mod messaging;
pub mod models;
pub mod scrapers;
pub mod services;
pub mod session;
pub mod utils;
