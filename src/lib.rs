//! Tracks how long each foreground window is in focus, keeps a per-day ledger on disk and
//! exports it every day to a spreadsheet, one worksheet per month.
//!
//! The tracker runs as a single-threaded daemon. The cli starts and stops it and gives access to
//! the recorded days.

pub mod cli;
pub mod config;
pub mod daemon;
pub mod fs;
pub mod report;
pub mod utils;
pub mod window_api;
