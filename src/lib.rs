//! # bulkpost
//!
//! Bounded-concurrency bulk task runner for posting content to many remote
//! accounts.
//!
//! Tasks are synthesized by zipping item sources (accounts, titles, content,
//! tags) into a lazy finite sequence, then dispatched over a fixed number of
//! lanes with per-lane pacing, an error cooldown, and pass-based retries.

pub mod config;
pub mod engine;
pub mod error;
pub mod factory;
pub mod model;
pub mod operation;
pub mod output;
pub mod report;
pub mod source;
pub mod telemetry;
