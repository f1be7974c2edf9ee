//! # VirenWald Backend Library
//!
//! Scans a folder recursively with an external command-line virus scanner
//! (ClamAV's `clamscan` by default) and reports every file as clean, infected
//! or error. The backend serves a small HTTP API with live progress over
//! Server-Sent Events; the web UI and the desktop shell sit on top of it.
//!
//! ## Core Components
//!
//! - [`config`]: layered configuration (embedded defaults, TOML file, env)
//! - [`db`]: SQLite schema for scans, results and walk warnings
//! - [`error`]: `AppError` and its JSON error responses
//! - [`metrics`]: process-wide counters
//! - [`middleware`]: security headers, request validation, rate limiting
//! - [`routes`]: HTTP handlers and router
//! - [`scanner`]: folder walker, scanner invocation, verdict classification
//!   and the sequential scan loop
//! - [`state`]: shared state (DB pool, running jobs, scanner)
//! - [`types`]: API types and scan events

pub mod config;
pub mod db;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod scanner;
pub mod state;
pub mod types;

#[cfg(test)]
mod tests;
