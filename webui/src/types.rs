//! Type definitions for the VirenWald web UI.
//!
//! Mirrors the JSON the backend sends. Status values stay plain strings
//! (`clean`, `infected`, `error`) so an unknown value never breaks a page.

use serde::{Deserialize, Serialize};

/// One scan as listed in the history and shown on the detail page.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ScanSummary {
    pub id: String,
    /// `running`, `done`, `canceled` or `failed`
    pub status: String,
    pub root_path: String,
    pub scanner: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub total_files: i64,
    pub scanned_files: i64,
    pub clean_count: i64,
    pub infected_count: i64,
    pub error_count: i64,
    pub warning_count: i64,
}

impl ScanSummary {
    pub fn is_running(&self) -> bool {
        self.status == "running"
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CreateScanResp {
    pub id: String,
    pub status: String,
    pub started_at: String,
}

/// One row of the results table.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FileResult {
    pub seq: i64,
    pub path: String,
    pub status: String,
    pub signature: String,
    #[serde(default)]
    pub signature_name: Option<String>,
    #[serde(default)]
    pub duration_ms: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BrowseEntry {
    pub name: String,
    pub path: String,
}

/// Folder chooser listing; `path == None` means the filesystem roots.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BrowseResponse {
    #[serde(default)]
    pub path: Option<String>,
    pub parent: Option<String>,
    pub entries: Vec<BrowseEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ScannerInfo {
    pub binary: String,
    pub args: Vec<String>,
    pub available: bool,
    pub version: Option<String>,
    pub error: Option<String>,
}

/// Server-Sent Events of a running scan.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    Started { root_path: String },
    Enumerated { total_files: u64 },
    FileScanned { index: u64, total: u64, path: String, status: String, signature: String },
    Warning { path: String, code: String, message: String },
    Done { total: u64, clean: u64, infected: u64, errors: u64 },
    Cancelled,
    Failed { message: String },
}
