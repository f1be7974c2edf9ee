use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Walk options for one scan. Defaults reproduce a plain recursive walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanOptions {
    pub follow_symlinks: bool,
    pub include_hidden: bool,
    pub excludes: Vec<String>,
    pub max_depth: Option<u32>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self { follow_symlinks: false, include_hidden: true, excludes: vec![], max_depth: None }
    }
}

/// Outcome bucket of a single scanner invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Clean,
    Infected,
    Error,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Clean => "clean",
            FileStatus::Infected => "infected",
            FileStatus::Error => "error",
        }
    }

    /// Upper-case label as shown in the results table.
    pub fn label(&self) -> &'static str {
        match self {
            FileStatus::Clean => "CLEAN",
            FileStatus::Infected => "INFECTED",
            FileStatus::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clean" => Some(FileStatus::Clean),
            "infected" => Some(FileStatus::Infected),
            "error" => Some(FileStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate counters of a scan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTotals {
    pub total: u64,
    pub clean: u64,
    pub infected: u64,
    pub errors: u64,
}

impl ScanTotals {
    pub fn record(&mut self, status: FileStatus) {
        match status {
            FileStatus::Clean => self.clean += 1,
            FileStatus::Infected => self.infected += 1,
            FileStatus::Error => self.errors += 1,
        }
    }

    pub fn scanned(&self) -> u64 {
        self.clean + self.infected + self.errors
    }

    pub fn summary_line(&self) -> String {
        format!(
            "Scanned: {} | Clean: {} | Infected: {} | Errors: {}",
            self.total, self.clean, self.infected, self.errors
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScanRequest {
    pub root_path: String,
    pub follow_symlinks: Option<bool>,
    pub include_hidden: Option<bool>,
    pub excludes: Option<Vec<String>>,
    pub max_depth: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScanResponse {
    pub id: Uuid,
    pub status: String,
    pub started_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSummary {
    pub id: Uuid,
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

/// One row of the results table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResultDto {
    pub seq: i64,
    pub path: String,
    pub status: FileStatus,
    pub signature: String,
    pub signature_name: Option<String>,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowseEntry {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowseResponse {
    /// `None` when listing filesystem roots.
    pub path: Option<String>,
    pub parent: Option<String>,
    pub entries: Vec<BrowseEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerInfo {
    pub binary: String,
    pub args: Vec<String>,
    pub available: bool,
    pub version: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    Started {
        root_path: String,
    },
    Enumerated {
        total_files: u64,
    },
    FileScanned {
        index: u64,
        total: u64,
        path: String,
        status: FileStatus,
        signature: String,
    },
    Warning {
        path: String,
        code: String,
        message: String,
    },
    Done {
        total: u64,
        clean: u64,
        infected: u64,
        errors: u64,
    },
    Cancelled,
    Failed {
        message: String,
    },
}
