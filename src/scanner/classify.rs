//! Buckets the text a scanner run printed into clean / infected / error.
//!
//! The scanner is a black box; the only contract is the literal markers
//! clamscan prints: `<path>: <Signature> FOUND` and `<path>: OK`.

use crate::types::FileStatus;

const INFECTED_MARKER: &str = "FOUND";
const CLEAN_MARKER: &str = "OK";

/// Classified outcome of one file plus the text shown next to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileVerdict {
    pub status: FileStatus,
    /// Full scanner output for infected files, error text for errors, empty when clean.
    pub detail: String,
}

impl FileVerdict {
    pub fn clean() -> Self {
        Self { status: FileStatus::Clean, detail: String::new() }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let detail = if detail.trim().is_empty() { "Unknown error".to_string() } else { detail };
        Self { status: FileStatus::Error, detail }
    }

    /// Detail text flattened to a single line for the table.
    pub fn signature(&self) -> String {
        signature_column(&self.detail)
    }

    pub fn signature_name(&self) -> Option<String> {
        match self.status {
            FileStatus::Infected => extract_signature(&self.detail),
            _ => None,
        }
    }
}

/// `FOUND` wins over `OK`; anything else is an error.
pub fn classify(output: &str) -> FileVerdict {
    if output.contains(INFECTED_MARKER) {
        FileVerdict { status: FileStatus::Infected, detail: output.to_string() }
    } else if output.contains(CLEAN_MARKER) {
        FileVerdict::clean()
    } else {
        FileVerdict::error(output)
    }
}

pub fn signature_column(detail: &str) -> String {
    detail.replace("\r\n", " ").replace('\n', " ")
}

/// Pulls `Eicar-Signature` out of `/tmp/x: Eicar-Signature FOUND`.
pub fn extract_signature(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let line = line.trim_end();
        let head = line.strip_suffix(INFECTED_MARKER)?.trim_end();
        // Paths may contain ": " themselves, the signature follows the last one.
        let (_, name) = head.rsplit_once(": ")?;
        let name = name.trim();
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    })
}
