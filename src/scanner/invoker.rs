//! Runs the external scanner binary for a single file.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::process::Command;

use super::classify::{classify, FileVerdict};
use crate::config::ScannerConfig;

#[cfg(windows)]
const WINDOWS_DEFAULT_BINARY: &str = r"C:\Program Files\ClamAV\clamscan.exe";
const FALLBACK_BINARY: &str = "clamscan";

#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("failed to start scanner {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("scanner timed out after {0} seconds")]
    Timeout(u64),
    #[error("failed to collect scanner output: {0}")]
    Wait(#[source] std::io::Error),
}

/// Captured text of one finished scanner process.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CapturedOutput {
    /// stdout and stderr, each trimmed, joined by a newline and trimmed again.
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout.trim(), self.stderr.trim()).trim().to_string()
    }
}

/// Resolved scanner executable plus fixed leading arguments.
#[derive(Debug, Clone)]
pub struct ScannerCommand {
    binary: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ScannerCommand {
    pub fn new(binary: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self { binary: binary.into(), args, timeout }
    }

    pub fn resolve(cfg: &ScannerConfig) -> Self {
        Self::new(resolve_binary(cfg.binary.as_deref()), cfg.args.clone(), Duration::from_secs(cfg.timeout_secs))
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Full argument vector for one file, the path always last.
    pub fn command_line(&self, file: &Path) -> Vec<OsString> {
        let mut v: Vec<OsString> = self.args.iter().map(OsString::from).collect();
        v.push(file.as_os_str().to_os_string());
        v
    }

    pub async fn run(&self, file: &Path) -> Result<CapturedOutput, InvokeError> {
        self.exec(self.command_line(file)).await
    }

    /// First line of `<binary> <args> --version`.
    pub async fn version(&self) -> Result<String, InvokeError> {
        let mut args: Vec<OsString> = self.args.iter().map(OsString::from).collect();
        args.push(OsString::from("--version"));
        let out = self.exec(args).await?;
        Ok(out.combined().lines().next().unwrap_or_default().trim().to_string())
    }

    async fn exec(&self, args: Vec<OsString>) -> Result<CapturedOutput, InvokeError> {
        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| InvokeError::Spawn { binary: self.binary.display().to_string(), source })?;

        // Bei Timeout wird das Future verworfen, kill_on_drop beendet den Prozess.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(res) => res.map_err(InvokeError::Wait)?,
            Err(_) => return Err(InvokeError::Timeout(self.timeout.as_secs())),
        };

        Ok(CapturedOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}

fn resolve_binary(configured: Option<&str>) -> PathBuf {
    if let Some(bin) = configured.map(str::trim).filter(|b| !b.is_empty()) {
        let p = PathBuf::from(bin);
        // Bare command names are left to PATH lookup.
        if p.is_file() || p.components().count() == 1 {
            return p;
        }
        tracing::warn!(binary = %bin, "configured scanner binary not found, falling back to default");
    }
    #[cfg(windows)]
    {
        let p = PathBuf::from(WINDOWS_DEFAULT_BINARY);
        if p.is_file() {
            return p;
        }
    }
    PathBuf::from(FALLBACK_BINARY)
}

/// Seam between the scan loop and whatever produces verdicts.
#[async_trait]
pub trait FileScanner: Send + Sync {
    async fn scan_file(&self, path: &Path) -> FileVerdict;

    /// Human readable name of the backing scanner, stored with each scan.
    fn describe(&self) -> String;
}

/// Production scanner: one external process per file.
#[derive(Debug, Clone)]
pub struct ClamScanner {
    command: ScannerCommand,
}

impl ClamScanner {
    pub fn new(command: ScannerCommand) -> Self {
        Self { command }
    }

    pub fn command(&self) -> &ScannerCommand {
        &self.command
    }
}

#[async_trait]
impl FileScanner for ClamScanner {
    async fn scan_file(&self, path: &Path) -> FileVerdict {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return FileVerdict::error("File does not exist");
        }
        let start = Instant::now();
        match self.command.run(path).await {
            Ok(out) => {
                let verdict = classify(&out.combined());
                tracing::debug!(
                    path = %path.display(),
                    status = %verdict.status,
                    exit_code = ?out.exit_code,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "scanner finished"
                );
                verdict
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "scanner invocation failed");
                FileVerdict::error(e.to_string())
            }
        }
    }

    fn describe(&self) -> String {
        self.command.binary().display().to_string()
    }
}
