use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};

use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::metrics::Metrics;
use crate::middleware::EndpointRateLimiter;
use crate::scanner::invoker::{ClamScanner, FileScanner, ScannerCommand};
use crate::types::ScanEvent;

/// A running scan: cancel it or subscribe to its events.
#[derive(Clone)]
pub struct JobHandle {
    pub cancel: CancellationToken,
    pub sender: broadcast::Sender<ScanEvent>,
    /// Folder being scanned, used to refuse a second scan of the same root.
    pub root: PathBuf,
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::SqlitePool,
    /// Running scans by id. Entries are removed when the scan task ends.
    pub jobs: Arc<RwLock<HashMap<Uuid, JobHandle>>>,
    pub config: Arc<AppConfig>,
    pub metrics: Metrics,
    pub rate_limiter: EndpointRateLimiter,
    /// Resolved command line of the external scanner (for `/scanner`).
    pub scanner_command: Arc<ScannerCommand>,
    /// Produces the verdict for each file; swapped out in tests.
    pub scanner: Arc<dyn FileScanner>,
}

impl AppState {
    /// State with the real clamscan-backed scanner resolved from `config.scanner`.
    pub fn new(db: sqlx::SqlitePool, config: AppConfig) -> Self {
        let command = ScannerCommand::resolve(&config.scanner);
        let scanner: Arc<dyn FileScanner> = Arc::new(ClamScanner::new(command.clone()));
        Self::with_scanner(db, config, command, scanner)
    }

    pub fn with_scanner(
        db: sqlx::SqlitePool,
        config: AppConfig,
        command: ScannerCommand,
        scanner: Arc<dyn FileScanner>,
    ) -> Self {
        let rate_limiter = EndpointRateLimiter::new().with_limits(vec![
            ("/scans", 60, 60),   // 60 scan starts per minute
            ("/browse", 600, 60), // folder dialog navigates a lot
        ]);

        Self {
            db,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
            metrics: Metrics::new(),
            rate_limiter,
            scanner_command: Arc::new(command),
            scanner,
        }
    }

    /// Cancels every running scan and waits until their tasks have written
    /// the final status and left `jobs`. `false` if some were still running
    /// after `timeout`.
    pub async fn cancel_all_jobs(&self, timeout: Duration) -> bool {
        let running = {
            let jobs = self.jobs.read().await;
            for handle in jobs.values() {
                handle.cancel.cancel();
            }
            jobs.len()
        };
        if running == 0 {
            return true;
        }
        tracing::info!(count = running, "cancelling running scans");
        let drained = async {
            while !self.jobs.read().await.is_empty() {
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        };
        tokio::time::timeout(timeout, drained).await.is_ok()
    }
}
