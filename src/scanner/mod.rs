pub mod classify;
pub mod invoker;
pub mod walker;

use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use sqlx::QueryBuilder;
use tokio::{sync::broadcast, task};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::types::{FileStatus, ScanEvent, ScanOptions, ScanTotals};
use invoker::FileScanner;
use walker::WalkWarning;

/// Everything a background scan needs besides the scanner itself.
pub struct ScanContext {
    pub pool: sqlx::SqlitePool,
    pub id: Uuid,
    pub root: PathBuf,
    pub options: ScanOptions,
    pub tx: broadcast::Sender<ScanEvent>,
    pub cancel: CancellationToken,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
}

#[derive(Debug, Clone)]
struct ResultRecord {
    seq: u64,
    path: String,
    status: FileStatus,
    signature: String,
    signature_name: Option<String>,
    duration_ms: u64,
}

/// Walks `ctx.root` and scans the files one after another.
///
/// Emits `Started`, `Enumerated` and one `FileScanned` per file; the final
/// `Done`/`Cancelled`/`Failed` event is the caller's job. Cancellation is
/// reported as an error, the caller tells it apart via the token.
pub async fn run_scan(ctx: ScanContext, scanner: Arc<dyn FileScanner>) -> anyhow::Result<ScanTotals> {
    let ScanContext { pool, id, root, options, tx, cancel, batch_size, flush_interval_ms } = ctx;
    let root_str = root.to_string_lossy().to_string();
    let _ = tx.send(ScanEvent::Started { root_path: root_str.clone() });

    // Enumeration touches the filesystem synchronously
    let (files, warnings) = {
        let tx = tx.clone();
        let cancel = cancel.clone();
        task::spawn_blocking(move || {
            let mut warnings: Vec<WalkWarning> = Vec::new();
            let files = walker::walk_files(&root, &options, &cancel, |w| {
                tracing::debug!(path = %w.path, code = w.code, "walk warning");
                let _ = tx.send(ScanEvent::Warning {
                    path: w.path.clone(),
                    code: w.code.into(),
                    message: w.message.clone(),
                });
                warnings.push(w);
            })?;
            Ok::<_, anyhow::Error>((files, warnings))
        })
        .await??
    };
    if cancel.is_cancelled() {
        anyhow::bail!("cancelled")
    }

    persist_warnings(&pool, id, &warnings).await?;
    let total = files.len() as u64;
    sqlx::query("UPDATE scans SET total_files=?1, warning_count=?2 WHERE id=?3")
        .bind(total as i64)
        .bind(warnings.len() as i64)
        .bind(id.to_string())
        .execute(&pool)
        .await?;
    let _ = tx.send(ScanEvent::Enumerated { total_files: total });
    tracing::info!(scan_id = %id, root = %root_str, total_files = total, warnings = warnings.len(), "enumeration finished");

    let mut totals = ScanTotals { total, ..ScanTotals::default() };
    let mut pending: Vec<ResultRecord> = Vec::with_capacity(batch_size.max(1));
    let flush_every = Duration::from_millis(flush_interval_ms.max(1));
    let mut last_flush = Instant::now();

    for (i, path) in files.iter().enumerate() {
        if cancel.is_cancelled() {
            flush(&pool, id, &mut pending, batch_size, &totals).await?;
            anyhow::bail!("cancelled")
        }

        let started = Instant::now();
        // Dropping the scan future on cancel kills the child process
        let verdict = tokio::select! {
            v = scanner.scan_file(path) => Some(v),
            _ = cancel.cancelled() => None,
        };
        let Some(verdict) = verdict else {
            flush(&pool, id, &mut pending, batch_size, &totals).await?;
            anyhow::bail!("cancelled")
        };

        let index = i as u64 + 1;
        let path_str = path.to_string_lossy().to_string();
        let signature = verdict.signature();
        totals.record(verdict.status);
        if verdict.status == FileStatus::Infected {
            tracing::warn!(scan_id = %id, path = %path_str, signature = %signature, "infected file");
        }

        let _ = tx.send(ScanEvent::FileScanned {
            index,
            total,
            path: path_str.clone(),
            status: verdict.status,
            signature: signature.clone(),
        });
        pending.push(ResultRecord {
            seq: index,
            path: path_str,
            status: verdict.status,
            signature,
            signature_name: verdict.signature_name(),
            duration_ms: started.elapsed().as_millis() as u64,
        });

        if pending.len() >= batch_size.max(1) || last_flush.elapsed() >= flush_every {
            // Fehler hier nicht fatal, Datensätze bleiben gepuffert bis zum nächsten Flush
            if let Err(e) = flush(&pool, id, &mut pending, batch_size, &totals).await {
                tracing::warn!(scan_id = %id, error = %e, "failed to persist results");
            }
            last_flush = Instant::now();
        }
    }

    flush(&pool, id, &mut pending, batch_size, &totals).await?;
    Ok(totals)
}

/// Writes buffered rows and the running counters.
async fn flush(
    pool: &sqlx::SqlitePool,
    id: Uuid,
    pending: &mut Vec<ResultRecord>,
    batch_size: usize,
    totals: &ScanTotals,
) -> anyhow::Result<()> {
    persist_batches(pool, id, pending, batch_size).await?;
    sqlx::query(
        r#"UPDATE scans SET
            scanned_files=?1,
            clean_count=?2,
            infected_count=?3,
            error_count=?4
          WHERE id=?5"#,
    )
    .bind(totals.scanned() as i64)
    .bind(totals.clean as i64)
    .bind(totals.infected as i64)
    .bind(totals.errors as i64)
    .bind(id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

async fn persist_batches(
    pool: &sqlx::SqlitePool,
    id: Uuid,
    rows: &mut Vec<ResultRecord>,
    batch_size: usize,
) -> anyhow::Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let sid = id.to_string();
    let mut txdb = pool.begin().await?;

    // SQLite variable limit (commonly 999): keep every INSERT below it.
    const SQLITE_MAX_VARS: usize = 999;
    const RESULT_BINDS_PER_ROW: usize = 7; // scan_id, seq, path, status, signature, signature_name, duration_ms

    let chunk = batch_size.max(1).min(SQLITE_MAX_VARS / RESULT_BINDS_PER_ROW);
    for part in rows.chunks(chunk) {
        let mut qb = QueryBuilder::new(
            "INSERT INTO results (scan_id, seq, path, status, signature, signature_name, duration_ms) ",
        );
        qb.push_values(part, |mut b, r| {
            b.push_bind(&sid)
                .push_bind(r.seq as i64)
                .push_bind(&r.path)
                .push_bind(r.status.as_str())
                .push_bind(&r.signature)
                .push_bind(r.signature_name.as_deref())
                .push_bind(r.duration_ms as i64);
        });
        qb.build().execute(&mut *txdb).await?;
    }

    txdb.commit().await?;
    rows.clear();
    Ok(())
}

async fn persist_warnings(pool: &sqlx::SqlitePool, id: Uuid, warnings: &[WalkWarning]) -> anyhow::Result<()> {
    if warnings.is_empty() {
        return Ok(());
    }
    let sid = id.to_string();
    let mut txdb = pool.begin().await?;
    // 4 binds per row
    for part in warnings.chunks(200) {
        let mut qb = QueryBuilder::new("INSERT INTO warnings (scan_id, path, code, message) ");
        qb.push_values(part, |mut b, w| {
            b.push_bind(&sid).push_bind(&w.path).push_bind(w.code).push_bind(&w.message);
        });
        qb.build().execute(&mut *txdb).await?;
    }
    txdb.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        path::Path,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use sqlx::{sqlite::SqlitePoolOptions, Row};

    use super::classify::FileVerdict;
    use super::*;

    /// Verdict by file name: `eicar*` infected, `broken*` error, rest clean.
    struct NameScanner {
        calls: AtomicUsize,
        cancel_after: Option<(usize, CancellationToken)>,
    }

    impl NameScanner {
        fn new() -> Self {
            Self { calls: AtomicUsize::new(0), cancel_after: None }
        }
    }

    #[async_trait]
    impl FileScanner for NameScanner {
        async fn scan_file(&self, path: &Path) -> FileVerdict {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((limit, token)) = &self.cancel_after {
                if n >= *limit {
                    token.cancel();
                }
            }
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            if name.starts_with("eicar") {
                classify::classify(&format!("{}: Eicar-Test-Signature FOUND", path.display()))
            } else if name.starts_with("broken") {
                FileVerdict::error("Can't open file")
            } else {
                classify::classify(&format!("{}: OK", path.display()))
            }
        }

        fn describe(&self) -> String {
            "fake".into()
        }
    }

    async fn setup() -> (sqlx::SqlitePool, tempfile::TempDir, Uuid) {
        let pool = SqlitePoolOptions::new().max_connections(1).connect("sqlite::memory:").await.unwrap();
        crate::db::init_db(&pool).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("broken.doc"), b"b").unwrap();
        std::fs::write(dir.path().join("sub/eicar.com"), b"X5O").unwrap();
        std::fs::write(dir.path().join("sub/z.txt"), b"z").unwrap();

        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO scans (id, status, root_path, options) VALUES (?1, 'running', ?2, '{}')")
            .bind(id.to_string())
            .bind(dir.path().to_string_lossy().to_string())
            .execute(&pool)
            .await
            .unwrap();
        (pool, dir, id)
    }

    fn ctx(
        pool: &sqlx::SqlitePool,
        id: Uuid,
        root: &Path,
        tx: broadcast::Sender<ScanEvent>,
        cancel: CancellationToken,
    ) -> ScanContext {
        ScanContext {
            pool: pool.clone(),
            id,
            root: root.to_path_buf(),
            options: ScanOptions::default(),
            tx,
            cancel,
            batch_size: 2,
            flush_interval_ms: 10_000,
        }
    }

    #[tokio::test]
    async fn scans_sequentially_and_persists_every_result() {
        let (pool, dir, id) = setup().await;
        let (tx, mut rx) = broadcast::channel(64);
        let totals = run_scan(ctx(&pool, id, dir.path(), tx, CancellationToken::new()), Arc::new(NameScanner::new()))
            .await
            .unwrap();
        assert_eq!(totals, ScanTotals { total: 4, clean: 2, infected: 1, errors: 1 });
        assert_eq!(totals.summary_line(), "Scanned: 4 | Clean: 2 | Infected: 1 | Errors: 1");

        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        assert!(matches!(events.first(), Some(ScanEvent::Started { .. })));
        assert_eq!(events[1], ScanEvent::Enumerated { total_files: 4 });
        let indexes: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                ScanEvent::FileScanned { index, total, .. } => {
                    assert_eq!(*total, 4);
                    Some(*index)
                }
                _ => None,
            })
            .collect();
        assert_eq!(indexes, vec![1, 2, 3, 4]);

        let rows = sqlx::query("SELECT path, status, signature_name FROM results WHERE scan_id=?1 ORDER BY seq")
            .bind(id.to_string())
            .fetch_all(&pool)
            .await
            .unwrap();
        let statuses: Vec<String> = rows.iter().map(|r| r.get::<String, _>("status")).collect();
        assert_eq!(statuses, vec!["clean", "error", "infected", "clean"]);
        assert_eq!(rows[2].get::<Option<String>, _>("signature_name").as_deref(), Some("Eicar-Test-Signature"));

        let scan = sqlx::query("SELECT total_files, scanned_files, infected_count FROM scans WHERE id=?1")
            .bind(id.to_string())
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(scan.get::<i64, _>("total_files"), 4);
        assert_eq!(scan.get::<i64, _>("scanned_files"), 4);
        assert_eq!(scan.get::<i64, _>("infected_count"), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_between_files_and_keeps_partial_results() {
        let (pool, dir, id) = setup().await;
        let (tx, _rx) = broadcast::channel(64);
        let cancel = CancellationToken::new();
        let scanner = NameScanner { calls: AtomicUsize::new(0), cancel_after: Some((2, cancel.clone())) };
        let scanner = Arc::new(scanner);

        let res = run_scan(ctx(&pool, id, dir.path(), tx, cancel.clone()), scanner.clone()).await;
        assert!(res.is_err());
        assert!(cancel.is_cancelled());
        assert_eq!(scanner.calls.load(Ordering::SeqCst), 2);

        let n: i64 = sqlx::query("SELECT COUNT(*) AS n FROM results WHERE scan_id=?1")
            .bind(id.to_string())
            .fetch_one(&pool)
            .await
            .unwrap()
            .get("n");
        assert_eq!(n, 2);
    }

    #[tokio::test]
    async fn empty_folder_finishes_with_zero_totals() {
        let pool = SqlitePoolOptions::new().max_connections(1).connect("sqlite::memory:").await.unwrap();
        crate::db::init_db(&pool).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO scans (id, status, root_path, options) VALUES (?1, 'running', '/', '{}')")
            .bind(id.to_string())
            .execute(&pool)
            .await
            .unwrap();
        let (tx, _rx) = broadcast::channel(8);
        let totals = run_scan(ctx(&pool, id, dir.path(), tx, CancellationToken::new()), Arc::new(NameScanner::new()))
            .await
            .unwrap();
        assert_eq!(totals, ScanTotals::default());
        assert_eq!(totals.summary_line(), "Scanned: 0 | Clean: 0 | Infected: 0 | Errors: 0");
    }
}
