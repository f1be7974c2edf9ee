use sqlx::SqlitePool;

pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<()> {
    // Pragmas: WAL for concurrent readers while a scan writes results
    if let Err(e) = sqlx::query("PRAGMA journal_mode=WAL;").execute(pool).await {
        tracing::warn!("Failed to set WAL journal mode: {}", e);
    }
    if let Err(e) = sqlx::query("PRAGMA synchronous=NORMAL;").execute(pool).await {
        tracing::warn!("Failed to set synchronous mode: {}", e);
    }
    // Foreign keys are required for purge cascades - fail if this doesn't work
    sqlx::query("PRAGMA foreign_keys=ON;").execute(pool).await?;

    if let Err(e) = sqlx::query("PRAGMA busy_timeout=10000;").execute(pool).await {
        tracing::warn!("Failed to set busy_timeout: {}", e);
    }
    if let Err(e) = sqlx::query("PRAGMA temp_store=MEMORY;").execute(pool).await {
        tracing::warn!("Failed to set temp_store: {}", e);
    }

    // scans table
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS scans (
            id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            root_path TEXT NOT NULL,
            options TEXT NOT NULL,
            scanner TEXT NULL,
            started_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            finished_at TEXT NULL,
            total_files INTEGER NULL,
            scanned_files INTEGER NULL,
            clean_count INTEGER NULL,
            infected_count INTEGER NULL,
            error_count INTEGER NULL,
            warning_count INTEGER NULL
        )"#,
    )
    .execute(pool)
    .await?;

    // one row per scanned file, seq = position in walk order (1-based)
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            scan_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            path TEXT NOT NULL,
            status TEXT NOT NULL,
            signature TEXT NOT NULL DEFAULT '',
            signature_name TEXT NULL,
            duration_ms INTEGER NOT NULL DEFAULT 0,
            scanned_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            FOREIGN KEY(scan_id) REFERENCES scans(id) ON DELETE CASCADE
        )"#,
    )
    .execute(pool)
    .await?;

    // walk warnings (unreadable directories, broken links)
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS warnings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            scan_id TEXT NOT NULL,
            path TEXT NOT NULL,
            code TEXT NOT NULL,
            message TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            FOREIGN KEY(scan_id) REFERENCES scans(id) ON DELETE CASCADE
        )"#,
    )
    .execute(pool)
    .await?;

    let indexes = [
        ("idx_scans_status_started", "CREATE INDEX IF NOT EXISTS idx_scans_status_started ON scans(status, started_at DESC)"),
        ("idx_results_scan_seq", "CREATE INDEX IF NOT EXISTS idx_results_scan_seq ON results(scan_id, seq)"),
        ("idx_results_scan_status", "CREATE INDEX IF NOT EXISTS idx_results_scan_status ON results(scan_id, status)"),
        ("idx_warnings_scan", "CREATE INDEX IF NOT EXISTS idx_warnings_scan ON warnings(scan_id)"),
    ];

    for (name, query) in indexes {
        if let Err(e) = sqlx::query(query).execute(pool).await {
            match &e {
                sqlx::Error::Database(db_err) => {
                    let msg = db_err.message().to_lowercase();
                    if msg.contains("already exists") || msg.contains("duplicate") {
                        tracing::debug!("Index {} already exists, skipping", name);
                    } else {
                        tracing::warn!("Failed to create index {}: {}", name, e);
                    }
                }
                _ => {
                    tracing::warn!("Failed to create index {}: {}", name, e);
                }
            }
        }
    }

    // Scans left 'running' by a crashed process can never finish
    let stale = sqlx::query(
        r#"UPDATE scans SET status='failed', finished_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
           WHERE status='running'"#,
    )
    .execute(pool)
    .await?;
    if stale.rows_affected() > 0 {
        tracing::warn!(count = stale.rows_affected(), "marked interrupted scans as failed");
    }

    Ok(())
}
