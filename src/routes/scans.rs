use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::Stream;
use globset::Glob;
use serde_json::json;
use sqlx::{sqlite::SqliteRow, Row};
use tokio::{sync::broadcast, task::JoinHandle};
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    error::{
        validation::{validate_positive_number, validate_scan_root},
        AppError, AppResult, OptionExt, INVALID_FOLDER_MESSAGE,
    },
    middleware::ip::{extract_ip_from_headers, MaybeRemoteAddr},
    middleware::validation::{validate_file_path, validate_scan_options},
    scanner::{self, ScanContext},
    state::{AppState, JobHandle},
    types::{
        CreateScanRequest, CreateScanResponse, FileResultDto, FileStatus, ScanEvent, ScanOptions, ScanSummary,
        ScanTotals,
    },
};

const DEFAULT_RESULTS_LIMIT: i64 = 500;
const MAX_RESULTS_LIMIT: i64 = 5_000;

pub async fn create_scan(
    State(state): State<AppState>,
    maybe_remote: MaybeRemoteAddr,
    headers: HeaderMap,
    Json(req): Json<CreateScanRequest>,
) -> AppResult<Response> {
    let ip = extract_ip_from_headers(&headers, maybe_remote.ip());
    if let Err((status, body)) = state.rate_limiter.check_endpoint_limit("/scans", ip).await {
        return Ok((status, body).into_response());
    }

    if req.root_path.trim().is_empty() {
        return Err(AppError::BadRequest(INVALID_FOLDER_MESSAGE.into()));
    }
    let raw_root = validate_file_path(&req.root_path).map_err(|(_, body)| {
        let msg = body.0["error"]["message"].as_str().unwrap_or("Invalid path").to_string();
        AppError::InvalidInput(msg)
    })?;
    validate_scan_options(req.max_depth, req.excludes.as_deref())
        .map_err(|_| AppError::InvalidInput("Invalid scan options".into()))?;
    let root = validate_scan_root(&raw_root)?;
    let root_str = root.to_string_lossy().to_string();

    // Request values win over [scan_defaults]
    let d = &state.config.scan_defaults;
    let excludes_src = req.excludes.clone().unwrap_or_else(|| d.excludes.clone());
    let mut excludes = Vec::with_capacity(excludes_src.len());
    for pat in excludes_src {
        let norm = pat.trim().replace('\\', "/");
        if norm.is_empty() {
            continue;
        }
        if let Err(e) = Glob::new(&norm) {
            return Err(AppError::InvalidInput(format!("Invalid exclude pattern: {} ({})", pat, e)));
        }
        excludes.push(norm);
    }
    let options = ScanOptions {
        follow_symlinks: req.follow_symlinks.unwrap_or(d.follow_symlinks),
        include_hidden: req.include_hidden.unwrap_or(d.include_hidden),
        excludes,
        max_depth: req.max_depth.or(d.max_depth),
    };
    let options_json = serde_json::to_string(&options).map_err(|e| AppError::Internal(e.into()))?;

    let id = Uuid::new_v4();
    let (tx, _rx) = broadcast::channel::<ScanEvent>(1024);
    let cancel = CancellationToken::new();

    // Check and register under one lock so two requests for one folder cannot both pass
    {
        let mut jobs = state.jobs.write().await;
        if jobs.values().any(|h| h.root == root) {
            return Err(AppError::Conflict(format!("A scan of {} is already running", root_str)));
        }
        jobs.insert(id, JobHandle { cancel: cancel.clone(), sender: tx.clone(), root: root.clone() });
    }

    let inserted = sqlx::query(
        r#"INSERT INTO scans (id, status, root_path, options, scanner)
           VALUES (?1, 'running', ?2, ?3, ?4)"#,
    )
    .bind(id.to_string())
    .bind(&root_str)
    .bind(options_json)
    .bind(state.scanner.describe())
    .execute(&state.db)
    .await;
    if let Err(e) = inserted {
        state.jobs.write().await.remove(&id);
        return Err(e.into());
    }

    state.metrics.inc_scans_started();
    tracing::info!(scan_id = %id, root = %root_str, "scan started");

    let ctx = ScanContext {
        pool: state.db.clone(),
        id,
        root,
        options,
        tx: tx.clone(),
        cancel: cancel.clone(),
        batch_size: state.config.scanner.batch_size,
        flush_interval_ms: state.config.scanner.flush_interval_ms,
    };
    let task_state = state.clone();
    let _handle: JoinHandle<()> = tokio::spawn(async move {
        let res = scanner::run_scan(ctx, task_state.scanner.clone()).await;
        finish_scan(&task_state, id, &tx, &cancel, res).await;
        task_state.jobs.write().await.remove(&id);
    });

    let started_at: String = sqlx::query("SELECT started_at FROM scans WHERE id=?1")
        .bind(id.to_string())
        .fetch_one(&state.db)
        .await
        .map(|row| row.get::<String, _>("started_at"))
        .unwrap_or_else(|_| chrono::Utc::now().to_rfc3339());
    let resp = CreateScanResponse { id, status: "running".into(), started_at };
    Ok((StatusCode::ACCEPTED, Json(resp)).into_response())
}

/// Final event, final status row, metrics.
///
/// Status rows only move away from `running`; a scan cancelled or purged
/// while its last file was in flight stays cancelled.
pub(crate) async fn finish_scan(
    state: &AppState,
    id: Uuid,
    tx: &broadcast::Sender<ScanEvent>,
    cancel: &CancellationToken,
    res: anyhow::Result<ScanTotals>,
) {
    let metrics = &state.metrics;
    match res {
        Ok(totals) => {
            let updated = sqlx::query(
                r#"UPDATE scans SET status='done', finished_at = strftime('%Y-%m-%dT%H:%M:%SZ','now'),
                    total_files=?1, scanned_files=?2, clean_count=?3, infected_count=?4, error_count=?5
                    WHERE id=?6 AND status='running'"#,
            )
            .bind(totals.total as i64)
            .bind(totals.scanned() as i64)
            .bind(totals.clean as i64)
            .bind(totals.infected as i64)
            .bind(totals.errors as i64)
            .bind(id.to_string())
            .execute(&state.db)
            .await;
            match updated {
                Ok(r) if r.rows_affected() == 0 => {
                    metrics.inc_scans_cancelled();
                    tracing::info!(scan_id = %id, "scan cancelled after its last file");
                    let _ = tx.send(ScanEvent::Cancelled);
                }
                other => {
                    if let Err(e) = other {
                        tracing::error!(scan_id = %id, error = %e, "failed to store final scan status");
                    }
                    metrics.inc_scans_completed();
                    metrics.add_totals(&totals);
                    tracing::info!(scan_id = %id, "{}", totals.summary_line());
                    let _ = tx.send(ScanEvent::Done {
                        total: totals.total,
                        clean: totals.clean,
                        infected: totals.infected,
                        errors: totals.errors,
                    });
                }
            }
        }
        Err(e) if cancel.is_cancelled() => {
            metrics.inc_scans_cancelled();
            tracing::info!(scan_id = %id, "scan cancelled");
            let _ = sqlx::query(
                r#"UPDATE scans SET status='canceled', finished_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
                   WHERE id=?1 AND status='running'"#,
            )
            .bind(id.to_string())
            .execute(&state.db)
            .await;
            tracing::debug!(scan_id = %id, reason = %e, "scan loop stopped");
            let _ = tx.send(ScanEvent::Cancelled);
        }
        Err(e) => {
            metrics.inc_scans_failed();
            tracing::error!(scan_id = %id, error = %e, "scan failed");
            let _ = sqlx::query(
                r#"UPDATE scans SET status='failed', finished_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
                   WHERE id=?1 AND status='running'"#,
            )
            .bind(id.to_string())
            .execute(&state.db)
            .await;
            let _ = tx.send(ScanEvent::Failed { message: e.to_string() });
        }
    }

    let warnings: i64 = sqlx::query("SELECT COALESCE(warning_count,0) AS n FROM scans WHERE id=?1")
        .bind(id.to_string())
        .fetch_optional(&state.db)
        .await
        .ok()
        .flatten()
        .map(|r| r.get::<i64, _>("n"))
        .unwrap_or(0);
    metrics.add_warnings(warnings.max(0) as usize);
}

const SUMMARY_COLUMNS: &str = r#"SELECT id, status, root_path, scanner, started_at, finished_at,
       COALESCE(total_files,0) AS total_files,
       COALESCE(scanned_files,0) AS scanned_files,
       COALESCE(clean_count,0) AS clean_count,
       COALESCE(infected_count,0) AS infected_count,
       COALESCE(error_count,0) AS error_count,
       COALESCE(warning_count,0) AS warning_count
  FROM scans"#;

fn summary_from_row(r: &SqliteRow) -> Option<ScanSummary> {
    let id = Uuid::parse_str(r.get::<String, _>("id").as_str()).ok()?;
    Some(ScanSummary {
        id,
        status: r.get("status"),
        root_path: r.get("root_path"),
        scanner: r.get("scanner"),
        started_at: r.get("started_at"),
        finished_at: r.get("finished_at"),
        total_files: r.get("total_files"),
        scanned_files: r.get("scanned_files"),
        clean_count: r.get("clean_count"),
        infected_count: r.get("infected_count"),
        error_count: r.get("error_count"),
        warning_count: r.get("warning_count"),
    })
}

pub async fn list_scans(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let rows = sqlx::query(&format!("{} ORDER BY started_at DESC, rowid DESC", SUMMARY_COLUMNS))
        .fetch_all(&state.db)
        .await?;
    let items: Vec<ScanSummary> = rows.iter().filter_map(summary_from_row).collect();
    Ok(Json(items))
}

pub(crate) async fn load_summary(db: &sqlx::SqlitePool, id: Uuid) -> AppResult<ScanSummary> {
    let row = sqlx::query(&format!("{} WHERE id = ?1", SUMMARY_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(db)
        .await?;
    row.as_ref().and_then(summary_from_row).ok_or_not_found("scan")
}

pub async fn get_scan(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<impl IntoResponse> {
    Ok(Json(load_summary(&state.db, id).await?))
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct CancelQuery {
    pub purge: Option<bool>,
}

/// Cancels a running scan; `purge=true` also deletes it with all results.
pub async fn cancel_scan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<CancelQuery>,
) -> AppResult<impl IntoResponse> {
    let purge = q.purge.unwrap_or(false);

    let handle = state.jobs.write().await.remove(&id);
    match handle {
        Some(handle) => {
            handle.cancel.cancel();
            tracing::info!(scan_id = %id, purge, "cancel requested");
            if !purge {
                sqlx::query(
                    r#"UPDATE scans SET status='canceled', finished_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
                       WHERE id=?1 AND status='running'"#,
                )
                .bind(id.to_string())
                .execute(&state.db)
                .await?;
            }
        }
        None if !purge => {
            // Already finished: idempotent, but unknown ids are still 404
            load_summary(&state.db, id).await?;
            return Ok(StatusCode::NO_CONTENT);
        }
        None => {}
    }

    if purge {
        // results and warnings go via ON DELETE CASCADE
        sqlx::query("DELETE FROM scans WHERE id=?1").bind(id.to_string()).execute(&state.db).await?;
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn scan_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>> {
    let rx = {
        let jobs = state.jobs.read().await;
        jobs.get(&id).map(|h| h.sender.subscribe()).ok_or_not_found("running scan")?
    };

    // Lagged receivers skip events; the UI reloads /results on completion.
    let stream = BroadcastStream::new(rx).filter_map(|res| res.ok()).map(|ev| {
        let data = serde_json::to_string(&ev)
            .unwrap_or_else(|_| json!({"type":"warning","path":"","code":"serialize","message":"serialization error"}).to_string());
        Ok::<Event, std::convert::Infallible>(Event::default().data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(10)).text("keep-alive")))
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct ResultsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub(crate) fn parse_status_filter(status: Option<&str>) -> AppResult<Option<FileStatus>> {
    match status.map(str::trim).filter(|s| !s.is_empty() && *s != "all") {
        None => Ok(None),
        Some(s) => FileStatus::parse(s)
            .map(Some)
            .ok_or_else(|| AppError::InvalidInput(format!("unknown status filter: {}", s))),
    }
}

/// Result rows in scan order.
pub(crate) async fn fetch_results(
    db: &sqlx::SqlitePool,
    id: Uuid,
    status: Option<FileStatus>,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<FileResultDto>> {
    let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
        "SELECT seq, path, status, signature, signature_name, duration_ms FROM results WHERE scan_id = ",
    );
    qb.push_bind(id.to_string());
    if let Some(st) = status {
        qb.push(" AND status = ").push_bind(st.as_str());
    }
    qb.push(" ORDER BY seq LIMIT ").push_bind(limit).push(" OFFSET ").push_bind(offset);

    let rows = qb.build().fetch_all(db).await?;
    let items = rows
        .iter()
        .map(|r| {
            let raw: String = r.get("status");
            FileResultDto {
                seq: r.get("seq"),
                path: r.get("path"),
                // Unknown values would only come from a foreign writer
                status: FileStatus::parse(&raw).unwrap_or(FileStatus::Error),
                signature: r.get("signature"),
                signature_name: r.get("signature_name"),
                duration_ms: r.get("duration_ms"),
            }
        })
        .collect();
    Ok(items)
}

pub async fn get_results(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<ResultsQuery>,
) -> AppResult<impl IntoResponse> {
    let status = parse_status_filter(q.status.as_deref())?;
    validate_positive_number(q.limit, "limit")?;
    load_summary(&state.db, id).await?;
    let limit = q.limit.unwrap_or(DEFAULT_RESULTS_LIMIT).clamp(1, MAX_RESULTS_LIMIT);
    let offset = q.offset.unwrap_or(0).max(0);
    Ok(Json(fetch_results(&state.db, id, status, limit, offset).await?))
}

