use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use uuid::Uuid;

use super::scans::{fetch_results, load_summary, parse_status_filter};
use crate::{
    error::{validation::validate_positive_number, AppError, AppResult},
    state::AppState,
    types::{FileResultDto, FileStatus, ScanSummary, ScanTotals},
};

const CSV_HEADER: &str = "Seq,File,Status,Signature,Signature Name,Duration (ms)\n";
const EXPORT_CHUNK_SIZE: i64 = 800;
const DEFAULT_EXPORT_LIMIT: i64 = 100_000;
const MAX_EXPORT_LIMIT: i64 = 250_000;

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: String, // csv or json
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct WarningExport {
    pub path: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ExportData {
    pub scan: ScanSummary,
    pub summary: String,
    pub exported_at: String,
    pub results: Vec<FileResultDto>,
    pub warnings: Vec<WarningExport>,
}

pub async fn export_scan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ExportQuery>,
) -> AppResult<Response> {
    let status = parse_status_filter(query.status.as_deref())?;
    validate_positive_number(query.limit, "limit")?;
    let scan = load_summary(&state.db, id).await?;

    let requested = query.limit.unwrap_or(DEFAULT_EXPORT_LIMIT);
    if requested > MAX_EXPORT_LIMIT {
        tracing::warn!("Export limit clamped from {} to {} for scan {}", requested, MAX_EXPORT_LIMIT, id);
    }
    let limit = requested.clamp(1, MAX_EXPORT_LIMIT);

    match query.format.as_str() {
        "csv" => {
            let rows = fetch_all_results(&state, id, status, limit).await?;
            Ok(attachment(render_csv(&rows).into_response(), "text/csv; charset=utf-8", id, "csv"))
        }
        "json" => {
            let results = fetch_all_results(&state, id, status, limit).await?;
            let warnings = fetch_warnings(&state, id).await?;
            let data = ExportData {
                summary: summary_totals(&scan).summary_line(),
                scan,
                exported_at: chrono::Utc::now().to_rfc3339(),
                results,
                warnings,
            };
            Ok(attachment(Json(data).into_response(), "application/json; charset=utf-8", id, "json"))
        }
        _ => Err(AppError::BadRequest("Invalid format. Use 'csv' or 'json'".to_string())),
    }
}

fn summary_totals(scan: &ScanSummary) -> ScanTotals {
    ScanTotals {
        total: scan.total_files.max(0) as u64,
        clean: scan.clean_count.max(0) as u64,
        infected: scan.infected_count.max(0) as u64,
        errors: scan.error_count.max(0) as u64,
    }
}

fn attachment(mut response: Response, content_type: &'static str, id: Uuid, ext: &str) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    let disposition = format!("attachment; filename=\"virenwald_{}.{}\"", id, ext);
    if let Ok(v) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, v);
    }
    response
}

fn render_csv(rows: &[FileResultDto]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + rows.len() * 96);
    out.push_str(CSV_HEADER);
    for r in rows {
        out.push_str(&format!(
            "{},\"{}\",{},\"{}\",\"{}\",{}\n",
            r.seq,
            escape_csv(&r.path),
            r.status.label(),
            escape_csv(&r.signature),
            escape_csv(r.signature_name.as_deref().unwrap_or("")),
            r.duration_ms,
        ));
    }
    out
}

fn escape_csv(s: &str) -> String {
    // "" für Anführungszeichen, Steuerzeichen werden zu Leerzeichen
    s.chars()
        .flat_map(|c| match c {
            '"' => vec!['"', '"'],
            c if c.is_control() => vec![' '],
            c => vec![c],
        })
        .collect()
}

async fn fetch_all_results(
    state: &AppState,
    id: Uuid,
    status: Option<FileStatus>,
    limit: i64,
) -> AppResult<Vec<FileResultDto>> {
    let mut results = Vec::new();
    let mut offset: i64 = 0;
    while offset < limit {
        let batch = (limit - offset).min(EXPORT_CHUNK_SIZE);
        let rows = fetch_results(&state.db, id, status, batch, offset).await?;
        let fetched = rows.len() as i64;
        results.extend(rows);
        offset += fetched;
        if fetched < batch {
            break;
        }
    }
    Ok(results)
}

async fn fetch_warnings(state: &AppState, id: Uuid) -> AppResult<Vec<WarningExport>> {
    let rows = sqlx::query("SELECT path, code, message FROM warnings WHERE scan_id = ?1 ORDER BY id")
        .bind(id.to_string())
        .fetch_all(&state.db)
        .await?;
    Ok(rows
        .iter()
        .map(|r| WarningExport { path: r.get("path"), code: r.get("code"), message: r.get("message") })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_escapes_quotes_and_newlines() {
        let rows = vec![FileResultDto {
            seq: 1,
            path: "/data/\"odd\" name.exe".into(),
            status: FileStatus::Infected,
            signature: "/data/x: Win.Trojan FOUND\nnote".into(),
            signature_name: Some("Win.Trojan".into()),
            duration_ms: 12,
        }];
        let csv = render_csv(&rows);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER.trim_end()));
        assert_eq!(
            lines.next(),
            Some(r#"1,"/data/""odd"" name.exe",INFECTED,"/data/x: Win.Trojan FOUND note","Win.Trojan",12"#)
        );
        assert_eq!(lines.next(), None);
    }
}
