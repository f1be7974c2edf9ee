use serde::Serialize;
use serde_json::Value as JsonValue;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use web_sys::{EventSource, MessageEvent};

use crate::types::*;

pub const BASE: &str = ""; // use same-origin relative URLs

fn url(path: &str) -> String {
    format!("{}{}", BASE, path)
}

fn map_net(e: reqwasm::Error) -> String {
    format!("Network error: {}", e)
}

/// `error.message` of the backend's JSON error body, else the raw text.
async fn error_text(resp: reqwasm::http::Response) -> String {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_else(|_| format!("HTTP {}", status));
    match serde_json::from_str::<JsonValue>(&text) {
        Ok(v) => v
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or(text),
        Err(_) if text.trim().is_empty() => format!("HTTP {}", status),
        Err(_) => text,
    }
}

pub async fn healthz() -> Result<bool, String> {
    let resp = reqwasm::http::Request::get(&url("/healthz")).send().await.map_err(map_net)?;
    Ok(resp.ok())
}

pub async fn scanner_info() -> Result<ScannerInfo, String> {
    let resp = reqwasm::http::Request::get(&url("/scanner")).send().await.map_err(map_net)?;
    if !resp.ok() {
        return Err(error_text(resp).await);
    }
    resp.json().await.map_err(map_net)
}

pub async fn browse(path: Option<&str>) -> Result<BrowseResponse, String> {
    let target = match path {
        Some(p) => format!("/browse?path={}", urlencoding::encode(p)),
        None => "/browse".to_string(),
    };
    let resp = reqwasm::http::Request::get(&url(&target)).send().await.map_err(map_net)?;
    if !resp.ok() {
        return Err(error_text(resp).await);
    }
    resp.json().await.map_err(map_net)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateScanReq {
    pub root_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_symlinks: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_hidden: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excludes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<u32>,
}

pub async fn create_scan(req: &CreateScanReq) -> Result<CreateScanResp, String> {
    let body = serde_json::to_string(req).map_err(|e| e.to_string())?;
    let resp = reqwasm::http::Request::post(&url("/scans"))
        .header("Content-Type", "application/json")
        .body(body)
        .send()
        .await
        .map_err(map_net)?;
    if !resp.ok() {
        return Err(error_text(resp).await);
    }
    resp.json().await.map_err(map_net)
}

pub async fn list_scans() -> Result<Vec<ScanSummary>, String> {
    let resp = reqwasm::http::Request::get(&url("/scans")).send().await.map_err(map_net)?;
    if !resp.ok() {
        return Err(error_text(resp).await);
    }
    resp.json().await.map_err(map_net)
}

pub async fn get_scan(id: &str) -> Result<ScanSummary, String> {
    let resp = reqwasm::http::Request::get(&url(&format!("/scans/{}", id))).send().await.map_err(map_net)?;
    if !resp.ok() {
        return Err(error_text(resp).await);
    }
    resp.json().await.map_err(map_net)
}

pub async fn cancel_scan(id: &str, purge: bool) -> Result<(), String> {
    let resp = reqwasm::http::Request::delete(&url(&format!(
        "/scans/{}?purge={}",
        id,
        if purge { "true" } else { "false" }
    )))
    .send()
    .await
    .map_err(map_net)?;
    if !resp.ok() {
        return Err(error_text(resp).await);
    }
    Ok(())
}

/// Result rows in scan order; `status` is `all` or one of the three buckets.
pub async fn get_results(id: &str, status: &str, limit: i64) -> Result<Vec<FileResult>, String> {
    let resp = reqwasm::http::Request::get(&url(&format!(
        "/scans/{}/results?status={}&limit={}",
        id,
        urlencoding::encode(status),
        limit
    )))
    .send()
    .await
    .map_err(map_net)?;
    if !resp.ok() {
        return Err(error_text(resp).await);
    }
    resp.json().await.map_err(map_net)
}

pub fn export_url(id: &str, format: &str, status: &str) -> String {
    url(&format!("/scans/{}/export?format={}&status={}", id, format, urlencoding::encode(status)))
}

// SSE helper: open EventSource and wire callbacks. Returns the EventSource to be kept alive.
// `on_error` fires on connection problems, including 404 for scans that already ended.
pub fn sse_attach<F, E>(id: &str, mut on_message: F, mut on_error: E) -> Result<EventSource, String>
where
    F: 'static + FnMut(ScanEvent),
    E: 'static + FnMut(),
{
    let es = EventSource::new(&url(&format!("/scans/{}/events", id))).map_err(|e| format!("SSE error: {:?}", e))?;
    let on_msg = Closure::<dyn FnMut(web_sys::Event)>::new(move |ev: web_sys::Event| {
        if let Ok(me) = ev.dyn_into::<MessageEvent>() {
            if let Some(text) = me.data().as_string() {
                if let Ok(ev) = serde_json::from_str::<ScanEvent>(&text) {
                    on_message(ev);
                }
            }
        }
    });
    es.set_onmessage(Some(on_msg.as_ref().unchecked_ref()));
    let on_err = Closure::<dyn FnMut(web_sys::Event)>::new(move |_ev: web_sys::Event| on_error());
    es.set_onerror(Some(on_err.as_ref().unchecked_ref()));
    // Leak the closures to keep them as long as the EventSource lives (owner closes ES)
    on_msg.forget();
    on_err.forget();
    Ok(es)
}
