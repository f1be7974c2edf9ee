use std::collections::BTreeMap;

use dioxus::events::FormData;
use dioxus::prelude::*;
use dioxus_router::prelude::*;
use gloo_timers::future::TimeoutFuture;

mod api;
mod types;
mod ui_utils;
use ui_utils::{
    completion_notice, copy_to_clipboard, fmt_time_opt, row_style, show_toast, status_label, summary_line,
    trigger_download, INVALID_FOLDER, SCANNING_TEXT,
};

// Obergrenze für das Nachladen der Tabelle (Backend erlaubt max. 5000)
const RESULTS_LIMIT: i64 = 5000;

// ----- Routing -----
#[derive(Routable, Clone, Debug, PartialEq)]
pub enum Route {
    #[route("/")]
    Home {},
    #[route("/history")]
    History {},
    #[route("/scan/:id")]
    Scan { id: String },
}

pub fn main() {
    console_error_panic_hook::set_once();
    dioxus_web::launch::launch(app, vec![], Default::default());
}

fn app() -> Element {
    rsx! {
        div {
            div { class: "app-header",
                div { class: "container",
                    div { class: "brand",
                        span { "🛡 VirenWald" }
                    }
                    nav {
                        Link { to: Route::Home {}, "Scan" }
                        Link { to: Route::History {}, "History" }
                    }
                }
            }
            Router::<Route> {}
            div { id: "toasts", class: "toast-container" }
        }
    }
}

// ----- Live-Scan Zustand (Signals sind Copy) -----
#[derive(Clone, Copy)]
struct LiveScan {
    scan_id: Signal<Option<String>>,
    scanning: Signal<bool>,
    rows: Signal<Vec<types::FileResult>>,
    summary: Signal<String>,
    notice: Signal<Option<String>>,
    error: Signal<Option<String>>,
    progress: Signal<(u64, u64)>,
    warnings: Signal<u64>,
    // EventSource-Handle, damit die Verbindung lebt
    es: Signal<Option<web_sys::EventSource>>,
}

fn use_live_scan() -> LiveScan {
    LiveScan {
        scan_id: use_signal(|| None),
        scanning: use_signal(|| false),
        rows: use_signal(Vec::new),
        summary: use_signal(String::new),
        notice: use_signal(|| None),
        error: use_signal(|| None),
        progress: use_signal(|| (0, 0)),
        warnings: use_signal(|| 0),
        es: use_signal(|| None),
    }
}

impl LiveScan {
    fn begin(mut self) {
        self.close_stream();
        self.scan_id.set(None);
        self.rows.set(Vec::new());
        self.summary.set(SCANNING_TEXT.to_string());
        self.notice.set(None);
        self.error.set(None);
        self.progress.set((0, 0));
        self.warnings.set(0);
        self.scanning.set(true);
    }

    fn fail_start(mut self, message: String) {
        self.scanning.set(false);
        self.summary.set(String::new());
        self.error.set(Some(message));
    }

    fn attach(mut self, id: String) {
        self.scan_id.set(Some(id.clone()));
        match api::sse_attach(&id, move |ev| self.on_event(ev), move || self.on_stream_error()) {
            Ok(es) => self.es.set(Some(es)),
            Err(e) => {
                show_toast(&e);
                self.on_stream_error();
            }
        }
        // Events vor dem Abonnieren gehen verloren: gespeicherte Zeilen nachladen
        self.reload_rows();
    }

    fn close_stream(mut self) {
        if let Some(es) = self.es.write().take() {
            es.close();
        }
    }

    fn stop(mut self) {
        self.scanning.set(false);
        self.close_stream();
    }

    fn on_event(mut self, ev: types::ScanEvent) {
        match ev {
            types::ScanEvent::Started { .. } => {}
            types::ScanEvent::Enumerated { total_files } => self.progress.set((0, total_files)),
            types::ScanEvent::FileScanned { index, total, path, status, signature } => {
                self.progress.set((index, total));
                let seq = index as i64;
                let known = self.rows.read().iter().any(|r| r.seq == seq);
                if !known {
                    let row = types::FileResult { seq, path, status, signature, signature_name: None, duration_ms: 0 };
                    let mut rows = self.rows.write();
                    let pos = rows.partition_point(|r| r.seq < seq);
                    rows.insert(pos, row);
                }
            }
            types::ScanEvent::Warning { .. } => *self.warnings.write() += 1,
            types::ScanEvent::Done { total, clean, infected, errors } => {
                self.finish(total as i64, clean as i64, infected as i64, errors as i64)
            }
            types::ScanEvent::Cancelled => {
                self.summary.set("Scan cancelled.".to_string());
                self.stop();
                self.reload_rows();
            }
            types::ScanEvent::Failed { message } => {
                self.summary.set(String::new());
                self.error.set(Some(format!("Scan failed: {}", message)));
                self.stop();
            }
        }
    }

    fn finish(mut self, total: i64, clean: i64, infected: i64, errors: i64) {
        self.summary.set(summary_line(total, clean, infected, errors));
        self.notice.set(Some(completion_notice(infected, clean, errors)));
        self.stop();
        self.reload_rows();
    }

    // 404 auf /events heißt: Scan war schon fertig, bevor wir abonniert haben
    fn on_stream_error(self) {
        if !*self.scanning.read() {
            return;
        }
        let Some(id) = self.scan_id.read().clone() else { return };
        wasm_bindgen_futures::spawn_local(async move {
            if let Ok(s) = api::get_scan(&id).await {
                if !s.is_running() && *self.scanning.read() {
                    self.apply_final(&s);
                }
            }
        });
    }

    fn apply_final(mut self, s: &types::ScanSummary) {
        match s.status.as_str() {
            "done" => self.finish(s.total_files, s.clean_count, s.infected_count, s.error_count),
            "canceled" => self.on_event(types::ScanEvent::Cancelled),
            _ => {
                self.summary.set(String::new());
                self.error.set(Some(format!("Scan ended with status '{}'", s.status)));
                self.stop();
            }
        }
    }

    fn reload_rows(self) {
        let Some(id) = self.scan_id.read().clone() else { return };
        wasm_bindgen_futures::spawn_local(async move {
            let mut rows_sig = self.rows;
            if let Ok(fetched) = api::get_results(&id, "all", RESULTS_LIMIT).await {
                if self.scan_id.read().as_deref() != Some(id.as_str()) {
                    return;
                }
                // Live-Zeilen und gespeicherte Zeilen nach seq zusammenführen
                let mut merged: BTreeMap<i64, types::FileResult> =
                    rows_sig.read().iter().cloned().map(|r| (r.seq, r)).collect();
                for r in fetched {
                    merged.insert(r.seq, r);
                }
                rows_sig.set(merged.into_values().collect());
            }
        });
    }
}

// ----- Home: Ordner wählen, scannen, Ergebnisse live -----
#[component]
fn Home() -> Element {
    let mut root = use_signal(String::new);
    let mut browse_open = use_signal(|| false);
    let mut filter = use_signal(|| "all".to_string());
    let mut scanner = use_signal(|| None as Option<types::ScannerInfo>);
    let mut live = use_live_scan();

    use_effect(move || {
        spawn(async move {
            match api::scanner_info().await {
                Ok(info) => scanner.set(Some(info)),
                Err(e) => console_warn(&format!("scanner info failed: {}", e)),
            }
        });
    });

    use_drop(move || live.close_stream());

    let start_scan = move |_| {
        let path = root.read().trim().to_string();
        if path.is_empty() {
            live.error.set(Some(INVALID_FOLDER.to_string()));
            return;
        }
        live.begin();
        spawn(async move {
            let req = api::CreateScanReq { root_path: path, ..Default::default() };
            match api::create_scan(&req).await {
                Ok(resp) => live.attach(resp.id),
                Err(e) => live.fail_start(e),
            }
        });
    };

    let cancel = move |_| {
        let Some(id) = live.scan_id.read().clone() else { return };
        spawn(async move {
            match api::cancel_scan(&id, false).await {
                Ok(()) => show_toast("Cancel requested"),
                Err(e) => show_toast(&format!("Cancel failed: {}", e)),
            }
        });
    };

    let scanning = *live.scanning.read();
    let summary = live.summary.read().clone();
    let (done_n, total_n) = *live.progress.read();
    let warnings = *live.warnings.read();
    let current_filter = filter.read().clone();
    let visible: Vec<types::FileResult> = live
        .rows
        .read()
        .iter()
        .filter(|r| current_filter == "all" || r.status == current_filter)
        .cloned()
        .collect();
    let export = live.scan_id.read().as_ref().map(|id| api::export_url(id, "csv", &current_filter));

    rsx! {
        section { class: "panel", style: panel_style(),
            h2 { "VirenWald (Folder Scan)" }
            div { class: "input-group",
                input { class: "form-control", value: "{root}", disabled: scanning,
                    placeholder: "Folder to scan (e.g. C:\\Users\\me\\Downloads or /home/me)",
                    oninput: move |e: Event<FormData>| root.set(e.value()) }
                div { class: "input-group-append",
                    button { class: "btn", style: btn_style(), disabled: scanning, onclick: move |_| browse_open.set(true), "Browse Folder" }
                    button { class: "btn btn-primary", style: btn_primary_style(), disabled: scanning, onclick: start_scan, "Scan" }
                    if scanning {
                        button { class: "btn btn-danger", style: btn_danger_style(), onclick: cancel, "Cancel" }
                    }
                }
            }
            { scanner.read().as_ref().map(|s| {
                if s.available {
                    let version = s.version.clone().unwrap_or_else(|| "unknown version".into());
                    rsx!(div { class: "text-muted", style: "margin-top:6px;font-size:12px;", "Scanner: {s.binary} ({version})" })
                } else {
                    let err = s.error.clone().unwrap_or_default();
                    rsx!(div { class: "alert alert-error", "Scanner not available: {s.binary} – {err}" })
                }
            }) }
            { live.error.read().as_ref().map(|e| rsx!(div { class: "alert alert-error", "{e}" })) }
            { live.notice.read().as_ref().map(|n| rsx!(
                div { class: "alert alert-success", style: "display:flex;justify-content:space-between;align-items:center;",
                    div { strong { "Scan Complete" } span { style: "margin-left:8px;", "{n}" } }
                    button { class: "btn", style: btn_style(), onclick: move |_| live.notice.set(None), "OK" }
                }
            )) }
            div { class: "toolbar", style: "margin-top:8px;display:flex;gap:12px;align-items:center;flex-wrap:wrap;",
                span { class: "summary", "{summary}" }
                if scanning && total_n > 0 {
                    span { class: "text-muted", "{done_n} / {total_n}" }
                }
                if scanning {
                    span { class: "spinner", "" }
                }
                if warnings > 0 {
                    span { class: "text-muted", "Warnings: {warnings}" }
                }
                span { style: "flex:1;" }
                StatusFilter { value: current_filter.clone(), on_change: move |v: String| filter.set(v) }
                { export.map(|href| rsx!(a { class: "btn", style: btn_style(), href: "{href}", "Export CSV" })) }
            }
            ResultsTable { rows: visible }
        }
        if *browse_open.read() {
            FolderDialog {
                on_pick: move |p: String| {
                    root.set(p);
                    browse_open.set(false);
                },
                on_close: move |_| browse_open.set(false),
            }
        }
    }
}

// ----- Ordner-Dialog hinter "Browse Folder" -----
#[component]
fn FolderDialog(on_pick: EventHandler<String>, on_close: EventHandler<()>) -> Element {
    let mut listing = use_signal(|| None as Option<types::BrowseResponse>);
    let mut err = use_signal(|| None as Option<String>);
    let mut loading = use_signal(|| false);

    let mut load = move |path: Option<String>| {
        loading.set(true);
        spawn(async move {
            match api::browse(path.as_deref()).await {
                Ok(r) => {
                    listing.set(Some(r));
                    err.set(None);
                }
                Err(e) => err.set(Some(e)),
            }
            loading.set(false);
        });
    };

    use_hook(move || load(None));

    let current = listing.read().as_ref().and_then(|l| l.path.clone());
    let parent = listing.read().as_ref().and_then(|l| l.parent.clone());
    let entries = listing.read().as_ref().map(|l| l.entries.clone()).unwrap_or_default();
    let label = current.clone().unwrap_or_else(|| "Computer".to_string());
    let pick = current.clone();
    let dialog_style = format!("{}width:560px;", panel_style());

    rsx! {
        div { style: "position:fixed;inset:0;background:rgba(0,0,0,.6);display:flex;align-items:center;justify-content:center;z-index:50;",
            div { class: "panel", style: "{dialog_style}",
                h3 { "Browse Folder" }
                div { class: "toolbar", style: "display:flex;gap:8px;align-items:center;",
                    button { class: "btn", style: btn_style(), disabled: current.is_none(),
                        onclick: move |_| load(parent.clone()), "Up" }
                    strong { style: "overflow:hidden;text-overflow:ellipsis;white-space:nowrap;", "{label}" }
                    if *loading.read() {
                        span { class: "spinner", "" }
                    }
                }
                { err.read().as_ref().map(|e| rsx!(div { class: "alert alert-error", "{e}" })) }
                ul { class: "list-unstyled", style: "max-height:320px;overflow:auto;margin:8px 0;",
                    if entries.is_empty() && !*loading.read() {
                        li { class: "text-muted", "No sub-folders." }
                    }
                    { entries.into_iter().map(|e| {
                        let target = e.path.clone();
                        rsx!{ li { key: "{e.path}",
                            a { href: "#", style: "color:#93c5fd;",
                                onclick: move |ev: Event<MouseData>| {
                                    ev.prevent_default();
                                    load(Some(target.clone()));
                                },
                                "📁 {e.name}" }
                        } }
                    }) }
                }
                div { style: "display:flex;gap:8px;justify-content:flex-end;",
                    button { class: "btn", style: btn_style(), onclick: move |_| on_close.call(()), "Cancel" }
                    button { class: "btn btn-primary", style: btn_primary_style(), disabled: pick.is_none(),
                        onclick: move |_| {
                            if let Some(p) = pick.clone() {
                                on_pick.call(p);
                            }
                        },
                        "Select this folder" }
                }
            }
        }
    }
}

#[component]
fn StatusFilter(value: String, on_change: EventHandler<String>) -> Element {
    rsx! {
        label { style: "display:flex;gap:6px;align-items:center;",
            "Show"
            select { class: "form-control", value: "{value}",
                onchange: move |e: Event<FormData>| on_change.call(e.value()),
                option { value: "all", "All" }
                option { value: "infected", "Infected" }
                option { value: "clean", "Clean" }
                option { value: "error", "Errors" }
            }
        }
    }
}

#[component]
fn ResultsTable(rows: Vec<types::FileResult>) -> Element {
    let status_th = format!("{}width:110px;", th_style());
    rsx! {
        table { style: table_style(),
            thead {
                tr {
                    th { style: th_style(), "File" }
                    th { style: "{status_th}", "Status" }
                    th { style: th_style(), "Signature" }
                }
            }
            tbody {
                if rows.is_empty() {
                    tr { td { colspan: "3", class: "text-muted", style: "padding:8px;", "No results." } }
                }
                { rows.iter().map(|r| {
                    let label = status_label(&r.status);
                    let style = row_style(&r.status);
                    let sig = r.signature.clone();
                    let title = r.signature_name.clone().unwrap_or_default();
                    rsx!{ tr { key: "{r.seq}", style: "{style}",
                        td { style: td_style(), title: "{r.path}", "{r.path}" }
                        td { style: td_style(), "{label}" }
                        td { style: td_style(), title: "{title}",
                            ondoubleclick: move |_| {
                                if !sig.is_empty() {
                                    copy_to_clipboard(sig.clone());
                                }
                            },
                            "{r.signature}" }
                    } }
                }) }
            }
        }
    }
}

// ----- Verlauf -----
#[component]
fn History() -> Element {
    let mut scans = use_signal(Vec::<types::ScanSummary>::new);
    let mut err = use_signal(|| None as Option<String>);
    let mut loading = use_signal(|| true);
    let mut server_ok = use_signal(|| None as Option<bool>);

    let mut reload = move || {
        loading.set(true);
        spawn(async move {
            match api::list_scans().await {
                Ok(list) => {
                    scans.set(list);
                    err.set(None);
                }
                Err(e) => err.set(Some(e)),
            }
            server_ok.set(api::healthz().await.ok());
            loading.set(false);
        });
    };

    use_hook(move || reload());

    let server_text = match *server_ok.read() {
        Some(true) => "OK",
        Some(false) => "Error",
        None => "...",
    };

    rsx! {
        section { class: "panel", style: panel_style(),
            h2 { "Scan History" }
            div { class: "toolbar", style: "display:flex;gap:12px;align-items:center;",
                span { "Server: {server_text}" }
                if *loading.read() {
                    span { class: "spinner", "" }
                }
                button { class: "btn", style: btn_style(), onclick: move |_| reload(), "Refresh" }
            }
            { err.read().as_ref().map(|e| rsx!(div { class: "alert alert-error", "{e}" })) }
            table { style: table_style(),
                thead {
                    tr {
                        th { style: th_style(), "Started" }
                        th { style: th_style(), "Folder" }
                        th { style: th_style(), "Status" }
                        th { style: th_style(), "Result" }
                    }
                }
                tbody {
                    if scans.read().is_empty() && !*loading.read() {
                        tr { td { colspan: "4", class: "text-muted", style: "padding:8px;", "No scans yet." } }
                    }
                    { scans.read().iter().map(|s| {
                        let started = fmt_time_opt(s.started_at.as_deref());
                        let result = summary_line(s.total_files, s.clean_count, s.infected_count, s.error_count);
                        let result_style = format!("{}{}", td_style(), if s.infected_count > 0 { "color:#fca5a5;" } else { "" });
                        rsx!{ tr { key: "{s.id}",
                            td { style: td_style(), "{started}" }
                            td { style: td_style(), Link { to: Route::Scan { id: s.id.clone() }, "{s.root_path}" } }
                            td { style: td_style(), "{s.status}" }
                            td { style: "{result_style}", "{result}" }
                        } }
                    }) }
                }
            }
        }
    }
}

// ----- Scan-Detailseite -----
#[component]
fn Scan(id: String) -> Element {
    let mut summary = use_signal(|| None as Option<types::ScanSummary>);
    let mut rows = use_signal(Vec::<types::FileResult>::new);
    let mut err = use_signal(|| None as Option<String>);
    let mut filter = use_signal(|| "all".to_string());
    let mut reload_tick = use_signal(|| 0_u32);
    let nav = use_navigator();

    // Status pollen, solange der Scan läuft (Task endet mit der Komponente)
    {
        let id = id.clone();
        use_hook(move || {
            spawn(async move {
                loop {
                    match api::get_scan(&id).await {
                        Ok(s) => {
                            let running = s.is_running();
                            summary.set(Some(s));
                            if !running {
                                break;
                            }
                        }
                        Err(e) => {
                            err.set(Some(e));
                            return;
                        }
                    }
                    *reload_tick.write() += 1;
                    TimeoutFuture::new(1_000).await;
                }
                *reload_tick.write() += 1;
            });
        });
    }

    {
        let id = id.clone();
        use_effect(move || {
            let status = filter.read().clone();
            let _tick = *reload_tick.read();
            let id = id.clone();
            spawn(async move {
                match api::get_results(&id, &status, RESULTS_LIMIT).await {
                    Ok(list) => rows.set(list),
                    Err(e) => err.set(Some(e)),
                }
            });
        });
    }

    let export_csv = {
        let id = id.clone();
        move |_| {
            let url = api::export_url(&id, "csv", &filter.read());
            trigger_download(&url, Some(&format!("virenwald_{}.csv", id)));
        }
    };
    let export_json = {
        let id = id.clone();
        move |_| {
            let url = api::export_url(&id, "json", &filter.read());
            trigger_download(&url, Some(&format!("virenwald_{}.json", id)));
        }
    };
    let cancel = {
        let id = id.clone();
        move |_| {
            let id = id.clone();
            spawn(async move {
                match api::cancel_scan(&id, false).await {
                    Ok(()) => show_toast("Cancel requested"),
                    Err(e) => show_toast(&format!("Cancel failed: {}", e)),
                }
            });
        }
    };
    let purge = {
        let id = id.clone();
        move |_| {
            let id = id.clone();
            spawn(async move {
                match api::cancel_scan(&id, true).await {
                    Ok(()) => {
                        show_toast("Scan deleted");
                        nav.push(Route::History {});
                    }
                    Err(e) => show_toast(&format!("Delete failed: {}", e)),
                }
            });
        }
    };

    let current_filter = filter.read().clone();
    let visible = rows.read().clone();

    rsx! {
        section { class: "panel", style: panel_style(),
            { summary.read().as_ref().map(|s| {
                let started = fmt_time_opt(s.started_at.as_deref());
                let finished = fmt_time_opt(s.finished_at.as_deref());
                let line = if s.is_running() {
                    format!("{} ({} / {})", SCANNING_TEXT, s.scanned_files, s.total_files)
                } else {
                    summary_line(s.total_files, s.clean_count, s.infected_count, s.error_count)
                };
                let scanner = s.scanner.clone().unwrap_or_default();
                rsx!{
                    h2 { "{s.root_path}" }
                    div { class: "text-muted", style: "font-size:12px;",
                        "Status: {s.status} · Started: {started} · Finished: {finished} · Scanner: {scanner} · Warnings: {s.warning_count}"
                    }
                    div { class: "summary", style: "margin:8px 0;", "{line}" }
                }
            }) }
            { err.read().as_ref().map(|e| rsx!(div { class: "alert alert-error", "{e}" })) }
            div { class: "toolbar", style: "display:flex;gap:8px;align-items:center;flex-wrap:wrap;",
                StatusFilter { value: current_filter.clone(), on_change: move |v: String| filter.set(v) }
                span { style: "flex:1;" }
                button { class: "btn", style: btn_style(), onclick: export_csv, "Export CSV" }
                button { class: "btn", style: btn_style(), onclick: export_json, "Export JSON" }
                if summary.read().as_ref().map(|s| s.is_running()).unwrap_or(false) {
                    button { class: "btn btn-danger", style: btn_danger_style(), onclick: cancel, "Cancel" }
                }
                button { class: "btn btn-danger", style: btn_danger_style(), onclick: purge, "Delete" }
            }
            ResultsTable { rows: visible }
        }
    }
}

fn console_warn(msg: &str) {
    web_sys::console::warn_1(&msg.into());
}

// ----- Styles -----
fn panel_style() -> &'static str {
    "max-width:1200px;margin:20px auto;padding:16px;background:#0b0c10;color:#e5e7eb;border:1px solid #222533;border-radius:12px;"
}

fn btn_style() -> &'static str {
    "background:#1f2937;color:#e5e7eb;border:1px solid #374151;border-radius:8px;padding:6px 10px;cursor:pointer;"
}

fn btn_danger_style() -> &'static str {
    "background:#7f1d1d;color:#fff;border:1px solid #991b1b;border-radius:8px;padding:6px 10px;cursor:pointer;"
}

fn btn_primary_style() -> &'static str {
    "background:#2563eb;color:#fff;border:none;border-radius:8px;padding:6px 10px;cursor:pointer;"
}

fn table_style() -> &'static str {
    "width:100%;border-collapse:collapse;margin-top:8px;background:#0f1117;border:1px solid #222533;border-radius:8px;"
}

fn th_style() -> &'static str {
    "text-align:left;padding:6px 8px;border-bottom:1px solid #222533;color:#9aa0a6;"
}

fn td_style() -> &'static str {
    "padding:4px 8px;border-bottom:1px solid #1a1d27;word-break:break-all;"
}
