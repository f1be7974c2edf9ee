use js_sys::Date;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;

/// Shown when the path field is empty or the backend rejects the folder.
pub const INVALID_FOLDER: &str = "Please select a valid folder.";
pub const SCANNING_TEXT: &str = "Scanning... Please wait.";

pub fn summary_line(total: i64, clean: i64, infected: i64, errors: i64) -> String {
    format!("Scanned: {} | Clean: {} | Infected: {} | Errors: {}", total, clean, infected, errors)
}

pub fn completion_notice(infected: i64, clean: i64, errors: i64) -> String {
    format!("Scan finished! Infected: {} | Clean: {} | Errors: {}", infected, clean, errors)
}

pub fn status_label(status: &str) -> &'static str {
    match status {
        "clean" => "CLEAN",
        "infected" => "INFECTED",
        _ => "ERROR",
    }
}

// Zeilenfarben: rot = infiziert, grün = sauber, orange = Fehler
pub fn row_style(status: &str) -> &'static str {
    match status {
        "clean" => "background:#0f2a1a;color:#86efac;",
        "infected" => "background:#3b0d0d;color:#fca5a5;font-weight:600;",
        _ => "background:#3a2410;color:#fdba74;",
    }
}

// "2024-05-01T10:11:12Z" -> "2024-05-01 12:11" (local time), a dash if None
pub fn fmt_time_opt(ts: Option<&str>) -> String {
    let Some(raw) = ts.filter(|s| !s.is_empty()) else {
        return "—".to_string();
    };
    let d = Date::new(&JsValue::from_str(raw));
    if d.get_time().is_nan() {
        return raw.to_string();
    }
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}",
        d.get_full_year(),
        d.get_month() + 1,
        d.get_date(),
        d.get_hours(),
        d.get_minutes()
    )
}

// Copy text to clipboard and show a toast on success
pub fn copy_to_clipboard(text: String) {
    if let Some(win) = web_sys::window() {
        let nav = win.navigator();
        let clip = nav.clipboard();
        let promise = clip.write_text(&text);
        wasm_bindgen_futures::spawn_local(async move {
            match JsFuture::from(promise).await {
                Ok(_) => show_toast("Copied to clipboard"),
                Err(_) => show_toast("Copy failed"),
            }
        });
    }
}

// Show a transient toast in the #toasts container
pub fn show_toast(message: &str) {
    if let Some(win) = web_sys::window() {
        if let Some(doc) = win.document() {
            if let Some(container) = doc.get_element_by_id("toasts") {
                if let Ok(toast) = doc.create_element("div") {
                    toast.set_class_name("toast fade-in");
                    toast.set_text_content(Some(message));
                    if container.append_child(&toast).is_err() {
                        return;
                    }

                    let container_clone = container.clone();
                    let toast_clone = toast.clone();
                    let cb = Closure::wrap(Box::new(move || {
                        let _ = container_clone.remove_child(&toast_clone);
                    }) as Box<dyn FnMut()>);
                    let _ = win.set_timeout_with_callback_and_timeout_and_arguments_0(cb.as_ref().unchecked_ref(), 2400);
                    cb.forget();
                }
            }
        }
    }
}

// Trigger a download from a server URL; `download` attribute hints the filename
pub fn trigger_download(url: &str, suggested_filename: Option<&str>) {
    if let Some(win) = web_sys::window() {
        if let Some(doc) = win.document() {
            if let Ok(a) = doc.create_element("a") {
                let _ = a.set_attribute("href", url);
                if let Some(name) = suggested_filename {
                    let _ = a.set_attribute("download", name);
                }
                if let Some(body) = doc.body() {
                    let _ = body.append_child(&a);
                    if let Some(ae) = a.dyn_ref::<web_sys::HtmlElement>() {
                        ae.click();
                    }
                    let _ = body.remove_child(&a);
                }
            }
        }
    }
}
