#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use std::{
  collections::HashSet,
  env,
  io::{Read, Write},
  net::{TcpListener, TcpStream},
  path::PathBuf,
  process::{Child, Command, Stdio},
  sync::Mutex,
  thread,
  time::Duration,
};
use tauri::{Manager, WindowUrl};

const WINDOW_TITLE: &str = "VirenWald (Folder Scan)";
const WINDOW_WIDTH: f64 = 900.0;
const WINDOW_HEIGHT: f64 = 600.0;
const READY_TIMEOUT_MS: u64 = 15_000;

struct BackendState {
  child: Mutex<Option<Child>>,
  port: u16,
}

fn find_free_port() -> anyhow::Result<u16> {
  let listener = TcpListener::bind("127.0.0.1:0")?;
  let port = listener.local_addr()?.port();
  drop(listener);
  Ok(port)
}

fn candidate_backend_paths() -> Vec<PathBuf> {
  let mut v = Vec::new();
  if let Ok(envp) = env::var("VIRENWALD_BACKEND_PATH") {
    v.push(PathBuf::from(envp));
  }
  let exe_name = |stem: &str| format!("{}{}", stem, env::consts::EXE_SUFFIX);
  if let Ok(exe) = env::current_exe() {
    if let Some(dir) = exe.parent() {
      v.push(dir.join(exe_name("virenwald-backend")));
      v.push(dir.join(exe_name("virenwald")));
      // packaged resource convention
      v.push(dir.join("..").join("resources").join(exe_name("virenwald-backend")));
      v.push(dir.join("..").join("resources").join(exe_name("virenwald")));
    }
  }
  // dev: desktop/src-tauri or desktop -> repo root
  if let Ok(mut cwd) = env::current_dir() {
    if cwd.ends_with("src-tauri") {
      cwd.pop();
    }
    if cwd.ends_with("desktop") {
      cwd.pop();
    }
    v.push(cwd.join("target").join("release").join(exe_name("virenwald")));
    v.push(cwd.join("target").join("debug").join(exe_name("virenwald")));
  }
  let mut seen = HashSet::<String>::new();
  v.retain(|p| seen.insert(p.to_string_lossy().to_lowercase()));
  v
}

fn spawn_backend(port: u16) -> anyhow::Result<Child> {
  let mut last_err: Option<anyhow::Error> = None;
  let self_path = env::current_exe().ok().and_then(|p| p.canonicalize().ok());
  for cand in candidate_backend_paths() {
    if !cand.is_file() {
      continue;
    }
    if let (Ok(cc), Some(sp)) = (cand.canonicalize(), self_path.as_ref()) {
      if &cc == sp {
        // sonst startet die Shell sich selbst
        eprintln!("[desktop] skip self executable as backend: {}", cc.display());
        continue;
      }
    }
    let mut cmd = Command::new(&cand);
    if let Some(dir) = cand.parent() {
      cmd.current_dir(dir);
    }
    cmd.env("VIRENWALD__SERVER__PORT", port.to_string())
      .env("VIRENWALD__SERVER__HOST", "127.0.0.1")
      .envs(user_writable_envs());
    #[cfg(debug_assertions)]
    {
      cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
    }
    #[cfg(not(debug_assertions))]
    {
      cmd.stdout(Stdio::null()).stderr(Stdio::null());
    }
    match cmd.spawn() {
      Ok(child) => {
        eprintln!("[desktop] backend {} on port {}", cand.display(), port);
        return Ok(child);
      }
      Err(e) => {
        eprintln!("[desktop] failed to spawn {:?}: {}", cand, e);
        last_err = Some(anyhow::anyhow!("{}: {}", cand.display(), e));
      }
    }
  }
  Err(last_err.unwrap_or_else(|| anyhow::anyhow!("virenwald backend executable not found")))
}

fn wait_until_ready(port: u16, timeout_ms: u64) -> bool {
  let start = std::time::Instant::now();
  while start.elapsed() < Duration::from_millis(timeout_ms) {
    if let Ok(mut s) = TcpStream::connect(("127.0.0.1", port)) {
      let _ = s.write_all(b"GET /healthz HTTP/1.1\r\nHost: 127.0.0.1\r\nConnection: close\r\n\r\n");
      let mut buf = [0u8; 64];
      if let Ok(n) = s.read(&mut buf) {
        if n >= 12 && &buf[..12] == b"HTTP/1.1 200" {
          return true;
        }
      }
    }
    thread::sleep(Duration::from_millis(150));
  }
  false
}

fn kill_backend(child: &mut Option<Child>) {
  if let Some(ch) = child.as_mut() {
    // Laufende clamscan-Prozesse hängen am Backend (kill_on_drop)
    let _ = ch.kill();
    let _ = ch.wait();
  }
  *child = None;
}

fn user_writable_envs() -> Vec<(String, String)> {
  // SQLite-Verlauf und Logs nicht neben der exe (Program Files ist read-only)
  let base = env::var("LOCALAPPDATA")
    .map(PathBuf::from)
    .or_else(|_| env::var("XDG_DATA_HOME").map(PathBuf::from))
    .or_else(|_| env::var("HOME").map(|h| PathBuf::from(h).join(".local").join("share")));
  let mut envs: Vec<(String, String)> = Vec::new();
  if let Ok(base) = base {
    let db_dir = base.join("VirenWald");
    let _ = std::fs::create_dir_all(&db_dir);
    let db_path = db_dir.join("virenwald.db");
    // sqlite:///C:/... bzw. sqlite:///home/...
    let mut p = db_path.to_string_lossy().replace('\\', "/");
    if !p.starts_with('/') {
      p = format!("/{}", p);
    }
    envs.push(("VIRENWALD__DATABASE__URL".to_string(), format!("sqlite://{}", p)));
  }
  envs
}

fn percent_encode_for_data_url(input: &str) -> String {
  let mut s = String::with_capacity(input.len() * 2);
  for ch in input.chars() {
    match ch {
      'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' | '/' | ':' | '=' | '&' | ';' | ',' | '\'' | '(' | ')'
      | '!' | '*' => s.push(ch),
      ' ' => s.push_str("%20"),
      '<' => s.push_str("%3C"),
      '>' => s.push_str("%3E"),
      '"' => s.push_str("%22"),
      '#' => s.push_str("%23"),
      '%' => s.push_str("%25"),
      '\n' => s.push_str("%0A"),
      '\r' => s.push_str("%0D"),
      _ => s.push(ch),
    }
  }
  s
}

fn error_page(message: &str) -> String {
  format!(
    r#"<html><head><meta charset='utf-8'><title>VirenWald – Error</title></head>
<body style='font-family:Segoe UI, sans-serif; padding:20px;'>
  <h2>VirenWald – the scan backend could not be started</h2>
  <p style='color:#b00020;'>Error: {}</p>
  <p>Please check:</p>
  <ul>
    <li>Is <code>virenwald</code> (<code>virenwald.exe</code> on Windows) next to the VirenWald app?</li>
    <li>Was the file blocked by SmartScreen? Right click → Properties → Unblock.</li>
    <li>Is ClamAV installed? The backend calls <code>clamscan</code> for every file.</li>
    <li>Test: start <code>virenwald</code> in a terminal and open <a href='http://127.0.0.1:8080/'>http://127.0.0.1:8080/</a>.</li>
  </ul>
</body></html>"#,
    message
  )
}

fn open_window(app: &tauri::AppHandle, url: &str, title: &str) {
  let parsed = match url.parse() {
    Ok(u) => u,
    Err(e) => {
      eprintln!("[desktop] invalid window url {}: {}", url, e);
      return;
    }
  };
  if let Err(e) = tauri::WindowBuilder::new(app, "main", WindowUrl::External(parsed))
    .title(title)
    .inner_size(WINDOW_WIDTH, WINDOW_HEIGHT)
    .build()
  {
    eprintln!("[desktop] failed to open window: {}", e);
  }
}

fn main() {
  let app = tauri::Builder::default()
    .setup(move |app| {
      let started = find_free_port().and_then(|port| spawn_backend(port).map(|child| (port, child)));

      match started {
        Ok((port, child)) => {
          app.manage(BackendState { child: Mutex::new(Some(child)), port });

          let app_handle = app.handle();
          thread::spawn(move || {
            if wait_until_ready(port, READY_TIMEOUT_MS) {
              open_window(&app_handle, &format!("http://127.0.0.1:{}/", port), WINDOW_TITLE);
            } else {
              let msg = format!("no answer on http://127.0.0.1:{}/healthz within {} s", port, READY_TIMEOUT_MS / 1000);
              let url = format!("data:text/html,{}", percent_encode_for_data_url(&error_page(&msg)));
              open_window(&app_handle, &url, "VirenWald – Error");
            }
          });
          Ok(())
        }
        Err(e) => {
          let url = format!("data:text/html,{}", percent_encode_for_data_url(&error_page(&e.to_string())));
          open_window(&app.handle(), &url, "VirenWald – Error");
          Ok(())
        }
      }
    })
    .on_window_event(|event| {
      if let tauri::WindowEvent::CloseRequested { .. } = event.event() {
        if let Some(state) = event.window().try_state::<BackendState>() {
          if let Ok(mut guard) = state.child.lock() {
            eprintln!("[desktop] stopping backend on port {}", state.port);
            kill_backend(&mut guard);
          }
        }
      }
    })
    .build(tauri::generate_context!());

  let app = match app {
    Ok(app) => app,
    Err(e) => {
      eprintln!("error while building tauri application: {}", e);
      std::process::exit(1);
    }
  };

  app.run(|app_handle, event| {
    // Auch bei Exit ohne CloseRequested (z. B. Ctrl+C im Terminal) kein verwaister Backend-Prozess
    if let tauri::RunEvent::Exit = event {
      if let Some(state) = app_handle.try_state::<BackendState>() {
        if let Ok(mut guard) = state.child.lock() {
          kill_backend(&mut guard);
        }
      }
    }
  });
}
