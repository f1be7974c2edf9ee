use std::net::SocketAddr;
use std::path::PathBuf;

use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Sqlite, SqlitePool};
use tokio::time::{self, Duration as TokioDuration};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use virenwald::{config, db, middleware::EndpointRateLimiter, routes, state::AppState};

const UI_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/ui");
const SHUTDOWN_GRACE: TokioDuration = TokioDuration::from_secs(10);
const UI_INDEX: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/ui/index.html");

/// stdout + `logs/virenwald.log` (daily). The guards flush on drop and must
/// live until the process ends.
fn init_tracing() -> (WorkerGuard, WorkerGuard) {
    std::fs::create_dir_all("logs").ok();
    let (stdout_nb, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let (file_nb, file_guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily("logs", "virenwald.log"));
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,tower_http=info".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(stdout_nb))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_nb))
        .init();
    (stdout_guard, file_guard)
}

async fn open_database(url: &str) -> anyhow::Result<SqlitePool> {
    config::ensure_sqlite_parent_dir(url)?;
    if !Sqlite::database_exists(url).await.unwrap_or(false) {
        info!(url, "creating scan history database");
        Sqlite::create_database(url).await?;
    }
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                // Ohne foreign_keys kein ON DELETE CASCADE für results/warnings
                let _ = sqlx::query("PRAGMA foreign_keys=ON;").execute(&mut *conn).await;
                let _ = sqlx::query("PRAGMA busy_timeout=10000;").execute(&mut *conn).await;
                let _ = sqlx::query("PRAGMA journal_mode=WAL;").execute(&mut *conn).await;
                Ok(())
            })
        })
        .connect(url)
        .await?;
    db::init_db(&pool).await?;
    Ok(pool)
}

fn spawn_rate_limit_cleanup(limiter: EndpointRateLimiter) {
    tokio::spawn(async move {
        let mut ticker = time::interval(TokioDuration::from_secs(300));
        loop {
            ticker.tick().await;
            limiter.cleanup_all().await;
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guards = init_tracing();
    let app_cfg = config::load()?;
    let pool = open_database(&app_cfg.database.url).await?;

    let state = AppState::new(pool, app_cfg.clone());
    info!(
        binary = %state.scanner_command.binary().display(),
        args = ?state.scanner_command.args(),
        timeout_secs = app_cfg.scanner.timeout_secs,
        "scanner configured"
    );
    spawn_rate_limit_cleanup(state.rate_limiter.clone());

    let shutdown_state = state.clone();
    let app = routes::build_app(state, Some(ui_paths()));

    let (host, port) = (app_cfg.server.host.as_str(), app_cfg.server.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid listen addr {}:{} - {}", host, port, e))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("VirenWald listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Laufende Scans abbrechen (kill_on_drop beendet clamscan) und auf den Endstatus warten
            if !shutdown_state.cancel_all_jobs(SHUTDOWN_GRACE).await {
                tracing::warn!("scans still running at shutdown are marked failed on next start");
            }
        })
        .await?;

    Ok(())
}

/// `<exe_dir>/ui` when shipped next to the binary, else the build-time path.
fn ui_paths() -> (PathBuf, PathBuf) {
    let runtime_ui = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.join("ui")))
        .unwrap_or_else(|| PathBuf::from("ui"));
    let runtime_index = runtime_ui.join("index.html");
    if runtime_ui.is_dir() && runtime_index.is_file() {
        (runtime_ui, runtime_index)
    } else {
        (PathBuf::from(UI_DIR), PathBuf::from(UI_INDEX))
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("Shutdown signal received. Stopping server...");
}
