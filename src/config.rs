use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanDefaultsConfig {
    pub follow_symlinks: bool,
    pub include_hidden: bool,
    pub excludes: Vec<String>,
    pub max_depth: Option<u32>,
}

/// How the external scanner is invoked.
#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    /// Explicit scanner executable. `None` falls back to the platform default.
    pub binary: Option<String>,
    /// Arguments placed before the file path.
    pub args: Vec<String>,
    /// Upper bound for a single scanner invocation.
    pub timeout_secs: u64,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SecurityConfig {
    pub enable_hsts: Option<bool>,
    pub hsts_max_age: Option<u64>,
    pub hsts_include_subdomains: Option<bool>,
    pub csp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub scanner: ScannerConfig,
    pub scan_defaults: ScanDefaultsConfig,
    pub security: Option<SecurityConfig>,
}

const DEFAULTS: &str = include_str!("../config/default.toml");

impl Default for AppConfig {
    fn default() -> Self {
        // Fallback: parse the embedded default TOML
        match ::config::Config::builder()
            .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
            .build()
            .and_then(|cfg| cfg.try_deserialize())
        {
            Ok(app_cfg) => app_cfg,
            Err(e) => {
                eprintln!("FATAL: Failed to load embedded default config: {}", e);
                panic!("Failed to load embedded default config: {}", e);
            }
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        // Mirror defaults from config/default.toml
        Self {
            binary: None,
            args: vec!["--no-summary".to_string()],
            timeout_secs: 300,
            batch_size: 200,
            flush_interval_ms: 750,
        }
    }
}

pub fn load() -> anyhow::Result<AppConfig> {
    // Load .env first (optional)
    let _ = dotenvy::dotenv();

    let mut builder = ::config::Config::builder()
        .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
        // Optional local file: virenwald.toml (in CWD)
        .add_source(::config::File::with_name("virenwald").required(false));

    if let Ok(custom_path) = std::env::var("VIRENWALD_CONFIG") {
        builder = builder.add_source(::config::File::with_name(&custom_path).required(false));
    }
    // Environment variables last to have highest precedence
    builder = builder.add_source(
        ::config::Environment::with_prefix("VIRENWALD")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("scanner.args")
            .with_list_parse_key("scan_defaults.excludes")
            .try_parsing(true),
    );

    let cfg = builder.build()?;
    let app_cfg: AppConfig = cfg.try_deserialize()?;
    validate(&app_cfg)?;
    Ok(app_cfg)
}

pub fn validate(cfg: &AppConfig) -> anyhow::Result<()> {
    // Server
    if cfg.server.port == 0 {
        return Err(anyhow::anyhow!("invalid server.port: {}", cfg.server.port));
    }
    // Warn for privileged ports on Unix-like systems
    #[cfg(unix)]
    if cfg.server.port < 1024 {
        tracing::warn!("Using privileged port {} - may require elevated permissions", cfg.server.port);
    }

    // Scanner
    if let Some(bin) = cfg.scanner.binary.as_deref() {
        if bin.trim().is_empty() {
            return Err(anyhow::anyhow!("scanner.binary must not be empty when set"));
        }
    }
    if cfg.scanner.args.iter().any(|a| a.trim().is_empty()) {
        return Err(anyhow::anyhow!("scanner.args must not contain empty entries"));
    }
    if cfg.scanner.timeout_secs == 0 {
        return Err(anyhow::anyhow!("scanner.timeout_secs must be > 0"));
    }
    if cfg.scanner.batch_size == 0 {
        return Err(anyhow::anyhow!("scanner.batch_size must be > 0"));
    }
    if cfg.scanner.flush_interval_ms == 0 {
        return Err(anyhow::anyhow!("scanner.flush_interval_ms must be > 0"));
    }

    // Scan defaults
    for pat in &cfg.scan_defaults.excludes {
        globset::Glob::new(&pat.trim().replace('\\', "/"))
            .map_err(|e| anyhow::anyhow!("invalid scan_defaults.excludes pattern {:?}: {}", pat, e))?;
    }

    Ok(())
}

pub fn ensure_sqlite_parent_dir(url: &str) -> anyhow::Result<()> {
    if let Some(path) = url.strip_prefix("sqlite://") {
        // On Windows, handle URLs like sqlite:///C:/... by stripping the leading '/'
        #[cfg(windows)]
        let path = {
            let bytes = path.as_bytes();
            if bytes.len() >= 3 && bytes[0] == b'/' && bytes[2] == b':' && bytes[1].is_ascii_alphabetic() {
                &path[1..]
            } else {
                path
            }
        };
        let p = Path::new(path);
        if let Some(parent) = p.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    Ok(())
}
