#[cfg(test)]
mod tests {
    use crate::config::{self, AppConfig, ScannerConfig};
    use std::env;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.url, "sqlite://data/virenwald.db");
        assert!(config.scanner.binary.is_none());
        assert_eq!(config.scanner.args, vec!["--no-summary".to_string()]);
        assert_eq!(config.scanner.timeout_secs, 300);
        assert!(!config.scan_defaults.follow_symlinks);
        assert!(config.scan_defaults.include_hidden);
        assert!(config.scan_defaults.excludes.is_empty());
        assert!(config.scan_defaults.max_depth.is_none());
        assert!(config.security.is_none());
    }

    #[test]
    fn test_scanner_config_default_matches_embedded_toml() {
        let embedded = AppConfig::default().scanner;
        let fallback = ScannerConfig::default();
        assert_eq!(embedded.args, fallback.args);
        assert_eq!(embedded.timeout_secs, fallback.timeout_secs);
        assert_eq!(embedded.batch_size, fallback.batch_size);
        assert_eq!(embedded.flush_interval_ms, fallback.flush_interval_ms);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(config::validate(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_invalid_server_port() {
        let mut cfg = AppConfig::default();
        cfg.server.port = 0;
        let err = config::validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("invalid server.port"));
    }

    #[test]
    fn test_invalid_scanner_settings() {
        let mut cfg = AppConfig::default();
        cfg.scanner.timeout_secs = 0;
        assert!(config::validate(&cfg).unwrap_err().to_string().contains("timeout_secs"));

        let mut cfg = AppConfig::default();
        cfg.scanner.binary = Some("   ".into());
        assert!(config::validate(&cfg).is_err());

        let mut cfg = AppConfig::default();
        cfg.scanner.args = vec!["--no-summary".into(), "".into()];
        assert!(config::validate(&cfg).is_err());

        let mut cfg = AppConfig::default();
        cfg.scanner.batch_size = 0;
        assert!(config::validate(&cfg).is_err());
    }

    #[test]
    fn test_invalid_exclude_pattern() {
        let mut cfg = AppConfig::default();
        cfg.scan_defaults.excludes = vec!["**/node_modules".into(), "[broken".into()];
        let err = config::validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("scan_defaults.excludes"));
    }

    // Only test in the crate that touches VIRENWALD__* variables
    #[test]
    fn test_config_from_env() {
        env::set_var("VIRENWALD__SERVER__PORT", "3000");
        env::set_var("VIRENWALD__SCANNER__TIMEOUT_SECS", "42");
        env::set_var("VIRENWALD__SCANNER__ARGS", "--no-summary,--infected");

        let loaded = config::load();

        env::remove_var("VIRENWALD__SERVER__PORT");
        env::remove_var("VIRENWALD__SCANNER__TIMEOUT_SECS");
        env::remove_var("VIRENWALD__SCANNER__ARGS");

        let cfg = loaded.unwrap();
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.scanner.timeout_secs, 42);
        assert_eq!(cfg.scanner.args, vec!["--no-summary".to_string(), "--infected".to_string()]);
        assert_eq!(cfg.server.host, "127.0.0.1");
    }

    #[test]
    fn test_ensure_sqlite_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("deeper").join("v.db");
        let url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));
        config::ensure_sqlite_parent_dir(&url).unwrap();
        assert!(dir.path().join("nested").join("deeper").is_dir());

        // Non-file URLs are left alone
        config::ensure_sqlite_parent_dir("sqlite::memory:").unwrap();
    }
}
