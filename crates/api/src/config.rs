use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use vqa_mirror::MirrorConfig;

/// Credentials for the Google Sheets backend.
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub access_token: String,
    /// API root (default: `https://sheets.googleapis.com`).
    pub api_base: String,
}

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `5000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `60`). Raised to the save
    /// deadline when that is longer, see [`ServerConfig::request_timeout`].
    pub request_timeout_secs: u64,
    /// Largest accepted request body (default: 1 MiB).
    pub max_body_bytes: usize,
    /// How long background jobs get to stop after the server drains (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Base output path; partitions live next to it as `{stem}_exo.json` / `{stem}_ego.json`.
    pub output_json_path: PathBuf,
    /// Image index file. `None` means an empty catalog.
    pub catalog_path: Option<PathBuf>,
    /// Worker assignment book (default: `worker_assignments.json`).
    pub assignments_path: PathBuf,
    /// Worker registry (default: `workers.json`).
    pub workers_path: PathBuf,
    /// Deadline for acquiring a partition lock on save. `None` waits forever.
    pub save_lock_timeout_secs: Option<u64>,
    /// Dedup sweep period in seconds. `0` disables the background sweep.
    pub sweep_interval_secs: u64,
    /// Remote sheets. `None` uses the in-process backend.
    pub sheets: Option<SheetsConfig>,
    /// Mirror cache TTL in seconds (default: `30`).
    pub mirror_cache_ttl_secs: u64,
    /// Deadline for one remote sheet call in seconds (default: `15`).
    pub mirror_request_timeout_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                    |
    /// |-------------------------------|----------------------------|
    /// | `HOST`                        | `0.0.0.0`                  |
    /// | `PORT`                        | `5000`                     |
    /// | `CORS_ORIGINS`                | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`        | `60`                       |
    /// | `MAX_BODY_BYTES`              | `1048576`                  |
    /// | `SHUTDOWN_TIMEOUT_SECS`       | `30`                       |
    /// | `OUTPUT_JSON_PATH`            | `annotations.json`         |
    /// | `CATALOG_PATH`                | unset                      |
    /// | `ASSIGNMENTS_PATH`            | `worker_assignments.json`  |
    /// | `WORKERS_PATH`                | `workers.json`             |
    /// | `SAVE_LOCK_TIMEOUT_SECS`      | unset                      |
    /// | `SWEEP_INTERVAL_SECS`         | `3600`                     |
    /// | `SHEETS_SPREADSHEET_ID`       | unset                      |
    /// | `SHEETS_ACCESS_TOKEN`         | required with the id       |
    /// | `SHEETS_API_BASE`             | `https://sheets.googleapis.com` |
    /// | `MIRROR_CACHE_TTL_SECS`       | `30`                       |
    /// | `MIRROR_REQUEST_TIMEOUT_SECS` | `15`                       |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = parsed_var("PORT", "5000");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let sheets = optional_var("SHEETS_SPREADSHEET_ID").map(|spreadsheet_id| SheetsConfig {
            spreadsheet_id,
            access_token: std::env::var("SHEETS_ACCESS_TOKEN")
                .expect("SHEETS_ACCESS_TOKEN must be set when SHEETS_SPREADSHEET_ID is set"),
            api_base: std::env::var("SHEETS_API_BASE")
                .unwrap_or_else(|_| vqa_mirror::google::DEFAULT_API_BASE.into()),
        });

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs: parsed_var("REQUEST_TIMEOUT_SECS", "60"),
            max_body_bytes: parsed_var("MAX_BODY_BYTES", "1048576"),
            shutdown_timeout_secs: parsed_var("SHUTDOWN_TIMEOUT_SECS", "30"),
            output_json_path: std::env::var("OUTPUT_JSON_PATH")
                .unwrap_or_else(|_| "annotations.json".into())
                .into(),
            catalog_path: optional_var("CATALOG_PATH").map(PathBuf::from),
            assignments_path: std::env::var("ASSIGNMENTS_PATH")
                .unwrap_or_else(|_| "worker_assignments.json".into())
                .into(),
            workers_path: std::env::var("WORKERS_PATH")
                .unwrap_or_else(|_| "workers.json".into())
                .into(),
            save_lock_timeout_secs: optional_var("SAVE_LOCK_TIMEOUT_SECS").map(|v| {
                v.parse()
                    .expect("SAVE_LOCK_TIMEOUT_SECS must be a valid u64")
            }),
            sweep_interval_secs: parsed_var("SWEEP_INTERVAL_SECS", "3600"),
            sheets,
            mirror_cache_ttl_secs: parsed_var("MIRROR_CACHE_TTL_SECS", "30"),
            mirror_request_timeout_secs: parsed_var("MIRROR_REQUEST_TIMEOUT_SECS", "15"),
        }
    }

    pub fn save_lock_timeout(&self) -> Option<Duration> {
        self.save_lock_timeout_secs.map(Duration::from_secs)
    }

    pub fn mirror_config(&self) -> MirrorConfig {
        MirrorConfig {
            ttl: Duration::from_secs(self.mirror_cache_ttl_secs),
            request_timeout: Duration::from_secs(self.mirror_request_timeout_secs),
            ..MirrorConfig::default()
        }
    }

    /// HTTP deadline. Never shorter than a save that waits out its lock and
    /// then every mirror retry, so such a save still gets its response.
    pub fn request_timeout(&self) -> Duration {
        let save = self.save_lock_timeout().unwrap_or_default() + self.mirror_config().write_budget();
        Duration::from_secs(self.request_timeout_secs).max(save)
    }

    /// `None` when the background sweep is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

/// Read `key`, falling back to `default`. Panics on an unparsable value.
fn parsed_var<T>(key: &str, default: &str) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(key).unwrap_or_else(|_| default.into());
    raw.parse()
        .unwrap_or_else(|e| panic!("{key} must be a valid {}: {e}", std::any::type_name::<T>()))
}

/// A set, non-blank variable.
fn optional_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            cors_origins: Vec::new(),
            request_timeout_secs: 60,
            max_body_bytes: 1024,
            shutdown_timeout_secs: 30,
            output_json_path: "out.json".into(),
            catalog_path: None,
            assignments_path: "a.json".into(),
            workers_path: "w.json".into(),
            save_lock_timeout_secs: None,
            sweep_interval_secs: 0,
            sheets: None,
            mirror_cache_ttl_secs: 30,
            mirror_request_timeout_secs: 1,
        }
    }

    #[test]
    fn request_timeout_keeps_configured_value_when_longer() {
        assert_eq!(config().request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn request_timeout_covers_lock_wait_and_mirror_retries() {
        let config = ServerConfig {
            request_timeout_secs: 5,
            save_lock_timeout_secs: Some(10),
            ..config()
        };
        let expected = Duration::from_secs(10) + config.mirror_config().write_budget();
        assert_eq!(config.request_timeout(), expected);
        assert!(expected > Duration::from_secs(5));
    }

    #[test]
    fn zero_interval_disables_sweep() {
        assert_eq!(config().sweep_interval(), None);
    }
}
