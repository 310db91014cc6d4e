use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::session::UploadSession;

/// Options for the bundled curl transport (optional section in config.toml).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurlConfig {
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Abort when throughput stays below this many bytes/sec for `low_speed_time_secs`.
    pub low_speed_limit: u32,
    pub low_speed_time_secs: u64,
    /// Hard wall-clock limit for one request.
    pub timeout_secs: u64,
}

impl Default for CurlConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            low_speed_limit: 1024,
            low_speed_time_secs: 60,
            timeout_secs: 3600,
        }
    }
}

/// Global configuration loaded from `~/.config/chunkup/config.toml`.
///
/// Immutable for the lifetime of a scheduler: the scheduler takes its own
/// copy when it is spawned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Endpoint for chunk existence tests (GET) and chunk uploads (POST).
    pub target: String,
    /// Endpoint for the final merge request.
    pub merge_target: String,
    /// Endpoint for the whole-file precheck.
    pub precheck_target: String,
    /// Chunk size in bytes.
    pub chunk_size: u64,
    /// Maximum number of outstanding requests across all sessions.
    pub concurrency: usize,
    /// Resends allowed per request after a transport error or unclassified status.
    pub retry_count: u32,
    /// Minimum spacing between progress recomputations for one session.
    pub progress_callbacks_interval_ms: u64,
    /// Extra headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub success_codes: Vec<u16>,
    pub skip_codes: Vec<u16>,
    pub fail_codes: Vec<u16>,
    /// File name suffixes admitted by the uploader (empty = everything).
    #[serde(default)]
    pub accept: Vec<String>,
    #[serde(default)]
    pub curl: Option<CurlConfig>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            target: "http://localhost:9000/upload".to_string(),
            merge_target: "http://localhost:9000/merge".to_string(),
            precheck_target: "http://localhost:9000/precheck".to_string(),
            chunk_size: 2 * 1024 * 1024,
            concurrency: 3,
            retry_count: 3,
            progress_callbacks_interval_ms: 200,
            headers: BTreeMap::new(),
            success_codes: vec![200, 201, 202],
            skip_codes: vec![204, 205, 206],
            fail_codes: vec![400, 404, 415, 500, 501],
            accept: Vec::new(),
            curl: None,
        }
    }
}

/// Invalid configuration values.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("chunk_size must be greater than zero")]
    ZeroChunkSize,
    #[error("status code {code} appears in both {first} and {second}")]
    OverlappingCodes {
        code: u16,
        first: &'static str,
        second: &'static str,
    },
}

impl UploadConfig {
    /// Check the invariants the scheduler relies on: a non-zero chunk size and
    /// three disjoint status code sets.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        let sets: [(&'static str, &[u16]); 3] = [
            ("success_codes", &self.success_codes),
            ("skip_codes", &self.skip_codes),
            ("fail_codes", &self.fail_codes),
        ];
        for (i, (first, a)) in sets.iter().enumerate() {
            for (second, b) in &sets[i + 1..] {
                if let Some(code) = a.iter().find(|c| b.contains(c)) {
                    return Err(ConfigError::OverlappingCodes {
                        code: *code,
                        first,
                        second,
                    });
                }
            }
        }
        Ok(())
    }

    /// Concurrency limit actually used by the scheduler (at least 1).
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }

    pub fn curl_or_default(&self) -> CurlConfig {
        self.curl.unwrap_or_default()
    }

    /// True if `filename` passes the `accept` suffix filter.
    pub fn accepts(&self, filename: &str) -> bool {
        if self.accept.is_empty() {
            return true;
        }
        let lower = filename.to_ascii_lowercase();
        self.accept
            .iter()
            .any(|suffix| lower.ends_with(&suffix.to_ascii_lowercase()))
    }
}

/// Caller-supplied extra-field injector: `(session) -> mapping`.
///
/// Returned entries are merged over the base request fields; on a key
/// collision the injected value wins.
pub type FieldInjector = Arc<dyn Fn(&UploadSession) -> Map<String, Value> + Send + Sync>;

/// The three optional injectors: `data` for chunk test/upload requests,
/// `merge_data` for the merge body and `precheck_data` for the precheck body.
#[derive(Clone, Default)]
pub struct FieldInjectors {
    pub data: Option<FieldInjector>,
    pub merge_data: Option<FieldInjector>,
    pub precheck_data: Option<FieldInjector>,
}

impl fmt::Debug for FieldInjectors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldInjectors")
            .field("data", &self.data.is_some())
            .field("merge_data", &self.merge_data.is_some())
            .field("precheck_data", &self.precheck_data.is_some())
            .finish()
    }
}

/// Everything a scheduler needs to build and classify requests.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub config: UploadConfig,
    pub injectors: FieldInjectors,
}

impl RequestOptions {
    pub fn new(config: UploadConfig) -> Self {
        Self {
            config,
            injectors: FieldInjectors::default(),
        }
    }

    pub fn with_injectors(mut self, injectors: FieldInjectors) -> Self {
        self.injectors = injectors;
        self
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("chunkup")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<UploadConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = UploadConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from(&path)
}

/// Load and validate configuration from an explicit path.
pub fn load_from(path: &Path) -> Result<UploadConfig> {
    let data = fs::read_to_string(path)?;
    let cfg: UploadConfig = toml::from_str(&data)?;
    cfg.validate()?;
    Ok(cfg)
}
