use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const SETTINGS_FILE: &str = "marketplace-session.json";
pub const ENV_SETTINGS_PATH: &str = "MARKETPLACE_SESSION_SETTINGS";
pub const ENV_API_URL: &str = "MARKETPLACE_API_URL";

pub const KEY_API_BASE_URL: &str = "apiBaseUrl";
pub const KEY_REQUEST_TIMEOUT_SECONDS: &str = "requestTimeoutSeconds";
pub const KEY_KEYRING_SERVICE: &str = "keyringService";

const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 15;
const DEFAULT_KEYRING_SERVICE: &str = "com.marketplace.session";

fn defaults() -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(KEY_API_BASE_URL.to_string(), json!(DEFAULT_API_BASE_URL));
    map.insert(
        KEY_REQUEST_TIMEOUT_SECONDS.to_string(),
        json!(DEFAULT_REQUEST_TIMEOUT_SECONDS),
    );
    map.insert(KEY_KEYRING_SERVICE.to_string(), json!(DEFAULT_KEYRING_SERVICE));
    map
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("settings file {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("settings file {0} must contain a JSON object")]
    NotAnObject(PathBuf),
}

/// Key-value settings: a JSON object merged over built-in defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    values: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self { values: defaults() }
    }
}

impl Settings {
    /// Loads `path` (else the file named by `MARKETPLACE_SESSION_SETTINGS`,
    /// else `marketplace-session.json` in the working directory) over the
    /// defaults, then applies `MARKETPLACE_API_URL`. A missing file is not an
    /// error.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| {
                std::env::var(ENV_SETTINGS_PATH)
                    .ok()
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .map(PathBuf::from)
            })
            .unwrap_or_else(|| PathBuf::from(SETTINGS_FILE));

        let mut settings = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };

        if let Ok(url) = std::env::var(ENV_API_URL) {
            let url = url.trim();
            if !url.is_empty() {
                settings.values.insert(KEY_API_BASE_URL.to_string(), json!(url));
            }
        }
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_json::from_str(&text).map_err(|source| SettingsError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_value(value).ok_or_else(|| SettingsError::NotAnObject(path.to_path_buf()))
    }

    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(overrides) = value else {
            return None;
        };
        let mut values = defaults();
        values.extend(overrides);
        Some(Self { values })
    }

    pub fn get_u64(&self, key: &str, fallback: u64) -> u64 {
        self.values
            .get(key)
            .and_then(Value::as_u64)
            .unwrap_or(fallback)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        let s = self.values.get(key)?.as_str()?.trim();
        if s.is_empty() {
            None
        } else {
            Some(s.to_string())
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn api_base_url(&self) -> String {
        self.get_string(KEY_API_BASE_URL)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn request_timeout(&self) -> Duration {
        let seconds = self.get_u64(KEY_REQUEST_TIMEOUT_SECONDS, DEFAULT_REQUEST_TIMEOUT_SECONDS);
        Duration::from_secs(seconds.max(1))
    }

    pub fn keyring_service(&self) -> String {
        self.get_string(KEY_KEYRING_SERVICE)
            .unwrap_or_else(|| DEFAULT_KEYRING_SERVICE.to_string())
    }
}
