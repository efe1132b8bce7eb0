//! Sync Configuration
//!
//! JSON settings file with every field defaulted, plus a few environment
//! overrides for deployment secrets.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{SyncError, SyncResult};
use crate::models::{BoardId, UserId};

pub const ENV_API_URL: &str = "KANBAN_SYNC_API_URL";
pub const ENV_TOKEN: &str = "KANBAN_SYNC_TOKEN";
pub const ENV_VIEWER_ID: &str = "KANBAN_SYNC_VIEWER_ID";

const MIN_AUTOSAVE_MS: u64 = 500;
const MAX_AUTOSAVE_MS: u64 = 2000;
const MAX_READ_RETRIES: u32 = 10;

/// How other viewers' changes reach an open board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeedMode {
    #[default]
    Push,
    Poll,
    PushAndPoll,
    /// Frames are delivered by the embedding application
    External,
}

impl FeedMode {
    pub fn uses_push(self) -> bool {
        matches!(self, FeedMode::Push | FeedMode::PushAndPoll)
    }

    pub fn uses_poll(self) -> bool {
        matches!(self, FeedMode::Poll | FeedMode::PushAndPoll)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// REST base, e.g. `http://localhost:8080/api`
    pub api_url: String,
    /// Push channel base; derived from `api_url` when absent
    pub ws_url: Option<String>,
    pub token: Option<String>,
    pub viewer_id: UserId,
    pub feed_mode: FeedMode,
    pub poll_interval_secs: u64,
    pub autosave_delay_ms: u64,
    pub read_retries: u32,
    pub retry_base_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub drag_threshold_px: f64,
    pub solved_column_title: String,
    pub unsolved_column_title: String,
    pub log_dir: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080/api".to_string(),
            ws_url: None,
            token: None,
            viewer_id: String::new(),
            feed_mode: FeedMode::default(),
            poll_interval_secs: 15,
            autosave_delay_ms: 1000,
            read_retries: 3,
            retry_base_delay_ms: 250,
            request_timeout_secs: 30,
            drag_threshold_px: 10.0,
            solved_column_title: "Solucionado".to_string(),
            unsolved_column_title: "Não Solucionado".to_string(),
            log_dir: None,
        }
    }
}

impl SyncConfig {
    /// Read a settings file, apply environment overrides and validate
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))?;
        let mut config: SyncConfig =
            serde_json::from_str(&raw).map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `KANBAN_SYNC_*` overrides from a variable lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL) {
            self.api_url = url;
        }
        if let Some(token) = lookup(ENV_TOKEN) {
            self.token = Some(token).filter(|t| !t.is_empty());
        }
        if let Some(viewer) = lookup(ENV_VIEWER_ID) {
            self.viewer_id = viewer;
        }
    }

    pub fn validate(&self) -> SyncResult<()> {
        let api = self.api_base()?;
        if !matches!(api.scheme(), "http" | "https") {
            return Err(SyncError::Config(format!("api_url must be http(s): {}", self.api_url)));
        }
        if self.viewer_id.trim().is_empty() {
            return Err(SyncError::Config("viewer_id is required".into()));
        }
        if self.feed_mode.uses_poll() && self.poll_interval_secs == 0 {
            return Err(SyncError::Config("poll_interval_secs must be positive".into()));
        }
        if self.read_retries > MAX_READ_RETRIES {
            return Err(SyncError::Config(format!("read_retries must be at most {}", MAX_READ_RETRIES)));
        }
        if let Some(ws) = &self.ws_url {
            Url::parse(ws).map_err(|e| SyncError::Config(format!("ws_url: {}", e)))?;
        }
        Ok(())
    }

    pub fn api_base(&self) -> SyncResult<Url> {
        Url::parse(&self.api_url).map_err(|e| SyncError::Config(format!("api_url: {}", e)))
    }

    /// Push channel address of one board
    pub fn board_socket_url(&self, board_id: BoardId) -> SyncResult<Url> {
        let base = match &self.ws_url {
            Some(ws) => ws.trim_end_matches('/').to_string(),
            None => {
                let api = self.api_base()?;
                let scheme = if api.scheme() == "https" { "wss" } else { "ws" };
                let host = api
                    .host_str()
                    .ok_or_else(|| SyncError::Config(format!("api_url has no host: {}", self.api_url)))?;
                match api.port() {
                    Some(port) => format!("{}://{}:{}", scheme, host, port),
                    None => format!("{}://{}", scheme, host),
                }
            }
        };
        let url = format!("{}/ws/board/{}", base, board_id);
        Url::parse(&url).map_err(|e| SyncError::Config(format!("{}: {}", url, e)))
    }

    /// Debounce window of the editing session, clamped to 0.5..=2 s
    pub fn autosave_delay(&self) -> Duration {
        Duration::from_millis(self.autosave_delay_ms.clamp(MIN_AUTOSAVE_MS, MAX_AUTOSAVE_MS))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn is_status_column(&self, title: &str) -> bool {
        let title = title.trim().to_lowercase();
        title == self.solved_column_title.to_lowercase() || title == self.unsolved_column_title.to_lowercase()
    }
}
