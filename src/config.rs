use anyhow::Result;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::coordinator::{DEFAULT_FRAME_TIMEOUT, DEFAULT_OPERATION_TIMEOUT};
use crate::extract::DEFAULT_CLASS_MATCH_THRESHOLD;
use crate::store::{MemoryStore, SessionStore, SqliteStore};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub frame_timeout: Duration,
    pub operation_timeout: Duration,
    /// Class-narrowed selectors are accepted at or below this many matches.
    pub class_match_threshold: usize,
    /// SQLite file; defaults to the platform data directory.
    pub db_path: Option<PathBuf>,
    pub memory_store: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: parsed("PORT").unwrap_or(defaults.port),
            host: env::var("HOST").unwrap_or(defaults.host),
            frame_timeout: parsed("FRAME_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.frame_timeout),
            operation_timeout: parsed("OPERATION_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.operation_timeout),
            class_match_threshold: parsed("CLASS_MATCH_THRESHOLD")
                .filter(|t: &usize| *t > 0)
                .unwrap_or(defaults.class_match_threshold),
            db_path: env::var("EXTRACTOR_DB_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            memory_store: env::var("EXTRACTOR_MEMORY_STORE")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }

    /// Opens the configured session store.
    pub fn open_store(&self) -> Result<Arc<dyn SessionStore>> {
        if self.memory_store {
            tracing::info!("Using in-memory session store");
            return Ok(Arc::new(MemoryStore::new()));
        }
        let store = match &self.db_path {
            Some(path) => SqliteStore::open(path)?,
            None => SqliteStore::open_default()?,
        };
        tracing::info!("Session store initialized");
        Ok(Arc::new(store))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8765,
            host: "127.0.0.1".to_string(),
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            class_match_threshold: DEFAULT_CLASS_MATCH_THRESHOLD,
            db_path: None,
            memory_store: false,
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
