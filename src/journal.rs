//! Provisioning journal
//!
//! Writes JSON lines to `journal.log` beside the cached artifacts.
//! On by default and opt-out via config; recording must never block or
//! break provisioning, so IO failures are logged and swallowed.

use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// File-based journal that appends JSON lines
pub struct Journal {
    enabled: bool,
    path: PathBuf,
}

impl Journal {
    /// Create a journal writing beside the given cache directory
    pub fn new(cache_dir: &Path, enabled: bool) -> Self {
        Self {
            enabled,
            path: cache_dir.join("journal.log"),
        }
    }

    /// Create a disabled journal that records nothing
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            path: PathBuf::new(),
        }
    }

    /// Record an event as a JSON line
    pub async fn record(&self, event: &str, data: serde_json::Value) {
        if !self.enabled {
            return;
        }

        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": event,
            "data": data,
        });

        let mut line = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize journal event: {}", e);
                return;
            }
        };
        line.push('\n');

        if let Err(e) = self.append(&line).await {
            warn!("Failed to write journal: {}", e);
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
