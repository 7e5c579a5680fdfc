//! HTTP-backed repository source

use crate::config::schema::NetworkConfig;
use crate::descriptor::Descriptor;
use crate::error::FetchError;
use crate::repository::Repository;
use async_trait::async_trait;
use std::io::Read;
use std::time::Duration;
use tracing::debug;

/// A repository reached over HTTP.
///
/// One shared agent per repository for connection reuse; downloads run
/// on the blocking pool so they never occupy async workers.
pub struct HttpRepository {
    name: String,
    base_url: String,
    agent: ureq::Agent,
}

impl HttpRepository {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, network: &NetworkConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(network.timeout_secs))
            .user_agent(concat!("depot/", env!("CARGO_PKG_VERSION")))
            .build();

        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Self {
            name: name.into(),
            base_url,
            agent,
        }
    }

    fn download(agent: &ureq::Agent, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = agent.get(url).call().map_err(|e| match e {
            ureq::Error::Status(status, _) => FetchError::Status {
                url: url.to_string(),
                status,
            },
            other => FetchError::Transport {
                url: url.to_string(),
                reason: other.to_string(),
            },
        })?;

        // Pre-allocate from Content-Length to avoid reallocs on large bundles
        let hint = response
            .header("Content-Length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        let mut buf = Vec::with_capacity(if hint > 0 { hint } else { 64 * 1024 });

        response
            .into_reader()
            .read_to_end(&mut buf)
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(buf)
    }
}

#[async_trait]
impl Repository for HttpRepository {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, descriptor: &Descriptor) -> Result<Vec<u8>, FetchError> {
        let url = format!("{}{}", self.base_url, descriptor.repository_path());
        debug!("Fetching {} from {}", descriptor, url);

        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || Self::download(&agent, &url))
            .await
            .map_err(|e| FetchError::Transport {
                url: format!("{}{}", self.base_url, descriptor.repository_path()),
                reason: format!("download task failed: {e}"),
            })?
    }
}
