//! Remote sources for bundle artifacts
//!
//! A [`Repository`] is a single location capable of producing the bytes
//! for a descriptor. Sources are tried in configured order by the cache
//! store; each failure is typed so fallback decisions stay explicit.

mod dir;
mod http;

pub use dir::DirRepository;
pub use http::HttpRepository;

use crate::config::schema::{NetworkConfig, RepositoryConfig};
use crate::descriptor::Descriptor;
use crate::error::FetchError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// A single remote source of bundle bytes
#[async_trait]
pub trait Repository: Send + Sync {
    /// Short name used in log lines
    fn name(&self) -> &str;

    /// Fetch the full artifact bytes for a descriptor
    async fn fetch(&self, descriptor: &Descriptor) -> Result<Vec<u8>, FetchError>;
}

/// Build the ordered repository list from configuration.
///
/// `file://` URLs become directory-backed sources; everything else is
/// fetched over HTTP.
pub fn from_config(
    repositories: &[RepositoryConfig],
    network: &NetworkConfig,
) -> Vec<Arc<dyn Repository>> {
    repositories
        .iter()
        .map(|repo| -> Arc<dyn Repository> {
            match repo.url.strip_prefix("file://") {
                Some(path) => Arc::new(DirRepository::new(&repo.name, PathBuf::from(path))),
                None => Arc::new(HttpRepository::new(&repo.name, &repo.url, network)),
            }
        })
        .collect()
}
