//! Directory-backed repository source
//!
//! Serves artifacts from a local directory tree laid out like a remote
//! repository. Used for `file://` configured sources and mirrors on
//! shared filesystems.

use crate::descriptor::Descriptor;
use crate::error::FetchError;
use crate::repository::Repository;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

/// A repository rooted at a local directory
pub struct DirRepository {
    name: String,
    root: PathBuf,
}

impl DirRepository {
    pub fn new(name: impl Into<String>, root: PathBuf) -> Self {
        Self {
            name: name.into(),
            root,
        }
    }
}

#[async_trait]
impl Repository for DirRepository {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, descriptor: &Descriptor) -> Result<Vec<u8>, FetchError> {
        let path = self.root.join(descriptor.repository_path());
        debug!("Reading {} from {}", descriptor, path.display());

        if !path.exists() {
            return Err(FetchError::NotFound {
                path: path.display().to_string(),
            });
        }

        tokio::fs::read(&path).await.map_err(|e| FetchError::Io {
            path: path.display().to_string(),
            source: e,
        })
    }
}
