//! Content-addressed artifact cache
//!
//! One flat directory of bundle files named by descriptor identity and
//! transform variant. Presence on disk is authoritative: a present file
//! is never re-downloaded or re-verified (trust-on-first-write); bytes
//! are only checksummed at initial write time.

use crate::descriptor::Descriptor;
use crate::error::{DepotError, DepotResult, FetchError};
use crate::repository::Repository;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Local artifact cache backed by an ordered list of remote sources
pub struct CacheStore {
    dir: PathBuf,
    repositories: Vec<Arc<dyn Repository>>,
}

impl CacheStore {
    /// Create a cache store, creating the directory if needed
    pub fn new(dir: PathBuf, repositories: Vec<Arc<dyn Repository>>) -> DepotResult<Self> {
        std::fs::create_dir_all(&dir)
            .map_err(|e| DepotError::io(format!("creating cache directory {}", dir.display()), e))?;

        Ok(Self { dir, repositories })
    }

    /// The cache directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic cache path for a descriptor and variant
    pub fn path_for(&self, descriptor: &Descriptor, variant: Option<&str>) -> PathBuf {
        self.dir.join(descriptor.cache_file_name(variant))
    }

    /// Resolve a descriptor to a local file.
    ///
    /// An existing cache file is returned immediately with no network
    /// work. Otherwise each repository is tried in order; the first one
    /// whose bytes match the declared checksum wins. When every source
    /// fails, the error carries only the last underlying cause — the
    /// earlier ones appear in the logs but are not retained.
    pub async fn resolve(&self, descriptor: &Descriptor) -> DepotResult<PathBuf> {
        let path = self.path_for(descriptor, None);
        if path.exists() {
            debug!("Cache hit for {}", descriptor);
            return Ok(path);
        }

        let mut last_error: Option<FetchError> = None;

        for repository in &self.repositories {
            match repository.fetch(descriptor).await {
                Ok(bytes) => {
                    if !descriptor.checksum().matches(&bytes) {
                        let actual = crate::descriptor::Checksum::of(&bytes);
                        warn!(
                            "Checksum mismatch for {} from {}: expected {}, got {}",
                            descriptor,
                            repository.name(),
                            descriptor.checksum(),
                            actual,
                        );
                        last_error = Some(FetchError::ChecksumMismatch {
                            artifact: descriptor.artifact().to_string(),
                            expected: descriptor.checksum().to_string(),
                            actual: actual.to_string(),
                        });
                        continue;
                    }

                    self.persist(&path, &bytes).await?;
                    debug!(
                        "Resolved {} from {} ({} bytes, sha256 {})",
                        descriptor,
                        repository.name(),
                        bytes.len(),
                        descriptor.checksum().short_hex(),
                    );
                    return Ok(path);
                }
                Err(e) => {
                    warn!(
                        "Failed to fetch {} from {}: {}",
                        descriptor,
                        repository.name(),
                        e,
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(DepotError::Download {
            artifact: descriptor.artifact().to_string(),
            source: last_error.unwrap_or_else(|| FetchError::Transport {
                url: descriptor.repository_path(),
                reason: "no repositories configured".to_string(),
            }),
        })
    }

    /// Atomically persist bytes at a cache path (temp file + rename),
    /// so a crashed or failed write never leaves a half-written file
    /// that trust-on-first-write would later treat as valid.
    pub(crate) async fn persist(&self, path: &Path, bytes: &[u8]) -> DepotResult<()> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = self.dir.join(format!(".{}.{}.part", file_name, Uuid::new_v4()));

        tokio::fs::write(&temp, bytes)
            .await
            .map_err(|e| DepotError::io(format!("writing {}", temp.display()), e))?;

        if let Err(e) = tokio::fs::rename(&temp, path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(DepotError::io(
                format!("renaming {} to {}", temp.display(), path.display()),
                e,
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Checksum;
    use crate::repository::DirRepository;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FailingRepository;

    #[async_trait]
    impl Repository for FailingRepository {
        fn name(&self) -> &str {
            "failing"
        }

        async fn fetch(&self, descriptor: &Descriptor) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::Status {
                url: format!("https://failing.example/{}", descriptor.repository_path()),
                status: 503,
            })
        }
    }

    struct CountingRepository {
        inner: DirRepository,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl Repository for CountingRepository {
        fn name(&self) -> &str {
            "counting"
        }

        async fn fetch(&self, descriptor: &Descriptor) -> Result<Vec<u8>, FetchError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch(descriptor).await
        }
    }

    fn descriptor(payload: &[u8]) -> Descriptor {
        Descriptor::new("org.example", "lib", "1.0", &Checksum::of(payload).to_string()).unwrap()
    }

    async fn seed_repo(root: &Path, d: &Descriptor, payload: &[u8]) {
        let path = root.join(d.repository_path());
        tokio::fs::create_dir_all(path.parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(&path, payload).await.unwrap();
    }

    #[tokio::test]
    async fn resolves_and_caches() {
        let repo_dir = TempDir::new().unwrap();
        let cache_dir = TempDir::new().unwrap();
        let d = descriptor(b"payload");
        seed_repo(repo_dir.path(), &d, b"payload").await;

        let counting = Arc::new(CountingRepository {
            inner: DirRepository::new("local", repo_dir.path().to_path_buf()),
            fetches: AtomicUsize::new(0),
        });
        let cache = CacheStore::new(
            cache_dir.path().join("libs"),
            vec![counting.clone() as Arc<dyn Repository>],
        )
        .unwrap();

        let path = cache.resolve(&d).await.unwrap();
        assert_eq!(path.file_name().unwrap(), "lib-1.0.tgz");
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"payload");
        assert_eq!(counting.fetches.load(Ordering::SeqCst), 1);

        // second resolve is a pure disk hit
        let again = cache.resolve(&d).await.unwrap();
        assert_eq!(again, path);
        assert_eq!(counting.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn falls_back_to_next_source() {
        let repo_dir = TempDir::new().unwrap();
        let cache_dir = TempDir::new().unwrap();
        let d = descriptor(b"payload");
        seed_repo(repo_dir.path(), &d, b"payload").await;

        let cache = CacheStore::new(
            cache_dir.path().join("libs"),
            vec![
                Arc::new(FailingRepository),
                Arc::new(DirRepository::new("local", repo_dir.path().to_path_buf())),
            ],
        )
        .unwrap();

        let path = cache.resolve(&d).await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn all_sources_failing_carries_last_error() {
        let cache_dir = TempDir::new().unwrap();
        let d = descriptor(b"payload");

        let cache = CacheStore::new(
            cache_dir.path().join("libs"),
            vec![Arc::new(FailingRepository), Arc::new(FailingRepository)],
        )
        .unwrap();

        let err = cache.resolve(&d).await.unwrap_err();
        match err {
            DepotError::Download { artifact, source } => {
                assert_eq!(artifact, "lib");
                assert!(matches!(source, FetchError::Status { status: 503, .. }));
            }
            other => panic!("expected Download, got {other}"),
        }
    }

    #[tokio::test]
    async fn checksum_mismatch_leaves_no_file_and_falls_back() {
        let bad_repo = TempDir::new().unwrap();
        let good_repo = TempDir::new().unwrap();
        let cache_dir = TempDir::new().unwrap();
        let d = descriptor(b"payload");

        seed_repo(bad_repo.path(), &d, b"tampered bytes").await;
        seed_repo(good_repo.path(), &d, b"payload").await;

        let cache = CacheStore::new(
            cache_dir.path().join("libs"),
            vec![
                Arc::new(DirRepository::new("bad", bad_repo.path().to_path_buf())),
                Arc::new(DirRepository::new("good", good_repo.path().to_path_buf())),
            ],
        )
        .unwrap();

        let path = cache.resolve(&d).await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"payload");

        // no partial or mismatched files left behind
        let mut entries = tokio::fs::read_dir(cache.dir()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["lib-1.0.tgz".to_string()]);
    }

    #[tokio::test]
    async fn checksum_mismatch_everywhere_is_download_failure() {
        let bad_repo = TempDir::new().unwrap();
        let cache_dir = TempDir::new().unwrap();
        let d = descriptor(b"payload");
        seed_repo(bad_repo.path(), &d, b"tampered bytes").await;

        let cache = CacheStore::new(
            cache_dir.path().join("libs"),
            vec![Arc::new(DirRepository::new("bad", bad_repo.path().to_path_buf()))],
        )
        .unwrap();

        let err = cache.resolve(&d).await.unwrap_err();
        match err {
            DepotError::Download { source, .. } => {
                assert!(matches!(source, FetchError::ChecksumMismatch { .. }));
            }
            other => panic!("expected Download, got {other}"),
        }
        assert!(!cache.path_for(&d, None).exists());
    }

    #[tokio::test]
    async fn existing_file_is_trusted_without_validation() {
        let cache_dir = TempDir::new().unwrap();
        let d = descriptor(b"payload");

        let cache = CacheStore::new(cache_dir.path().join("libs"), vec![]).unwrap();

        // pre-seed a file whose content does not match the checksum;
        // trust-on-first-write means it is still returned as-is
        tokio::fs::write(cache.path_for(&d, None), b"whatever")
            .await
            .unwrap();

        let path = cache.resolve(&d).await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"whatever");
    }
}
