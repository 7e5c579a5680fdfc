//! Bundle-backed loadable units
//!
//! The default [`ArtifactOpener`]: opens a bundle file, indexes its
//! entries in memory, and keeps the file handle for the unit's lifetime
//! so the inode stays pinned against cache pruning until release.

use crate::bundle;
use crate::error::{DepotError, DepotResult};
use crate::isolate::{ArtifactOpener, LoadedArtifact};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Opens bundle files as loadable units
pub struct BundleOpener;

impl ArtifactOpener for BundleOpener {
    fn open(&self, path: &Path) -> DepotResult<Box<dyn LoadedArtifact>> {
        Ok(Box::new(BundleUnit::open(path)?))
    }
}

/// One opened bundle: an in-memory symbol index plus the pinned handle
#[derive(Debug)]
pub struct BundleUnit {
    origin: PathBuf,
    index: HashMap<String, Vec<u8>>,
    order: Vec<String>,
    handle: Mutex<Option<File>>,
}

impl BundleUnit {
    pub fn open(path: &Path) -> DepotResult<Self> {
        let mut file = File::open(path)
            .map_err(|e| DepotError::io(format!("opening bundle {}", path.display()), e))?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| DepotError::io(format!("reading bundle {}", path.display()), e))?;

        let mut index = HashMap::new();
        let mut order = Vec::new();
        for (name, bytes) in bundle::entries(&data)? {
            // first entry wins on duplicate names within one bundle
            if !index.contains_key(&name) {
                order.push(name.clone());
                index.insert(name, bytes);
            }
        }

        debug!("Opened {} ({} symbols)", path.display(), order.len());

        Ok(Self {
            origin: path.to_path_buf(),
            index,
            order,
            handle: Mutex::new(Some(file)),
        })
    }
}

impl LoadedArtifact for BundleUnit {
    fn origin(&self) -> &Path {
        &self.origin
    }

    fn symbols(&self) -> Vec<String> {
        self.order.clone()
    }

    fn read(&self, symbol: &str) -> Option<Vec<u8>> {
        self.index.get(symbol).cloned()
    }

    fn release(&self) -> DepotResult<()> {
        let mut handle = self
            .handle
            .lock()
            .map_err(|_| DepotError::Internal("bundle handle lock poisoned".to_string()))?;
        // dropping the File closes the OS handle; releasing twice is a no-op
        handle.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::BundleBuilder;
    use tempfile::TempDir;

    fn write_bundle(dir: &Path, entries: &[(&str, &[u8])]) -> PathBuf {
        let mut builder = BundleBuilder::new();
        for &(name, bytes) in entries {
            builder.add(name, bytes).unwrap();
        }
        let path = dir.join("unit-1.0.tgz");
        std::fs::write(&path, builder.finish().unwrap()).unwrap();
        path
    }

    #[test]
    fn indexes_symbols_in_order() {
        let dir = TempDir::new().unwrap();
        let path = write_bundle(
            dir.path(),
            &[("org/b/Second", b"2"), ("org/a/First", b"1")],
        );

        let unit = BundleUnit::open(&path).unwrap();
        assert_eq!(unit.symbols(), vec!["org/b/Second", "org/a/First"]);
        assert_eq!(unit.read("org/a/First").unwrap(), b"1");
        assert!(unit.read("org/missing").is_none());
    }

    #[test]
    fn release_twice_is_ok() {
        let dir = TempDir::new().unwrap();
        let path = write_bundle(dir.path(), &[("a/One", b"1")]);

        let unit = BundleUnit::open(&path).unwrap();
        unit.release().unwrap();
        unit.release().unwrap();
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = BundleUnit::open(&dir.path().join("absent.tgz")).unwrap_err();
        assert!(matches!(err, DepotError::Io { .. }));
    }
}
