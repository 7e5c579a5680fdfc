//! Isolated loading of resolved artifacts
//!
//! An [`IsolationContext`] is a sandboxed loading scope bound to one
//! immutable set of artifact paths. Symbol lookups through a context
//! resolve only against that context's own units — never against the
//! host's namespace or any other context. The opening mechanism is a
//! trait seam so hosts can back it with something other than bundles.

mod bundle_unit;
mod context;

pub use bundle_unit::{BundleOpener, BundleUnit};
pub use context::IsolationContext;

use crate::error::DepotResult;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// One artifact opened into a context: an indexed, releasable unit
pub trait LoadedArtifact: Send + Sync {
    /// The file this unit was opened from
    fn origin(&self) -> &Path;

    /// All symbol names this unit provides, in container order
    fn symbols(&self) -> Vec<String>;

    /// Read one symbol's bytes, `None` if this unit does not provide it
    fn read(&self, symbol: &str) -> Option<Vec<u8>>;

    /// Release owned resources. Idempotent.
    fn release(&self) -> DepotResult<()>;
}

/// Opens an artifact file as a loadable unit
pub trait ArtifactOpener: Send + Sync {
    fn open(&self, path: &Path) -> DepotResult<Box<dyn LoadedArtifact>>;
}

/// Creates isolation contexts from sets of artifact paths
#[derive(Clone)]
pub struct IsolationLoader {
    opener: Arc<dyn ArtifactOpener>,
}

impl IsolationLoader {
    pub fn new(opener: Arc<dyn ArtifactOpener>) -> Self {
        Self { opener }
    }

    /// Default loader backed by the bundle container format
    pub fn bundles() -> Self {
        Self::new(Arc::new(BundleOpener))
    }

    /// Open every path in the set as a unit scoped to a new context.
    ///
    /// Set order (lexicographic) decides lookup precedence: the first
    /// unit providing a symbol wins. If any open fails, units opened so
    /// far are released best-effort and the error is returned.
    pub fn open(&self, paths: &BTreeSet<PathBuf>) -> DepotResult<IsolationContext> {
        let mut units: Vec<Box<dyn LoadedArtifact>> = Vec::with_capacity(paths.len());

        for path in paths {
            match self.opener.open(path) {
                Ok(unit) => units.push(unit),
                Err(e) => {
                    for unit in &units {
                        if let Err(release_err) = unit.release() {
                            warn!(
                                "Failed to release {} after open failure: {}",
                                unit.origin().display(),
                                release_err,
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }

        Ok(IsolationContext::new(paths.clone(), units))
    }
}
