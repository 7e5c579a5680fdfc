//! Isolation context lifecycle
//!
//! State machine: absent → active → closed (terminal). A closed context
//! is never reused; requesting the same set again creates a fresh one.

use crate::error::{CloseFailure, DepotError, DepotResult};
use crate::isolate::LoadedArtifact;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// A sandboxed loading scope bound to one immutable set of artifacts
pub struct IsolationContext {
    id: Uuid,
    paths: BTreeSet<PathBuf>,
    units: Vec<Box<dyn LoadedArtifact>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for IsolationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolationContext")
            .field("id", &self.id)
            .field("paths", &self.paths)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl IsolationContext {
    pub(crate) fn new(paths: BTreeSet<PathBuf>, units: Vec<Box<dyn LoadedArtifact>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            paths,
            units,
            closed: AtomicBool::new(false),
        }
    }

    /// Identity of this context in logs and errors
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The artifact set this context owns
    pub fn paths(&self) -> &BTreeSet<PathBuf> {
        &self.paths
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Read a symbol through this context only.
    ///
    /// Lookup never consults the host namespace or any other context;
    /// the first unit (in set order) providing the symbol wins.
    pub fn read(&self, symbol: &str) -> DepotResult<Vec<u8>> {
        if self.is_closed() {
            return Err(DepotError::ContextClosed { id: self.id });
        }

        self.units
            .iter()
            .find_map(|unit| unit.read(symbol))
            .ok_or_else(|| DepotError::SymbolMissing {
                id: self.id,
                symbol: symbol.to_string(),
            })
    }

    /// Whether any unit in this context provides the symbol
    pub fn contains(&self, symbol: &str) -> bool {
        !self.is_closed() && self.units.iter().any(|unit| unit.read(symbol).is_some())
    }

    /// All symbols visible through this context, first provider wins
    pub fn symbols(&self) -> Vec<String> {
        let mut seen = std::collections::BTreeSet::new();
        let mut out = Vec::new();
        for unit in &self.units {
            for symbol in unit.symbols() {
                if seen.insert(symbol.clone()) {
                    out.push(symbol);
                }
            }
        }
        out
    }

    /// Release every owned unit. Idempotent; the closed state is
    /// reached regardless of release errors. A failing unit does not
    /// prevent releasing the others — all failures are aggregated and
    /// returned, never thrown mid-loop.
    pub fn close(&self) -> Result<(), CloseFailure> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut causes = Vec::new();
        for unit in &self.units {
            if let Err(e) = unit.release() {
                causes.push(format!("{}: {}", unit.origin().display(), e));
            }
        }

        match CloseFailure::from_causes(causes) {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }
}
