//! Error types for Depot
//!
//! All modules use `DepotResult<T>` as their return type.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for Depot operations
pub type DepotResult<T> = Result<T, DepotError>;

/// All errors that can occur in Depot
#[derive(Error, Debug)]
pub enum DepotError {
    // Descriptor errors
    #[error("Invalid checksum for {artifact}: {reason}")]
    InvalidChecksum { artifact: String, reason: String },

    // Bundle errors
    #[error("Invalid bundle entry name {name:?}: {reason}")]
    InvalidEntryName { name: String, reason: String },

    #[error("Invalid bundle: {0}")]
    Bundle(String),

    // Provisioning errors
    #[error("Unable to download {artifact}")]
    Download {
        artifact: String,
        #[source]
        source: FetchError,
    },

    #[error("Unable to relocate {artifact}")]
    Relocation {
        artifact: String,
        #[source]
        source: Box<DepotError>,
    },

    #[error("Descriptor {artifact} is not provisioned")]
    NotProvisioned { artifact: String },

    // Isolation errors
    #[error("Isolation context {id} is closed")]
    ContextClosed { id: Uuid },

    #[error("Symbol not found in context {id}: {symbol}")]
    SymbolMissing { id: Uuid, symbol: String },

    #[error("Resource release failed: {0}")]
    Release(#[from] CloseFailure),

    // Relocation profile errors
    #[error("Invalid rewrite profile: {reason}")]
    Profile { reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DepotError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a relocation error for one artifact
    pub fn relocation(artifact: impl Into<String>, source: DepotError) -> Self {
        Self::Relocation {
            artifact: artifact.into(),
            source: Box::new(source),
        }
    }

    /// Check if this error is a programming-contract violation rather
    /// than a runtime condition (never retried, surfaced synchronously)
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::NotProvisioned { .. })
    }
}

/// Failure of a single repository source for one descriptor.
///
/// A checksum mismatch is deliberately a fetch failure: the bytes the
/// source produced are unusable, so resolution falls through to the
/// next source exactly as for a transport error.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Transport error fetching {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("Artifact not present at {path}")]
    NotFound { path: String },

    #[error("Checksum mismatch for {artifact}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        artifact: String,
        expected: String,
        actual: String,
    },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Aggregate failure from releasing a set of resources.
///
/// The first cause is the surfaced one; the remainder are retained in
/// order so no failure information is lost during best-effort release.
#[derive(Debug)]
pub struct CloseFailure {
    causes: Vec<String>,
}

impl CloseFailure {
    /// Build from an ordered list of causes; `None` if the list is empty
    pub fn from_causes(causes: Vec<String>) -> Option<Self> {
        if causes.is_empty() {
            None
        } else {
            Some(Self { causes })
        }
    }

    /// The first failure encountered
    pub fn first(&self) -> &str {
        &self.causes[0]
    }

    /// Failures after the first, in encounter order
    pub fn secondary(&self) -> &[String] {
        &self.causes[1..]
    }

    /// All failures in encounter order
    pub fn causes(&self) -> &[String] {
        &self.causes
    }
}

impl fmt::Display for CloseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.first())?;
        if self.causes.len() > 1 {
            write!(f, " (+{} secondary failures)", self.causes.len() - 1)?;
        }
        Ok(())
    }
}

impl std::error::Error for CloseFailure {}
