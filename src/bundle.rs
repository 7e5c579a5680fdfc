//! Bundle container format
//!
//! A bundle is a gzip-compressed tar archive whose regular-file entries
//! are symbols: the entry path is the symbol name, with `/`-separated
//! namespace segments. Reading guards against hostile archives (path
//! traversal, unsafe entry types, entry-count and size bombs); writing
//! pins every header field so identical inputs produce identical bytes.

use crate::error::{DepotError, DepotResult};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Read;
use tar::{Archive, EntryType};

/// Maximum number of entries allowed in a bundle
const MAX_ENTRY_COUNT: usize = 10_000;

/// Maximum total uncompressed size (256 MB) — gzip bomb protection
const MAX_TOTAL_SIZE: u64 = 256 * 1024 * 1024;

/// Validate a symbol / entry name.
///
/// Names are relative `/`-separated paths. Absolute paths, parent
/// traversal, backslashes, NUL bytes, and empty names or segments are
/// rejected before any entry content is touched.
pub fn validate_entry_name(name: &str) -> DepotResult<()> {
    let reject = |reason: &str| {
        Err(DepotError::InvalidEntryName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    if name.is_empty() {
        return reject("empty name");
    }
    if name.starts_with('/') {
        return reject("absolute path");
    }
    if name.contains('\\') {
        return reject("backslash separator");
    }
    if name.contains('\0') {
        return reject("NUL byte");
    }
    for segment in name.split('/') {
        if segment.is_empty() {
            return reject("empty path segment");
        }
        if segment == ".." {
            return reject("parent traversal");
        }
    }
    Ok(())
}

/// Read all (name, bytes) entries of a bundle, in archive order.
pub fn entries(data: &[u8]) -> DepotResult<Vec<(String, Vec<u8>)>> {
    let decoder = GzDecoder::new(data);
    let mut archive = Archive::new(decoder);

    let mut out = Vec::new();
    let mut total_size: u64 = 0;

    let iter = archive
        .entries()
        .map_err(|e| DepotError::Bundle(format!("failed to read archive entries: {e}")))?;

    for entry in iter {
        let mut entry =
            entry.map_err(|e| DepotError::Bundle(format!("failed to read archive entry: {e}")))?;

        if out.len() >= MAX_ENTRY_COUNT {
            return Err(DepotError::Bundle(format!(
                "bundle exceeds maximum entry count ({MAX_ENTRY_COUNT})"
            )));
        }

        let entry_type = entry.header().entry_type();
        match entry_type {
            EntryType::Regular => {}
            // Directory and extended-header entries carry no symbol
            EntryType::Directory
            | EntryType::GNULongName
            | EntryType::XHeader
            | EntryType::XGlobalHeader => continue,
            other => {
                return Err(DepotError::Bundle(format!(
                    "unsafe entry type {other:?} in bundle"
                )));
            }
        }

        let size = entry
            .header()
            .size()
            .map_err(|e| DepotError::Bundle(format!("failed to read entry size: {e}")))?;
        total_size = total_size.saturating_add(size);
        if total_size > MAX_TOTAL_SIZE {
            return Err(DepotError::Bundle(format!(
                "bundle exceeds maximum total size ({MAX_TOTAL_SIZE} bytes)"
            )));
        }

        let name = {
            let path = entry
                .path()
                .map_err(|e| DepotError::Bundle(format!("failed to read entry path: {e}")))?;
            path.to_string_lossy().into_owned()
        };
        validate_entry_name(&name)?;

        let mut bytes = Vec::with_capacity(size as usize);
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| DepotError::Bundle(format!("failed to read entry {name}: {e}")))?;

        out.push((name, bytes));
    }

    Ok(out)
}

/// Deterministic bundle writer.
///
/// Entries are written in insertion order with fixed header fields
/// (mode 0644, mtime 0), so the same entries always produce the same
/// compressed bytes.
pub struct BundleBuilder {
    builder: tar::Builder<GzEncoder<Vec<u8>>>,
}

impl BundleBuilder {
    pub fn new() -> Self {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        Self {
            builder: tar::Builder::new(encoder),
        }
    }

    /// Append one symbol entry
    pub fn add(&mut self, name: &str, bytes: &[u8]) -> DepotResult<()> {
        validate_entry_name(name)?;

        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();

        self.builder
            .append_data(&mut header, name, bytes)
            .map_err(|e| DepotError::Bundle(format!("failed to append entry {name}: {e}")))
    }

    /// Finalize the archive and return the compressed bytes
    pub fn finish(self) -> DepotResult<Vec<u8>> {
        let encoder = self
            .builder
            .into_inner()
            .map_err(|e| DepotError::Bundle(format!("failed to finalize bundle: {e}")))?;
        encoder
            .finish()
            .map_err(|e| DepotError::Bundle(format!("failed to finish compression: {e}")))
    }
}

impl Default for BundleBuilder {
    fn default() -> Self {
        Self::new()
    }
}
