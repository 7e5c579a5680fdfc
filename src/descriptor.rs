//! Library bundle descriptors
//!
//! A [`Descriptor`] is the immutable identity, integrity and transform
//! metadata for one provisionable bundle. Two descriptors with the same
//! (group, artifact, version) triple are the same unit of work, no
//! matter how they were constructed.

use crate::error::{DepotError, DepotResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// File extension used for all bundle artifacts
pub const BUNDLE_EXT: &str = "tgz";

/// A SHA-256 digest declared in base64 and compared as raw bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum([u8; 32]);

impl Checksum {
    /// Decode a declared checksum from standard base64
    pub fn from_base64(artifact: &str, encoded: &str) -> DepotResult<Self> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| DepotError::InvalidChecksum {
                artifact: artifact.to_string(),
                reason: e.to_string(),
            })?;

        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| DepotError::InvalidChecksum {
                artifact: artifact.to_string(),
                reason: format!("expected 32 bytes, got {}", b.len()),
            })?;

        Ok(Self(bytes))
    }

    /// Compute the checksum of a byte stream
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hasher.finalize().into())
    }

    /// Check a byte stream against this checksum
    pub fn matches(&self, bytes: &[u8]) -> bool {
        Self::of(bytes) == *self
    }

    /// Short hex form for log lines
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", BASE64.encode(self.0))
    }
}

/// One ordered symbol-rename rule: every reference under `from` moves
/// under `to`. Prefixes are dotted namespaces; the slash forms are
/// derived for entry paths.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelocationRule {
    from: String,
    to: String,
}

impl RelocationRule {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: rewrite_escaping(&from.into()),
            to: rewrite_escaping(&to.into()),
        }
    }

    /// Dotted source prefix
    pub fn from_dotted(&self) -> &str {
        &self.from
    }

    /// Dotted target prefix
    pub fn to_dotted(&self) -> &str {
        &self.to
    }

    /// Source prefix with dots as slashes (entry-path form)
    pub fn from_slash(&self) -> String {
        self.from.replace('.', "/")
    }

    /// Target prefix with dots as slashes (entry-path form)
    pub fn to_slash(&self) -> String {
        self.to.replace('.', "/")
    }
}

/// Unescape `{}` to `.` in namespace strings.
///
/// Descriptor tables that ship inside a relocatable bundle escape their
/// own dotted prefixes this way, so relocating the bundle does not
/// rewrite the table's text.
fn rewrite_escaping(s: &str) -> String {
    s.replace("{}", ".")
}

/// Immutable identity + integrity + transform metadata for one bundle.
///
/// Equality, hashing and ordering use the (group, artifact, version)
/// identity triple only — value semantics, never reference semantics.
#[derive(Debug, Clone)]
pub struct Descriptor {
    group: String,
    artifact: String,
    version: String,
    checksum: Checksum,
    relocations: Vec<RelocationRule>,
    auto_load: bool,
}

impl Descriptor {
    /// Create a descriptor. The checksum is required and decoded once;
    /// malformed input is a construction error.
    pub fn new(
        group: impl Into<String>,
        artifact: impl Into<String>,
        version: impl Into<String>,
        checksum_base64: &str,
    ) -> DepotResult<Self> {
        let artifact = rewrite_escaping(&artifact.into());
        let checksum = Checksum::from_base64(&artifact, checksum_base64)?;

        Ok(Self {
            group: rewrite_escaping(&group.into()),
            artifact,
            version: version.into(),
            checksum,
            relocations: Vec::new(),
            auto_load: true,
        })
    }

    /// Attach ordered relocation rules
    pub fn with_relocations(mut self, rules: impl IntoIterator<Item = RelocationRule>) -> Self {
        self.relocations = rules.into_iter().collect();
        self
    }

    /// Mark this descriptor for isolated use only: it is never merged
    /// into the host's primary namespace
    pub fn isolated(mut self) -> Self {
        self.auto_load = false;
        self
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn checksum(&self) -> &Checksum {
        &self.checksum
    }

    pub fn relocations(&self) -> &[RelocationRule] {
        &self.relocations
    }

    /// Whether the resolved artifact is handed to the host appender
    pub fn auto_load(&self) -> bool {
        self.auto_load
    }

    /// Deterministic cache file name for a transform variant.
    ///
    /// `{artifact}-{version}[-{variant}].tgz`, artifact lowercased with
    /// underscores as hyphens.
    pub fn cache_file_name(&self, variant: Option<&str>) -> String {
        let name = self.artifact.to_lowercase().replace('_', "-");
        match variant {
            Some(v) if !v.is_empty() => format!("{}-{}-{}.{}", name, self.version, v, BUNDLE_EXT),
            _ => format!("{}-{}.{}", name, self.version, BUNDLE_EXT),
        }
    }

    /// Deterministic relative path used to query remote sources:
    /// `{group dots as slashes}/{artifact}/{version}/{artifact}-{version}.tgz`
    pub fn repository_path(&self) -> String {
        format!(
            "{}/{}/{}/{}-{}.{}",
            self.group.replace('.', "/"),
            self.artifact,
            self.version,
            self.artifact,
            self.version,
            BUNDLE_EXT,
        )
    }
}

/// Display is `group:artifact:version`, the form used in log lines
impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)
    }
}

impl PartialEq for Descriptor {
    fn eq(&self, other: &Self) -> bool {
        self.group == other.group
            && self.artifact == other.artifact
            && self.version == other.version
    }
}

impl Eq for Descriptor {}

impl Hash for Descriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.group.hash(state);
        self.artifact.hash(state);
        self.version.hash(state);
    }
}

impl PartialOrd for Descriptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Descriptor {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.group, &self.artifact, &self.version).cmp(&(
            &other.group,
            &other.artifact,
            &other.version,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checksum_of(bytes: &[u8]) -> String {
        Checksum::of(bytes).to_string()
    }

    fn descriptor(artifact: &str) -> Descriptor {
        Descriptor::new("org.example", artifact, "1.0", &checksum_of(b"payload")).unwrap()
    }

    #[test]
    fn checksum_roundtrip() {
        let encoded = checksum_of(b"payload");
        let checksum = Checksum::from_base64("lib", &encoded).unwrap();
        assert!(checksum.matches(b"payload"));
        assert!(!checksum.matches(b"other"));
        assert_eq!(checksum.to_string(), encoded);
    }

    #[test]
    fn checksum_rejects_malformed() {
        let err = Checksum::from_base64("lib", "not base64!!").unwrap_err();
        assert!(matches!(err, DepotError::InvalidChecksum { .. }));
    }

    #[test]
    fn checksum_rejects_wrong_length() {
        let short = BASE64.encode(b"too short");
        let err = Checksum::from_base64("lib", &short).unwrap_err();
        assert!(err.to_string().contains("32 bytes"));
    }

    #[test]
    fn value_equality_on_identity_only() {
        let a = descriptor("lib");
        let b = Descriptor::new("org.example", "lib", "1.0", &checksum_of(b"different"))
            .unwrap()
            .isolated();
        assert_eq!(a, b);

        let c = descriptor("other-lib");
        assert_ne!(a, c);
    }

    #[test]
    fn cache_file_name_variants() {
        let d = Descriptor::new("org.example", "My_Lib", "2.1", &checksum_of(b"x")).unwrap();
        assert_eq!(d.cache_file_name(None), "my-lib-2.1.tgz");
        assert_eq!(d.cache_file_name(Some("remapped")), "my-lib-2.1-remapped.tgz");
        assert_eq!(d.cache_file_name(Some("")), "my-lib-2.1.tgz");
    }

    #[test]
    fn repository_path_layout() {
        let d = descriptor("lib");
        assert_eq!(d.repository_path(), "org/example/lib/1.0/lib-1.0.tgz");
    }

    #[test]
    fn escaped_namespaces_unescape() {
        let d = Descriptor::new("org{}example", "lib", "1.0", &checksum_of(b"x")).unwrap();
        assert_eq!(d.group(), "org.example");

        let rule = RelocationRule::new("org{}example{}inner", "org{}shaded{}inner");
        assert_eq!(rule.from_dotted(), "org.example.inner");
        assert_eq!(rule.from_slash(), "org/example/inner");
        assert_eq!(rule.to_slash(), "org/shaded/inner");
    }

    #[test]
    fn auto_load_default_and_isolated() {
        let d = descriptor("lib");
        assert!(d.auto_load());
        assert!(!d.isolated().auto_load());
    }

    #[test]
    fn ordering_follows_identity() {
        let a = descriptor("aaa");
        let b = descriptor("bbb");
        assert!(a < b);
    }
}
