//! Rewrite profiles
//!
//! A profile is a versioned JSON document shipped inside the engine's
//! tool bundle. It assigns each bundle entry a rewrite mode by filename
//! suffix, so the engine knows which entries carry symbol references
//! worth substituting and which must be copied verbatim.

use crate::error::{DepotError, DepotResult};
use serde::{Deserialize, Serialize};

/// Symbol name the profile document is read from inside the tool context
pub const PROFILE_SYMBOL: &str = "io/depot/rewrite/profiles.json";

/// Profile document version this engine understands
pub const PROFILE_VERSION: u32 = 1;

/// How one bundle entry is treated during relocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewriteMode {
    /// Rename the entry path and substitute prefixes inside the bytes
    Rewrite,
    /// Rename the entry path only, bytes copied verbatim
    Rename,
    /// Copy the entry verbatim
    Keep,
}

/// One suffix rule; the first matching rule decides the mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuffixRule {
    pub suffix: String,
    pub mode: RewriteMode,
}

/// The full rewrite profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteProfile {
    pub version: u32,

    #[serde(rename = "default")]
    pub default_mode: RewriteMode,

    pub rules: Vec<SuffixRule>,
}

impl RewriteProfile {
    /// Parse and validate a profile document
    pub fn parse(bytes: &[u8]) -> DepotResult<Self> {
        let profile: Self =
            serde_json::from_slice(bytes).map_err(|e| DepotError::Profile {
                reason: e.to_string(),
            })?;

        if profile.version != PROFILE_VERSION {
            return Err(DepotError::Profile {
                reason: format!(
                    "unsupported profile version {} (expected {})",
                    profile.version, PROFILE_VERSION
                ),
            });
        }

        Ok(profile)
    }

    /// Mode for one entry name: first matching suffix rule, else default
    pub fn mode_for(&self, name: &str) -> RewriteMode {
        self.rules
            .iter()
            .find(|rule| name.ends_with(&rule.suffix))
            .map(|rule| rule.mode)
            .unwrap_or(self.default_mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> RewriteProfile {
        RewriteProfile::parse(
            br#"{
                "version": 1,
                "default": "rewrite",
                "rules": [
                    { "suffix": ".json", "mode": "keep" },
                    { "suffix": ".sym", "mode": "rewrite" },
                    { "suffix": ".bin", "mode": "rename" }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn first_matching_suffix_wins() {
        let p = profile();
        assert_eq!(p.mode_for("org/example/data.json"), RewriteMode::Keep);
        assert_eq!(p.mode_for("org/example/Thing.sym"), RewriteMode::Rewrite);
        assert_eq!(p.mode_for("org/example/blob.bin"), RewriteMode::Rename);
    }

    #[test]
    fn default_applies_when_no_rule_matches() {
        let p = profile();
        assert_eq!(p.mode_for("org/example/NOTICE"), RewriteMode::Rewrite);
    }

    #[test]
    fn rejects_unknown_version() {
        let err = RewriteProfile::parse(br#"{"version": 9, "default": "keep", "rules": []}"#)
            .unwrap_err();
        assert!(err.to_string().contains("version 9"));
    }

    #[test]
    fn rejects_malformed_document() {
        let err = RewriteProfile::parse(b"not json").unwrap_err();
        assert!(matches!(err, DepotError::Profile { .. }));
    }
}
