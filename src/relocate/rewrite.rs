//! Bundle rewriting
//!
//! Rewrites internal symbol references inside a bundle according to a
//! set of rename rules, preserving container structure, entry order and
//! all content the rules do not touch. Output is byte-deterministic:
//! the same input and rules always produce the same bytes.

use crate::bundle::{self, BundleBuilder};
use crate::descriptor::RelocationRule;
use crate::error::DepotResult;
use crate::relocate::profile::{RewriteMode, RewriteProfile};

/// Rewrite one bundle in memory
pub fn rewrite_bundle(
    data: &[u8],
    rules: &[RelocationRule],
    profile: &RewriteProfile,
) -> DepotResult<Vec<u8>> {
    let entries = bundle::entries(data)?;
    let mut out = BundleBuilder::new();

    for (name, bytes) in entries {
        match profile.mode_for(&name) {
            RewriteMode::Keep => out.add(&name, &bytes)?,
            RewriteMode::Rename => out.add(&rename_path(&name, rules), &bytes)?,
            RewriteMode::Rewrite => {
                let renamed = rename_path(&name, rules);
                let rewritten = substitute(&bytes, rules);
                out.add(&renamed, &rewritten)?;
            }
        }
    }

    out.finish()
}

/// Move an entry path under its new prefix.
///
/// The first rule whose slash-form prefix matches on a segment boundary
/// applies; an entry no rule matches keeps its path.
fn rename_path(name: &str, rules: &[RelocationRule]) -> String {
    for rule in rules {
        let from = rule.from_slash();
        if let Some(rest) = name.strip_prefix(&from) {
            if rest.is_empty() || rest.starts_with('/') {
                return format!("{}{}", rule.to_slash(), rest);
            }
        }
    }
    name.to_string()
}

/// Substitute every occurrence of each rule's prefix inside the bytes,
/// in both slash and dotted form, applying rules in declaration order.
fn substitute(bytes: &[u8], rules: &[RelocationRule]) -> Vec<u8> {
    let mut out = bytes.to_vec();
    for rule in rules {
        out = replace_all(&out, rule.from_slash().as_bytes(), rule.to_slash().as_bytes());
        out = replace_all(
            &out,
            rule.from_dotted().as_bytes(),
            rule.to_dotted().as_bytes(),
        );
    }
    out
}

/// Replace every non-overlapping occurrence of `needle` in `haystack`
fn replace_all(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Vec<u8> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return haystack.to_vec();
    }

    let mut out = Vec::with_capacity(haystack.len());
    let mut i = 0;
    while i < haystack.len() {
        if haystack[i..].starts_with(needle) {
            out.extend_from_slice(replacement);
            i += needle.len();
        } else {
            out.push(haystack[i]);
            i += 1;
        }
    }
    out
}
