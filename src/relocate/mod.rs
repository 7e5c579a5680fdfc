//! Symbol relocation engine
//!
//! Rewrites a bundle's internal symbol references to a different
//! namespace prefix so the host's own copies of the same libraries
//! cannot collide with the provisioned ones.
//!
//! The engine's supporting tool bundle (the rewrite profile data) is
//! itself provisioned — fetched, verified and cached like any other
//! descriptor — but never relocated and never merged into the host
//! namespace: it is opened through a dedicated isolation context,
//! built lazily on first use and cached for the engine's lifetime.

pub mod profile;
pub mod rewrite;

pub use profile::{RewriteMode, RewriteProfile, SuffixRule};

use crate::descriptor::Descriptor;
use crate::error::{DepotError, DepotResult};
use crate::isolate::IsolationContext;
use crate::provisioner::Core;
use crate::relocate::profile::PROFILE_SYMBOL;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Variant tag for relocated cache files
pub const REMAPPED_VARIANT: &str = "remapped";

/// The standard tool bundles backing the rewrite step.
///
/// An explicit table, passed by reference at construction — never
/// resolved through any ambient registry. The descriptors are isolated
/// (excluded from auto-load) and carry no relocation rules of their
/// own: relocating the relocation tooling would make it inoperable.
pub fn standard_tools() -> DepotResult<Vec<Descriptor>> {
    Ok(vec![
        Descriptor::new(
            "io{}depot",
            "rewrite-core",
            "2.3.1",
            "xqTeRV+rSP8Ly3xItGOUR9TehZp6/DCglKmG8JNr66I=",
        )?
        .isolated(),
        Descriptor::new(
            "io{}depot",
            "rewrite-profiles",
            "2.3.1",
            "k2sm3B/BLAxKma2mcJCN2C4Y38SIyvXuklRplrRwwAw=",
        )?
        .isolated(),
    ])
}

/// Relocation engine bound to the coordinator's shared state
pub struct Relocator {
    core: Arc<Core>,
    tools: Vec<Descriptor>,
    tool_context: OnceCell<Arc<IsolationContext>>,
}

impl Relocator {
    pub(crate) fn new(core: Arc<Core>, tools: Vec<Descriptor>) -> Self {
        Self {
            core,
            tools,
            tool_context: OnceCell::new(),
        }
    }

    /// Produce the relocated variant of a resolved artifact.
    ///
    /// Only invoked for descriptors with relocation rules. An existing
    /// remapped cache file is reused without re-processing, the same
    /// trust-on-first-write policy the cache store applies.
    pub(crate) async fn remapped(
        &self,
        descriptor: &Descriptor,
        source: &Path,
    ) -> DepotResult<PathBuf> {
        self.remap_inner(descriptor, source)
            .await
            .map_err(|e| match e {
                already @ DepotError::Relocation { .. } => already,
                other => DepotError::relocation(descriptor.artifact(), other),
            })
    }

    async fn remap_inner(&self, descriptor: &Descriptor, source: &Path) -> DepotResult<PathBuf> {
        let out = self.core.cache.path_for(descriptor, Some(REMAPPED_VARIANT));
        if out.exists() {
            debug!("Remapped variant already cached for {}", descriptor);
            return Ok(out);
        }

        let context = self.tool_context().await?;
        let profile = RewriteProfile::parse(&context.read(PROFILE_SYMBOL)?)?;

        let data = tokio::fs::read(source)
            .await
            .map_err(|e| DepotError::io(format!("reading {}", source.display()), e))?;

        let rules = descriptor.relocations().to_vec();
        let rewritten =
            tokio::task::spawn_blocking(move || rewrite::rewrite_bundle(&data, &rules, &profile))
                .await
                .map_err(|e| DepotError::Internal(format!("rewrite task failed: {e}")))??;

        self.core.cache.persist(&out, &rewritten).await?;

        info!(
            "Relocated {} ({} rules)",
            descriptor,
            descriptor.relocations().len()
        );
        self.core
            .journal
            .record(
                "artifact.relocated",
                serde_json::json!({
                    "artifact": descriptor.artifact(),
                    "version": descriptor.version(),
                    "rules": descriptor.relocations().len(),
                }),
            )
            .await;

        Ok(out)
    }

    /// The dedicated context holding the tool bundles.
    ///
    /// Double-checked first-use initialization: concurrent callers race
    /// on one cell, at most one provisions the tools; a failed
    /// initialization is retried on the next call.
    async fn tool_context(&self) -> DepotResult<Arc<IsolationContext>> {
        self.tool_context
            .get_or_try_init(|| async {
                for tool in &self.tools {
                    self.core.resolve_plain(tool).await?;
                }
                let set: BTreeSet<Descriptor> = self.tools.iter().cloned().collect();
                self.core.context_for(&set).await
            })
            .await
            .cloned()
    }
}
