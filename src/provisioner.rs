//! Provisioning coordinator
//!
//! Accepts a batch of descriptors, fans the work out across the
//! runtime, de-duplicates in-flight and previously completed units, and
//! hands resolved artifact paths to the host's appender. Per-descriptor
//! failures are logged and journaled; they never abort sibling units.

use crate::cache::CacheStore;
use crate::config::{ConfigManager, DepotConfig};
use crate::descriptor::Descriptor;
use crate::error::{CloseFailure, DepotError, DepotResult};
use crate::isolate::{ArtifactOpener, IsolationContext, IsolationLoader};
use crate::journal::Journal;
use crate::relocate::{self, Relocator};
use crate::repository::{self, Repository};
use dashmap::DashMap;
use futures_util::future::join_all;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Host collaborator receiving auto-loaded artifact paths.
///
/// Called at most once per descriptor, after successful resolution and
/// relocation. Implementations merge the artifact into the host's
/// primary namespace.
pub trait Appender: Send + Sync {
    fn add_artifact(&self, path: &Path) -> DepotResult<()>;
}

/// Shared coordinator state, reachable from spawned units and the
/// relocation engine.
pub(crate) struct Core {
    pub(crate) cache: CacheStore,
    pub(crate) journal: Journal,
    loader: IsolationLoader,
    /// Descriptor → resolved path; write-once per descriptor, the
    /// single source of truth for "is this already provisioned"
    loaded: DashMap<Descriptor, PathBuf>,
    /// Per-descriptor async gates so one descriptor scheduled twice
    /// fetches exactly once
    gates: DashMap<Descriptor, Arc<Mutex<()>>>,
    /// Context cache keyed by exact descriptor set; check-then-create
    /// runs entirely under this one lock
    contexts: Mutex<HashMap<BTreeSet<Descriptor>, Arc<IsolationContext>>>,
    appender: Option<Arc<dyn Appender>>,
}

impl Core {
    fn gate(&self, descriptor: &Descriptor) -> Arc<Mutex<()>> {
        self.gates
            .entry(descriptor.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub(crate) fn path_of(&self, descriptor: &Descriptor) -> Option<PathBuf> {
        self.loaded.get(descriptor).map(|entry| entry.value().clone())
    }

    async fn register(&self, descriptor: &Descriptor, path: &Path) {
        self.loaded.insert(descriptor.clone(), path.to_path_buf());
        self.journal
            .record(
                "descriptor.resolved",
                serde_json::json!({
                    "descriptor": descriptor.to_string(),
                    "path": path.display().to_string(),
                }),
            )
            .await;
    }

    /// Resolve a descriptor into load state without relocation or
    /// appender callbacks. Used for the relocation engine's own tool
    /// bundles, which carry no rules and are never auto-loaded.
    pub(crate) async fn resolve_plain(&self, descriptor: &Descriptor) -> DepotResult<PathBuf> {
        let gate = self.gate(descriptor);
        let _guard = gate.lock().await;

        if let Some(path) = self.path_of(descriptor) {
            return Ok(path);
        }

        let path = self.cache.resolve(descriptor).await?;
        self.register(descriptor, &path).await;
        Ok(path)
    }

    /// Look up or create the context for an exact descriptor set.
    ///
    /// The whole check-then-create sequence holds the context lock, so
    /// at most one context ever exists per distinct set. A closed
    /// context is replaced by a fresh one.
    pub(crate) async fn context_for(
        &self,
        set: &BTreeSet<Descriptor>,
    ) -> DepotResult<Arc<IsolationContext>> {
        let mut contexts = self.contexts.lock().await;

        if let Some(context) = contexts.get(set) {
            if !context.is_closed() {
                return Ok(context.clone());
            }
        }

        let mut paths = BTreeSet::new();
        for descriptor in set {
            let path = self
                .path_of(descriptor)
                .ok_or_else(|| DepotError::NotProvisioned {
                    artifact: descriptor.artifact().to_string(),
                })?;
            paths.insert(path);
        }

        let loader = self.loader.clone();
        let context = tokio::task::spawn_blocking(move || loader.open(&paths))
            .await
            .map_err(|e| DepotError::Internal(format!("context open task failed: {e}")))??;
        let context = Arc::new(context);

        info!(
            "Opened isolation context {} ({} artifacts)",
            context.id(),
            set.len()
        );
        self.journal
            .record(
                "context.opened",
                serde_json::json!({
                    "id": context.id().to_string(),
                    "artifacts": set.len(),
                }),
            )
            .await;

        contexts.insert(set.clone(), context.clone());
        Ok(context)
    }
}

/// One provisioning unit: strict order fetch → verify → relocate →
/// register → appender, all inside the descriptor's gate.
async fn load_one(
    core: Arc<Core>,
    relocator: Arc<Relocator>,
    descriptor: Descriptor,
) -> DepotResult<PathBuf> {
    let gate = core.gate(&descriptor);
    let _guard = gate.lock().await;

    if let Some(path) = core.path_of(&descriptor) {
        debug!("{} already provisioned", descriptor);
        return Ok(path);
    }

    let fetched = core.cache.resolve(&descriptor).await?;

    let path = if descriptor.relocations().is_empty() {
        fetched
    } else {
        relocator.remapped(&descriptor, &fetched).await?
    };

    core.register(&descriptor, &path).await;

    if descriptor.auto_load() {
        if let Some(appender) = &core.appender {
            appender.add_artifact(&path)?;
            debug!("Handed {} to host appender", descriptor);
        }
    }

    Ok(path)
}

/// Builder for [`Provisioner`]
pub struct ProvisionerBuilder {
    config: DepotConfig,
    cache_dir: Option<PathBuf>,
    repositories: Vec<Arc<dyn Repository>>,
    appender: Option<Arc<dyn Appender>>,
    tools: Option<Vec<Descriptor>>,
    opener: Option<Arc<dyn ArtifactOpener>>,
}

impl ProvisionerBuilder {
    pub fn new(config: DepotConfig) -> Self {
        Self {
            config,
            cache_dir: None,
            repositories: Vec::new(),
            appender: None,
            tools: None,
            opener: None,
        }
    }

    /// Override the cache directory
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Add a repository source; injected sources replace the configured
    /// list entirely and are tried in insertion order
    pub fn repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repositories.push(repository);
        self
    }

    /// Set the host appender collaborator
    pub fn appender(mut self, appender: Arc<dyn Appender>) -> Self {
        self.appender = Some(appender);
        self
    }

    /// Override the relocation engine's tool descriptor table
    pub fn relocation_tools(mut self, tools: Vec<Descriptor>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Override the artifact opener backing isolation contexts
    pub fn opener(mut self, opener: Arc<dyn ArtifactOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    pub fn build(self) -> DepotResult<Provisioner> {
        let cache_dir = self
            .cache_dir
            .or(self.config.cache.dir.clone())
            .unwrap_or_else(ConfigManager::default_cache_dir);

        let repositories = if self.repositories.is_empty() {
            repository::from_config(&self.config.repositories, &self.config.network)
        } else {
            self.repositories
        };

        let cache = CacheStore::new(cache_dir, repositories)?;
        let journal = Journal::new(cache.dir(), self.config.general.journal);
        let loader = match self.opener {
            Some(opener) => IsolationLoader::new(opener),
            None => IsolationLoader::bundles(),
        };
        let tools = match self.tools {
            Some(tools) => tools,
            None => relocate::standard_tools()?,
        };

        info!("Provisioner ready (cache: {})", cache.dir().display());

        let core = Arc::new(Core {
            cache,
            journal,
            loader,
            loaded: DashMap::new(),
            gates: DashMap::new(),
            contexts: Mutex::new(HashMap::new()),
            appender: self.appender,
        });
        let relocator = Arc::new(Relocator::new(core.clone(), tools));

        Ok(Provisioner { core, relocator })
    }
}

/// Top-level provisioning orchestrator
pub struct Provisioner {
    core: Arc<Core>,
    relocator: Arc<Relocator>,
}

impl Provisioner {
    pub fn builder(config: DepotConfig) -> ProvisionerBuilder {
        ProvisionerBuilder::new(config)
    }

    /// Provision a batch of descriptors.
    ///
    /// Returns once every descriptor has either loaded or failed and
    /// been logged. Descriptors already in load state are skipped with
    /// no network or disk work; the rest run as parallel units with no
    /// ordering guarantee between them. A failing unit never aborts its
    /// siblings.
    pub async fn provision(&self, descriptors: impl IntoIterator<Item = Descriptor>) {
        let batch: BTreeSet<Descriptor> = descriptors.into_iter().collect();

        let mut handles = Vec::new();
        for descriptor in batch {
            if self.core.path_of(&descriptor).is_some() {
                debug!("Skipping {}, already provisioned", descriptor);
                continue;
            }

            let core = self.core.clone();
            let relocator = self.relocator.clone();
            handles.push(tokio::spawn(async move {
                let artifact = descriptor.artifact().to_string();
                if let Err(e) = load_one(core.clone(), relocator, descriptor).await {
                    error!("Unable to load {}: {}", artifact, e);
                    core.journal
                        .record(
                            "descriptor.failed",
                            serde_json::json!({
                                "artifact": artifact,
                                "error": e.to_string(),
                            }),
                        )
                        .await;
                }
            }));
        }

        // completion barrier: every unit counts exactly once, success,
        // failure or panic
        for result in join_all(handles).await {
            if let Err(e) = result {
                error!("Provisioning unit panicked: {}", e);
            }
        }
    }

    /// Obtain the isolation context for an exact descriptor set.
    ///
    /// Every descriptor must already be provisioned — anything else is
    /// a programming-contract violation and fails immediately. Repeat
    /// calls with an equal set return the same context instance.
    pub async fn isolated_context(
        &self,
        descriptors: &BTreeSet<Descriptor>,
    ) -> DepotResult<Arc<IsolationContext>> {
        for descriptor in descriptors {
            if self.core.path_of(descriptor).is_none() {
                return Err(DepotError::NotProvisioned {
                    artifact: descriptor.artifact().to_string(),
                });
            }
        }

        self.core.context_for(descriptors).await
    }

    /// Resolved local path for a provisioned descriptor
    pub fn artifact_path(&self, descriptor: &Descriptor) -> Option<PathBuf> {
        self.core.path_of(descriptor)
    }

    /// The cache directory artifacts resolve into
    pub fn cache_dir(&self) -> &Path {
        self.core.cache.dir()
    }

    /// Close every cached isolation context, best effort.
    ///
    /// All contexts reach the closed state regardless of individual
    /// failures; the first failure is surfaced with the rest attached
    /// as ordered secondary causes.
    pub async fn shutdown(&self) -> DepotResult<()> {
        let drained: Vec<Arc<IsolationContext>> = {
            let mut contexts = self.core.contexts.lock().await;
            contexts.drain().map(|(_, context)| context).collect()
        };

        let total = drained.len();
        let mut causes = Vec::new();
        for context in drained {
            if let Err(failure) = context.close() {
                causes.extend(failure.causes().iter().cloned());
            }
        }

        self.core
            .journal
            .record(
                "provisioner.shutdown",
                serde_json::json!({
                    "contexts": total,
                    "failures": causes.len(),
                }),
            )
            .await;

        match CloseFailure::from_causes(causes) {
            Some(failure) => {
                error!("Context release failed during shutdown: {}", failure);
                Err(DepotError::Release(failure))
            }
            None => {
                info!("Provisioner shut down ({} contexts closed)", total);
                Ok(())
            }
        }
    }
}
