//! Depot - Runtime Library Provisioning
//!
//! Resolves library bundles against remote sources, verifies their
//! integrity, optionally relocates their internal symbol references,
//! and loads them into isolated execution contexts.

pub mod bundle;
pub mod cache;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod isolate;
pub mod journal;
pub mod provisioner;
pub mod relocate;
pub mod repository;

pub use config::{ConfigManager, DepotConfig};
pub use descriptor::{Checksum, Descriptor, RelocationRule};
pub use error::{DepotError, DepotResult};
pub use isolate::IsolationContext;
pub use provisioner::{Appender, Provisioner, ProvisionerBuilder};
