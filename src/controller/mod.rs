//! Render and reconcile logic for the LogStorage stack
//!
//! Builders for each component, the ordered assembly table and the lifecycle
//! state machine that splits the output into create and delete lists.

pub mod assembler;
pub mod conditions;
pub mod config;
pub mod constants;
pub mod curator;
pub mod dex;
pub mod eck_operator;
pub mod elasticsearch;
pub mod kibana;
pub mod lifecycle;
#[cfg(test)]
mod lifecycle_test;
pub mod manifest;
pub mod nodesets;
pub mod normalizer;
pub mod quantity;
pub mod resources;

pub use assembler::{assemble, included_stages, Assembly, Stage};
pub use config::{
    ClusterConfig, FederationRole, LogStorageConfig, Readiness, SecretProvider, SecretRole,
};
pub use constants::LOG_STORAGE_FINALIZER;
pub use dex::{generate_client_secret, DexRelyingPartyConfig};
pub use lifecycle::{reconcile, ChildRef, LifecyclePhase, Reconciliation};
pub use manifest::{Manifest, ManifestId};
pub use nodesets::{partition, ResolvedNodeGroup};
pub use normalizer::{jvm_heap_options, normalize, ResourceDefaults};
