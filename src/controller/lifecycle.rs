//! LogStorage lifecycle and finalizer handling
//!
//! The LogStorage carries a finalizer so the ECK resources it owns can be torn
//! down before it disappears. Teardown runs in three steps:
//! 1. Delete the Elasticsearch and Kibana resources that are still live
//! 2. Wait while ECK removes them (they carry deletion timestamps)
//! 3. Release the finalizer once neither is observed any more

use std::fmt;

use kube::ResourceExt;
use tracing::{debug, info, instrument};

use super::assembler;
use super::config::{FederationRole, LogStorageConfig};
use super::constants::LOG_STORAGE_FINALIZER;
use super::manifest::Manifest;
use crate::crd::LogStorage;
use crate::error::Result;

/// A child custom resource still awaiting deletion
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChildRef {
    pub kind: &'static str,
    pub name: String,
    pub namespace: Option<String>,
}

impl fmt::Display for ChildRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Where the LogStorage is in its lifecycle
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// No deletion requested: render the full stack
    Provisioning,
    /// Deletion requested and these children have not been deleted yet
    Terminating { pending: Vec<ChildRef> },
    /// Every observed child is already being deleted
    AwaitingChildRemoval,
    /// No child observed; the finalizer may be dropped
    Released,
}

impl LifecyclePhase {
    pub fn observe(cfg: &LogStorageConfig) -> Self {
        let deleting = cfg.log_storage.as_ref().is_some_and(is_being_deleted);
        if !deleting {
            return LifecyclePhase::Provisioning;
        }

        let pending = live_children(cfg)
            .into_iter()
            .map(|m| ChildRef {
                kind: m.kind(),
                name: m.name().to_string(),
                namespace: m.namespace().map(str::to_string),
            })
            .collect::<Vec<_>>();

        if !pending.is_empty() {
            LifecyclePhase::Terminating { pending }
        } else if cfg.elasticsearch.is_some() || cfg.kibana.is_some() {
            LifecyclePhase::AwaitingChildRemoval
        } else {
            LifecyclePhase::Released
        }
    }

    pub fn is_terminating(&self) -> bool {
        !matches!(self, LifecyclePhase::Provisioning)
    }
}

/// Observed children without a deletion timestamp, Elasticsearch first
fn live_children(cfg: &LogStorageConfig) -> Vec<Manifest> {
    let es = cfg
        .elasticsearch
        .as_ref()
        .filter(|es| es.metadata.deletion_timestamp.is_none())
        .map(|es| Manifest::from(es.clone()));
    let kb = cfg
        .kibana
        .as_ref()
        .filter(|kb| kb.metadata.deletion_timestamp.is_none())
        .map(|kb| Manifest::from(kb.clone()));
    es.into_iter().chain(kb).collect()
}

/// Outcome of one reconcile pass
#[derive(Clone, Debug, PartialEq)]
pub struct Reconciliation {
    pub phase: LifecyclePhase,
    pub to_create: Vec<Manifest>,
    pub to_delete: Vec<Manifest>,
    /// Finalizers of the LogStorage, exactly as observed
    pub finalizers: Vec<String>,
}

impl Reconciliation {
    /// Whether the caller may now drop the LogStorage finalizer
    pub fn finalizer_removable(&self) -> bool {
        self.phase == LifecyclePhase::Released
    }
}

/// Compute the create and delete lists for the current snapshot
#[instrument(skip(cfg))]
pub fn reconcile(cfg: &LogStorageConfig) -> Result<Reconciliation> {
    // A managed cluster may render without any LogStorage
    let finalizers = if cfg.federation == FederationRole::Managed && cfg.log_storage.is_none() {
        Vec::new()
    } else {
        cfg.log_storage()?.finalizers().to_vec()
    };
    let phase = LifecyclePhase::observe(cfg);

    let (to_create, to_delete) = match &phase {
        LifecyclePhase::Provisioning => {
            let assembly = assembler::assemble(cfg)?;
            (assembly.to_create, assembly.to_delete)
        }
        LifecyclePhase::Terminating { pending } => {
            for child in pending {
                info!(child = %child, "Deleting child of terminating LogStorage");
            }
            (Vec::new(), live_children(cfg))
        }
        LifecyclePhase::AwaitingChildRemoval => {
            debug!("Waiting for Elasticsearch and Kibana to be removed");
            (Vec::new(), Vec::new())
        }
        LifecyclePhase::Released => {
            info!("Children removed, LogStorage finalizer can be released");
            (Vec::new(), Vec::new())
        }
    };

    Ok(Reconciliation {
        phase,
        to_create,
        to_delete,
        finalizers,
    })
}

/// Check if the LogStorage is being deleted
///
/// A deletion timestamp indicates the user has requested deletion,
/// but finalizers are preventing the actual removal.
pub fn is_being_deleted(log_storage: &LogStorage) -> bool {
    log_storage.metadata.deletion_timestamp.is_some()
}

/// Check if the LogStorage has our finalizer
pub fn has_finalizer(log_storage: &LogStorage) -> bool {
    log_storage
        .finalizers()
        .iter()
        .any(|f| f == LOG_STORAGE_FINALIZER)
}

/// Finalizer list with ours appended when missing
pub fn with_finalizer(finalizers: &[String]) -> Vec<String> {
    let mut out = finalizers.to_vec();
    if !out.iter().any(|f| f == LOG_STORAGE_FINALIZER) {
        out.push(LOG_STORAGE_FINALIZER.to_string());
    }
    out
}

/// Finalizer list with ours removed, to be patched once the phase is released
pub fn without_finalizer(finalizers: &[String]) -> Vec<String> {
    finalizers
        .iter()
        .filter(|f| f.as_str() != LOG_STORAGE_FINALIZER)
        .cloned()
        .collect()
}
