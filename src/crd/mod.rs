//! Custom Resource Definitions for the log storage stack
//!
//! `LogStorage` is the resource users edit; the ECK and PodSecurityPolicy
//! types describe objects the renderer emits.

pub mod eck;
mod log_storage;
pub mod psp;
pub mod types;


pub use eck::{Elasticsearch, ElasticsearchNodeSet, ElasticsearchSpec, Kibana, KibanaSpec};
pub use log_storage::{
    LogStorage, LogStorageSpec, LogStorageStatus, SpecValidationError, DEFAULT_STORAGE_CLASS,
};
pub use psp::{PodSecurityPolicy, PodSecurityPolicySpec};
pub use types::*;
