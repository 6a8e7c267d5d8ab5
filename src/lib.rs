//! LogStorage renderer: desired state for the Elasticsearch/Kibana log storage stack
//!
//! Given a configuration snapshot, the crate synthesizes the ordered list of
//! Kubernetes objects to apply and the list of objects to delete. It performs
//! no I/O; applying the output is left to the caller.

pub mod controller;
pub mod crd;
pub mod error;

pub use crate::error::{Error, Result};
