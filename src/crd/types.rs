//! Shared types for the LogStorage resource and its children
//!
//! These types are used across the CRD definitions and the render logic.
//!
//! # Type Hierarchy
//!
//! - [`Nodes`] - Elasticsearch node count, node sets and resource overrides
//! - [`NodeSet`] / [`NodeSetSelectionAttribute`] - placement constraints per node group
//! - [`Indices`] / [`Retention`] - index replication and curator retention
//! - [`LogStorageComponentResource`] - resource overrides for auxiliary components
//! - [`InstallationSpec`] / [`CertificateManagement`] - cluster-wide installation settings
//! - [`LicenseType`] / [`Provider`] - feature gates supplied by the installation

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ResourceRequirements;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Elasticsearch node topology request
///
/// `count` is split across `node_sets`; when `node_sets` is empty a single
/// implicit node set receives all nodes.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Nodes {
    /// Total number of Elasticsearch nodes
    pub count: i64,

    /// Node groups the nodes are distributed over
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_sets: Vec<NodeSet>,

    /// CPU, memory and storage requirements for every Elasticsearch node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub resource_requirements: Option<ResourceRequirements>,
}

/// A homogeneous group of Elasticsearch nodes sharing placement constraints
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeSet {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selection_attributes: Vec<NodeSetSelectionAttribute>,
}

/// A node label requirement that is also published to Elasticsearch as a
/// shard allocation awareness attribute
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeSetSelectionAttribute {
    /// Attribute name as seen by Elasticsearch (`node.attr.<name>`)
    pub name: String,
    /// Kubernetes node label to match
    pub node_label: String,
    /// Required label value
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Indices {
    /// Number of index replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
}

/// Retention periods, in days, enforced by the curator job
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Retention {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flows: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_reports: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshots: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance_reports: Option<i32>,
}

impl Retention {
    pub const DEFAULT_FLOWS_DAYS: i32 = 8;
    pub const DEFAULT_AUDIT_REPORTS_DAYS: i32 = 91;
    pub const DEFAULT_SNAPSHOTS_DAYS: i32 = 91;
    pub const DEFAULT_COMPLIANCE_REPORTS_DAYS: i32 = 91;

    pub fn flows_days(&self) -> i32 {
        self.flows.unwrap_or(Self::DEFAULT_FLOWS_DAYS)
    }

    pub fn audit_reports_days(&self) -> i32 {
        self.audit_reports
            .unwrap_or(Self::DEFAULT_AUDIT_REPORTS_DAYS)
    }

    pub fn snapshots_days(&self) -> i32 {
        self.snapshots.unwrap_or(Self::DEFAULT_SNAPSHOTS_DAYS)
    }

    pub fn compliance_reports_days(&self) -> i32 {
        self.compliance_reports
            .unwrap_or(Self::DEFAULT_COMPLIANCE_REPORTS_DAYS)
    }
}

/// Components whose resources can be overridden through `spec.componentResources`
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ComponentName {
    ECKOperator,
}

impl std::fmt::Display for ComponentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentName::ECKOperator => write!(f, "ECKOperator"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogStorageComponentResource {
    pub component_name: ComponentName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub resource_requirements: Option<ResourceRequirements>,
}

/// Elasticsearch license tier
///
/// Single sign-on for Kibana is only available above the basic tier.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum LicenseType {
    Basic,
    #[default]
    EnterpriseTrial,
    Enterprise,
    Unknown,
}

impl LicenseType {
    pub fn allows_sso(&self) -> bool {
        !matches!(self, LicenseType::Basic)
    }
}

impl std::fmt::Display for LicenseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LicenseType::Basic => write!(f, "basic"),
            LicenseType::EnterpriseTrial => write!(f, "enterprise_trial"),
            LicenseType::Enterprise => write!(f, "enterprise"),
            LicenseType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Kubernetes distribution hint
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum Provider {
    #[default]
    None,
    EKS,
    GKE,
    AKS,
    OpenShift,
    DockerEnterprise,
}

impl Provider {
    /// OpenShift admits pods through SecurityContextConstraints, not PodSecurityPolicies
    pub fn uses_pod_security_policies(&self) -> bool {
        !matches!(self, Provider::OpenShift)
    }
}

/// Certificate management through the Kubernetes CSR API
///
/// When present, pod certificates are requested from `signer_name` by init
/// containers instead of being provisioned as secrets up front.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CertificateManagement {
    /// PEM encoded CA certificate of the signer
    #[serde(default)]
    pub ca_cert: Vec<u8>,
    pub signer_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_algorithm: Option<String>,
}

/// Installation-wide settings shared with the rest of the product
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstallationSpec {
    /// Replica count for control plane components such as Kibana
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_replicas: Option<i32>,

    /// Image registry prefix, including the trailing slash
    #[serde(default)]
    pub registry: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_management: Option<CertificateManagement>,
}

/// Condition following Kubernetes API conventions
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., "Ready", "Degraded")
    #[serde(rename = "type")]
    pub type_: String,
    /// Status of the condition: "True", "False", or "Unknown"
    pub status: String,
    /// Last time the condition transitioned
    pub last_transition_time: String,
    /// Machine-readable reason for the condition
    pub reason: String,
    /// Human-readable message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Labels selecting the nodes Elasticsearch data pods may run on
pub type NodeSelector = BTreeMap<String, String>;
