//! LogStorage Custom Resource Definition
//!
//! The LogStorage CRD is the single declarative input for the log storage
//! stack: Elasticsearch, Kibana and the curator job. It is cluster scoped and
//! conventionally named `tigera-secure`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    Condition, Indices, LogStorageComponentResource, NodeSelector, Nodes, Retention,
};

/// Structured validation error for `LogStorageSpec`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpecValidationError {
    pub field: String,
    pub message: String,
    pub how_to_fix: String,
}

impl SpecValidationError {
    pub fn new(
        field: impl Into<String>,
        message: impl Into<String>,
        how_to_fix: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            how_to_fix: how_to_fix.into(),
        }
    }
}

#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "operator.tigera.io",
    version = "v1",
    kind = "LogStorage",
    status = "LogStorageStatus",
    derive = "PartialEq",
    derive = "Default",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct LogStorageSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Nodes>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indices: Option<Indices>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<Retention>,

    /// Storage class used for Elasticsearch data volumes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    /// Node selector applied to every Elasticsearch data pod
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_node_selector: Option<NodeSelector>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub component_resources: Vec<LogStorageComponentResource>,
}

pub const DEFAULT_STORAGE_CLASS: &str = "tigera-elasticsearch";

impl LogStorageSpec {
    /// Node request with the CRD default of a single node applied
    pub fn nodes_or_default(&self) -> Nodes {
        self.nodes.clone().unwrap_or(Nodes {
            count: 1,
            ..Default::default()
        })
    }

    pub fn retention_or_default(&self) -> Retention {
        self.retention.clone().unwrap_or_default()
    }

    pub fn storage_class(&self) -> &str {
        self.storage_class_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_STORAGE_CLASS)
    }

    /// Validate the shape of the spec
    ///
    /// Checks the invariants synthesis relies on: non-negative counts and
    /// retention periods, and complete selection attributes.
    ///
    /// # Errors
    ///
    /// Returns every violation found, not just the first.
    pub fn validate(&self) -> Result<(), Vec<SpecValidationError>> {
        let mut errors: Vec<SpecValidationError> = Vec::new();

        if let Some(nodes) = &self.nodes {
            if nodes.count < 0 {
                errors.push(SpecValidationError::new(
                    "spec.nodes.count",
                    format!("node count must not be negative, got {}", nodes.count),
                    "Set spec.nodes.count to zero or a positive number of Elasticsearch nodes.",
                ));
            } else if nodes.count > i64::from(i32::MAX) {
                errors.push(SpecValidationError::new(
                    "spec.nodes.count",
                    format!("node count {} is out of range", nodes.count),
                    "Lower spec.nodes.count.",
                ));
            }

            for (i, node_set) in nodes.node_sets.iter().enumerate() {
                for (j, attr) in node_set.selection_attributes.iter().enumerate() {
                    let field = format!("spec.nodes.nodeSets[{i}].selectionAttributes[{j}]");
                    if attr.name.trim().is_empty() {
                        errors.push(SpecValidationError::new(
                            format!("{field}.name"),
                            "selection attribute name must not be empty",
                            "Name the attribute, e.g. \"zone\".",
                        ));
                    }
                    if attr.node_label.trim().is_empty() {
                        errors.push(SpecValidationError::new(
                            format!("{field}.nodeLabel"),
                            "selection attribute nodeLabel must not be empty",
                            "Set nodeLabel to the Kubernetes node label to match.",
                        ));
                    }
                }
            }
        }

        if let Some(replicas) = self.indices.as_ref().and_then(|i| i.replicas) {
            if replicas < 0 {
                errors.push(SpecValidationError::new(
                    "spec.indices.replicas",
                    "index replicas must not be negative",
                    "Set spec.indices.replicas to zero or more.",
                ));
            }
        }

        if let Some(retention) = &self.retention {
            let periods = [
                ("flows", retention.flows),
                ("auditReports", retention.audit_reports),
                ("snapshots", retention.snapshots),
                ("complianceReports", retention.compliance_reports),
            ];
            for (name, days) in periods {
                if matches!(days, Some(d) if d < 0) {
                    errors.push(SpecValidationError::new(
                        format!("spec.retention.{name}"),
                        "retention period must not be negative",
                        format!("Set spec.retention.{name} to a number of days."),
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Status subresource for LogStorage
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogStorageStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
