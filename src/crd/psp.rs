//! `policy/v1beta1` PodSecurityPolicy
//!
//! The type was removed from the Kubernetes API packages, but clusters that
//! still enforce pod security through admission need it rendered.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "policy",
    version = "v1beta1",
    kind = "PodSecurityPolicy",
    plural = "podsecuritypolicies",
    derive = "PartialEq",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct PodSecurityPolicySpec {
    #[serde(default)]
    pub privileged: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_privilege_escalation: Option<bool>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_drop_capabilities: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,

    #[serde(default)]
    pub host_network: bool,

    #[serde(default, rename = "hostIPC")]
    pub host_ipc: bool,

    #[serde(default, rename = "hostPID")]
    pub host_pid: bool,

    pub run_as_user: StrategyOptions,

    #[serde(rename = "seLinux")]
    pub se_linux: StrategyOptions,

    pub supplemental_groups: StrategyOptions,

    pub fs_group: StrategyOptions,

    #[serde(default)]
    pub read_only_root_filesystem: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StrategyOptions {
    pub rule: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ranges: Vec<IdRange>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IdRange {
    pub min: i64,
    pub max: i64,
}

impl StrategyOptions {
    pub fn rule(rule: &str) -> Self {
        Self {
            rule: rule.to_string(),
            ranges: Vec::new(),
        }
    }

    /// `MustRunAs` over the non-root id range
    pub fn must_run_as_non_root_range() -> Self {
        Self {
            rule: "MustRunAs".to_string(),
            ranges: vec![IdRange { min: 1, max: 65535 }],
        }
    }
}

impl PodSecurityPolicySpec {
    /// Baseline policy: unprivileged, no host namespaces, non-root
    pub fn restricted() -> Self {
        Self {
            privileged: false,
            allow_privilege_escalation: Some(false),
            required_drop_capabilities: vec!["ALL".to_string()],
            volumes: [
                "configMap",
                "emptyDir",
                "projected",
                "secret",
                "downwardAPI",
                "persistentVolumeClaim",
            ]
            .iter()
            .map(|v| v.to_string())
            .collect(),
            host_network: false,
            host_ipc: false,
            host_pid: false,
            run_as_user: StrategyOptions::rule("MustRunAsNonRoot"),
            se_linux: StrategyOptions::rule("RunAsAny"),
            supplemental_groups: StrategyOptions::must_run_as_non_root_range(),
            fs_group: StrategyOptions::must_run_as_non_root_range(),
            read_only_root_filesystem: false,
        }
    }
}
