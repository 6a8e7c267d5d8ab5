//! Kubernetes resource builders shared by the log storage components
//!
//! Namespaces, secret copies, RBAC, pod security policies and the small
//! services and config maps that surround the Elasticsearch and Kibana
//! custom resources.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    ConfigMap, LocalObjectReference, Namespace, Secret, Service, ServiceAccount, ServiceSpec,
};
use k8s_openapi::api::rbac::v1::{
    ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::config::{ClusterConfig, LogStorageConfig};
use super::constants::{
    CLUSTER_CONFIG_MAP_NAME, CSR_CREATOR_CLUSTER_ROLE, ELASTICSEARCH_NAMESPACE,
    ES_GATEWAY_SERVICE_NAME, ES_MANAGER_ROLE, ES_MANAGER_ROLE_BINDING, GUARDIAN_NAMESPACE,
    GUARDIAN_SERVICE_NAME, MANAGER_NAMESPACE, MANAGER_SERVICE_ACCOUNT, OPERATOR_NAMESPACE,
};
use crate::crd::{PodSecurityPolicy, PodSecurityPolicySpec, Provider};

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";

/// Selector label used by every log storage workload
pub const APP_LABEL: &str = "k8s-app";

pub fn app_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_string(), name.to_string())])
}

fn meta(name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        ..Default::default()
    }
}

pub(crate) fn rule(groups: &[&str], resources: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(groups.iter().map(|g| g.to_string()).collect()),
        resources: Some(resources.iter().map(|r| r.to_string()).collect()),
        verbs: verbs.iter().map(|v| v.to_string()).collect(),
        ..Default::default()
    }
}

fn named_rule(groups: &[&str], resources: &[&str], names: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        resource_names: Some(names.iter().map(|n| n.to_string()).collect()),
        ..rule(groups, resources, verbs)
    }
}

// ============================================================================
// Namespaces and secrets
// ============================================================================

pub fn build_namespace(name: &str) -> Namespace {
    Namespace {
        metadata: meta(name, None),
        ..Default::default()
    }
}

/// Copy a secret into `namespace`, keeping only its name, labels and payload
pub fn copy_secret(secret: &Secret, namespace: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: secret.metadata.name.clone(),
            namespace: Some(namespace.to_string()),
            labels: secret.metadata.labels.clone(),
            ..Default::default()
        },
        data: secret.data.clone(),
        string_data: secret.string_data.clone(),
        type_: secret.type_.clone(),
        immutable: None,
    }
}

pub fn copy_secrets(secrets: &[Secret], namespace: &str) -> Vec<Secret> {
    secrets.iter().map(|s| copy_secret(s, namespace)).collect()
}

/// Provided secrets emitted as given, with only server-populated fields dropped
pub fn provided_secrets(secrets: &[Secret]) -> Vec<Secret> {
    secrets
        .iter()
        .map(|s| {
            let namespace = s.metadata.namespace.as_deref().unwrap_or(OPERATOR_NAMESPACE);
            copy_secret(s, namespace)
        })
        .collect()
}

/// Pod references to the pull secrets copied into each namespace
pub fn image_pull_secrets(cfg: &LogStorageConfig) -> Option<Vec<LocalObjectReference>> {
    let refs: Vec<_> = cfg
        .pull_secrets
        .iter()
        .filter_map(|s| s.metadata.name.clone())
        .map(|name| LocalObjectReference { name: Some(name) })
        .collect();
    (!refs.is_empty()).then_some(refs)
}

pub fn build_service_account(name: &str, namespace: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: meta(name, Some(namespace)),
        ..Default::default()
    }
}

// ============================================================================
// RBAC
// ============================================================================

/// Rule allowing the bound account to run pods under its admission policy
pub fn admission_rule(provider: &Provider, psp_name: &str, scc: &str) -> PolicyRule {
    if provider.uses_pod_security_policies() {
        named_rule(&["policy"], &["podsecuritypolicies"], &[psp_name], &["use"])
    } else {
        named_rule(
            &["security.openshift.io"],
            &["securitycontextconstraints"],
            &[scc],
            &["use"],
        )
    }
}

pub fn build_cluster_role(name: &str, rules: Vec<PolicyRule>) -> ClusterRole {
    ClusterRole {
        metadata: meta(name, None),
        rules: Some(rules),
        ..Default::default()
    }
}

/// Cluster role binding granting `role` to one service account
pub fn build_cluster_role_binding(
    name: &str,
    role: &str,
    service_account: &str,
    namespace: &str,
) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: meta(name, None),
        role_ref: RoleRef {
            api_group: RBAC_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name: role.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: service_account.to_string(),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }]),
    }
}

/// Cluster role and binding that let an application's pods pass admission
pub fn application_rbac(
    account: &str,
    namespace: &str,
    provider: &Provider,
    scc: &str,
) -> (ClusterRoleBinding, ClusterRole) {
    (
        build_cluster_role_binding(account, account, account, namespace),
        build_cluster_role(account, vec![admission_rule(provider, account, scc)]),
    )
}

/// Role letting the manager read the Elasticsearch elastic user and certificates
pub fn build_es_manager_role() -> Role {
    Role {
        metadata: meta(ES_MANAGER_ROLE, Some(ELASTICSEARCH_NAMESPACE)),
        rules: Some(vec![rule(&[""], &["secrets"], &["get", "list", "watch"])]),
    }
}

pub fn build_es_manager_role_binding() -> RoleBinding {
    RoleBinding {
        metadata: meta(ES_MANAGER_ROLE_BINDING, Some(ELASTICSEARCH_NAMESPACE)),
        role_ref: RoleRef {
            api_group: RBAC_GROUP.to_string(),
            kind: "Role".to_string(),
            name: ES_MANAGER_ROLE.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: MANAGER_SERVICE_ACCOUNT.to_string(),
            namespace: Some(MANAGER_NAMESPACE.to_string()),
            ..Default::default()
        }]),
    }
}

/// Binding that lets an application's init containers submit CSRs
pub fn build_csr_creator_binding(account: &str, namespace: &str) -> ClusterRoleBinding {
    build_cluster_role_binding(
        &format!("{account}:csr-creator"),
        CSR_CREATOR_CLUSTER_ROLE,
        account,
        namespace,
    )
}

// ============================================================================
// Pod security policies
// ============================================================================

pub fn build_pod_security_policy(name: &str, spec: PodSecurityPolicySpec) -> PodSecurityPolicy {
    let mut psp = PodSecurityPolicy::new(name, spec);
    psp.metadata.annotations = Some(BTreeMap::from([(
        "seccomp.security.alpha.kubernetes.io/allowedProfileNames".to_string(),
        "*".to_string(),
    )]));
    psp
}

/// Policy for Elasticsearch, whose OS settings init container is privileged
pub fn elasticsearch_psp_spec() -> PodSecurityPolicySpec {
    PodSecurityPolicySpec {
        privileged: true,
        allow_privilege_escalation: Some(true),
        required_drop_capabilities: Vec::new(),
        run_as_user: crate::crd::psp::StrategyOptions::rule("RunAsAny"),
        ..PodSecurityPolicySpec::restricted()
    }
}

// ============================================================================
// Config maps and services
// ============================================================================

/// Index layout shared with the components that write to Elasticsearch
pub fn build_cluster_config_map(config: &ClusterConfig) -> ConfigMap {
    ConfigMap {
        metadata: meta(CLUSTER_CONFIG_MAP_NAME, Some(OPERATOR_NAMESPACE)),
        data: Some(BTreeMap::from([
            ("clusterName".to_string(), config.cluster_name.clone()),
            ("replicas".to_string(), config.replicas.to_string()),
            ("shards".to_string(), config.shards.to_string()),
            ("flowShards".to_string(), config.flow_shards.to_string()),
        ])),
        ..Default::default()
    }
}

/// ExternalName service routing Elasticsearch traffic to the Guardian tunnel
pub fn build_gateway_external_service(cfg: &LogStorageConfig) -> Service {
    Service {
        metadata: meta(ES_GATEWAY_SERVICE_NAME, Some(ELASTICSEARCH_NAMESPACE)),
        spec: Some(ServiceSpec {
            type_: Some("ExternalName".to_string()),
            external_name: Some(format!(
                "{GUARDIAN_SERVICE_NAME}.{GUARDIAN_NAMESPACE}.svc.{}",
                cfg.cluster_domain
            )),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Whether an observed service is an ExternalName left over from a managed setup
pub fn is_external_name(service: &Service) -> bool {
    service
        .spec
        .as_ref()
        .and_then(|s| s.type_.as_deref())
        == Some("ExternalName")
}
