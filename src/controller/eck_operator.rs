//! The Elastic Cloud on Kubernetes operator deployment
//!
//! ECK reconciles the Elasticsearch and Kibana resources this crate renders;
//! it runs as a single-replica StatefulSet restricted to the two log storage
//! namespaces.

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, ObjectFieldSelector, PodSecurityContext,
    PodSpec, PodTemplateSpec, ResourceRequirements,
};
use k8s_openapi::api::rbac::v1::ClusterRole;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use super::config::LogStorageConfig;
use super::constants::{
    images, ECK_OPERATOR_NAME, ECK_OPERATOR_NAMESPACE, ELASTICSEARCH_NAMESPACE, KIBANA_NAMESPACE,
};
use super::normalizer::{self, ResourceDefaults};
use super::resources::{self, admission_rule, app_labels, image_pull_secrets, rule};
use crate::crd::{ComponentName, LogStorageComponentResource};
use crate::error::Result;

const CONTROL_PLANE_LABEL: &str = "control-plane";

pub fn build_cluster_role(cfg: &LogStorageConfig) -> ClusterRole {
    const ALL: &[&str] = &["get", "list", "watch", "create", "update", "patch", "delete"];

    let rules = vec![
        rule(&["authorization.k8s.io"], &["subjectaccessreviews"], &["create"]),
        rule(
            &[""],
            &[
                "pods",
                "endpoints",
                "events",
                "persistentvolumeclaims",
                "secrets",
                "services",
                "configmaps",
            ],
            ALL,
        ),
        rule(&["apps"], &["deployments", "statefulsets"], ALL),
        rule(&["policy"], &["poddisruptionbudgets"], ALL),
        rule(
            &["elasticsearch.k8s.elastic.co"],
            &["elasticsearches", "elasticsearches/status", "elasticsearches/finalizers"],
            ALL,
        ),
        rule(
            &["kibana.k8s.elastic.co"],
            &["kibanas", "kibanas/status", "kibanas/finalizers"],
            ALL,
        ),
        rule(
            &["associations.k8s.elastic.co"],
            &["apmserverelasticsearchassociations", "apmserverelasticsearchassociations/status"],
            ALL,
        ),
        admission_rule(&cfg.provider, ECK_OPERATOR_NAME, "nonroot"),
    ];

    resources::build_cluster_role(ECK_OPERATOR_NAME, rules)
}

/// Resource override for the ECK operator from `spec.componentResources`
pub fn component_override(
    component_resources: &[LogStorageComponentResource],
) -> Option<&ResourceRequirements> {
    component_resources
        .iter()
        .find(|c| c.component_name == ComponentName::ECKOperator)
        .and_then(|c| c.resource_requirements.as_ref())
}

/// Arguments of the `manager` container
pub fn manager_args(cfg: &LogStorageConfig) -> Vec<String> {
    vec![
        "manager".to_string(),
        format!("--namespaces={ELASTICSEARCH_NAMESPACE},{KIBANA_NAMESPACE}"),
        "--log-verbosity=0".to_string(),
        "--metrics-port=0".to_string(),
        format!("--container-registry={}", cfg.installation.registry),
        "--max-concurrent-reconciles=3".to_string(),
        "--ca-cert-validity=8760h".to_string(),
        "--ca-cert-rotate-before=24h".to_string(),
        "--cert-validity=8760h".to_string(),
        "--cert-rotate-before=24h".to_string(),
        "--enable-webhook=false".to_string(),
        "--manage-webhook-certs=false".to_string(),
    ]
}

pub fn build_statefulset(cfg: &LogStorageConfig) -> Result<StatefulSet> {
    let user = cfg
        .log_storage
        .as_ref()
        .and_then(|ls| component_override(&ls.spec.component_resources));
    let resources = normalizer::normalize(
        user,
        &ResourceDefaults::eck_operator(),
        "spec.componentResources[ECKOperator].resourceRequirements",
    )?;

    let mut labels = app_labels(ECK_OPERATOR_NAME);
    labels.insert(
        CONTROL_PLANE_LABEL.to_string(),
        ECK_OPERATOR_NAME.to_string(),
    );

    let container = Container {
        name: "manager".to_string(),
        image: Some(cfg.image(images::ECK_OPERATOR)),
        args: Some(manager_args(cfg)),
        env: Some(vec![
            EnvVar {
                name: "OPERATOR_NAMESPACE".to_string(),
                value_from: Some(EnvVarSource {
                    field_ref: Some(ObjectFieldSelector {
                        field_path: "metadata.namespace".to_string(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
            EnvVar {
                name: "OPERATOR_IMAGE".to_string(),
                value: Some(cfg.image(images::ECK_OPERATOR)),
                ..Default::default()
            },
        ]),
        ports: Some(vec![ContainerPort {
            container_port: 9443,
            name: Some("https-webhook".to_string()),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        resources: Some(resources),
        ..Default::default()
    };

    Ok(StatefulSet {
        metadata: ObjectMeta {
            name: Some(ECK_OPERATOR_NAME.to_string()),
            namespace: Some(ECK_OPERATOR_NAMESPACE.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            replicas: Some(1),
            service_name: ECK_OPERATOR_NAME.to_string(),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(ECK_OPERATOR_NAME.to_string()),
                    image_pull_secrets: image_pull_secrets(cfg),
                    security_context: Some(PodSecurityContext {
                        run_as_non_root: Some(true),
                        ..Default::default()
                    }),
                    termination_grace_period_seconds: Some(10),
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    })
}
