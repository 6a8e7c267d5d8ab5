//! Elasticsearch curator: hourly index retention job

use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, JobSpec, JobTemplateSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, EnvVarSource, KeyToPath, PodSecurityContext, PodSpec, PodTemplateSpec,
    SecretKeySelector, SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::config::LogStorageConfig;
use super::constants::{
    images, secrets, CURATOR_NAME, CURATOR_SCHEDULE, CURATOR_SERVICE_ACCOUNT,
    ELASTICSEARCH_NAMESPACE, ELASTICSEARCH_PORT, ELASTICSEARCH_SERVICE_NAME,
};
use super::resources::{self, admission_rule, app_labels, image_pull_secrets};
use crate::crd::{PodSecurityPolicy, PodSecurityPolicySpec, Retention};

const CERT_MOUNT_PATH: &str = "/etc/ssl/elastic/";
const CERT_VOLUME: &str = "elastic-ca-cert-volume";

/// Share of disk the curator lets indices grow to before deleting the oldest
const MAX_TOTAL_STORAGE_PCT: &str = "80";
const MAX_LOGS_STORAGE_PCT: &str = "70";

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn secret_env(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: Some(secret.to_string()),
                key: key.to_string(),
                optional: None,
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Retention settings as the curator image reads them
pub fn retention_env(retention: &Retention) -> Vec<EnvVar> {
    vec![
        env(
            "EE_FLOWS_INDEX_RETENTION_PERIOD",
            retention.flows_days().to_string(),
        ),
        env(
            "EE_AUDIT_INDEX_RETENTION_PERIOD",
            retention.audit_reports_days().to_string(),
        ),
        env(
            "EE_SNAPSHOT_INDEX_RETENTION_PERIOD",
            retention.snapshots_days().to_string(),
        ),
        env(
            "EE_COMPLIANCE_REPORT_INDEX_RETENTION_PERIOD",
            retention.compliance_reports_days().to_string(),
        ),
        env("EE_MAX_TOTAL_STORAGE_PCT", MAX_TOTAL_STORAGE_PCT),
        env("EE_MAX_LOGS_STORAGE_PCT", MAX_LOGS_STORAGE_PCT),
    ]
}

fn elasticsearch_env(cfg: &LogStorageConfig) -> Vec<EnvVar> {
    vec![
        env(
            "ELASTIC_HOST",
            format!(
                "{ELASTICSEARCH_SERVICE_NAME}.{ELASTICSEARCH_NAMESPACE}.svc.{}",
                cfg.cluster_domain
            ),
        ),
        env("ELASTIC_PORT", ELASTICSEARCH_PORT.to_string()),
        env("ELASTIC_SSL", "true"),
        env("ES_CA_CERT", format!("{CERT_MOUNT_PATH}ca.pem")),
        secret_env("ES_CURATOR_USERNAME", secrets::CURATOR_USER, "username"),
        secret_env("ES_CURATOR_PASSWORD", secrets::CURATOR_USER, "password"),
    ]
}

pub fn build_cron_job(cfg: &LogStorageConfig) -> CronJob {
    let retention = cfg
        .log_storage
        .as_ref()
        .map(|ls| ls.spec.retention_or_default())
        .unwrap_or_default();

    let mut env = retention_env(&retention);
    env.extend(elasticsearch_env(cfg));

    let container = Container {
        name: CURATOR_NAME.to_string(),
        image: Some(cfg.image(images::CURATOR)),
        env: Some(env),
        volume_mounts: Some(vec![VolumeMount {
            name: CERT_VOLUME.to_string(),
            mount_path: CERT_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        }]),
        ..Default::default()
    };

    let pod = PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(app_labels(CURATOR_NAME)),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            service_account_name: Some(CURATOR_SERVICE_ACCOUNT.to_string()),
            image_pull_secrets: image_pull_secrets(cfg),
            restart_policy: Some("OnFailure".to_string()),
            security_context: Some(PodSecurityContext {
                run_as_non_root: Some(true),
                run_as_user: Some(10001),
                ..Default::default()
            }),
            containers: vec![container],
            volumes: Some(vec![Volume {
                name: CERT_VOLUME.to_string(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(secrets::ELASTICSEARCH_PUBLIC_CERT.to_string()),
                    items: Some(vec![KeyToPath {
                        key: "tls.crt".to_string(),
                        path: "ca.pem".to_string(),
                        mode: None,
                    }]),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    };

    CronJob {
        metadata: ObjectMeta {
            name: Some(CURATOR_NAME.to_string()),
            namespace: Some(ELASTICSEARCH_NAMESPACE.to_string()),
            ..Default::default()
        },
        spec: Some(CronJobSpec {
            schedule: CURATOR_SCHEDULE.to_string(),
            concurrency_policy: Some("Forbid".to_string()),
            successful_jobs_history_limit: Some(3),
            failed_jobs_history_limit: Some(3),
            job_template: JobTemplateSpec {
                metadata: None,
                spec: Some(JobSpec {
                    template: pod,
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

pub fn build_cluster_role(cfg: &LogStorageConfig) -> ClusterRole {
    resources::build_cluster_role(
        CURATOR_NAME,
        vec![admission_rule(&cfg.provider, CURATOR_NAME, "restricted")],
    )
}

pub fn build_cluster_role_binding() -> ClusterRoleBinding {
    resources::build_cluster_role_binding(
        CURATOR_NAME,
        CURATOR_NAME,
        CURATOR_SERVICE_ACCOUNT,
        ELASTICSEARCH_NAMESPACE,
    )
}

pub fn build_pod_security_policy() -> PodSecurityPolicy {
    resources::build_pod_security_policy(CURATOR_NAME, PodSecurityPolicySpec::restricted())
}
