//! Kibana custom resource builder

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Affinity, Container, HTTPGetAction, PodAffinityTerm, PodAntiAffinity, PodSpec,
    PodTemplateSpec, Probe, WeightedPodAffinityTerm,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, LabelSelectorRequirement, ObjectMeta,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde_json::Value;

use super::config::LogStorageConfig;
use super::constants::{
    images, secrets, ELASTICSEARCH_NAME, ELASTICSEARCH_NAMESPACE, KIBANA_ACCOUNT, KIBANA_BASE_PATH,
    KIBANA_NAME, KIBANA_NAMESPACE, KIBANA_PORT,
};
use super::dex::{self, DexRelyingPartyConfig};
use super::resources::{app_labels, image_pull_secrets, APP_LABEL};
use crate::crd::eck::{self, Config, ObjectSelector};
use crate::crd::{Kibana, KibanaSpec};

const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";

/// Prefer spreading replicas of `name` in `namespace` across nodes
pub fn pod_anti_affinity(name: &str, namespace: &str) -> Affinity {
    Affinity {
        pod_anti_affinity: Some(PodAntiAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(vec![
                WeightedPodAffinityTerm {
                    weight: 100,
                    pod_affinity_term: PodAffinityTerm {
                        label_selector: Some(LabelSelector {
                            match_expressions: Some(vec![LabelSelectorRequirement {
                                key: APP_LABEL.to_string(),
                                operator: "In".to_string(),
                                values: Some(vec![name.to_string()]),
                            }]),
                            ..Default::default()
                        }),
                        namespaces: Some(vec![namespace.to_string()]),
                        topology_key: HOSTNAME_TOPOLOGY_KEY.to_string(),
                        ..Default::default()
                    },
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn kibana_config(sso: Option<&DexRelyingPartyConfig>) -> Config {
    let mut config: Config = BTreeMap::from([
        (
            "server.basePath".to_string(),
            Value::from(format!("/{KIBANA_BASE_PATH}")),
        ),
        ("server.rewriteBasePath".to_string(), Value::from(true)),
        (
            "xpack.security.session.lifespan".to_string(),
            Value::from("8h"),
        ),
        (
            "xpack.security.session.idleTimeout".to_string(),
            Value::from("30m"),
        ),
    ]);
    if sso.is_some() {
        config.insert(
            "xpack.security.authc.providers".to_string(),
            dex::kibana_auth_providers(),
        );
    }
    config
}

pub fn build_kibana(cfg: &LogStorageConfig, sso: Option<&DexRelyingPartyConfig>) -> Kibana {
    let replicas = cfg.control_plane_replicas();

    let container = Container {
        name: "kibana".to_string(),
        readiness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some(format!("/{KIBANA_BASE_PATH}/login")),
                port: IntOrString::Int(KIBANA_PORT),
                scheme: Some("HTTPS".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    };

    let mut kibana = Kibana::new(
        KIBANA_NAME,
        KibanaSpec {
            version: images::KIBANA_VERSION.to_string(),
            image: Some(cfg.image(images::KIBANA)),
            count: replicas,
            elasticsearch_ref: Some(ObjectSelector {
                name: ELASTICSEARCH_NAME.to_string(),
                namespace: Some(ELASTICSEARCH_NAMESPACE.to_string()),
            }),
            config: Some(kibana_config(sso)),
            http: Some(eck::http_tls(secrets::KIBANA_CERT)),
            pod_template: Some(PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(app_labels(KIBANA_NAME)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(KIBANA_ACCOUNT.to_string()),
                    image_pull_secrets: image_pull_secrets(cfg),
                    containers: vec![container],
                    affinity: (replicas > 1)
                        .then(|| pod_anti_affinity(KIBANA_NAME, KIBANA_NAMESPACE)),
                    ..Default::default()
                }),
            }),
        },
    );
    kibana.metadata.namespace = Some(KIBANA_NAMESPACE.to_string());
    kibana
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::InstallationSpec;

    fn cfg_with_replicas(replicas: Option<i32>) -> LogStorageConfig {
        LogStorageConfig {
            installation: InstallationSpec {
                control_plane_replicas: replicas,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn affinity(kibana: &Kibana) -> Option<Affinity> {
        kibana
            .spec
            .pod_template
            .as_ref()
            .and_then(|t| t.spec.as_ref())
            .and_then(|s| s.affinity.clone())
    }

    #[test]
    fn test_single_replica_has_no_affinity() {
        for replicas in [None, Some(1)] {
            let kibana = build_kibana(&cfg_with_replicas(replicas), None);
            assert_eq!(kibana.spec.count, 1);
            assert!(affinity(&kibana).is_none());
        }
    }

    #[test]
    fn test_multiple_replicas_spread_across_hosts() {
        let kibana = build_kibana(&cfg_with_replicas(Some(2)), None);
        assert_eq!(kibana.spec.count, 2);
        assert_eq!(
            affinity(&kibana),
            Some(pod_anti_affinity("tigera-secure", "tigera-kibana"))
        );
    }

    #[test]
    fn test_auth_providers_only_with_sso() {
        let rp = DexRelyingPartyConfig::default();
        let with = build_kibana(&LogStorageConfig::default(), Some(&rp));
        let without = build_kibana(&LogStorageConfig::default(), None);
        assert!(with
            .spec
            .config
            .unwrap()
            .contains_key("xpack.security.authc.providers"));
        assert!(!without
            .spec
            .config
            .unwrap()
            .contains_key("xpack.security.authc.providers"));
    }
}
