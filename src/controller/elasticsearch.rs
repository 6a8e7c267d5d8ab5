//! Elasticsearch custom resource builder
//!
//! One ECK node set is rendered per resolved node group. All node sets share
//! the normalized compute and storage requirements; placement and awareness
//! settings come from each group's selection attributes.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Affinity, Container, EmptyDirVolumeSource, EnvVar, EnvVarSource, ObjectFieldSelector,
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec, PodTemplateSpec,
    ResourceRequirements, Secret, SecurityContext, Volume, VolumeMount,
    VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::config::LogStorageConfig;
use super::constants::{
    images, init_containers, secrets, volumes, CSR_MOUNT_PATH, ELASTICSEARCH_ACCOUNT,
    ELASTICSEARCH_NAME, ELASTICSEARCH_NAMESPACE, ELASTICSEARCH_SERVICE_NAME,
};
use super::dex::{self, DexRelyingPartyConfig};
use super::nodesets::{self, ResolvedNodeGroup};
use super::normalizer::{self, ResourceDefaults, MEMORY, STORAGE};
use super::resources::{app_labels, image_pull_secrets};
use crate::crd::eck::{self, Config, SecretSource};
use crate::crd::{CertificateManagement, Elasticsearch, ElasticsearchNodeSet, ElasticsearchSpec};
use crate::error::{Error, Result};

const RESOURCES_FIELD: &str = "spec.nodes.resourceRequirements";
const HEAP_ENV: &str = "ES_JAVA_OPTS";
/// Digest characters kept in node set names
const NODE_SET_NAME_LEN: usize = 16;

/// Compute and storage requirements of every Elasticsearch node
#[derive(Clone, Debug, PartialEq)]
pub struct NodeResources {
    pub compute: ResourceRequirements,
    pub storage: VolumeResourceRequirements,
}

/// Normalize the user's node requirements, split into compute and storage
pub fn node_resources(user: Option<&ResourceRequirements>) -> Result<NodeResources> {
    let compute = normalizer::normalize(
        Some(&normalizer::select_dimensions(user, |d| d != STORAGE)),
        &ResourceDefaults::elasticsearch_compute(),
        RESOURCES_FIELD,
    )?;
    let storage = normalizer::normalize(
        Some(&normalizer::select_dimensions(user, |d| d == STORAGE)),
        &ResourceDefaults::elasticsearch_storage(),
        RESOURCES_FIELD,
    )?;
    Ok(NodeResources {
        compute,
        storage: VolumeResourceRequirements {
            limits: storage.limits,
            requests: storage.requests,
        },
    })
}

/// JVM heap flags derived from the normalized memory request
pub fn heap_options(compute: &ResourceRequirements) -> Result<String> {
    let memory = memory_request(compute)
        .ok_or_else(|| Error::ConfigError("normalized compute block has no memory request".to_string()))?;
    normalizer::jvm_heap_options(memory, &format!("{RESOURCES_FIELD}.requests.{MEMORY}"))
}

pub fn build_volume_claim_template(
    storage_class: &str,
    storage: &VolumeResourceRequirements,
) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(volumes::ELASTICSEARCH_DATA.to_string()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: Some(storage_class.to_string()),
            resources: Some(storage.clone()),
            ..Default::default()
        }),
        status: None,
    }
}

/// Node set name prefix derived from the volume claim template.
///
/// ECK cannot resize volumes in place, so a storage change must surface as a
/// new node set.
pub fn node_set_base_name(template: &PersistentVolumeClaim) -> Result<String> {
    let encoded = serde_json::to_vec(template)?;
    let digest = hex::encode(Sha256::digest(&encoded));
    Ok(digest[..NODE_SET_NAME_LEN].to_string())
}

/// Settings common to every node plus the group's awareness attributes
pub fn node_config(
    group: &ResolvedNodeGroup,
    sso: Option<&DexRelyingPartyConfig>,
    cluster_domain: &str,
) -> Config {
    let mut config: Config = BTreeMap::from([
        ("node.master".to_string(), Value::from("true")),
        ("node.data".to_string(), Value::from("true")),
        ("node.ingest".to_string(), Value::from("true")),
        ("cluster.max_shards_per_node".to_string(), Value::from(10000)),
    ]);
    config.extend(group.awareness_config());
    if let Some(rp) = sso {
        config.insert(dex::realm_key(), rp.realm_config(cluster_domain));
    }
    config
}

fn privileged_init(name: &str, image: String, script: &str) -> Container {
    Container {
        name: name.to_string(),
        image: Some(image),
        command: Some(vec!["/bin/sh".to_string()]),
        args: Some(vec!["-c".to_string(), script.to_string()]),
        security_context: Some(SecurityContext {
            privileged: Some(true),
            run_as_user: Some(0),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn field_env(name: &str, path: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: path.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

/// Init container requesting a key pair and certificate through the CSR API
fn csr_init_container(
    cfg: &LogStorageConfig,
    cm: &CertificateManagement,
    name: &str,
    volume: &str,
    common_name: String,
) -> Container {
    let domain = &cfg.cluster_domain;
    let short = common_name
        .split('.')
        .next()
        .unwrap_or_default()
        .to_string();
    let dns_names = [
        short.clone(),
        format!("{short}.{ELASTICSEARCH_NAMESPACE}"),
        format!("{short}.{ELASTICSEARCH_NAMESPACE}.svc"),
        format!("{short}.{ELASTICSEARCH_NAMESPACE}.svc.{domain}"),
    ]
    .join(",");

    Container {
        name: name.to_string(),
        image: Some(cfg.image(images::CSR_INIT)),
        env: Some(vec![
            env("SIGNER", cm.signer_name.clone()),
            env("COMMON_NAME", common_name),
            env("DNS_NAMES", dns_names),
            env(
                "KEY_ALGORITHM",
                cm.key_algorithm.clone().unwrap_or_default(),
            ),
            env(
                "SIGNATURE_ALGORITHM",
                cm.signature_algorithm.clone().unwrap_or_default(),
            ),
            env("CERTPATH", format!("{CSR_MOUNT_PATH}/tls.crt")),
            env("KEYPATH", format!("{CSR_MOUNT_PATH}/tls.key")),
            env("CACERTPATH", format!("{CSR_MOUNT_PATH}/ca.crt")),
            field_env("POD_IP", "status.podIP"),
            field_env("POD_NAME", "metadata.name"),
            field_env("POD_NAMESPACE", "metadata.namespace"),
        ]),
        volume_mounts: Some(vec![VolumeMount {
            name: volume.to_string(),
            mount_path: CSR_MOUNT_PATH.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

/// Init containers in the order ECK merges them with its own defaults
pub fn init_containers(
    cfg: &LogStorageConfig,
    sso: Option<&DexRelyingPartyConfig>,
) -> Vec<Container> {
    let image = cfg.image(images::ELASTICSEARCH);
    let mut containers = vec![privileged_init(
        init_containers::OS_SETTINGS,
        image.clone(),
        "sysctl -w vm.max_map_count=262144",
    )];

    if sso.is_some() {
        containers.push(Container {
            name: init_containers::KEYSTORE.to_string(),
            security_context: Some(SecurityContext {
                privileged: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    if let Some(cm) = &cfg.installation.certificate_management {
        containers.push(Container {
            name: init_containers::FILESYSTEM.to_string(),
            volume_mounts: Some(vec![VolumeMount {
                name: volumes::TRANSPORT_CERTIFICATES.to_string(),
                mount_path: "/csr".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        });
        containers.push(csr_init_container(
            cfg,
            cm,
            init_containers::HTTP_CSR,
            volumes::HTTP_CERTIFICATES,
            format!("{ELASTICSEARCH_SERVICE_NAME}.{ELASTICSEARCH_NAMESPACE}.svc"),
        ));
        containers.push(csr_init_container(
            cfg,
            cm,
            init_containers::TRANSPORT_CSR,
            volumes::TRANSPORT_CERTIFICATES,
            format!("{ELASTICSEARCH_NAME}-es-transport.{ELASTICSEARCH_NAMESPACE}.svc"),
        ));
    }

    containers.push(privileged_init(
        init_containers::SELINUX_CONTEXT,
        image,
        "chcon -Rt svirt_sandbox_file_t /usr/share/elasticsearch/logs /usr/share/elasticsearch/data || true",
    ));
    containers
}

fn certificate_volumes(cfg: &LogStorageConfig) -> Option<Vec<Volume>> {
    cfg.installation.certificate_management.as_ref()?;
    Some(
        [volumes::HTTP_CERTIFICATES, volumes::TRANSPORT_CERTIFICATES]
            .iter()
            .map(|name| Volume {
                name: name.to_string(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Default::default()
            })
            .collect(),
    )
}

fn pod_template(
    cfg: &LogStorageConfig,
    group: &ResolvedNodeGroup,
    resources: &NodeResources,
    heap: &str,
    sso: Option<&DexRelyingPartyConfig>,
) -> Result<PodTemplateSpec> {
    let spec = &cfg.log_storage()?.spec;

    let container = Container {
        name: "elasticsearch".to_string(),
        env: Some(vec![env(HEAP_ENV, heap)]),
        resources: Some(resources.compute.clone()),
        ..Default::default()
    };

    Ok(PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(app_labels(ELASTICSEARCH_NAME)),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            service_account_name: Some(ELASTICSEARCH_ACCOUNT.to_string()),
            image_pull_secrets: image_pull_secrets(cfg),
            init_containers: Some(init_containers(cfg, sso)),
            containers: vec![container],
            volumes: certificate_volumes(cfg),
            node_selector: spec.data_node_selector.clone().filter(|s| !s.is_empty()),
            affinity: group.node_affinity().map(|node_affinity| Affinity {
                node_affinity: Some(node_affinity),
                ..Default::default()
            }),
            ..Default::default()
        }),
    })
}

/// Build the Elasticsearch resource; `sso` is the active relying party, if any
pub fn build_elasticsearch(
    cfg: &LogStorageConfig,
    sso: Option<&DexRelyingPartyConfig>,
) -> Result<Elasticsearch> {
    let spec = &cfg.log_storage()?.spec;
    let nodes = spec.nodes_or_default();

    let resources = node_resources(nodes.resource_requirements.as_ref())?;
    let heap = heap_options(&resources.compute)?;
    let groups = nodesets::partition(nodes.count, &nodes.node_sets)?;

    let template = build_volume_claim_template(spec.storage_class(), &resources.storage);
    let base_name = node_set_base_name(&template)?;
    let multiple = groups.len() > 1;

    let node_sets = groups
        .iter()
        .map(|group| {
            let name = if multiple {
                format!("{base_name}-{}", group.index)
            } else {
                base_name.clone()
            };
            debug!(node_set = %name, count = group.count, "Rendering node set");
            Ok(ElasticsearchNodeSet {
                name,
                count: group.count,
                config: Some(node_config(group, sso, &cfg.cluster_domain)),
                pod_template: Some(pod_template(cfg, group, &resources, &heap, sso)?),
                volume_claim_templates: vec![template.clone()],
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut es = Elasticsearch::new(
        ELASTICSEARCH_NAME,
        ElasticsearchSpec {
            version: images::ELASTICSEARCH_VERSION.to_string(),
            image: Some(cfg.image(images::ELASTICSEARCH)),
            http: Some(eck::http_tls(secrets::ELASTICSEARCH_CERT)),
            node_sets,
            secure_settings: sso
                .map(|_| {
                    vec![SecretSource {
                        secret_name: secrets::ELASTICSEARCH_SECURE_SETTINGS.to_string(),
                    }]
                })
                .unwrap_or_default(),
        },
    );
    es.metadata.namespace = Some(ELASTICSEARCH_NAMESPACE.to_string());
    Ok(es)
}

/// Secret ECK loads into the keystore, holding the relying-party client secret
pub fn build_secure_settings_secret(rp: &DexRelyingPartyConfig) -> Option<Secret> {
    let value = rp.client_secret_value()?;
    Some(Secret {
        metadata: ObjectMeta {
            name: Some(secrets::ELASTICSEARCH_SECURE_SETTINGS.to_string()),
            namespace: Some(ELASTICSEARCH_NAMESPACE.to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(dex::client_secret_setting(), value.clone())])),
        ..Default::default()
    })
}

/// Memory request the heap is derived from
pub fn memory_request(compute: &ResourceRequirements) -> Option<&Quantity> {
    compute.requests.as_ref().and_then(|r| r.get(MEMORY))
}
