//! Configuration snapshot consumed by the renderer
//!
//! A `LogStorageConfig` is assembled by the caller from the LogStorage
//! resource, the installation, provided secrets and the observed state of the
//! child resources. The renderer only ever reads it.

use std::path::Path;

use k8s_openapi::api::core::v1::{Secret, Service};
use serde::{Deserialize, Serialize};

use super::dex::DexRelyingPartyConfig;
use crate::crd::{Elasticsearch, InstallationSpec, Kibana, LicenseType, LogStorage, Provider};
use crate::error::{Error, Result};

pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";

/// Whether this cluster stores its own logs or ships them to a management cluster
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum FederationRole {
    #[default]
    Standalone,
    /// Logs are stored by the management cluster, reached through Guardian
    Managed,
}

/// Index layout published to the rest of the product
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    pub cluster_name: String,
    pub replicas: i32,
    pub shards: i32,
    pub flow_shards: i32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_name: "cluster".to_string(),
            replicas: 0,
            shards: 1,
            flow_shards: 1,
        }
    }
}

/// Readiness of the child resources as reported by ECK
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Readiness {
    pub elasticsearch: bool,
    pub kibana: bool,
}

impl Readiness {
    pub fn all_ready(&self) -> bool {
        self.elasticsearch && self.kibana
    }
}

/// Logical purpose of a provided secret
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SecretRole {
    /// Elasticsearch TLS material, emitted as given
    Elasticsearch,
    /// Kibana serving certificate, provided in the operator namespace
    KibanaCert,
    /// Kibana public certificate mirrored back to the operator namespace
    KibanaPublicCert,
    /// Curator credentials and the Elasticsearch public certificate it trusts
    Curator,
    /// Image pull secrets copied into every namespace with workloads
    Pull,
    /// Dex relying-party client secret
    DexClient,
}

impl SecretRole {
    pub const ALL: [SecretRole; 6] = [
        SecretRole::Elasticsearch,
        SecretRole::KibanaCert,
        SecretRole::KibanaPublicCert,
        SecretRole::Curator,
        SecretRole::Pull,
        SecretRole::DexClient,
    ];
}

/// Source of secrets the renderer references but never creates itself
pub trait SecretProvider {
    /// Secrets provided for `role`, in the order they were supplied
    fn provided(&self, role: SecretRole) -> &[Secret];

    /// Look up a provided secret by name and owning namespace
    fn lookup(&self, name: &str, namespace: &str) -> Option<&Secret> {
        SecretRole::ALL
            .iter()
            .flat_map(|role| self.provided(*role))
            .find(|s| {
                s.metadata.name.as_deref() == Some(name)
                    && s.metadata.namespace.as_deref() == Some(namespace)
            })
    }
}

/// Immutable input of one synthesis call
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogStorageConfig {
    pub log_storage: Option<LogStorage>,
    pub installation: InstallationSpec,
    pub federation: FederationRole,
    pub provider: Provider,
    pub cluster_domain: String,
    pub license: LicenseType,
    pub cluster_config: ClusterConfig,

    pub elasticsearch_secrets: Vec<Secret>,
    pub kibana_cert_secret: Option<Secret>,
    pub kibana_public_cert_secret: Option<Secret>,
    pub curator_secrets: Vec<Secret>,
    pub pull_secrets: Vec<Secret>,

    /// Single sign-on relying party, when an Authentication resource exists
    pub dex: Option<DexRelyingPartyConfig>,

    /// Child resources as currently observed in the cluster
    pub elasticsearch: Option<Elasticsearch>,
    pub kibana: Option<Kibana>,
    pub es_service: Option<Service>,
    pub kb_service: Option<Service>,
    /// Observed OIDC secure-settings secret
    pub oidc_secret: Option<Secret>,
    pub readiness: Readiness,
}

impl Default for LogStorageConfig {
    fn default() -> Self {
        Self {
            log_storage: None,
            installation: InstallationSpec::default(),
            federation: FederationRole::default(),
            provider: Provider::default(),
            cluster_domain: DEFAULT_CLUSTER_DOMAIN.to_string(),
            license: LicenseType::default(),
            cluster_config: ClusterConfig::default(),
            elasticsearch_secrets: Vec::new(),
            kibana_cert_secret: None,
            kibana_public_cert_secret: None,
            curator_secrets: Vec::new(),
            pull_secrets: Vec::new(),
            dex: None,
            elasticsearch: None,
            kibana: None,
            es_service: None,
            kb_service: None,
            oidc_secret: None,
            readiness: Readiness::default(),
        }
    }
}

impl LogStorageConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    /// The LogStorage resource, which every synthesis requires
    pub fn log_storage(&self) -> Result<&LogStorage> {
        self.log_storage
            .as_ref()
            .ok_or_else(|| Error::ConfigError("no LogStorage resource in configuration".to_string()))
    }

    /// Shape checks on the snapshot before anything is rendered
    ///
    /// A managed cluster only renders the gateway to the management cluster,
    /// so neither the LogStorage nor the installation is consulted there.
    pub fn validate(&self) -> Result<()> {
        if self.cluster_domain.trim().is_empty() {
            return Err(Error::validation(
                "clusterDomain",
                "cluster domain must not be empty",
                "Set clusterDomain, usually \"cluster.local\".",
            ));
        }
        if self.federation == FederationRole::Managed {
            return Ok(());
        }

        let log_storage = self.log_storage()?;
        log_storage
            .spec
            .validate()
            .map_err(Error::ValidationError)?;

        if matches!(self.installation.control_plane_replicas, Some(r) if r < 1) {
            return Err(Error::validation(
                "installation.controlPlaneReplicas",
                "control plane replicas must be at least one",
                "Set controlPlaneReplicas to one or more, or leave it unset for a single replica.",
            ));
        }
        Ok(())
    }

    /// Image reference under the installation registry
    pub fn image(&self, image: &str) -> String {
        let registry = if self.installation.registry.is_empty() {
            super::constants::images::DEFAULT_REGISTRY
        } else {
            self.installation.registry.as_str()
        };
        if registry.ends_with('/') {
            format!("{registry}{image}")
        } else {
            format!("{registry}/{image}")
        }
    }

    /// Cluster config with the index replica count taken from the spec when set
    pub fn effective_cluster_config(&self) -> ClusterConfig {
        let mut config = self.cluster_config.clone();
        if let Some(replicas) = self
            .log_storage
            .as_ref()
            .and_then(|ls| ls.spec.indices.as_ref())
            .and_then(|i| i.replicas)
        {
            config.replicas = replicas;
        }
        config
    }

    pub fn certificate_management_enabled(&self) -> bool {
        self.installation.certificate_management.is_some()
    }

    /// Relying party whose client secret has been materialized, when the
    /// license allows single sign-on
    pub fn active_sso(&self) -> Option<&DexRelyingPartyConfig> {
        if !self.license.allows_sso() {
            return None;
        }
        self.dex
            .as_ref()
            .filter(|rp| rp.client_secret_value().is_some())
    }

    pub fn control_plane_replicas(&self) -> i32 {
        self.installation.control_plane_replicas.unwrap_or(1)
    }
}

impl SecretProvider for LogStorageConfig {
    fn provided(&self, role: SecretRole) -> &[Secret] {
        match role {
            SecretRole::Elasticsearch => &self.elasticsearch_secrets,
            SecretRole::KibanaCert => self.kibana_cert_secret.as_slice(),
            SecretRole::KibanaPublicCert => self.kibana_public_cert_secret.as_slice(),
            SecretRole::Curator => &self.curator_secrets,
            SecretRole::Pull => &self.pull_secrets,
            SecretRole::DexClient => self
                .dex
                .as_ref()
                .map(|rp| rp.client_secret.as_slice())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::constants::{secrets, OPERATOR_NAMESPACE};

    const SNAPSHOT: &str = r#"
logStorage:
  apiVersion: operator.tigera.io/v1
  kind: LogStorage
  metadata:
    name: tigera-secure
  spec:
    nodes:
      count: 3
    indices:
      replicas: 2
installation:
  registry: testregistry.com/
  controlPlaneReplicas: 2
license: basic
kibanaCertSecret:
  metadata:
    name: tigera-secure-kibana-cert
    namespace: tigera-operator
pullSecrets:
  - metadata:
      name: tigera-pull-secret
"#;

    #[test]
    fn test_parse_snapshot() {
        let cfg = LogStorageConfig::from_yaml_str(SNAPSHOT).unwrap();
        assert_eq!(cfg.cluster_domain, DEFAULT_CLUSTER_DOMAIN);
        assert_eq!(cfg.license, LicenseType::Basic);
        assert_eq!(cfg.federation, FederationRole::Standalone);
        assert_eq!(cfg.control_plane_replicas(), 2);
        assert_eq!(cfg.effective_cluster_config().replicas, 2);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_image_registry() {
        let mut cfg = LogStorageConfig::default();
        assert_eq!(cfg.image("tigera/kibana:7.6.2"), "quay.io/tigera/kibana:7.6.2");
        cfg.installation.registry = "my.registry".to_string();
        assert_eq!(cfg.image("tigera/kibana:7.6.2"), "my.registry/tigera/kibana:7.6.2");
    }

    #[test]
    fn test_secret_lookup_by_name_and_namespace() {
        let cfg = LogStorageConfig::from_yaml_str(SNAPSHOT).unwrap();
        assert!(cfg.lookup(secrets::KIBANA_CERT, OPERATOR_NAMESPACE).is_some());
        assert!(cfg.lookup(secrets::KIBANA_CERT, "tigera-kibana").is_none());
        assert_eq!(cfg.provided(SecretRole::Pull).len(), 1);
        assert!(cfg.provided(SecretRole::DexClient).is_empty());
    }

    #[test]
    fn test_missing_log_storage_is_config_error() {
        let cfg = LogStorageConfig::default();
        assert!(matches!(cfg.validate(), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_managed_cluster_needs_no_log_storage() {
        let cfg = LogStorageConfig {
            federation: FederationRole::Managed,
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());

        let cfg = LogStorageConfig {
            cluster_domain: " ".to_string(),
            ..cfg
        };
        assert!(matches!(cfg.validate(), Err(Error::ValidationError(_))));
    }

    #[test]
    fn test_control_plane_replicas_must_be_positive() {
        let mut cfg = LogStorageConfig::from_yaml_str(SNAPSHOT).unwrap();
        for replicas in [0, -1] {
            cfg.installation.control_plane_replicas = Some(replicas);
            match cfg.validate() {
                Err(Error::ValidationError(errors)) => {
                    assert_eq!(errors[0].field, "installation.controlPlaneReplicas");
                }
                other => panic!("expected validation error, got {other:?}"),
            }
        }

        cfg.installation.control_plane_replicas = None;
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.control_plane_replicas(), 1);
    }

    #[test]
    fn test_sso_requires_license_and_secret() {
        let mut cfg = LogStorageConfig {
            dex: Some(DexRelyingPartyConfig {
                manager_domain: "https://example.com".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(cfg.active_sso().is_none());

        if let Some(rp) = cfg.dex.as_mut() {
            rp.client_secret = Some(crate::controller::dex::create_client_secret());
        }
        assert!(cfg.active_sso().is_some());

        cfg.license = LicenseType::Basic;
        assert!(cfg.active_sso().is_none());
    }
}
