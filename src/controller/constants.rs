//! Names, namespaces and images shared by the renderers.

/// Namespace the product operator runs in; shared secrets are provided here.
pub const OPERATOR_NAMESPACE: &str = "tigera-operator";

/// Finalizer the LogStorage controller places on the LogStorage resource.
pub const LOG_STORAGE_FINALIZER: &str = "tigera.io/eck-cleanup";

pub const ECK_OPERATOR_NAME: &str = "elastic-operator";
pub const ECK_OPERATOR_NAMESPACE: &str = "tigera-eck-operator";

pub const ELASTICSEARCH_NAME: &str = "tigera-secure";
pub const ELASTICSEARCH_NAMESPACE: &str = "tigera-elasticsearch";
pub const ELASTICSEARCH_SERVICE_NAME: &str = "tigera-secure-es-http";
pub const ELASTICSEARCH_PORT: i32 = 9200;
/// Service account and RBAC name of the Elasticsearch pods.
pub const ELASTICSEARCH_ACCOUNT: &str = "tigera-elasticsearch";

pub const KIBANA_NAME: &str = "tigera-secure";
pub const KIBANA_NAMESPACE: &str = "tigera-kibana";
pub const KIBANA_BASE_PATH: &str = "tigera-kibana";
pub const KIBANA_PORT: i32 = 5601;
pub const KIBANA_ACCOUNT: &str = "tigera-kibana";

pub const ES_GATEWAY_SERVICE_NAME: &str = "tigera-secure-es-gateway-http";
pub const GUARDIAN_SERVICE_NAME: &str = "tigera-guardian";
pub const GUARDIAN_NAMESPACE: &str = "tigera-guardian";

pub const CURATOR_NAME: &str = "elastic-curator";
pub const CURATOR_SERVICE_ACCOUNT: &str = "tigera-elastic-curator";
pub const CURATOR_SCHEDULE: &str = "@hourly";

pub const ES_MANAGER_ROLE: &str = "tigera-es-manager";
pub const ES_MANAGER_ROLE_BINDING: &str = "tigera-es-manager";
pub const MANAGER_SERVICE_ACCOUNT: &str = "tigera-manager";
pub const MANAGER_NAMESPACE: &str = "tigera-manager";

pub const CSR_CREATOR_CLUSTER_ROLE: &str = "tigera-csr-creator";
pub const CSR_MOUNT_PATH: &str = "/certs/elasticsearch";

pub const CLUSTER_CONFIG_MAP_NAME: &str = "tigera-secure-elasticsearch";

/// Secret names addressed through the secret provider.
pub mod secrets {
    pub const ELASTICSEARCH_CERT: &str = "tigera-secure-elasticsearch-cert";
    pub const ELASTICSEARCH_PUBLIC_CERT: &str = "tigera-secure-es-http-certs-public";
    pub const KIBANA_CERT: &str = "tigera-secure-kibana-cert";
    pub const CURATOR_USER: &str = "tigera-ee-curator-elasticsearch-access";
    pub const ELASTICSEARCH_SECURE_SETTINGS: &str = "tigera-elasticsearch-secure-settings";
    pub const DEX_CLIENT: &str = "tigera-dex";
}

/// Init container names ECK merges its own defaults into.
pub mod init_containers {
    pub const OS_SETTINGS: &str = "elastic-internal-init-os-settings";
    pub const KEYSTORE: &str = "elastic-internal-init-keystore";
    pub const FILESYSTEM: &str = "elastic-internal-init-filesystem";
    pub const HTTP_CSR: &str = "key-cert-elastic";
    pub const TRANSPORT_CSR: &str = "key-cert-elastic-transport";
    pub const SELINUX_CONTEXT: &str = "elastic-internal-init-log-selinux-context";
}

pub mod volumes {
    pub const HTTP_CERTIFICATES: &str = "elastic-internal-http-certificates";
    pub const TRANSPORT_CERTIFICATES: &str = "elastic-internal-transport-certificates";
    pub const ELASTICSEARCH_DATA: &str = "elasticsearch-data";
}

/// Image repositories and tags, appended to the installation registry.
pub mod images {
    pub const DEFAULT_REGISTRY: &str = "quay.io/";
    pub const ECK_OPERATOR: &str = "tigera/eck-operator:1.0.1";
    pub const ELASTICSEARCH: &str = "tigera/elasticsearch:7.6.2";
    pub const KIBANA: &str = "tigera/kibana:7.6.2";
    pub const CURATOR: &str = "tigera/es-curator:v3.5.0";
    pub const CSR_INIT: &str = "tigera/key-cert-provisioner:v1.0.0";

    pub const ELASTICSEARCH_VERSION: &str = "7.6.2";
    pub const KIBANA_VERSION: &str = "7.6.2";
}

/// Dex identity provider endpoints used for Kibana single sign-on.
pub mod dex {
    pub const SERVICE_NAME: &str = "tigera-dex";
    pub const NAMESPACE: &str = "tigera-dex";
    pub const PORT: i32 = 5556;
    pub const CLIENT_ID: &str = "tigera-manager";
    pub const CLIENT_SECRET_KEY: &str = "clientSecret";
    pub const CLIENT_SECRET_LENGTH: usize = 24;
    pub const TLS_CA_PATH: &str = "/usr/share/elasticsearch/config/dex/tls-dex.crt";
    pub const OIDC_REALM: &str = "oidc1";
}
