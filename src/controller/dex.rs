//! Dex relying-party settings for Kibana single sign-on
//!
//! Elasticsearch is registered as an OpenID Connect client of the product's
//! Dex instance. Browser-facing endpoints go through the manager domain;
//! back-channel endpoints talk to the in-cluster Dex service directly.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::constants::{dex, secrets, KIBANA_BASE_PATH, OPERATOR_NAMESPACE};

/// Settings key of the OIDC realm in `elasticsearch.yml`
pub fn realm_key() -> String {
    format!("xpack.security.authc.realms.oidc.{}", dex::OIDC_REALM)
}

/// Keystore entry holding the realm's client secret
pub fn client_secret_setting() -> String {
    format!("{}.rp.client_secret", realm_key())
}

/// Relying-party descriptor derived from the Authentication resource
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DexRelyingPartyConfig {
    /// Externally reachable base URL of the manager, e.g. `https://example.com`
    pub manager_domain: String,

    /// Claim used as the Elasticsearch principal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_claim: Option<String>,

    /// `tigera-dex` secret holding the `clientSecret` entry, once created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<Secret>,
}

impl DexRelyingPartyConfig {
    fn manager_base(&self) -> &str {
        self.manager_domain.trim_end_matches('/')
    }

    /// Issuer URL as advertised to browsers
    pub fn issuer(&self) -> String {
        format!("{}/dex", self.manager_base())
    }

    pub fn username_claim(&self) -> &str {
        self.username_claim
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or("email")
    }

    /// Materialized client secret, if the `tigera-dex` secret carries one
    pub fn client_secret_value(&self) -> Option<&ByteString> {
        self.client_secret
            .as_ref()
            .and_then(|s| s.data.as_ref())
            .and_then(|d| d.get(dex::CLIENT_SECRET_KEY))
            .filter(|v| !v.0.is_empty())
    }

    /// Realm block for the Elasticsearch node configuration
    pub fn realm_config(&self, cluster_domain: &str) -> Value {
        let base = self.manager_base();
        let service = dex_service_url(cluster_domain);
        json!({
            "rp.client_id": dex::CLIENT_ID,
            "rp.requested_scopes": ["openid", "email", "profile", "groups", "offline_access"],
            "rp.response_type": "code",
            "rp.redirect_uri": format!("{base}/{KIBANA_BASE_PATH}/api/security/oidc/callback"),
            "rp.post_logout_redirect_uri": format!("{base}/{KIBANA_BASE_PATH}/logged_out"),
            "op.issuer": self.issuer(),
            "op.authorization_endpoint": format!("{base}/dex/auth"),
            "op.token_endpoint": format!("{service}/dex/token"),
            "op.jwkset_path": format!("{service}/dex/keys"),
            "op.userinfo_endpoint": format!("{service}/dex/userinfo"),
            "claims.principal": self.username_claim(),
            "claims.groups": "groups",
            "order": 1,
            "ssl.certificate_authorities": [dex::TLS_CA_PATH],
        })
    }
}

/// In-cluster URL of the Dex service
pub fn dex_service_url(cluster_domain: &str) -> String {
    format!(
        "https://{}.{}.svc.{}:{}",
        dex::SERVICE_NAME,
        dex::NAMESPACE,
        cluster_domain,
        dex::PORT
    )
}

/// Kibana login providers: OIDC first, basic login as the fallback
pub fn kibana_auth_providers() -> Value {
    json!({
        (format!("oidc.{}", dex::OIDC_REALM)): {
            "order": 0,
            "realm": dex::OIDC_REALM,
            "description": "Log in with Dex",
        },
        "basic.basic1": {
            "order": 1,
        },
    })
}

/// Random alphanumeric client secret of the length Dex expects
pub fn generate_client_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(dex::CLIENT_SECRET_LENGTH)
        .map(char::from)
        .collect()
}

/// A fresh `tigera-dex` client secret in the operator namespace
pub fn create_client_secret() -> Secret {
    let mut data = BTreeMap::new();
    data.insert(
        dex::CLIENT_SECRET_KEY.to_string(),
        ByteString(generate_client_secret().into_bytes()),
    );
    Secret {
        metadata: ObjectMeta {
            name: Some(secrets::DEX_CLIENT.to_string()),
            namespace: Some(OPERATOR_NAMESPACE.to_string()),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}
