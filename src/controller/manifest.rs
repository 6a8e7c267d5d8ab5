//! Typed manifest objects emitted by the renderer

use std::fmt;

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::Resource as _;
use serde::Serialize;

use crate::crd::{Elasticsearch, Kibana, PodSecurityPolicy};

/// A Kubernetes object the caller applies or deletes
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Manifest {
    Namespace(Namespace),
    Secret(Secret),
    ServiceAccount(ServiceAccount),
    ConfigMap(ConfigMap),
    Service(Service),
    ClusterRole(ClusterRole),
    ClusterRoleBinding(ClusterRoleBinding),
    Role(Role),
    RoleBinding(RoleBinding),
    PodSecurityPolicy(PodSecurityPolicy),
    StatefulSet(Box<StatefulSet>),
    CronJob(Box<CronJob>),
    Elasticsearch(Box<Elasticsearch>),
    Kibana(Box<Kibana>),
}

/// Identity of a manifest: no two emitted manifests share one
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManifestId {
    pub kind: &'static str,
    pub name: String,
    pub namespace: Option<String>,
}

impl fmt::Display for ManifestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

impl Manifest {
    pub fn kind(&self) -> &'static str {
        match self {
            Manifest::Namespace(_) => Namespace::KIND,
            Manifest::Secret(_) => Secret::KIND,
            Manifest::ServiceAccount(_) => ServiceAccount::KIND,
            Manifest::ConfigMap(_) => ConfigMap::KIND,
            Manifest::Service(_) => Service::KIND,
            Manifest::ClusterRole(_) => ClusterRole::KIND,
            Manifest::ClusterRoleBinding(_) => ClusterRoleBinding::KIND,
            Manifest::Role(_) => Role::KIND,
            Manifest::RoleBinding(_) => RoleBinding::KIND,
            Manifest::PodSecurityPolicy(_) => "PodSecurityPolicy",
            Manifest::StatefulSet(_) => StatefulSet::KIND,
            Manifest::CronJob(_) => CronJob::KIND,
            Manifest::Elasticsearch(_) => "Elasticsearch",
            Manifest::Kibana(_) => "Kibana",
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Manifest::Namespace(o) => &o.metadata,
            Manifest::Secret(o) => &o.metadata,
            Manifest::ServiceAccount(o) => &o.metadata,
            Manifest::ConfigMap(o) => &o.metadata,
            Manifest::Service(o) => &o.metadata,
            Manifest::ClusterRole(o) => &o.metadata,
            Manifest::ClusterRoleBinding(o) => &o.metadata,
            Manifest::Role(o) => &o.metadata,
            Manifest::RoleBinding(o) => &o.metadata,
            Manifest::PodSecurityPolicy(o) => &o.metadata,
            Manifest::StatefulSet(o) => &o.metadata,
            Manifest::CronJob(o) => &o.metadata,
            Manifest::Elasticsearch(o) => &o.metadata,
            Manifest::Kibana(o) => &o.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    /// Namespace, or `None` for cluster scoped objects
    pub fn namespace(&self) -> Option<&str> {
        self.metadata()
            .namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
    }

    pub fn id(&self) -> ManifestId {
        ManifestId {
            kind: self.kind(),
            name: self.name().to_string(),
            namespace: self.namespace().map(str::to_string),
        }
    }

    pub fn as_elasticsearch(&self) -> Option<&Elasticsearch> {
        match self {
            Manifest::Elasticsearch(es) => Some(es.as_ref()),
            _ => None,
        }
    }

    pub fn as_kibana(&self) -> Option<&Kibana> {
        match self {
            Manifest::Kibana(kb) => Some(kb.as_ref()),
            _ => None,
        }
    }

    pub fn as_stateful_set(&self) -> Option<&StatefulSet> {
        match self {
            Manifest::StatefulSet(sts) => Some(sts.as_ref()),
            _ => None,
        }
    }

    pub fn as_cron_job(&self) -> Option<&CronJob> {
        match self {
            Manifest::CronJob(job) => Some(job.as_ref()),
            _ => None,
        }
    }

    pub fn as_secret(&self) -> Option<&Secret> {
        match self {
            Manifest::Secret(secret) => Some(secret),
            _ => None,
        }
    }

    pub fn as_service(&self) -> Option<&Service> {
        match self {
            Manifest::Service(svc) => Some(svc),
            _ => None,
        }
    }

    pub fn as_config_map(&self) -> Option<&ConfigMap> {
        match self {
            Manifest::ConfigMap(cm) => Some(cm),
            _ => None,
        }
    }
}

/// Look up a manifest by identity
pub fn find<'a>(
    manifests: &'a [Manifest],
    kind: &str,
    name: &str,
    namespace: Option<&str>,
) -> Option<&'a Manifest> {
    manifests
        .iter()
        .find(|m| m.kind() == kind && m.name() == name && m.namespace() == namespace)
}

impl From<Namespace> for Manifest {
    fn from(o: Namespace) -> Self {
        Manifest::Namespace(o)
    }
}

impl From<Secret> for Manifest {
    fn from(o: Secret) -> Self {
        Manifest::Secret(o)
    }
}

impl From<ServiceAccount> for Manifest {
    fn from(o: ServiceAccount) -> Self {
        Manifest::ServiceAccount(o)
    }
}

impl From<ConfigMap> for Manifest {
    fn from(o: ConfigMap) -> Self {
        Manifest::ConfigMap(o)
    }
}

impl From<Service> for Manifest {
    fn from(o: Service) -> Self {
        Manifest::Service(o)
    }
}

impl From<ClusterRole> for Manifest {
    fn from(o: ClusterRole) -> Self {
        Manifest::ClusterRole(o)
    }
}

impl From<ClusterRoleBinding> for Manifest {
    fn from(o: ClusterRoleBinding) -> Self {
        Manifest::ClusterRoleBinding(o)
    }
}

impl From<Role> for Manifest {
    fn from(o: Role) -> Self {
        Manifest::Role(o)
    }
}

impl From<RoleBinding> for Manifest {
    fn from(o: RoleBinding) -> Self {
        Manifest::RoleBinding(o)
    }
}

impl From<PodSecurityPolicy> for Manifest {
    fn from(o: PodSecurityPolicy) -> Self {
        Manifest::PodSecurityPolicy(o)
    }
}

impl From<StatefulSet> for Manifest {
    fn from(o: StatefulSet) -> Self {
        Manifest::StatefulSet(Box::new(o))
    }
}

impl From<CronJob> for Manifest {
    fn from(o: CronJob) -> Self {
        Manifest::CronJob(Box::new(o))
    }
}

impl From<Elasticsearch> for Manifest {
    fn from(o: Elasticsearch) -> Self {
        Manifest::Elasticsearch(Box::new(o))
    }
}

impl From<Kibana> for Manifest {
    fn from(o: Kibana) -> Self {
        Manifest::Kibana(Box::new(o))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns(name: &str) -> Manifest {
        Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
        .into()
    }

    #[test]
    fn test_identity_of_cluster_scoped_object() {
        let m = ns("tigera-elasticsearch");
        assert_eq!(m.kind(), "Namespace");
        assert_eq!(m.namespace(), None);
        assert_eq!(m.id().to_string(), "Namespace/tigera-elasticsearch");
    }

    #[test]
    fn test_find_matches_kind_name_and_namespace() {
        let secret: Manifest = Secret {
            metadata: ObjectMeta {
                name: Some("tigera-elasticsearch".to_string()),
                namespace: Some("tigera-operator".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
        .into();
        let manifests = vec![ns("tigera-elasticsearch"), secret];

        assert!(find(&manifests, "Namespace", "tigera-elasticsearch", None).is_some());
        assert!(find(&manifests, "Secret", "tigera-elasticsearch", Some("tigera-operator")).is_some());
        assert!(find(&manifests, "Secret", "tigera-elasticsearch", None).is_none());
    }

    #[test]
    fn test_serializes_with_type_meta() {
        let json = serde_json::to_value(ns("tigera-kibana")).unwrap();
        assert_eq!(json["apiVersion"], "v1");
        assert_eq!(json["kind"], "Namespace");
        assert_eq!(json["metadata"]["name"], "tigera-kibana");
    }
}
