//! Ordered manifest assembly
//!
//! The create list is produced by walking a fixed table of steps. Each step
//! names its stage, decides whether it applies to the snapshot and builds its
//! manifests. Callers diff the output positionally, so the table order is
//! part of the contract.

use std::collections::HashSet;

use tracing::{debug, info, instrument, warn};

use super::config::{FederationRole, LogStorageConfig, SecretProvider, SecretRole};
use super::constants::{
    CURATOR_SERVICE_ACCOUNT, ECK_OPERATOR_NAME, ECK_OPERATOR_NAMESPACE, ELASTICSEARCH_ACCOUNT,
    ELASTICSEARCH_NAMESPACE, KIBANA_ACCOUNT, KIBANA_NAMESPACE, OPERATOR_NAMESPACE,
};
use super::dex::DexRelyingPartyConfig;
use super::manifest::Manifest;
use super::resources::{self, copy_secrets};
use super::{curator, eck_operator, elasticsearch, kibana};
use crate::crd::{LicenseType, PodSecurityPolicySpec};
use crate::error::Result;

/// Position of a step in the create list
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    EckOperatorNamespace,
    EckOperatorRbac,
    EckOperatorPodSecurityPolicy,
    ElasticsearchRbac,
    ElasticsearchPodSecurityPolicy,
    KibanaRbac,
    KibanaPodSecurityPolicy,
    EckOperator,
    ElasticsearchNamespace,
    ClusterConfig,
    SecureSettings,
    Elasticsearch,
    KibanaNamespace,
    KibanaPublicCert,
    Kibana,
    Curator,
    EsManagerRbac,
    CsrCreatorBindings,
    ManagedNamespace,
    GatewayService,
}

/// Inputs shared by every step of one assembly
pub struct RenderContext<'a> {
    pub cfg: &'a LogStorageConfig,
    /// Relying party when single sign-on is active for this call
    pub sso: Option<&'a DexRelyingPartyConfig>,
}

impl<'a> RenderContext<'a> {
    pub fn new(cfg: &'a LogStorageConfig) -> Self {
        let sso = cfg.active_sso();
        if sso.is_none() && cfg.dex.is_some() {
            if cfg.license.allows_sso() {
                warn!("Dex relying party has no client secret yet, skipping single sign-on");
            } else {
                warn!(license = ?cfg.license, "License does not allow single sign-on, skipping");
            }
        }
        Self { cfg, sso }
    }
}

type Include = fn(&RenderContext<'_>) -> bool;
type Build = fn(&RenderContext<'_>) -> Result<Vec<Manifest>>;

/// One row of the assembly table
pub struct Step {
    pub stage: Stage,
    include: Include,
    build: Build,
}

impl Step {
    const fn new(stage: Stage, include: Include, build: Build) -> Self {
        Self {
            stage,
            include,
            build,
        }
    }

    pub fn applies(&self, ctx: &RenderContext<'_>) -> bool {
        (self.include)(ctx)
    }
}

/// Result of one assembly: objects to apply and objects to remove, in order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Assembly {
    pub to_create: Vec<Manifest>,
    pub to_delete: Vec<Manifest>,
}

// ============================================================================
// Predicates
// ============================================================================

fn always(_: &RenderContext<'_>) -> bool {
    true
}

fn uses_psp(ctx: &RenderContext<'_>) -> bool {
    ctx.cfg.provider.uses_pod_security_policies()
}

fn sso_active(ctx: &RenderContext<'_>) -> bool {
    ctx.sso.is_some()
}

fn has_kibana_public_cert(ctx: &RenderContext<'_>) -> bool {
    !ctx.cfg.provided(SecretRole::KibanaPublicCert).is_empty()
}

fn curator_ready(ctx: &RenderContext<'_>) -> bool {
    let ready = ctx.cfg.readiness.all_ready();
    let has_secrets = !ctx.cfg.provided(SecretRole::Curator).is_empty();
    if ready && !has_secrets {
        debug!("Curator secrets not provided yet, skipping curator");
    }
    ready && has_secrets
}

fn certificate_management(ctx: &RenderContext<'_>) -> bool {
    ctx.cfg.certificate_management_enabled()
}

// ============================================================================
// Builders
// ============================================================================

fn manifests<T: Into<Manifest>>(items: impl IntoIterator<Item = T>) -> Vec<Manifest> {
    items.into_iter().map(Into::into).collect()
}

fn pull_secrets(ctx: &RenderContext<'_>, namespace: &str) -> Vec<Manifest> {
    manifests(copy_secrets(ctx.cfg.provided(SecretRole::Pull), namespace))
}

fn eck_operator_namespace(ctx: &RenderContext<'_>) -> Result<Vec<Manifest>> {
    let mut out = vec![resources::build_namespace(ECK_OPERATOR_NAMESPACE).into()];
    out.extend(pull_secrets(ctx, ECK_OPERATOR_NAMESPACE));
    Ok(out)
}

fn eck_operator_rbac(ctx: &RenderContext<'_>) -> Result<Vec<Manifest>> {
    Ok(vec![
        eck_operator::build_cluster_role(ctx.cfg).into(),
        resources::build_cluster_role_binding(
            ECK_OPERATOR_NAME,
            ECK_OPERATOR_NAME,
            ECK_OPERATOR_NAME,
            ECK_OPERATOR_NAMESPACE,
        )
        .into(),
        resources::build_service_account(ECK_OPERATOR_NAME, ECK_OPERATOR_NAMESPACE).into(),
    ])
}

fn eck_operator_psp(_: &RenderContext<'_>) -> Result<Vec<Manifest>> {
    Ok(vec![resources::build_pod_security_policy(
        ECK_OPERATOR_NAME,
        PodSecurityPolicySpec::restricted(),
    )
    .into()])
}

fn elasticsearch_rbac(ctx: &RenderContext<'_>) -> Result<Vec<Manifest>> {
    let (binding, role) = resources::application_rbac(
        ELASTICSEARCH_ACCOUNT,
        ELASTICSEARCH_NAMESPACE,
        &ctx.cfg.provider,
        "privileged",
    );
    Ok(vec![binding.into(), role.into()])
}

fn elasticsearch_psp(_: &RenderContext<'_>) -> Result<Vec<Manifest>> {
    Ok(vec![resources::build_pod_security_policy(
        ELASTICSEARCH_ACCOUNT,
        resources::elasticsearch_psp_spec(),
    )
    .into()])
}

fn kibana_rbac(ctx: &RenderContext<'_>) -> Result<Vec<Manifest>> {
    let (binding, role) =
        resources::application_rbac(KIBANA_ACCOUNT, KIBANA_NAMESPACE, &ctx.cfg.provider, "nonroot");
    Ok(vec![binding.into(), role.into()])
}

fn kibana_psp(_: &RenderContext<'_>) -> Result<Vec<Manifest>> {
    Ok(vec![resources::build_pod_security_policy(
        KIBANA_ACCOUNT,
        PodSecurityPolicySpec::restricted(),
    )
    .into()])
}

fn eck_operator_workload(ctx: &RenderContext<'_>) -> Result<Vec<Manifest>> {
    Ok(vec![eck_operator::build_statefulset(ctx.cfg)?.into()])
}

fn elasticsearch_namespace(ctx: &RenderContext<'_>) -> Result<Vec<Manifest>> {
    let mut out = vec![resources::build_namespace(ELASTICSEARCH_NAMESPACE).into()];
    out.extend(pull_secrets(ctx, ELASTICSEARCH_NAMESPACE));
    out.extend(manifests(resources::provided_secrets(
        ctx.cfg.provided(SecretRole::Elasticsearch),
    )));
    out.push(resources::build_service_account(ELASTICSEARCH_ACCOUNT, ELASTICSEARCH_NAMESPACE).into());
    Ok(out)
}

fn cluster_config(ctx: &RenderContext<'_>) -> Result<Vec<Manifest>> {
    Ok(vec![resources::build_cluster_config_map(
        &ctx.cfg.effective_cluster_config(),
    )
    .into()])
}

fn secure_settings(ctx: &RenderContext<'_>) -> Result<Vec<Manifest>> {
    Ok(manifests(
        ctx.sso.and_then(elasticsearch::build_secure_settings_secret),
    ))
}

fn elasticsearch_resource(ctx: &RenderContext<'_>) -> Result<Vec<Manifest>> {
    Ok(vec![elasticsearch::build_elasticsearch(ctx.cfg, ctx.sso)?.into()])
}

fn kibana_namespace(ctx: &RenderContext<'_>) -> Result<Vec<Manifest>> {
    let mut out = vec![
        resources::build_namespace(KIBANA_NAMESPACE).into(),
        resources::build_service_account(KIBANA_ACCOUNT, KIBANA_NAMESPACE).into(),
    ];
    out.extend(pull_secrets(ctx, KIBANA_NAMESPACE));
    let cert = ctx.cfg.provided(SecretRole::KibanaCert);
    if cert.is_empty() {
        debug!("Kibana certificate not provided yet");
    }
    out.extend(manifests(copy_secrets(cert, KIBANA_NAMESPACE)));
    Ok(out)
}

fn kibana_public_cert(ctx: &RenderContext<'_>) -> Result<Vec<Manifest>> {
    Ok(manifests(copy_secrets(
        ctx.cfg.provided(SecretRole::KibanaPublicCert),
        OPERATOR_NAMESPACE,
    )))
}

fn kibana_resource(ctx: &RenderContext<'_>) -> Result<Vec<Manifest>> {
    Ok(vec![kibana::build_kibana(ctx.cfg, ctx.sso).into()])
}

fn curator_objects(ctx: &RenderContext<'_>) -> Result<Vec<Manifest>> {
    let cfg = ctx.cfg;
    let mut out = manifests(copy_secrets(
        cfg.provided(SecretRole::Curator),
        ELASTICSEARCH_NAMESPACE,
    ));
    out.push(
        resources::build_service_account(
            CURATOR_SERVICE_ACCOUNT,
            ELASTICSEARCH_NAMESPACE,
        )
        .into(),
    );
    out.push(curator::build_cluster_role(cfg).into());
    out.push(curator::build_cluster_role_binding().into());
    if uses_psp(ctx) {
        out.push(curator::build_pod_security_policy().into());
    }
    out.push(curator::build_cron_job(cfg).into());
    Ok(out)
}

fn es_manager_rbac(_: &RenderContext<'_>) -> Result<Vec<Manifest>> {
    Ok(vec![
        resources::build_es_manager_role().into(),
        resources::build_es_manager_role_binding().into(),
    ])
}

fn csr_creator_bindings(_: &RenderContext<'_>) -> Result<Vec<Manifest>> {
    Ok(vec![
        resources::build_csr_creator_binding(ELASTICSEARCH_ACCOUNT, ELASTICSEARCH_NAMESPACE).into(),
        resources::build_csr_creator_binding(KIBANA_ACCOUNT, KIBANA_NAMESPACE).into(),
    ])
}

fn managed_namespace(_: &RenderContext<'_>) -> Result<Vec<Manifest>> {
    Ok(vec![resources::build_namespace(ELASTICSEARCH_NAMESPACE).into()])
}

fn gateway_service(ctx: &RenderContext<'_>) -> Result<Vec<Manifest>> {
    Ok(vec![resources::build_gateway_external_service(ctx.cfg).into()])
}

// ============================================================================
// Tables
// ============================================================================

pub static STANDALONE_STEPS: [Step; 18] = [
    Step::new(Stage::EckOperatorNamespace, always, eck_operator_namespace),
    Step::new(Stage::EckOperatorRbac, always, eck_operator_rbac),
    Step::new(Stage::EckOperatorPodSecurityPolicy, uses_psp, eck_operator_psp),
    Step::new(Stage::ElasticsearchRbac, always, elasticsearch_rbac),
    Step::new(Stage::ElasticsearchPodSecurityPolicy, uses_psp, elasticsearch_psp),
    Step::new(Stage::KibanaRbac, always, kibana_rbac),
    Step::new(Stage::KibanaPodSecurityPolicy, uses_psp, kibana_psp),
    Step::new(Stage::EckOperator, always, eck_operator_workload),
    Step::new(Stage::ElasticsearchNamespace, always, elasticsearch_namespace),
    Step::new(Stage::ClusterConfig, always, cluster_config),
    Step::new(Stage::SecureSettings, sso_active, secure_settings),
    Step::new(Stage::Elasticsearch, always, elasticsearch_resource),
    Step::new(Stage::KibanaNamespace, always, kibana_namespace),
    Step::new(Stage::KibanaPublicCert, has_kibana_public_cert, kibana_public_cert),
    Step::new(Stage::Kibana, always, kibana_resource),
    Step::new(Stage::Curator, curator_ready, curator_objects),
    Step::new(Stage::EsManagerRbac, always, es_manager_rbac),
    Step::new(Stage::CsrCreatorBindings, certificate_management, csr_creator_bindings),
];

pub static MANAGED_STEPS: [Step; 2] = [
    Step::new(Stage::ManagedNamespace, always, managed_namespace),
    Step::new(Stage::GatewayService, always, gateway_service),
];

pub fn steps(role: FederationRole) -> &'static [Step] {
    match role {
        FederationRole::Standalone => &STANDALONE_STEPS,
        FederationRole::Managed => &MANAGED_STEPS,
    }
}

/// Stages that contribute to the create list for this snapshot, in order
pub fn included_stages(cfg: &LogStorageConfig) -> Vec<Stage> {
    let ctx = RenderContext::new(cfg);
    steps(cfg.federation)
        .iter()
        .filter(|step| step.applies(&ctx))
        .map(|step| step.stage)
        .collect()
}

// ============================================================================
// Deletions
// ============================================================================

/// Observed objects that must be removed rather than recreated
fn stale_objects(cfg: &LogStorageConfig) -> Vec<Manifest> {
    if cfg.federation == FederationRole::Managed {
        return Vec::new();
    }

    let mut out: Vec<Manifest> = [&cfg.es_service, &cfg.kb_service]
        .into_iter()
        .flatten()
        .filter(|svc| resources::is_external_name(svc))
        .cloned()
        .map(Into::into)
        .collect();

    if cfg.license == LicenseType::Basic {
        if let Some(secret) = &cfg.oidc_secret {
            out.push(secret.clone().into());
        }
    }
    out
}

/// Drop later manifests whose identity was already emitted
fn dedupe(manifests: Vec<Manifest>) -> Vec<Manifest> {
    let mut seen = HashSet::new();
    manifests
        .into_iter()
        .filter(|m| {
            let fresh = seen.insert(m.id());
            if !fresh {
                warn!(id = %m.id(), "Duplicate manifest identity, keeping the first");
            }
            fresh
        })
        .collect()
}

/// Build the create and delete lists for a provisioning LogStorage
#[instrument(skip(cfg), fields(federation = ?cfg.federation, license = ?cfg.license))]
pub fn assemble(cfg: &LogStorageConfig) -> Result<Assembly> {
    cfg.validate()?;

    let ctx = RenderContext::new(cfg);
    let mut to_create = Vec::new();
    for step in steps(cfg.federation) {
        if !step.applies(&ctx) {
            debug!(stage = ?step.stage, "Skipping stage");
            continue;
        }
        let built = (step.build)(&ctx)?;
        debug!(stage = ?step.stage, count = built.len(), "Rendered stage");
        to_create.extend(built);
    }

    let assembly = Assembly {
        to_create: dedupe(to_create),
        to_delete: stale_objects(cfg),
    };
    info!(
        create = assembly.to_create.len(),
        delete = assembly.to_delete.len(),
        "Assembled log storage manifests"
    );
    Ok(assembly)
}
