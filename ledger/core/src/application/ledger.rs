// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Ledger
//!
//! Composition root and caller-facing surface. Built once at startup from
//! explicitly constructed collaborators (repositories, embedder, verifier);
//! nothing here is a global.
//!
//! Every operation takes a [`TenantContext`] obtained from
//! [`Ledger::authenticate`] (or, for trusted local tooling,
//! [`Ledger::context_for_principal`]).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::application::authentication::{
    AuthChallenge, AuthenticationService, EstablishedSession, LoginRedirect, Logout, TenantContext,
};
use crate::application::errors::LedgerError;
use crate::application::evolve::RetryPolicy;
use crate::application::memory_service::MemoryService;
use crate::application::reinforcement::{FeedbackAck, FeedbackTicket, ReinforcementApplier};
use crate::application::tenant_resolver::TenantResolver;
use crate::application::workflow_service::WorkflowService;
use crate::domain::embedding::EmbeddingProvider;
use crate::domain::feedback::{FeedbackKind, FeedbackWeight, ReinforcementPolicy};
use crate::domain::identity::{CredentialVerifier, IdentityClaims};
use crate::domain::ledger_config::{LedgerConfigManifest, LedgerConfigSpec};
use crate::domain::memory::{Confidence, MemoryFact, MemoryVersion, Provenance, ScoredMemory, SearchScope};
use crate::domain::repository::{MemoryRepository, TenantRepository, VersionedRepository};
use crate::domain::tenant::Tenant;
use crate::domain::versioning::{ConceptId, ConceptKind, VersionNumber};
use crate::domain::workflow::{WorkflowDefinition, WorkflowVersion};
use crate::infrastructure::db::Database;
use crate::infrastructure::embedding_client::HttpEmbeddingClient;
use crate::infrastructure::event_bus::{EventBus, EventReceiver};
use crate::infrastructure::oidc::jwks::JwksKeySource;
use crate::infrastructure::oidc::login::AuthorizationCodeClient;
use crate::infrastructure::oidc::{http_client, ProviderMetadata};
use crate::infrastructure::repositories::{
    InMemoryTenantRepository, InMemoryVersionedRepository, PostgresMemoryRepository,
    PostgresTenantRepository, PostgresWorkflowRepository,
};
use crate::infrastructure::token_verifier::{DevBypassVerifier, OidcTokenVerifier};

/// Collaborators the ledger is assembled from.
pub struct LedgerComponents {
    pub tenants: Arc<dyn TenantRepository>,
    pub workflows: Arc<dyn VersionedRepository<WorkflowDefinition>>,
    pub memories: Arc<dyn MemoryRepository>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub verifier: Arc<dyn CredentialVerifier>,
    /// Authorization-code client for browser sessions, when configured
    pub login: Option<AuthorizationCodeClient>,
    /// `None` for in-memory deployments
    pub database: Option<Database>,
}

impl LedgerComponents {
    /// Process-local repositories. Nothing survives a restart.
    pub fn in_memory(verifier: Arc<dyn CredentialVerifier>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            tenants: Arc::new(InMemoryTenantRepository::new()),
            workflows: Arc::new(InMemoryVersionedRepository::<WorkflowDefinition>::new(ConceptKind::Workflow)),
            memories: Arc::new(InMemoryVersionedRepository::<MemoryFact>::new(ConceptKind::Memory)),
            embedder,
            verifier,
            login: None,
            database: None,
        }
    }
}

/// Connectivity report returned by [`Ledger::health`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthReport {
    pub storage: &'static str,
    pub checked_at: DateTime<Utc>,
}

pub struct Ledger {
    authentication: AuthenticationService,
    tenants: Arc<TenantResolver>,
    workflows: WorkflowService,
    memories: Arc<MemoryService>,
    reinforcement: ReinforcementApplier,
    event_bus: EventBus,
    database: Option<Database>,
}

impl Ledger {
    /// Wire the services. Must be called inside a tokio runtime because the
    /// reinforcement workers are spawned here.
    pub fn assemble(components: LedgerComponents, settings: &LedgerConfigSpec) -> Self {
        let event_bus = EventBus::with_default_capacity();
        let retry = RetryPolicy::with_max_attempts(settings.versioning.max_conflict_retries);

        let tenants = Arc::new(
            TenantResolver::new(components.tenants, event_bus.clone())
                .with_max_attempts(settings.versioning.max_conflict_retries),
        );
        let mut authentication = AuthenticationService::new(components.verifier, tenants.clone());
        if let Some(login) = components.login {
            authentication = authentication.with_login_client(login);
        }

        let workflows = WorkflowService::new(components.workflows, event_bus.clone()).with_retry_policy(retry);

        let reinforcement_settings = &settings.reinforcement;
        let memories = Arc::new(
            MemoryService::new(components.memories, components.embedder, event_bus.clone())
                .with_retry_policy(retry)
                .with_reinforcement_policy(ReinforcementPolicy {
                    step: reinforcement_settings.step,
                    correction_confidence: Confidence::clamped(reinforcement_settings.correction_confidence),
                })
                .with_initial_confidence(Confidence::clamped(reinforcement_settings.initial_confidence))
                .with_top_k(settings.versioning.search_top_k),
        );
        let reinforcement = ReinforcementApplier::spawn(
            memories.clone(),
            event_bus.clone(),
            reinforcement_settings.workers,
            reinforcement_settings.queue_capacity,
        );

        Self {
            authentication,
            tenants,
            workflows,
            memories,
            reinforcement,
            event_bus,
            database: components.database,
        }
    }

    /// Build a PostgreSQL-backed ledger from configuration.
    ///
    /// Performs OIDC discovery unless the development bypass is active.
    /// Migrations are not applied here; run `evolve migrate` first.
    pub async fn connect(config: &LedgerConfigManifest) -> anyhow::Result<Self> {
        config.validate()?;
        let spec = &config.spec;

        let database = Database::connect(&spec.database)
            .await
            .context("Failed to connect to PostgreSQL")?;

        let (verifier, login): (Arc<dyn CredentialVerifier>, Option<AuthorizationCodeClient>) = if config.bypass_active() {
            let bypass: Arc<dyn CredentialVerifier> = Arc::new(DevBypassVerifier::new(spec.environment)?);
            (bypass, None)
        } else {
            let http = http_client(spec.auth.http_timeout())?;
            let metadata = ProviderMetadata::discover(&http, &spec.auth.issuer).await?;
            info!(issuer = %metadata.issuer, "Discovered identity provider");
            let login = match spec.auth.redirect_url {
                Some(_) => Some(AuthorizationCodeClient::new(http.clone(), &metadata, &spec.auth)?),
                None => None,
            };
            let keys = Arc::new(JwksKeySource::new(http, metadata.jwks_uri.clone()));
            let verifier: Arc<dyn CredentialVerifier> = Arc::new(
                OidcTokenVerifier::new(&metadata, &spec.auth.client_id, keys).with_leeway(spec.auth.leeway_secs),
            );
            (verifier, login)
        };

        let embedder = Arc::new(HttpEmbeddingClient::new(
            &spec.embedding.url,
            Duration::from_secs(spec.embedding.timeout_secs),
            spec.embedding.dimensions,
        )?);

        let pool = database.pool().clone();
        let components = LedgerComponents {
            tenants: Arc::new(PostgresTenantRepository::new(pool.clone())),
            workflows: Arc::new(PostgresWorkflowRepository::new(pool.clone())),
            memories: Arc::new(PostgresMemoryRepository::new(pool)),
            embedder,
            verifier,
            login,
            database: Some(database),
        };
        Ok(Self::assemble(components, spec))
    }

    pub async fn authenticate(
        &self,
        authorization: Option<&str>,
        cookie_header: Option<&str>,
    ) -> Result<TenantContext, AuthChallenge> {
        self.authentication.authenticate(authorization, cookie_header).await
    }

    pub fn begin_login(&self) -> Result<LoginRedirect, LedgerError> {
        self.authentication.begin_login()
    }

    pub async fn complete_login(
        &self,
        code: &str,
        state: &str,
        cookie_header: Option<&str>,
    ) -> Result<EstablishedSession, AuthChallenge> {
        self.authentication.complete_login(code, state, cookie_header).await
    }

    pub fn logout(&self, cookie_header: Option<&str>, post_logout_redirect: &str) -> Logout {
        self.authentication.logout(cookie_header, post_logout_redirect)
    }

    /// Context for a principal known out of band (operator tooling).
    pub async fn context_for_principal(&self, email: &str) -> Result<TenantContext, LedgerError> {
        let tenant = self.tenants.resolve_email(email).await?;
        Ok(TenantContext {
            tenant_id: tenant.id,
            principal: IdentityClaims {
                subject: email.to_string(),
                email: email.to_string(),
                issuer: "local".to_string(),
                audience: Vec::new(),
                expires_at: DateTime::<Utc>::MAX_UTC,
            },
        })
    }

    pub async fn resolve_tenant(&self, email: &str) -> Result<Tenant, LedgerError> {
        self.tenants.resolve_email(email).await
    }

    pub async fn remember(
        &self,
        ctx: &TenantContext,
        content: &str,
        provenance: Provenance,
    ) -> Result<MemoryVersion, LedgerError> {
        self.memories.remember(ctx.tenant_id, content, provenance).await
    }

    pub async fn recall(&self, ctx: &TenantContext, query: &str) -> Result<Vec<ScoredMemory>, LedgerError> {
        self.memories.recall(ctx.tenant_id, query, None).await
    }

    pub async fn recall_with_scope(
        &self,
        ctx: &TenantContext,
        query: &str,
        scope: SearchScope,
    ) -> Result<Vec<ScoredMemory>, LedgerError> {
        self.memories.recall(ctx.tenant_id, query, Some(scope)).await
    }

    pub async fn get_memory(&self, ctx: &TenantContext, concept_id: ConceptId) -> Result<MemoryVersion, LedgerError> {
        self.memories.get(ctx.tenant_id, concept_id).await
    }

    pub async fn get_memory_version(
        &self,
        ctx: &TenantContext,
        concept_id: ConceptId,
        version: VersionNumber,
    ) -> Result<MemoryVersion, LedgerError> {
        self.memories.get_version(ctx.tenant_id, concept_id, version).await
    }

    pub async fn memory_history(
        &self,
        ctx: &TenantContext,
        concept_id: ConceptId,
    ) -> Result<Vec<MemoryVersion>, LedgerError> {
        self.memories.history(ctx.tenant_id, concept_id).await
    }

    /// Queue feedback and return the acknowledgement without waiting.
    pub async fn give_feedback(
        &self,
        ctx: &TenantContext,
        memory_id: ConceptId,
        kind: FeedbackKind,
        weight: FeedbackWeight,
    ) -> Result<FeedbackAck, LedgerError> {
        Ok(self.submit_feedback(ctx, memory_id, kind, weight).await?.ack)
    }

    /// Queue feedback and keep a handle on its outcome.
    pub async fn submit_feedback(
        &self,
        ctx: &TenantContext,
        memory_id: ConceptId,
        kind: FeedbackKind,
        weight: FeedbackWeight,
    ) -> Result<FeedbackTicket, LedgerError> {
        self.reinforcement.submit(ctx.tenant_id, memory_id, kind, weight).await
    }

    pub async fn put_workflow(
        &self,
        ctx: &TenantContext,
        concept_id: Option<ConceptId>,
        definition: WorkflowDefinition,
    ) -> Result<WorkflowVersion, LedgerError> {
        self.workflows
            .put_workflow(ctx.tenant_id, concept_id, definition, &ctx.principal.email)
            .await
    }

    pub async fn list_workflows(&self, ctx: &TenantContext) -> Result<Vec<WorkflowVersion>, LedgerError> {
        self.workflows.list_workflows(ctx.tenant_id).await
    }

    pub async fn get_workflow(&self, ctx: &TenantContext, concept_id: ConceptId) -> Result<WorkflowVersion, LedgerError> {
        self.workflows.get_workflow(ctx.tenant_id, concept_id).await
    }

    pub async fn get_workflow_version(
        &self,
        ctx: &TenantContext,
        concept_id: ConceptId,
        version: VersionNumber,
    ) -> Result<WorkflowVersion, LedgerError> {
        self.workflows.get_workflow_version(ctx.tenant_id, concept_id, version).await
    }

    pub async fn workflow_history(
        &self,
        ctx: &TenantContext,
        concept_id: ConceptId,
    ) -> Result<Vec<WorkflowVersion>, LedgerError> {
        self.workflows.history(ctx.tenant_id, concept_id).await
    }

    pub async fn deprecate_workflow(
        &self,
        ctx: &TenantContext,
        concept_id: ConceptId,
    ) -> Result<WorkflowVersion, LedgerError> {
        self.workflows
            .deprecate(ctx.tenant_id, concept_id, &ctx.principal.email)
            .await
    }

    pub async fn rename_tenant(&self, ctx: &TenantContext, name: &str) -> Result<Tenant, LedgerError> {
        self.tenants.rename(ctx.tenant_id, name).await
    }

    pub async fn health(&self) -> Result<HealthReport, LedgerError> {
        let storage = match &self.database {
            Some(db) => {
                db.ping().await?;
                "postgres"
            }
            None => "in-memory",
        };
        Ok(HealthReport {
            storage,
            checked_at: Utc::now(),
        })
    }

    pub fn events(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }

    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    /// Drain pending feedback and stop background workers.
    pub async fn shutdown(&self) {
        self.reinforcement.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger_config::Environment;
    use crate::infrastructure::embedding_client::HashingEmbedder;
    use crate::infrastructure::token_verifier::DevBypassVerifier;

    fn ledger() -> Ledger {
        let verifier = Arc::new(DevBypassVerifier::new(Environment::Development).unwrap());
        Ledger::assemble(
            LedgerComponents::in_memory(verifier, Arc::new(HashingEmbedder::new(32))),
            &LedgerConfigSpec::default(),
        )
    }

    #[tokio::test]
    async fn test_in_memory_health() {
        let ledger = ledger();
        let report = ledger.health().await.unwrap();
        assert_eq!(report.storage, "in-memory");
        assert!(ledger.database().is_none());
        ledger.shutdown().await;
    }

    #[tokio::test]
    async fn test_bypass_authenticates_as_placeholder() {
        let ledger = ledger();
        let ctx = ledger.authenticate(None, None).await.unwrap();
        let again = ledger.context_for_principal("someone@localhost").await.unwrap();
        assert_eq!(ctx.tenant_id, again.tenant_id);
        ledger.shutdown().await;
    }

    #[tokio::test]
    async fn test_login_without_client_is_unavailable() {
        let ledger = ledger();
        assert!(matches!(ledger.begin_login(), Err(LedgerError::DependencyUnavailable(_))));
        ledger.shutdown().await;
    }

    #[tokio::test]
    async fn test_context_for_unusable_principal_is_rejected() {
        let ledger = ledger();
        let err = ledger.context_for_principal("not-an-email").await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidPrincipal(_)));
        ledger.shutdown().await;
    }

    #[tokio::test]
    async fn test_connect_validates_before_touching_the_network() {
        let err = Ledger::connect(&LedgerConfigManifest::default()).await.err().unwrap();
        assert!(err.to_string().contains("spec.auth.issuer"));
    }
}
