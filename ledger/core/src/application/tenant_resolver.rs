// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # TenantResolver
//!
//! Maps a verified principal onto the tenant owning its email domain,
//! provisioning the tenant on first sight.
//!
//! ## Provisioning race
//!
//! Two first-time users of the same domain may both miss the lookup and both
//! try to insert. The `tenants.domain` unique constraint lets exactly one win;
//! the loser sees `UniqueViolation`, re-reads, and returns the winner's id.
//! The loop is bounded so a constraint that keeps firing without a readable
//! row surfaces `TenantProvisioningConflict` instead of spinning.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use tracing::{debug, info, warn};

use crate::application::errors::LedgerError;
use crate::domain::events::LedgerEvent;
use crate::domain::identity::IdentityClaims;
use crate::domain::repository::{RepositoryError, TenantRepository};
use crate::domain::tenant::{email_domain, NewTenant, Tenant, TenantId};
use crate::infrastructure::event_bus::EventBus;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;

pub struct TenantResolver {
    tenants: Arc<dyn TenantRepository>,
    event_bus: EventBus,
    max_attempts: u32,
}

impl TenantResolver {
    pub fn new(tenants: Arc<dyn TenantRepository>, event_bus: EventBus) -> Self {
        Self {
            tenants,
            event_bus,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub async fn resolve(&self, claims: &IdentityClaims) -> Result<TenantId, LedgerError> {
        Ok(self.resolve_email(&claims.email).await?.id)
    }

    /// Resolve (or provision) the tenant for an email address.
    pub async fn resolve_email(&self, email: &str) -> Result<Tenant, LedgerError> {
        let domain = email_domain(email).ok_or_else(|| {
            LedgerError::InvalidPrincipal("email must have the form local@domain".to_string())
        })?;

        for attempt in 1..=self.max_attempts {
            if let Some(tenant) = self.tenants.find_by_domain(&domain).await? {
                debug!(tenant_id = %tenant.id, domain = %domain, "Resolved existing tenant");
                return Ok(tenant);
            }

            match self.tenants.create(NewTenant::for_domain(&domain)).await {
                Ok(tenant) => {
                    info!(tenant_id = %tenant.id, domain = %domain, "Provisioned tenant");
                    counter!("evolve_tenants_provisioned_total").increment(1);
                    self.event_bus.publish(LedgerEvent::TenantProvisioned {
                        tenant_id: tenant.id,
                        domain: domain.clone(),
                        provisioned_at: Utc::now(),
                    });
                    return Ok(tenant);
                }
                Err(RepositoryError::UniqueViolation(_)) => {
                    debug!(domain = %domain, attempt, "Tenant created concurrently, re-reading");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(domain = %domain, attempts = self.max_attempts, "Tenant provisioning did not converge");
        Err(LedgerError::TenantProvisioningConflict {
            domain,
            attempts: self.max_attempts,
        })
    }

    pub async fn rename(&self, tenant_id: TenantId, name: &str) -> Result<Tenant, LedgerError> {
        if name.trim().is_empty() {
            return Err(LedgerError::InvalidArgument("tenant name must not be empty".to_string()));
        }
        Ok(self.tenants.rename(tenant_id, name.trim()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::InMemoryTenantRepository;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Another node always wins the insert; its row becomes readable after
    /// `misses` lookups, or never when there is no winner.
    struct LosingRace {
        winner: Option<Tenant>,
        misses: AtomicU32,
        creates: AtomicU32,
    }

    impl LosingRace {
        fn new(winner: Option<Tenant>, misses: u32) -> Self {
            Self {
                winner,
                misses: AtomicU32::new(misses),
                creates: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl TenantRepository for LosingRace {
        async fn find_by_domain(&self, _domain: &str) -> Result<Option<Tenant>, RepositoryError> {
            if self.misses.load(Ordering::SeqCst) > 0 {
                self.misses.fetch_sub(1, Ordering::SeqCst);
                return Ok(None);
            }
            Ok(self.winner.clone())
        }

        async fn create(&self, _tenant: NewTenant) -> Result<Tenant, RepositoryError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            Err(RepositoryError::UniqueViolation("tenants_domain_key".to_string()))
        }

        async fn rename(&self, id: TenantId, _name: &str) -> Result<Tenant, RepositoryError> {
            Err(RepositoryError::NotFound(format!("tenant {}", id)))
        }
    }

    fn tenant_for(domain: &str) -> Tenant {
        let now = Utc::now();
        Tenant {
            id: TenantId::new(),
            name: domain.to_string(),
            domain: domain.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn resolver() -> TenantResolver {
        TenantResolver::new(Arc::new(InMemoryTenantRepository::new()), EventBus::with_default_capacity())
    }

    #[tokio::test]
    async fn test_same_domain_resolves_to_same_tenant() {
        let resolver = resolver();
        let a = resolver.resolve_email("a@newco.io").await.unwrap();
        let b = resolver.resolve_email("b@NewCo.io").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.name, "newco.io");
    }

    #[tokio::test]
    async fn test_malformed_email_is_invalid_principal() {
        let resolver = resolver();
        let err = resolver.resolve_email("not-an-email").await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidPrincipal(_)));
    }

    #[tokio::test]
    async fn test_provisioning_publishes_event_once() {
        let bus = EventBus::with_default_capacity();
        let mut rx = bus.subscribe();
        let resolver = TenantResolver::new(Arc::new(InMemoryTenantRepository::new()), bus);

        resolver.resolve_email("a@newco.io").await.unwrap();
        resolver.resolve_email("b@newco.io").await.unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event_type(), "TenantProvisioned");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rename_keeps_domain() {
        let resolver = resolver();
        let tenant = resolver.resolve_email("a@newco.io").await.unwrap();
        let renamed = resolver.rename(tenant.id, "NewCo Inc").await.unwrap();
        assert_eq!(renamed.name, "NewCo Inc");
        assert_eq!(renamed.domain, "newco.io");
        assert!(resolver.rename(tenant.id, " ").await.is_err());
    }

    #[tokio::test]
    async fn test_unique_violation_rereads_the_winner() {
        let winner = tenant_for("newco.io");
        let repo = Arc::new(LosingRace::new(Some(winner.clone()), 1));
        let bus = EventBus::with_default_capacity();
        let mut rx = bus.subscribe();
        let resolver = TenantResolver::new(repo.clone(), bus);

        let resolved = resolver.resolve_email("a@newco.io").await.unwrap();
        assert_eq!(resolved.id, winner.id);
        assert_eq!(repo.creates.load(Ordering::SeqCst), 1);
        // The winning node announces the tenant, not us.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unreadable_winner_exhausts_attempts() {
        let repo = Arc::new(LosingRace::new(None, 0));
        let resolver = TenantResolver::new(repo.clone(), EventBus::with_default_capacity()).with_max_attempts(4);

        let err = resolver.resolve_email("a@newco.io").await.unwrap_err();
        match err {
            LedgerError::TenantProvisioningConflict { domain, attempts } => {
                assert_eq!(domain, "newco.io");
                assert_eq!(attempts, 4);
            }
            other => panic!("expected TenantProvisioningConflict, got {:?}", other),
        }
        assert_eq!(repo.creates.load(Ordering::SeqCst), 4);
    }
}
