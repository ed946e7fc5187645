// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tenant resolution from principal emails: idempotence under sequential and
//! concurrent first logins, and rejection of unusable principals.

use std::sync::Arc;

use evolve_ledger_core::application::tenant_resolver::TenantResolver;
use evolve_ledger_core::domain::events::LedgerEvent;
use evolve_ledger_core::domain::identity::IdentityClaims;
use evolve_ledger_core::domain::repository::TenantRepository;
use evolve_ledger_core::infrastructure::event_bus::EventBus;
use evolve_ledger_core::infrastructure::repositories::InMemoryTenantRepository;
use evolve_ledger_core::LedgerError;

fn claims_for(email: &str) -> IdentityClaims {
    IdentityClaims {
        subject: format!("sub-{}", email),
        email: email.to_string(),
        ..IdentityClaims::dev_placeholder()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_logins_share_one_tenant() {
    let repo = Arc::new(InMemoryTenantRepository::new());
    let bus = EventBus::with_default_capacity();
    let mut events = bus.subscribe();
    let resolver = Arc::new(TenantResolver::new(repo.clone(), bus));

    let mut handles = Vec::new();
    for i in 0..20 {
        let resolver = resolver.clone();
        let email = if i % 2 == 0 { "a@newco.io" } else { "b@newco.io" };
        handles.push(tokio::spawn(async move { resolver.resolve(&claims_for(email)).await }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap());
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);

    let tenant = repo.find_by_domain("newco.io").await.unwrap().unwrap();
    assert_eq!(tenant.id, ids[0]);
    assert_eq!(tenant.name, "newco.io");

    let mut provisioned = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, LedgerEvent::TenantProvisioned { .. }) {
            provisioned += 1;
        }
    }
    assert_eq!(provisioned, 1);
}

#[tokio::test]
async fn test_sequential_resolution_is_idempotent_and_case_insensitive() {
    let resolver = TenantResolver::new(Arc::new(InMemoryTenantRepository::new()), EventBus::with_default_capacity());
    let first = resolver.resolve(&claims_for("alice@NewCo.io")).await.unwrap();
    let second = resolver.resolve(&claims_for("bob@newco.io")).await.unwrap();
    let other = resolver.resolve(&claims_for("carol@other.org")).await.unwrap();

    assert_eq!(first, second);
    assert_ne!(first, other);
}

#[tokio::test]
async fn test_unusable_emails_are_invalid_principal() {
    let resolver = TenantResolver::new(Arc::new(InMemoryTenantRepository::new()), EventBus::with_default_capacity());
    for email in ["", "no-at-sign", "@newco.io", "alice@", "a@b@c.io"] {
        let err = resolver.resolve(&claims_for(email)).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidPrincipal(_)), "{email:?} gave {err:?}");
        assert_eq!(err.status(), 403);
    }
}

#[tokio::test]
async fn test_rename_keeps_domain() {
    let repo = Arc::new(InMemoryTenantRepository::new());
    let resolver = TenantResolver::new(repo.clone(), EventBus::with_default_capacity());
    let tenant_id = resolver.resolve(&claims_for("alice@newco.io")).await.unwrap();

    let renamed = resolver.rename(tenant_id, "NewCo Inc.").await.unwrap();
    assert_eq!(renamed.name, "NewCo Inc.");
    assert_eq!(renamed.domain, "newco.io");
    assert!(matches!(
        resolver.rename(tenant_id, "  ").await,
        Err(LedgerError::InvalidArgument(_))
    ));
}
