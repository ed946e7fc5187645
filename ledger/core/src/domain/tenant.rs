// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a tenant
///
/// Every versioned read and write is scoped by one of these. There is no
/// default tenant: a `TenantId` only exists once a principal was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub Uuid);

impl TenantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Isolation boundary derived from a principal's email domain.
///
/// `domain` is the natural key used for resolution, `id` the surrogate key
/// used everywhere else. Tenant metadata is not versioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub domain: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tenant about to be provisioned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTenant {
    pub name: String,
    pub domain: String,
}

impl NewTenant {
    /// Auto-provisioned tenants are named after their domain.
    pub fn for_domain(domain: &str) -> Self {
        Self {
            name: domain.to_string(),
            domain: domain.to_string(),
        }
    }
}

/// Extract the tenant domain from a principal email.
///
/// The address must split on `@` into exactly two non-empty parts. The domain
/// is lowercased so `NewCo.io` and `newco.io` land in the same tenant.
pub fn email_domain(email: &str) -> Option<String> {
    let mut parts = email.trim().split('@');
    let local = parts.next()?;
    let domain = parts.next()?;
    if parts.next().is_some() || local.is_empty() || domain.is_empty() {
        return None;
    }
    Some(domain.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_domain_extracts_suffix() {
        assert_eq!(email_domain("a@newco.io").as_deref(), Some("newco.io"));
        assert_eq!(email_domain("Ops@NewCo.IO").as_deref(), Some("newco.io"));
    }

    #[test]
    fn test_email_domain_rejects_malformed() {
        assert!(email_domain("no-at-sign").is_none());
        assert!(email_domain("a@b@c").is_none());
        assert!(email_domain("@newco.io").is_none());
        assert!(email_domain("a@").is_none());
        assert!(email_domain("").is_none());
    }

    #[test]
    fn test_new_tenant_named_after_domain() {
        let tenant = NewTenant::for_domain("newco.io");
        assert_eq!(tenant.name, "newco.io");
        assert_eq!(tenant.domain, "newco.io");
    }
}
