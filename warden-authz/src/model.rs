use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_core::{Permission, TenantId};

/// A permission bound directly to a tenant (`account_permissions`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectGrant {
    pub tenant: TenantId,
    pub permission: Permission,
    pub expires_at: Option<DateTime<Utc>>,
}

impl DirectGrant {
    /// Valid up to and including the expiry instant.
    pub fn is_valid_at(&self, as_of: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |exp| exp >= as_of)
    }
}

/// A named bundle of permissions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// A role assigned to a tenant (`account_role_assignments`), optionally
/// scoped to a related tenant and a validity window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub id: i64,
    pub tenant: TenantId,
    pub role_id: i64,
    pub related_tenant: Option<TenantId>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl RoleGrant {
    pub fn new(tenant: TenantId, role_id: i64) -> Self {
        RoleGrant {
            id: 0,
            tenant,
            role_id,
            related_tenant: None,
            valid_from: None,
            valid_until: None,
        }
    }

    pub fn related_to(mut self, tenant: TenantId) -> Self {
        self.related_tenant = Some(tenant);
        self
    }

    pub fn valid_from(mut self, from: DateTime<Utc>) -> Self {
        self.valid_from = Some(from);
        self
    }

    pub fn valid_until(mut self, until: DateTime<Utc>) -> Self {
        self.valid_until = Some(until);
        self
    }

    /// Inside `valid_from..=valid_until`; open ends are unbounded.
    pub fn is_valid_at(&self, as_of: DateTime<Utc>) -> bool {
        self.valid_from.map_or(true, |from| from <= as_of)
            && self.valid_until.map_or(true, |until| until >= as_of)
    }

    /// An unscoped assignment applies everywhere; a scoped one only when the
    /// query targets the same related tenant or targets none.
    pub fn applies_to(&self, related: Option<TenantId>) -> bool {
        match (related, self.related_tenant) {
            (Some(wanted), Some(own)) => wanted == own,
            _ => true,
        }
    }
}

/// A time-bounded delegation of permissions from one tenant to another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub id: i64,
    pub from: TenantId,
    pub to: TenantId,
    pub valid_until: Option<DateTime<Utc>>,
}

impl Delegation {
    pub fn is_valid_at(&self, as_of: DateTime<Utc>) -> bool {
        self.valid_until.map_or(true, |until| until >= as_of)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn role_window_is_inclusive_on_both_ends() {
        let now = Utc::now();
        let grant = RoleGrant::new(TenantId::random(), 1)
            .valid_from(now)
            .valid_until(now + Duration::hours(1));
        assert!(!grant.is_valid_at(now - Duration::seconds(1)));
        assert!(grant.is_valid_at(now));
        assert!(grant.is_valid_at(now + Duration::hours(1)));
        assert!(!grant.is_valid_at(now + Duration::hours(1) + Duration::seconds(1)));
    }

    #[test]
    fn related_tenant_scoping() {
        let (a, b) = (TenantId::random(), TenantId::random());
        let scoped = RoleGrant::new(TenantId::random(), 1).related_to(a);
        assert!(scoped.applies_to(None));
        assert!(scoped.applies_to(Some(a)));
        assert!(!scoped.applies_to(Some(b)));
        assert!(RoleGrant::new(TenantId::random(), 1).applies_to(Some(b)));
    }
}
