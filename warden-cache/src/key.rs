use std::fmt;

use warden_core::TenantId;

/// A tenant-scoped cache key.
///
/// Layout: `tenant:{tenant}:{resource}:list:{variant}` for collection views
/// and `tenant:{tenant}:{resource}:detail:{id}` for single entities. Every key
/// starts with its tenant, so no prefix of one tenant matches another's keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Collection view. `variant` distinguishes filters or pages; use
    /// `"all"` for the unfiltered list.
    pub fn list(tenant: TenantId, resource: &str, variant: &str) -> Self {
        CacheKey(format!("{}{variant}", Self::list_prefix(tenant, resource)))
    }

    pub fn detail(tenant: TenantId, resource: &str, id: &str) -> Self {
        CacheKey(format!("{}detail:{id}", Self::resource_prefix(tenant, resource)))
    }

    /// Prefix of every key of one tenant.
    pub fn tenant_prefix(tenant: TenantId) -> String {
        format!("tenant:{tenant}:")
    }

    /// Prefix of every key of one resource of one tenant.
    pub fn resource_prefix(tenant: TenantId, resource: &str) -> String {
        format!("tenant:{tenant}:{resource}:")
    }

    /// Prefix of every collection view of one resource of one tenant.
    pub fn list_prefix(tenant: TenantId, resource: &str) -> String {
        format!("tenant:{tenant}:{resource}:list:")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_nest_under_their_prefixes() {
        let t = TenantId::random();
        let list = CacheKey::list(t, "projects", "all");
        let detail = CacheKey::detail(t, "projects", "42");

        assert!(list.as_str().starts_with(&CacheKey::list_prefix(t, "projects")));
        assert!(detail.as_str().starts_with(&CacheKey::resource_prefix(t, "projects")));
        assert!(!detail.as_str().starts_with(&CacheKey::list_prefix(t, "projects")));
        assert!(list.as_str().starts_with(&CacheKey::tenant_prefix(t)));
        assert!(!list.as_str().starts_with(&CacheKey::tenant_prefix(TenantId::random())));
    }

    #[test]
    fn resource_prefix_does_not_match_longer_names() {
        let t = TenantId::random();
        let archived = CacheKey::list(t, "tasks_archive", "all");
        assert!(!archived.as_str().starts_with(&CacheKey::resource_prefix(t, "tasks")));
    }
}
