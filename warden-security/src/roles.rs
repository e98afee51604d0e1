//! Role extraction from verified claims.
//!
//! Identity providers put roles in different places. The principal builder is
//! parameterized over a [`RoleExtractor`] so deployments can point it at the
//! right claim without touching the rest of the pipeline.

/// Extracts role names from a claims object.
pub trait RoleExtractor: Send + Sync {
    fn extract_roles(&self, claims: &serde_json::Value) -> Vec<String>;
}

/// Reads the top-level `roles` array.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardRoleExtractor;

impl RoleExtractor for StandardRoleExtractor {
    fn extract_roles(&self, claims: &serde_json::Value) -> Vec<String> {
        string_array_at(claims, &["roles"])
    }
}

/// Reads Keycloak-style `realm_access.roles`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealmRoleExtractor;

impl RoleExtractor for RealmRoleExtractor {
    fn extract_roles(&self, claims: &serde_json::Value) -> Vec<String> {
        string_array_at(claims, &["realm_access", "roles"])
    }
}

/// Tries `A`, falls back to `B` when `A` yields nothing.
#[derive(Debug, Clone, Copy)]
pub struct FirstOf<A, B>(pub A, pub B);

impl<A: RoleExtractor, B: RoleExtractor> RoleExtractor for FirstOf<A, B> {
    fn extract_roles(&self, claims: &serde_json::Value) -> Vec<String> {
        let roles = self.0.extract_roles(claims);
        if roles.is_empty() {
            self.1.extract_roles(claims)
        } else {
            roles
        }
    }
}

/// Default extractor: standard `roles` claim, then `realm_access.roles`.
pub type DefaultRoleExtractor = FirstOf<StandardRoleExtractor, RealmRoleExtractor>;

pub fn default_role_extractor() -> DefaultRoleExtractor {
    FirstOf(StandardRoleExtractor, RealmRoleExtractor)
}

/// Collect the strings of the array found at `path`, ignoring non-string items.
pub fn string_array_at(value: &serde_json::Value, path: &[&str]) -> Vec<String> {
    path.iter()
        .try_fold(value, |current, key| current.get(*key))
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}
