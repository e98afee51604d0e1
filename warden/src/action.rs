use warden_audit::{singularize, ResourcePath};
use warden_core::{OperationKind, Permission, WardenError};

/// What a unit of work does, described once and used by every stage: the
/// permission check, the audit entry, cache invalidation and the event.
///
/// `/projects/42` with [`OperationKind::Update`] checks `(project, update)`,
/// audits entity `project`/`42` and invalidates the `projects` views.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtectedAction {
    path: String,
    kind: OperationKind,
    resource: String,
    entity_type: String,
    entity_id: Option<String>,
}

impl ProtectedAction {
    pub fn new(path: &str, kind: OperationKind) -> Result<Self, WardenError> {
        let parsed = ResourcePath::parse(path)
            .ok_or_else(|| WardenError::NotFound(format!("no resource in path '{path}'")))?;
        Ok(ProtectedAction {
            path: path.to_string(),
            kind,
            resource: parsed.resource,
            entity_type: parsed.entity_type,
            entity_id: parsed.entity_id,
        })
    }

    /// Build from an HTTP method and path.
    pub fn from_request(method: &str, path: &str) -> Result<Self, WardenError> {
        let kind = OperationKind::from_method(method)
            .ok_or_else(|| WardenError::Handler(format!("unsupported method {method}")))?;
        Self::new(path, kind)
    }

    /// An action on a collection that has no request path.
    pub fn for_resource(resource: &str, kind: OperationKind) -> Self {
        let resource = resource.to_ascii_lowercase();
        ProtectedAction {
            path: format!("/{resource}"),
            kind,
            entity_type: singularize(&resource.replace('-', "_")),
            resource,
            entity_id: None,
        }
    }

    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.path = format!("/{}/{}", self.resource, id);
        self.entity_id = Some(id);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Collection name, as used in cache keys.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Singular name, as used in permissions and audit entries.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    /// The `(entity type, operation)` pair the caller must hold.
    pub fn permission(&self) -> Permission {
        Permission::new(&self.entity_type, self.kind.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_permission_and_entity_from_path() {
        let action = ProtectedAction::new("/api/v1/projects/42?expand=tasks", OperationKind::Update).unwrap();
        assert_eq!(action.resource(), "projects");
        assert_eq!(action.entity_id(), Some("42"));
        assert_eq!(action.permission(), Permission::new("project", "update"));
    }

    #[test]
    fn permission_names_keep_es_singulars() {
        let caches = ProtectedAction::new("/caches/1", OperationKind::Update).unwrap();
        assert_eq!(caches.permission(), Permission::new("cache", "update"));
        let statuses = ProtectedAction::new("/order-statuses/3", OperationKind::Read).unwrap();
        assert_eq!(statuses.permission(), Permission::new("order_status", "read"));
    }

    #[test]
    fn method_mapping() {
        let action = ProtectedAction::from_request("delete", "/clients/7").unwrap();
        assert_eq!(action.kind(), OperationKind::Delete);
        assert_eq!(action.permission(), Permission::new("client", "delete"));
        assert!(ProtectedAction::from_request("TRACE", "/clients").is_err());
    }

    #[test]
    fn resource_without_path() {
        let action = ProtectedAction::for_resource("Companies", OperationKind::Create);
        assert_eq!(action.path(), "/companies");
        assert_eq!(action.entity_type(), "company");
        let detail = action.with_entity_id("9");
        assert_eq!(detail.path(), "/companies/9");
    }

    #[test]
    fn empty_path_is_rejected() {
        assert!(matches!(
            ProtectedAction::new("/api/v2/", OperationKind::Read),
            Err(WardenError::NotFound(_))
        ));
    }
}
