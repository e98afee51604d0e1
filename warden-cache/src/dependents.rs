use std::collections::{HashMap, HashSet};

/// Static adjacency table: mutating a resource also invalidates the cached
/// views of the resources declared as its dependents.
///
/// Dependents are followed transitively; cycles are tolerated.
#[derive(Clone, Debug, Default)]
pub struct DependencyMap {
    edges: HashMap<String, Vec<String>>,
}

impl DependencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `dependents` of `resource`, in addition to existing ones.
    pub fn with<I, S>(mut self, resource: &str, dependents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.edges.entry(resource.to_string()).or_default();
        for dependent in dependents {
            let dependent = dependent.into();
            if !entry.contains(&dependent) {
                entry.push(dependent);
            }
        }
        self
    }

    /// Directly declared dependents.
    pub fn direct(&self, resource: &str) -> &[String] {
        self.edges.get(resource).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every resource reachable from `resource`, excluding itself, in
    /// breadth-first order.
    pub fn dependents_of(&self, resource: &str) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::from([resource]);
        let mut order = Vec::new();
        let mut frontier = vec![resource];
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for node in frontier {
                for dependent in self.direct(node) {
                    if seen.insert(dependent.as_str()) {
                        order.push(dependent.clone());
                        next.push(dependent.as_str());
                    }
                }
            }
            frontier = next;
        }
        order
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

impl From<HashMap<String, Vec<String>>> for DependencyMap {
    fn from(edges: HashMap<String, Vec<String>>) -> Self {
        edges
            .into_iter()
            .fold(DependencyMap::new(), |map, (resource, dependents)| {
                map.with(&resource, dependents)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitive_and_cycle_safe() {
        let map = DependencyMap::new()
            .with("projects", ["tasks"])
            .with("tasks", ["comments", "projects"])
            .with("clients", ["projects"]);

        assert_eq!(map.dependents_of("projects"), vec!["tasks", "comments"]);
        assert_eq!(map.dependents_of("clients"), vec!["projects", "tasks", "comments"]);
        assert!(map.dependents_of("comments").is_empty());
    }
}
