//! Entity type and id derivation from resource paths.

/// A resource path broken into the parts the audit trail and the cache care
/// about: `/projects/42/tasks` → resource `projects`, entity type `project`,
/// entity id `42`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourcePath {
    /// First segment, as written (`projects`).
    pub resource: String,
    /// Singular form of the resource (`project`).
    pub entity_type: String,
    /// The path parameter following the resource, if any.
    pub entity_id: Option<String>,
}

impl ResourcePath {
    /// Parse a request path. A leading `api` segment and version segments
    /// (`v1`, `v2`, ...) are skipped; query strings are ignored. Returns
    /// `None` for a path without a resource segment.
    pub fn parse(path: &str) -> Option<ResourcePath> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let mut segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .skip_while(|s| *s == "api" || is_version(s));

        let resource = segments.next()?.to_ascii_lowercase();
        let entity_id = segments.next().map(str::to_string);
        Some(ResourcePath {
            entity_type: singularize(&resource.replace('-', "_")),
            resource,
            entity_id,
        })
    }
}

fn is_version(segment: &str) -> bool {
    segment
        .strip_prefix('v')
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

/// Singulars whose plural adds `es` after a single `s`.
const ES_AFTER_S: &[&str] = &[
    "alias", "bias", "bonus", "bus", "campus", "canvas", "census", "corpus", "gas", "status",
    "virus",
];

/// Singulars ending in `che`, whose plural only adds `s`.
const CHE_SINGULARS: &[&str] = &[
    "ache", "avalanche", "cache", "cliche", "headache", "moustache", "niche", "psyche",
];

/// English singular of a collection name, covering the plural forms used
/// by resource names.
pub fn singularize(word: &str) -> String {
    if ES_AFTER_S.contains(&last_word(word)) {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix("ies") {
        if !stem.is_empty() {
            return format!("{stem}y");
        }
    }
    if let Some(stem) = word.strip_suffix("es") {
        if ES_AFTER_S.contains(&last_word(stem)) {
            return stem.to_string();
        }
        if stem.ends_with("ch") {
            let single = &word[..word.len() - 1];
            return if CHE_SINGULARS.contains(&last_word(single)) {
                single.to_string()
            } else {
                stem.to_string()
            };
        }
        if ["ss", "sh", "x", "zz"].iter().any(|end| stem.ends_with(end)) {
            return stem.to_string();
        }
    }
    if word.ends_with('s') && !word.ends_with("ss") && word.len() > 1 {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

fn last_word(word: &str) -> &str {
    word.rsplit(|c| c == '-' || c == '_').next().unwrap_or(word)
}
