use super::ConfigError;

/// Backend that turns a `${...}` reference into its secret value.
pub trait SecretResolver: Send + Sync {
    fn resolve(&self, reference: &str) -> Result<String, ConfigError>;
}

/// Resolves `${VAR}`, `${env:VAR}` and `${file:/path}` references.
///
/// Database credentials for the tenant and elevated pools are expected to come
/// through here rather than sit in `application.yaml`.
pub struct DefaultSecretResolver;

impl SecretResolver for DefaultSecretResolver {
    fn resolve(&self, reference: &str) -> Result<String, ConfigError> {
        let reference = reference.trim();
        if let Some(path) = reference.strip_prefix("file:") {
            let path = path.trim();
            return std::fs::read_to_string(path)
                .map(|s| s.trim().to_string())
                .map_err(|e| ConfigError::Load(format!("secret file '{path}': {e}")));
        }
        let var = reference.strip_prefix("env:").unwrap_or(reference).trim();
        std::env::var(var).map_err(|_| ConfigError::NotFound(format!("env:{var}")))
    }
}

/// Replace every `${...}` placeholder in `value` using `resolver`.
pub fn resolve_placeholders(
    value: &str,
    resolver: &dyn SecretResolver,
) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        let end = rest[start..]
            .find('}')
            .ok_or_else(|| ConfigError::Load(format!("unclosed placeholder in: {value}")))?;
        out.push_str(&rest[..start]);
        out.push_str(&resolver.resolve(&rest[start + 2..start + end])?);
        rest = &rest[start + end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl SecretResolver for Fixed {
        fn resolve(&self, reference: &str) -> Result<String, ConfigError> {
            Ok(format!("<{reference}>"))
        }
    }

    #[test]
    fn replaces_every_placeholder() {
        let out = resolve_placeholders("postgres://${USER}:${env:PASS}@db/app", &Fixed).unwrap();
        assert_eq!(out, "postgres://<USER>:<env:PASS>@db/app");
    }

    #[test]
    fn unclosed_placeholder_is_an_error() {
        assert!(resolve_placeholders("postgres://${USER@db", &Fixed).is_err());
    }

    #[test]
    fn reads_file_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("password");
        std::fs::write(&path, "s3cret\n").unwrap();
        let value = DefaultSecretResolver
            .resolve(&format!("file:{}", path.display()))
            .unwrap();
        assert_eq!(value, "s3cret");
    }
}
