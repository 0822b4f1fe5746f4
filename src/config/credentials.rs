use tracing::debug;

/// Resolve a secret-bearing setting. A value starting with `$` names an environment variable;
/// unset variables resolve to `None`.
pub fn resolve_secret(value: &str) -> Option<String> {
    let Some(var_name) = value.strip_prefix('$') else {
        return Some(value.to_string());
    };
    match std::env::var(var_name) {
        Ok(resolved) if !resolved.is_empty() => {
            debug!(var = %var_name, "Resolved secret from environment");
            Some(resolved)
        }
        _ => {
            debug!(var = %var_name, "Environment variable not set");
            None
        }
    }
}

/// Mask every occurrence of the given secrets. Secrets shorter than 4 characters are left alone.
pub fn redact_secrets(text: &str, secrets: &[&str]) -> String {
    let mut result = text.to_string();
    for secret in secrets.iter().filter(|s| s.len() >= 4) {
        result = result.replace(secret, "[REDACTED]");
    }
    result
}
