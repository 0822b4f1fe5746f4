use std::path::Path;

use regex::Regex;
use tracing::warn;

use super::schema::CONFIG_SCHEMA;
use super::types::CachesnakeConfig;
use crate::errors::CachesnakeError;

const MAX_CONFIG_BYTES: u64 = 1_048_576;

pub async fn parse_config(path: &Path) -> Result<CachesnakeConfig, CachesnakeError> {
    if !path.exists() {
        return Err(CachesnakeError::Config(format!("Config file not found: {}", path.display())));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > MAX_CONFIG_BYTES {
        return Err(CachesnakeError::Config("Config file exceeds 1MB limit".into()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    parse_config_str(&content)
}

/// Parse config text: YAML, schema check, typed decode, semantic validation.
pub fn parse_config_str(content: &str) -> Result<CachesnakeConfig, CachesnakeError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;
    // An empty document means "all defaults".
    if yaml.is_null() {
        return Ok(CachesnakeConfig::default());
    }

    validate_schema(&yaml)?;

    let config: CachesnakeConfig = serde_yaml::from_value(yaml)?;
    validate_semantics(&config)?;
    Ok(config)
}

/// Check the raw document against the JSON schema. Violations are logged, not fatal; the typed
/// decode and semantic checks decide.
fn validate_schema(yaml: &serde_yaml::Value) -> Result<(), CachesnakeError> {
    let json_value = serde_json::to_value(yaml)
        .map_err(|e| CachesnakeError::Config(format!("Config conversion error: {}", e)))?;

    let compiled = jsonschema::JSONSchema::compile(&CONFIG_SCHEMA)
        .map_err(|e| CachesnakeError::Config(format!("Schema compilation error: {}", e)))?;

    if let Err(errors) = compiled.validate(&json_value) {
        for e in errors {
            let msg = format!("{} at {}", e, e.instance_path);
            warn!(validation_error = %msg, "Config schema warning");
        }
    }
    Ok(())
}

pub fn validate_semantics(config: &CachesnakeConfig) -> Result<(), CachesnakeError> {
    for (stage, workers) in [
        ("crawler", config.crawler.workers),
        ("attack", config.attack.workers),
        ("triage", config.triage.workers),
    ] {
        if workers == 0 {
            return Err(CachesnakeError::Config(format!("{stage}.workers must be at least 1")));
        }
    }

    if config.crawler.targets_per_subdomain == 0 {
        return Err(CachesnakeError::Config(
            "crawler.targets_per_subdomain must be at least 1".into(),
        ));
    }

    for timeout in [config.crawler.timeout, config.attack.timeout] {
        if timeout.get().is_zero() {
            return Err(CachesnakeError::Config("Request timeouts must be non-zero".into()));
        }
    }

    for raw in &config.crawler.regexes {
        let re = Regex::new(raw)
            .map_err(|e| CachesnakeError::Config(format!("Invalid crawler regex '{raw}': {e}")))?;
        if re.captures_len() < 2 {
            return Err(CachesnakeError::Config(format!(
                "Crawler regex '{raw}' needs a capture group for the link"
            )));
        }
    }

    if config.user_agent.trim().is_empty() {
        return Err(CachesnakeError::Config("user_agent must not be empty".into()));
    }

    if config.scope.in_scope.is_empty() {
        warn!("No in-scope suffixes configured, the crawler will not follow links");
    }
    if config.attack.backoff.get().is_zero() {
        warn!("attack.backoff is zero, probes will not be spaced out");
    }
    if config.notifications.send_status && config.notifications.webhook_url.is_none() {
        warn!("notifications.send_status is set but no webhook_url is configured");
    }

    Ok(())
}
