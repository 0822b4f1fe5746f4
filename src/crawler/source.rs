use std::path::Path;
use std::sync::Arc;

use tracing::info;

use super::SubdomainRegistry;
use crate::errors::CachesnakeError;
use crate::models::{host_of, Subdomain, Target};

/// Read a newline-separated hostname list. Blank lines and `#` comments are skipped.
pub async fn load_subdomains(
    path: &Path,
    registry: &SubdomainRegistry,
) -> Result<Vec<Arc<Subdomain>>, CachesnakeError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        CachesnakeError::Config(format!("Cannot read subdomain file {}: {}", path.display(), e))
    })?;

    let subdomains = parse_subdomains(&content, registry);
    if subdomains.is_empty() {
        return Err(CachesnakeError::Config(format!(
            "Subdomain file is empty: {}",
            path.display()
        )));
    }
    info!(file = %path.display(), count = subdomains.len(), "Loaded subdomains");
    Ok(subdomains)
}

pub fn parse_subdomains(content: &str, registry: &SubdomainRegistry) -> Vec<Arc<Subdomain>> {
    let mut seen = std::collections::HashSet::new();
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter(|l| seen.insert(l.to_ascii_lowercase()))
        .map(|host| registry.get_or_insert(host))
        .collect()
}

/// Read a newline-separated list of absolute URLs to attack without crawling.
pub async fn load_targets(path: &Path, registry: &SubdomainRegistry) -> Result<Vec<Arc<Target>>, CachesnakeError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        CachesnakeError::Config(format!("Cannot read target file {}: {}", path.display(), e))
    })?;

    let targets = parse_targets(&content, registry)?;
    if targets.is_empty() {
        return Err(CachesnakeError::Config(format!(
            "Target file is empty: {}",
            path.display()
        )));
    }
    info!(file = %path.display(), count = targets.len(), "Loaded targets");
    Ok(targets)
}

pub fn parse_targets(content: &str, registry: &SubdomainRegistry) -> Result<Vec<Arc<Target>>, CachesnakeError> {
    let mut targets = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let url = line.trim();
        if url.is_empty() || url.starts_with('#') {
            continue;
        }
        let host = host_of(url).filter(|_| url.starts_with("http://") || url.starts_with("https://"));
        let Some(host) = host else {
            return Err(CachesnakeError::InvalidTarget(format!(
                "line {}: '{}' is not an absolute http(s) URL",
                lineno + 1,
                url
            )));
        };
        let subdomain = registry.get_or_insert(&host);
        targets.push(Arc::new(Target::new(url, subdomain)));
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Program;
    use std::io::Write;

    fn registry() -> SubdomainRegistry {
        SubdomainRegistry::new(Arc::new(Program {
            name: "Acme".into(),
            in_scope: vec!["acme.com".into()],
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "www.acme.com\n\n  api.acme.com  \n# staging.acme.com\nwww.acme.com").unwrap();
        let registry = registry();
        let subs = load_subdomains(file.path(), &registry).await.unwrap();
        let hosts: Vec<&str> = subs.iter().map(|s| s.hostname.as_str()).collect();
        assert_eq!(hosts, vec!["www.acme.com", "api.acme.com"]);
        assert_eq!(subs[0].program.name, "Acme");
    }

    #[tokio::test]
    async fn test_empty_file_is_config_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = load_subdomains(file.path(), &registry()).await.unwrap_err();
        assert!(matches!(err, CachesnakeError::Config(_)));
    }

    #[test]
    fn test_parse_targets_share_subdomains() {
        let registry = registry();
        let targets = parse_targets(
            "https://www.acme.com/\n# skip\nhttps://www.acme.com/login?next=1\nhttp://api.acme.com:8080/v1\n",
            &registry,
        )
        .unwrap();
        assert_eq!(targets.len(), 3);
        assert!(Arc::ptr_eq(&targets[0].subdomain, &targets[1].subdomain));
        assert_eq!(targets[2].subdomain.hostname, "api.acme.com");
        assert_eq!(targets[2].url, "http://api.acme.com:8080/v1");
        assert!(targets.iter().all(|t| t.baseline.is_none()));
    }

    #[test]
    fn test_parse_targets_rejects_relative() {
        let err = parse_targets("https://www.acme.com/\n/login\n", &registry()).unwrap_err();
        assert!(matches!(err, CachesnakeError::InvalidTarget(ref m) if m.contains("line 2")));
        assert_eq!(err.exit_code(), 5);

        let err = parse_targets("ftp://files.acme.com/\n", &registry()).unwrap_err();
        assert!(matches!(err, CachesnakeError::InvalidTarget(_)));
    }
}
