use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use url::Url;

use crate::http::ProbeResponse;
use crate::ratelimit::{BurstPermit, SubdomainState};

/// A bug bounty program: scope suffixes plus descriptive metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Program {
    pub name: String,
    pub url: String,
    pub platform: String,
    pub offers_bounties: bool,
    pub in_scope: Vec<String>,
    pub out_of_scope: Vec<String>,
}

impl Program {
    /// A host is in scope when it ends with an in-scope suffix and with no out-of-scope suffix.
    pub fn is_in_scope(&self, host: &str) -> bool {
        self.in_scope.iter().any(|s| host.ends_with(s.as_str()))
            && !self.out_of_scope.iter().any(|s| host.ends_with(s.as_str()))
    }
}

/// A cookie harvested from a `Set-Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Parse the leading `name=value` of a `Set-Cookie` header, ignoring attributes.
    pub fn parse_set_cookie(header: &str) -> Option<Self> {
        let pair = header.split(';').next()?.trim();
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self::new(name, value.trim().trim_matches('"')))
    }

    pub fn is_session(&self) -> bool {
        self.name.to_lowercase().contains("sess")
    }
}

/// A rate-limit domain. All probes against one hostname go through its permit.
#[derive(Debug)]
pub struct Subdomain {
    pub hostname: String,
    pub program: Arc<Program>,
    state: Arc<Mutex<SubdomainState>>,
}

impl Subdomain {
    pub fn new(hostname: impl Into<String>, program: Arc<Program>) -> Self {
        Self {
            hostname: hostname.into(),
            program,
            state: Arc::new(Mutex::new(SubdomainState::default())),
        }
    }

    /// Wait until this subdomain is free and `backoff` has passed since its last request.
    pub async fn acquire(&self, backoff: Duration) -> BurstPermit {
        BurstPermit::acquire(&self.state, backoff).await
    }

    /// Snapshot of the harvested cookies.
    pub async fn cookies(&self) -> Vec<Cookie> {
        self.state.lock().await.cookies.clone()
    }
}

/// One URL to attack.
#[derive(Debug, Clone)]
pub struct Target {
    pub url: String,
    /// Captured baseline response. `None` means the orchestrator fetches one itself.
    pub baseline: Option<ProbeResponse>,
    pub subdomain: Arc<Subdomain>,
    /// Skip everything except the reflected cookie search.
    pub cookie_reflection_only: bool,
}

impl Target {
    pub fn new(url: impl Into<String>, subdomain: Arc<Subdomain>) -> Self {
        Self {
            url: url.into(),
            baseline: None,
            subdomain,
            cookie_reflection_only: false,
        }
    }

    pub fn with_baseline(mut self, baseline: ProbeResponse) -> Self {
        self.baseline = Some(baseline);
        self
    }
}

/// Lowercased hostname of an absolute URL, without userinfo or port.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(str::to_string)
}

/// `host[:port]` for a `Host` header. The port is kept only when it is not the scheme default.
pub fn authority_of(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program() -> Program {
        Program {
            name: "Example".into(),
            in_scope: vec![".example.com".into(), "example.org".into()],
            out_of_scope: vec!["admin.example.com".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_scope_in_suffix() {
        let p = program();
        assert!(p.is_in_scope("www.example.com"));
        assert!(p.is_in_scope("example.org"));
        assert!(!p.is_in_scope("example.net"));
    }

    #[test]
    fn test_scope_out_of_scope_wins() {
        let p = program();
        assert!(!p.is_in_scope("admin.example.com"));
        assert!(!p.is_in_scope("eu.admin.example.com"));
    }

    #[test]
    fn test_scope_empty_program() {
        assert!(!Program::default().is_in_scope("example.com"));
    }

    #[test]
    fn test_parse_set_cookie() {
        let c = Cookie::parse_set_cookie("lang=en-US; Path=/; HttpOnly").unwrap();
        assert_eq!(c, Cookie::new("lang", "en-US"));
        assert!(Cookie::parse_set_cookie("; Path=/").is_none());
        assert!(Cookie::parse_set_cookie("novalue").is_none());
    }

    #[test]
    fn test_session_cookie() {
        assert!(Cookie::new("PHPSESSID", "x").is_session());
        assert!(Cookie::new("user_session", "x").is_session());
        assert!(!Cookie::new("theme", "x").is_session());
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("https://a.example.com/x?y=1").as_deref(), Some("a.example.com"));
        assert_eq!(host_of("http://a.example.com:8080").as_deref(), Some("a.example.com"));
        assert_eq!(host_of("https://user:pw@x.evil.com/").as_deref(), Some("x.evil.com"));
        assert_eq!(host_of("HTTPS://Shop.Example.COM/").as_deref(), Some("shop.example.com"));
        assert_eq!(host_of("a.example.com"), None);
    }

    #[test]
    fn test_authority_of() {
        assert_eq!(authority_of("https://a.example.com:443/x").as_deref(), Some("a.example.com"));
        assert_eq!(authority_of("http://a.example.com:8080/").as_deref(), Some("a.example.com:8080"));
        assert_eq!(authority_of("https://user@a.example.com:8443").as_deref(), Some("a.example.com:8443"));
    }

    #[test]
    fn test_scope_ignores_port_and_userinfo() {
        let p = Program {
            in_scope: vec!["a.com".into()],
            ..Default::default()
        };
        let on_port = host_of("https://a.com:8443/").unwrap();
        assert!(p.is_in_scope(&on_port));
        let spoofed = host_of("https://a.com@x.evil.com/").unwrap();
        assert!(!p.is_in_scope(&spoofed));
    }
}
