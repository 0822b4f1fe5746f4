//! Per-target attack orchestration.

pub mod bruteforce;
pub mod cookie;
pub mod header;
pub mod large_header;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::HeaderCatalogues;
use crate::http::{random_lowercase, strip_query, HeaderPair, Probe, ProbeResponse, Transport};
use crate::models::{AttackKind, AttackResult, Impact, Target, Vuln};
use crate::ratelimit::BurstPermit;
use crate::search::{HeaderSearchArgs, Oracle, Reason};

pub use bruteforce::HeaderBruteforceResult;
pub use cookie::CookieSearchResult;

/// Suffixes that commonly make a cache treat a dynamic page as a static asset.
pub fn cacheable_postfixes() -> [String; 7] {
    [
        format!("/cache{}.css", random_lowercase(5)),
        ".css".to_string(),
        "/.css".to_string(),
        format!("%0Acache{}.css", random_lowercase(5)),
        format!("%3Bcache{}.css", random_lowercase(5)),
        format!("%23cache{}.css", random_lowercase(5)),
        format!("%3Fcache{}.css", random_lowercase(5)),
    ]
}

/// Target URL with query, fragment and one trailing slash removed.
pub fn url_stem(url: &str) -> &str {
    let stripped = strip_query(url);
    stripped.strip_suffix('/').unwrap_or(stripped)
}

/// Runs the attack sequence against targets. Cheap to clone; one per worker.
#[derive(Clone)]
pub struct Attacker {
    transport: Arc<dyn Transport>,
    catalogues: Arc<HeaderCatalogues>,
    backoff: Duration,
    user_agent: String,
}

impl Attacker {
    pub fn new(
        transport: Arc<dyn Transport>,
        catalogues: Arc<HeaderCatalogues>,
        backoff: Duration,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            catalogues,
            backoff,
            user_agent: user_agent.into(),
        }
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Run every applicable attack against `target`. Never fails; a target whose baseline
    /// cannot be fetched yields an empty result.
    pub async fn run(&self, target: &Arc<Target>) -> AttackResult {
        let mut result = AttackResult::new(Arc::clone(target));

        let fetched;
        let baseline = match &target.baseline {
            Some(baseline) => baseline,
            None => match self.fetch_baseline(target).await {
                Some(response) => {
                    fetched = response;
                    &fetched
                }
                None => {
                    result.time_stopped = chrono::Utc::now();
                    return result;
                }
            },
        };

        let mut session = AttackSession {
            attacker: self,
            target,
            baseline,
            persistent_headers: Vec::new(),
        };

        for finding in cookie::reflected_cookies(&session).await {
            result.vulns.push(finding.into_vuln());
        }
        if target.cookie_reflection_only {
            result.time_stopped = chrono::Utc::now();
            return result;
        }

        let found = header::host_override(&session).await;
        record(&mut result, AttackKind::HostOverride, found, &[Impact::Dos, Impact::Xss]);

        let found = header::path_override(&session).await;
        record(&mut result, AttackKind::PathOverride, found, &[Impact::Dos]);

        let found = header::illegal_header(&session).await;
        record(&mut result, AttackKind::IllegalHeader, found, &[Impact::Dos]);

        let found = large_header::large_header_count(&session).await;
        record(&mut result, AttackKind::LargeHeaderCount, found, &[Impact::Dos]);

        let found = header::method_override(&session).await;
        record(&mut result, AttackKind::MethodOverride, found, &[Impact::Dos]);

        let found = header::protocol_override(&session).await;
        self.chain_redirect(&mut session, &mut result, AttackKind::ProtocolOverride, found, "http")
            .await;

        let found = header::port_override(&session).await;
        self.chain_redirect(&mut session, &mut result, AttackKind::PortOverride, found, "80")
            .await;

        if baseline.is_redirect() {
            let found = header::permanent_redirect(&session).await;
            record(&mut result, AttackKind::PermanentRedirect, found, &[Impact::Dos, Impact::Xss]);

            let found = header::port_dos(&session).await;
            record(&mut result, AttackKind::PortDos, found, &[Impact::Dos]);
        }

        for finding in bruteforce::header_bruteforce(&session).await {
            result.vulns.push(finding.into_vuln());
        }

        result.time_stopped = chrono::Utc::now();
        if !result.vulns.is_empty() {
            info!(target_url = %target.url, vulns = result.vulns.len(), "Attack run found issues");
        }
        result
    }

    /// Record a protocol/port override and, if it worked, retry the permanent redirect with the
    /// offending header pinned on every probe.
    async fn chain_redirect(
        &self,
        session: &mut AttackSession<'_>,
        result: &mut AttackResult,
        kind: AttackKind,
        found: Vec<String>,
        pinned_value: &str,
    ) {
        let Some(first) = found.first().cloned() else {
            debug!(target_url = %session.target.url, attack = %kind, "No cached effect");
            return;
        };
        record(result, kind, found, &[Impact::Dos]);

        session.persistent_headers.push((first, pinned_value.to_string()));
        let redirect = header::permanent_redirect(session).await;
        record(result, AttackKind::PermanentRedirect, redirect, &[Impact::Xss, Impact::Dos]);
        session.persistent_headers.pop();
    }

    async fn fetch_baseline(&self, target: &Target) -> Option<ProbeResponse> {
        let _permit = target.subdomain.acquire(self.backoff).await;
        let mut probe = Probe::get(target.url.clone());
        probe.set_header("User-Agent", self.user_agent.as_str());
        match self.transport.send(&probe).await {
            Ok(response) => Some(response),
            Err(e) => {
                debug!(target_url = %target.url, error = %e, "Baseline fetch failed, skipping target");
                None
            }
        }
    }
}

fn record(result: &mut AttackResult, kind: AttackKind, headers: Vec<String>, impact: &[Impact]) {
    debug!(target_url = %result.target.url, attack = %kind, offending = headers.len(), "Attack finished");
    if headers.is_empty() {
        return;
    }
    result.vulns.push(Vuln::new(kind, "", headers, impact.to_vec()));
}

/// State shared by the attacks run against one target.
pub struct AttackSession<'a> {
    attacker: &'a Attacker,
    target: &'a Target,
    baseline: &'a ProbeResponse,
    /// Headers pinned on every probe while chaining attacks.
    persistent_headers: Vec<HeaderPair>,
}

impl<'a> AttackSession<'a> {
    async fn acquire(&self) -> BurstPermit {
        self.target.subdomain.acquire(self.attacker.backoff).await
    }

    fn catalogues(&self) -> &HeaderCatalogues {
        &self.attacker.catalogues
    }

    /// Search arguments for `url` with the session's transport, backoff and pinned headers.
    fn search_args(&self, url: &str, candidates: Vec<HeaderPair>, oracle: Oracle) -> HeaderSearchArgs<'_> {
        let mut args = HeaderSearchArgs::new(
            url,
            self.baseline,
            self.attacker.transport.as_ref(),
            candidates,
            oracle,
        );
        args.backoff = self.attacker.backoff;
        args.user_agent = &self.attacker.user_agent;
        args.persistent_headers = &self.persistent_headers;
        args.use_persistent_headers = true;
        args
    }
}

/// Detail sentence and impact for each oracle reason, in reason order.
fn describe_reasons(reasons: &[Reason]) -> (String, Vec<Impact>) {
    let mut details = String::new();
    let mut impact = Vec::new();
    for reason in reasons {
        match reason {
            Reason::StatusCodeModified => {
                details.push_str("Status code modified. ");
                impact.push(Impact::Dos);
            }
            Reason::ValueReflectedBody => {
                details.push_str("Value reflected in body. ");
                impact.push(Impact::Xss);
            }
            _ => {}
        }
    }
    (details, impact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::MockTransport;
    use crate::models::{Program, Subdomain};

    fn target(url: &str) -> Arc<Target> {
        let subdomain = Arc::new(Subdomain::new("a.com", Arc::new(Program::default())));
        Arc::new(Target::new(url, subdomain))
    }

    fn attacker(mock: MockTransport) -> (Attacker, Arc<MockTransport>) {
        let mock = Arc::new(mock);
        let attacker = Attacker::new(
            mock.clone(),
            Arc::new(HeaderCatalogues::default()),
            Duration::ZERO,
            "cachesnake-test",
        );
        (attacker, mock)
    }

    #[test]
    fn test_cacheable_postfixes_shape() {
        let postfixes = cacheable_postfixes();
        assert!(postfixes[0].starts_with("/cache") && postfixes[0].ends_with(".css"));
        assert_eq!(postfixes[0].len(), "/cache".len() + 5 + ".css".len());
        assert_eq!(postfixes[1], ".css");
        assert_eq!(postfixes[2], "/.css");
        assert!(postfixes[3].starts_with("%0Acache"));
        assert!(postfixes[6].starts_with("%3Fcache"));
    }

    #[test]
    fn test_url_stem() {
        assert_eq!(url_stem("https://a.com/profile/?tab=1"), "https://a.com/profile");
        assert_eq!(url_stem("https://a.com/app.js"), "https://a.com/app.js");
    }

    #[test]
    fn test_describe_reasons() {
        let (details, impact) = describe_reasons(&[Reason::StatusCodeModified, Reason::ValueReflectedBody]);
        assert_eq!(details, "Status code modified. Value reflected in body. ");
        assert_eq!(impact, vec![Impact::Dos, Impact::Xss]);
    }

    #[tokio::test]
    async fn test_unreachable_baseline_yields_empty_result() {
        let (attacker, mock) = attacker(MockTransport::new(|_| {
            Err(crate::errors::CachesnakeError::Network("refused".into()))
        }));
        let result = attacker.run(&target("https://a.com/")).await;
        assert!(result.vulns.is_empty());
        assert_eq!(mock.probe_count(), 1);
    }

    #[tokio::test]
    async fn test_cookie_reflection_only_skips_header_attacks() {
        let (attacker, mock) = attacker(MockTransport::caching(|_| Ok(ProbeResponse::new(200, "static"))));
        let mut t = Target::new("https://a.com/app.js", target("https://a.com/").subdomain.clone());
        t.cookie_reflection_only = true;
        let result = attacker.run(&Arc::new(t)).await;
        assert!(result.vulns.is_empty());
        // Baseline only: no cookies were harvested, so the cookie search sends nothing.
        assert_eq!(mock.probe_count(), 1);
    }

    #[tokio::test]
    async fn test_clean_origin_reports_nothing() {
        let (attacker, _mock) = attacker(MockTransport::caching(|_| Ok(ProbeResponse::new(200, "<html>static</html>"))));
        let result = attacker.run(&target("https://a.com/")).await;
        assert!(result.vulns.is_empty());
        assert!(result.time_stopped >= result.time_started);
    }

    #[tokio::test]
    async fn test_protocol_override_chains_permanent_redirect() {
        let (attacker, _mock) = attacker(MockTransport::caching(|p| {
            if p.header("X-Forwarded-Proto") == Some("http") {
                let host = p.header("X-Forwarded-Host").unwrap_or("a.com");
                return Ok(ProbeResponse::new(301, "").with_header("Location", format!("https://{host}/")));
            }
            Ok(ProbeResponse::new(200, "<html>home</html>"))
        }));

        let result = attacker.run(&target("https://a.com/")).await;
        let kinds: Vec<AttackKind> = result.vulns.iter().map(|v| v.kind).collect();
        assert!(kinds.contains(&AttackKind::ProtocolOverride), "{kinds:?}");
        assert!(kinds.contains(&AttackKind::PermanentRedirect), "{kinds:?}");

        let proto = result.vulns.iter().find(|v| v.kind == AttackKind::ProtocolOverride).unwrap();
        assert_eq!(proto.first_header(), Some("X-Forwarded-Proto"));
        let redirect = result.vulns.iter().find(|v| v.kind == AttackKind::PermanentRedirect).unwrap();
        assert_eq!(redirect.first_header(), Some("X-Forwarded-Host"));
        assert_eq!(redirect.impact, vec![Impact::Xss, Impact::Dos]);
    }
}
