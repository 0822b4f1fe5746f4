use tracing::debug;

use super::{cacheable_postfixes, url_stem, AttackSession};
use crate::http::{cache_buster, Probe, ProbeResponse};
use crate::models::{AttackKind, Cookie, Impact, Vuln};
use crate::search::{oracle, HeaderSearchArgs};

/// A harvested cookie whose value the cache hands to clients that never sent it.
#[derive(Debug, Clone, PartialEq)]
pub struct CookieSearchResult {
    pub cookie: Cookie,
    pub is_cached: bool,
    pub is_cacheable: bool,
    pub cacheable_postfix: Option<String>,
}

impl CookieSearchResult {
    pub fn into_vuln(self) -> Vuln {
        let mut details = String::from("Cookie value reflected in response. ");
        if self.is_cached {
            details.push_str("Cached. ");
        }
        if let (true, Some(postfix)) = (self.is_cacheable, &self.cacheable_postfix) {
            details.push_str(&format!("Forcibly Cached. Postfix: \"{postfix}\". "));
        }
        let header = format!("{}={}", self.cookie.name, self.cookie.value);
        Vuln::new(
            AttackKind::ReflectedCookie,
            details,
            vec![header],
            vec![Impact::Xss, Impact::Ato],
        )
    }
}

/// Send the subdomain's cookies, keep those echoed in the body, then check whether the echo
/// survives a cookie-less request on the same cache key. If not, retry on static-looking
/// variants of the URL.
pub async fn reflected_cookies(session: &AttackSession<'_>) -> Vec<CookieSearchResult> {
    let permit = session.acquire().await;
    let cookies = permit.cookies.clone();
    if cookies.is_empty() {
        return Vec::new();
    }

    let mut args = session.search_args(&session.target.url, Vec::new(), oracle::status_code_modified);
    args.cookies = &cookies;
    args.use_cookies = true;

    let Some((with_cookies, without_cookies)) = probe_pair(&args).await else {
        return Vec::new();
    };
    let reflected: Vec<&Cookie> = cookies
        .iter()
        .filter(|c| with_cookies.body_contains(&c.value))
        .collect();
    if reflected.is_empty() {
        return Vec::new();
    }
    debug!(target_url = %session.target.url, reflected = reflected.len(), "Cookie values reflected");

    let cached = still_reflected(&reflected, &without_cookies);
    if !cached.is_empty() {
        return cached
            .into_iter()
            .map(|cookie| CookieSearchResult {
                cookie,
                is_cached: true,
                is_cacheable: false,
                cacheable_postfix: None,
            })
            .collect();
    }

    let stem = url_stem(&session.target.url).to_string();
    if stem.ends_with(".js") {
        return Vec::new();
    }
    tokio::time::sleep(session.attacker.backoff).await;

    for postfix in cacheable_postfixes() {
        args.target_url = format!("{stem}{postfix}");
        let Some((_, without_cookies)) = probe_pair(&args).await else {
            return Vec::new();
        };
        let cached = still_reflected(&reflected, &without_cookies);
        if !cached.is_empty() {
            return cached
                .into_iter()
                .map(|cookie| CookieSearchResult {
                    cookie,
                    is_cached: false,
                    is_cacheable: true,
                    cacheable_postfix: Some(postfix.clone()),
                })
                .collect();
        }
        tokio::time::sleep(session.attacker.backoff).await;
    }
    Vec::new()
}

/// One request with cookies on a fresh key, then the same key without them.
async fn probe_pair(args: &HeaderSearchArgs<'_>) -> Option<(ProbeResponse, ProbeResponse)> {
    let with_cookies = args.probe(&cache_buster(), &[]);
    let first = send(args, &with_cookies).await?;

    let mut without_cookies = with_cookies;
    without_cookies.cookies.clear();
    let second = send(args, &without_cookies).await?;
    Some((first, second))
}

async fn send(args: &HeaderSearchArgs<'_>, probe: &Probe) -> Option<ProbeResponse> {
    match args.transport.send(probe).await {
        Ok(response) => Some(response),
        Err(e) => {
            debug!(url = %probe.url, error = %e, "Cookie probe failed");
            None
        }
    }
}

fn still_reflected(reflected: &[&Cookie], response: &ProbeResponse) -> Vec<Cookie> {
    reflected
        .iter()
        .filter(|c| response.body_contains(&c.value))
        .map(|c| (*c).clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attacks::Attacker;
    use crate::config::HeaderCatalogues;
    use crate::http::{strip_query, MockTransport};
    use crate::models::{Program, Subdomain, Target};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    async fn run(mock: MockTransport, url: &str, cookies: Vec<Cookie>) -> (Vec<CookieSearchResult>, Arc<MockTransport>) {
        run_with_backoff(mock, url, cookies, Duration::ZERO).await
    }

    async fn run_with_backoff(
        mock: MockTransport,
        url: &str,
        cookies: Vec<Cookie>,
        backoff: Duration,
    ) -> (Vec<CookieSearchResult>, Arc<MockTransport>) {
        let mock = Arc::new(mock);
        let attacker = Attacker::new(mock.clone(), Arc::new(HeaderCatalogues::default()), backoff, "ua");
        let subdomain = Arc::new(Subdomain::new("a.com", Arc::new(Program::default())));
        {
            let mut permit = subdomain.acquire(Duration::ZERO).await;
            permit.cookies = cookies;
        }
        let target = Target::new(url, subdomain);
        let baseline = ProbeResponse::new(200, "page");
        let session = AttackSession {
            attacker: &attacker,
            target: &target,
            baseline: &baseline,
            persistent_headers: Vec::new(),
        };
        (reflected_cookies(&session).await, mock)
    }

    /// Echoes the `lang` cookie value into the page.
    fn echo_lang(p: &Probe) -> Result<ProbeResponse, crate::errors::CachesnakeError> {
        let lang = p
            .cookies
            .iter()
            .find(|c| c.name == "lang")
            .map(|c| c.value.clone())
            .unwrap_or_default();
        Ok(ProbeResponse::new(200, format!("<html lang=\"{lang}\">")))
    }

    #[tokio::test]
    async fn test_no_cookies_sends_nothing() {
        let (found, mock) = run(MockTransport::caching(echo_lang), "https://a.com/", Vec::new()).await;
        assert!(found.is_empty());
        assert_eq!(mock.probe_count(), 0);
    }

    #[tokio::test]
    async fn test_cached_reflection() {
        let cookies = vec![Cookie::new("lang", "en-qzxwv"), Cookie::new("sid", "s3cr3t")];
        let (found, mock) = run(MockTransport::caching(echo_lang), "https://a.com/", cookies).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].cookie.name, "lang");
        assert!(found[0].is_cached);
        assert_eq!(mock.probe_count(), 2);

        let probes = mock.probes();
        assert_eq!(probes[0].url, probes[1].url);
        assert_eq!(probes[0].cookies.len(), 2);
        assert!(probes[1].cookies.is_empty());

        let vuln = found[0].clone().into_vuln();
        assert_eq!(vuln.kind, AttackKind::ReflectedCookie);
        assert_eq!(vuln.offending_headers, vec!["lang=en-qzxwv"]);
        assert_eq!(vuln.details, "Cookie value reflected in response. Cached. ");
        assert_eq!(vuln.impact, vec![Impact::Xss, Impact::Ato]);
    }

    #[tokio::test]
    async fn test_forced_caching_with_postfix() {
        // Only URLs that look like stylesheets are cached.
        let css_cache = Mutex::new(HashMap::<String, ProbeResponse>::new());
        let mock = MockTransport::new(move |p| {
            let response = echo_lang(p)?;
            if !strip_query(&p.url).ends_with(".css") {
                return Ok(response);
            }
            let mut cache = css_cache.lock().unwrap();
            Ok(cache.entry(p.url.clone()).or_insert(response).clone())
        });
        let cookies = vec![Cookie::new("lang", "en-qzxwv")];
        let (found, _mock) = run(mock, "https://a.com/profile/?tab=1", cookies).await;
        assert_eq!(found.len(), 1);
        assert!(found[0].is_cacheable);
        let postfix = found[0].cacheable_postfix.clone().unwrap();
        assert!(postfix.starts_with("/cache") && postfix.ends_with(".css"));

        let vuln = found[0].clone().into_vuln();
        assert!(vuln.details.contains(&format!("Forcibly Cached. Postfix: \"{postfix}\". ")));
    }

    #[tokio::test]
    async fn test_javascript_not_forced() {
        let cookies = vec![Cookie::new("lang", "en-qzxwv")];
        let (found, mock) = run(MockTransport::new(echo_lang), "https://a.com/app.js", cookies).await;
        assert!(found.is_empty());
        assert_eq!(mock.probe_count(), 2);
    }

    #[tokio::test]
    async fn test_uncacheable_everywhere() {
        let cookies = vec![Cookie::new("lang", "en-qzxwv")];
        let (found, mock) = run(MockTransport::new(echo_lang), "https://a.com/", cookies).await;
        assert!(found.is_empty());
        assert_eq!(mock.probe_count(), 2 + 7 * 2);
    }

    #[tokio::test]
    async fn test_postfix_pairs_are_spaced_by_backoff() {
        let backoff = Duration::from_millis(15);
        let cookies = vec![Cookie::new("lang", "en-qzxwv")];
        let (found, mock) = run_with_backoff(MockTransport::new(echo_lang), "https://a.com/", cookies, backoff).await;
        assert!(found.is_empty());

        let times = mock.probe_times();
        assert_eq!(times.len(), 2 + 7 * 2);
        // Each pair goes out back to back; the next pair waits out the backoff.
        for pair in times[2..].chunks(2).collect::<Vec<_>>().windows(2) {
            assert!(pair[1][0] - pair[0][1] >= backoff);
        }
        assert!(times[2] - times[1] >= backoff);
    }
}
