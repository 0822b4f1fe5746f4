use tracing::debug;

use super::{cacheable_postfixes, describe_reasons, url_stem, AttackSession};
use crate::http::{random_lowercase, HeaderPair};
use crate::models::{AttackKind, Vuln};
use crate::search::{confirm_cached, header_search, oracle, Decision, Reason, BRUTEFORCE_CANARY};

/// A bruteforced header whose effect is cached, or can be made cached with a postfix.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderBruteforceResult {
    pub header: String,
    pub reasons: Vec<Reason>,
    pub is_cached: bool,
    pub is_cacheable: bool,
    pub cacheable_postfix: Option<String>,
}

impl HeaderBruteforceResult {
    pub fn into_vuln(self) -> Vuln {
        let mut details = String::new();
        if self.is_cached {
            details.push_str("Cached. ");
        }
        if let (true, Some(postfix)) = (self.is_cacheable, &self.cacheable_postfix) {
            details.push_str(&format!("Forcibly cacheable. Postfix: \"{postfix}\". "));
        }
        let (reasons, impact) = describe_reasons(&self.reasons);
        details.push_str(&reasons);
        Vuln::new(AttackKind::HeaderBruteforce, details, vec![self.header], impact)
    }
}

fn forcible(decision: &Decision) -> bool {
    !decision.has_reason(Reason::StatusCodeModified) && reflects(decision)
}

fn reflects(decision: &Decision) -> bool {
    decision.has_reason(Reason::ValueReflectedBody) || decision.has_reason(Reason::SetCookiePresent)
}

/// Try every catalogued header with a canary value. Anything that changes the status or echoes
/// the canary is checked for caching; uncached reflections are retried on static-looking URLs.
pub async fn header_bruteforce(session: &AttackSession<'_>) -> Vec<HeaderBruteforceResult> {
    if session.baseline.status != 200 {
        return Vec::new();
    }
    let _permit = session.acquire().await;

    let canary = format!("{BRUTEFORCE_CANARY}{}", random_lowercase(10));
    let candidates: Vec<HeaderPair> = session
        .catalogues()
        .bruteforce
        .iter()
        .map(|h| (h.clone(), canary.clone()))
        .collect();

    let mut args = session.search_args(&session.target.url, candidates, oracle::bruteforce);
    args.normalize_headers = false;
    args.special_headers = false;

    let found = header_search(&args).await.matches;
    if found.is_empty() {
        return Vec::new();
    }
    debug!(target_url = %session.target.url, candidates = found.len(), "Bruteforce search hits");

    args.candidates = found.clone();
    let decisions = confirm_cached(&args).await;

    let stem = url_stem(&session.target.url).to_string();
    let mut results = Vec::new();
    for (pair, decision) in found.into_iter().zip(decisions) {
        if decision.keep {
            results.push(HeaderBruteforceResult {
                header: pair.0,
                reasons: decision.reasons,
                is_cached: true,
                is_cacheable: false,
                cacheable_postfix: None,
            });
            continue;
        }
        if !forcible(&decision) {
            continue;
        }

        for postfix in cacheable_postfixes() {
            args.target_url = format!("{stem}{postfix}");
            args.candidates = vec![pair.clone()];
            let forced = confirm_cached(&args).await;
            if forced.first().is_some_and(|d| d.keep && reflects(d)) {
                results.push(HeaderBruteforceResult {
                    header: pair.0.clone(),
                    reasons: decision.reasons.clone(),
                    is_cached: false,
                    is_cacheable: true,
                    cacheable_postfix: Some(postfix),
                });
                break;
            }
            tokio::time::sleep(args.backoff).await;
        }
    }
    results
}
