//! Breadth-first target discovery over each subdomain.

pub mod links;
pub mod registry;
pub mod source;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use regex::Regex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::CrawlerConfig;
use crate::errors::CachesnakeError;
use crate::http::{HttpTransport, Probe, Transport};
use crate::models::{host_of, Cookie, Subdomain, Target};
use crate::pipeline::Statistics;

pub use links::{extract_links, normalize_link, seed_url};
pub use registry::SubdomainRegistry;
pub use source::{load_subdomains, load_targets};

/// Crawl requests look like a desktop browser.
pub const CRAWLER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/116.0";

/// Past this many `.js` URLs on one subdomain, targets only get the cookie search.
const JS_TARGETS_BEFORE_COOKIE_ONLY: usize = 3;

pub struct Crawler {
    transport: Arc<dyn Transport>,
    registry: Arc<SubdomainRegistry>,
    regexes: Vec<Regex>,
    backoff: Duration,
    targets_per_subdomain: usize,
    visited: DashSet<String>,
}

impl Crawler {
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<SubdomainRegistry>,
        regexes: Vec<Regex>,
        backoff: Duration,
        targets_per_subdomain: usize,
    ) -> Self {
        Self {
            transport,
            registry,
            regexes,
            backoff,
            targets_per_subdomain,
            visited: DashSet::new(),
        }
    }

    pub fn from_config(
        config: &CrawlerConfig,
        registry: Arc<SubdomainRegistry>,
        stats: Arc<Statistics>,
    ) -> Result<Self, CachesnakeError> {
        let transport = HttpTransport::new(config.timeout.get(), CRAWLER_USER_AGENT)?.with_statistics(stats);
        let regexes = config
            .regexes
            .iter()
            .map(|raw| {
                Regex::new(raw)
                    .map_err(|e| CachesnakeError::Config(format!("Invalid crawler regex '{raw}': {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(
            Arc::new(transport),
            registry,
            regexes,
            config.backoff.get(),
            config.targets_per_subdomain,
        ))
    }

    /// Crawl `subdomain` and push every usable page to `out`. Returns the number of targets
    /// produced. Stops early on cancellation or when `out` is closed.
    pub async fn crawl(
        &self,
        subdomain: &Subdomain,
        out: &mpsc::Sender<Arc<Target>>,
        cancel: &CancellationToken,
    ) -> usize {
        let mut queue: VecDeque<String> = ["http", "https"]
            .into_iter()
            .filter_map(|scheme| seed_url(scheme, &subdomain.hostname))
            .collect();
        let mut produced = 0;
        let mut js_seen = 0;

        while produced < self.targets_per_subdomain {
            if cancel.is_cancelled() {
                debug!(subdomain = %subdomain.hostname, "Crawl cancelled");
                break;
            }
            let Some(url) = queue.pop_front() else {
                break;
            };
            if !self.visited.insert(url.clone()) {
                continue;
            }
            if url.ends_with(".js") {
                js_seen += 1;
            }

            let Some(host) = host_of(&url) else {
                continue;
            };
            let owner = self.registry.get_or_insert(&host);
            let response = {
                let mut permit = owner.acquire(self.backoff).await;
                let mut probe = Probe::get(url.as_str());
                probe.set_header("User-Agent", CRAWLER_USER_AGENT);
                match self.transport.send(&probe).await {
                    Ok(response) => {
                        let harvested = response
                            .headers
                            .iter()
                            .filter(|(name, _)| name.eq_ignore_ascii_case("set-cookie"))
                            .filter_map(|(_, value)| Cookie::parse_set_cookie(value));
                        permit.merge_cookies(harvested);
                        response
                    }
                    Err(e) => {
                        trace!(url = %url, error = %e, "Crawl request failed");
                        continue;
                    }
                }
            };

            if !(200..=308).contains(&response.status) {
                continue;
            }

            let mut target = Target::new(url.as_str(), Arc::clone(&owner));
            target.cookie_reflection_only = js_seen > JS_TARGETS_BEFORE_COOKIE_ONLY;
            if out.send(Arc::new(target)).await.is_err() {
                break;
            }
            produced += 1;

            for link in extract_links(&response, &self.regexes) {
                let Some(link) = normalize_link(&url, &link) else {
                    continue;
                };
                if self.visited.contains(&link) {
                    continue;
                }
                let in_scope = host_of(&link).is_some_and(|host| self.registry.program().is_in_scope(&host));
                if in_scope {
                    queue.push_back(link);
                }
            }
        }

        debug!(subdomain = %subdomain.hostname, targets = produced, "Crawl finished");
        produced
    }
}
