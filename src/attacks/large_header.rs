use tracing::debug;

use super::AttackSession;
use crate::http::{cache_buster, random_lowercase, Probe};
use crate::search::{oracle, HeaderSearchArgs};

const HEADER_NAME: &str = "X-Random-Custom-Header";
const HEADER_COUNT: usize = 130;

/// Flood the request with headers so a header-count limit turns it into an error page, then
/// check the error page is what the cache now serves.
///
/// Same three-probe shape as the catalogue confirmation, but the 130 headers travel together.
pub async fn large_header_count(session: &AttackSession<'_>) -> Vec<String> {
    let _permit = session.acquire().await;
    let args = session.search_args(&session.target.url, Vec::new(), oracle::status_code_modified);
    let baseline_status = session.baseline.status;

    let mut flooded = args.probe(&cache_buster(), &[]);
    for _ in 0..HEADER_COUNT {
        flooded.add_header(HEADER_NAME, random_lowercase(15));
    }
    match send(&args, &flooded).await {
        Some(status) if status != baseline_status => {}
        _ => return Vec::new(),
    }

    let mut same_key = flooded;
    same_key.remove_header(HEADER_NAME);
    match send(&args, &same_key).await {
        Some(status) if status != baseline_status => {}
        _ => return Vec::new(),
    }

    let control = args.probe(&cache_buster(), &[]);
    match send(&args, &control).await {
        Some(status) if status == baseline_status => vec![HEADER_NAME.to_string()],
        _ => Vec::new(),
    }
}

async fn send(args: &HeaderSearchArgs<'_>, probe: &Probe) -> Option<u16> {
    match args.transport.send(probe).await {
        Ok(response) => Some(response.status),
        Err(e) => {
            debug!(url = %probe.url, error = %e, "Large header probe failed");
            None
        }
    }
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

    async fn run(mock: MockTransport) -> (Vec<String>, Arc<MockTransport>) {
        let mock = Arc::new(mock);
        let attacker = Attacker::new(mock.clone(), Arc::new(HeaderCatalogues::default()), Duration::ZERO, "ua");
        let subdomain = Arc::new(Subdomain::new("a.com", Arc::new(Program::default())));
        let target = Target::new("https://a.com/", subdomain);
        let baseline = ProbeResponse::new(200, "page");
        let session = AttackSession {
            attacker: &attacker,
            target: &target,
            baseline: &baseline,
            persistent_headers: Vec::new(),
        };
        (large_header_count(&session).await, mock)
    }

    fn header_limit(p: &crate::http::Probe) -> Result<ProbeResponse, crate::errors::CachesnakeError> {
        let count = p.headers.iter().filter(|(k, _)| k == HEADER_NAME).count();
        Ok(ProbeResponse::new(if count > 100 { 431 } else { 200 }, "page"))
    }

    #[tokio::test]
    async fn test_cached_error_page_found() {
        let (found, mock) = run(MockTransport::caching(header_limit)).await;
        assert_eq!(found, vec![HEADER_NAME]);
        let probes = mock.probes();
        assert_eq!(probes.len(), 3);
        assert_eq!(probes[0].headers.iter().filter(|(k, _)| k == HEADER_NAME).count(), 130);
        assert!(!probes[1].has_header(HEADER_NAME));
        assert_eq!(probes[0].url, probes[1].url);
    }

    #[tokio::test]
    async fn test_uncached_error_page_ignored() {
        let (found, mock) = run(MockTransport::new(header_limit)).await;
        assert!(found.is_empty());
        assert_eq!(mock.probe_count(), 2);
    }
}
