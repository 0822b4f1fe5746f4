pub mod client;
pub mod mock;
pub mod probe;
pub mod raw;

use async_trait::async_trait;
use rand::Rng;

use crate::errors::CachesnakeError;

pub use client::HttpTransport;
pub use mock::MockTransport;
pub use probe::{HeaderPair, Probe, ProbeResponse};

/// Query parameter that carries the per-probe cache key.
pub const CACHE_BUSTER_PARAM: &str = "cachebuster";

/// Sends one probe and returns the raw response. Redirects are never followed.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, probe: &Probe) -> Result<ProbeResponse, CachesnakeError>;
}

/// Random string of lowercase ASCII letters.
pub fn random_lowercase(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen_range(b'a'..=b'z') as char).collect()
}

/// A fresh cache key value.
pub fn cache_buster() -> String {
    random_lowercase(10)
}

/// Append `cachebuster=<value>` to the query of `url`. Any fragment is dropped.
pub fn with_cache_buster(url: &str, buster: &str) -> String {
    let url = url.split('#').next().unwrap_or(url);
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{CACHE_BUSTER_PARAM}={buster}")
}

/// Value of the first `key=` parameter in the query string of `url`.
pub fn query_param<'a>(url: &'a str, key: &str) -> Option<&'a str> {
    let (_, query) = url.split_once('?')?;
    let query = query.split('#').next().unwrap_or(query);
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        (k == key).then_some(v)
    })
}

/// `url` without its query string and fragment.
pub fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}
