use std::time::Duration;

use tracing::{debug, trace};

use super::oracle::Oracle;
use crate::http::{cache_buster, with_cache_buster, HeaderPair, Probe, ProbeResponse, Transport};
use crate::models::{authority_of, Cookie};

/// Chunk size used by every catalogue attack.
pub const DEFAULT_CHUNK_SIZE: usize = 40;

/// Inputs for one search or confirmation run against one URL.
pub struct HeaderSearchArgs<'a> {
    /// URL probed, possibly a cacheable-postfix variant of the target.
    pub target_url: String,
    pub baseline: &'a ProbeResponse,
    pub transport: &'a dyn Transport,
    pub candidates: Vec<HeaderPair>,
    pub chunk_size: usize,
    pub backoff: Duration,
    pub oracle: Oracle,
    pub persistent_headers: &'a [HeaderPair],
    pub use_persistent_headers: bool,
    pub cookies: &'a [Cookie],
    pub use_cookies: bool,
    pub normalize_headers: bool,
    pub special_headers: bool,
    pub user_agent: &'a str,
}

impl<'a> HeaderSearchArgs<'a> {
    pub fn new(
        target_url: impl Into<String>,
        baseline: &'a ProbeResponse,
        transport: &'a dyn Transport,
        candidates: Vec<HeaderPair>,
        oracle: Oracle,
    ) -> Self {
        Self {
            target_url: target_url.into(),
            baseline,
            transport,
            candidates,
            chunk_size: DEFAULT_CHUNK_SIZE,
            backoff: Duration::ZERO,
            oracle,
            persistent_headers: &[],
            use_persistent_headers: false,
            cookies: &[],
            use_cookies: false,
            normalize_headers: true,
            special_headers: true,
            user_agent: "",
        }
    }

    /// Build a GET probe on cache key `buster` carrying `pairs`.
    pub(crate) fn probe(&self, buster: &str, pairs: &[HeaderPair]) -> Probe {
        let mut probe = Probe::get(with_cache_buster(&self.target_url, buster));
        probe.normalize_headers = self.normalize_headers;
        probe.special_headers = self.special_headers;

        if !self.special_headers {
            if let Some(host) = authority_of(&self.target_url) {
                probe.set_header("Host", host);
            }
            probe.set_header("User-Agent", self.user_agent);
        }
        probe.set_header("Accept", format!("*/*, text/{buster}"));
        if self.use_persistent_headers {
            for (name, value) in self.persistent_headers {
                probe.set_header(name.as_str(), value.as_str());
            }
        }
        if self.use_cookies {
            probe.cookies = self.cookies.to_vec();
        }
        for (name, value) in pairs {
            probe.set_header(name.as_str(), value.as_str());
        }
        probe
    }
}

/// What a search converged to, plus how much it cost.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOutcome {
    pub matches: Vec<HeaderPair>,
    pub rounds: usize,
    pub probes: usize,
}

/// Find the candidates that, on their own, make the oracle fire.
///
/// Candidates are probed a chunk at a time. Chunks the oracle rejects are dropped, the rest are
/// halved until every survivor is a single pair. A chunk whose probe fails at the transport level
/// stays in play and is probed again next round.
pub async fn header_search(args: &HeaderSearchArgs<'_>) -> SearchOutcome {
    let mut outcome = SearchOutcome::default();
    if args.candidates.is_empty() {
        return outcome;
    }

    let chunk_size = args.chunk_size.max(1);
    let mut chunks: Vec<Vec<HeaderPair>> = args
        .candidates
        .chunks(chunk_size)
        .map(<[HeaderPair]>::to_vec)
        .collect();

    loop {
        outcome.rounds += 1;
        let mut survivors = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let probe = args.probe(&cache_buster(), &chunk);
            outcome.probes += 1;

            let response = match args.transport.send(&probe).await {
                Ok(response) => response,
                Err(e) => {
                    debug!(url = %args.target_url, chunk_len = chunk.len(), error = %e, "Search probe failed, keeping chunk");
                    survivors.push(chunk);
                    continue;
                }
            };

            if (args.oracle)(&chunk, args.baseline, &response).keep {
                survivors.push(chunk);
            }
            tokio::time::sleep(args.backoff).await;
        }

        trace!(url = %args.target_url, round = outcome.rounds, survivors = survivors.len(), "Search round complete");

        if survivors.is_empty() {
            return outcome;
        }
        if survivors.iter().all(|c| c.len() == 1) {
            outcome.matches = survivors.into_iter().flatten().collect();
            return outcome;
        }

        chunks = Vec::with_capacity(survivors.len() * 2);
        for mut chunk in survivors {
            let second = chunk.split_off(chunk.len() / 2);
            if !chunk.is_empty() {
                chunks.push(chunk);
            }
            chunks.push(second);
        }
    }
}
