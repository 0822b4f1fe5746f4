use tracing::debug;

use super::engine::HeaderSearchArgs;
use super::oracle::Decision;
use crate::http::{cache_buster, HeaderPair, ProbeResponse};

/// For each candidate, decide whether its effect is served from cache to a client that never
/// sent it. One decision per candidate, in input order.
///
/// Three probes per candidate: with the header on a fresh key, without it on the same key, and
/// without it on another fresh key. Only the last one separates a poisoned cache entry from a
/// server that treats this client differently (bot challenges and the like), so nothing is kept
/// unless it came back clean.
pub async fn confirm_cached(args: &HeaderSearchArgs<'_>) -> Vec<Decision> {
    let mut decisions = Vec::with_capacity(args.candidates.len());
    for pair in &args.candidates {
        decisions.push(confirm_candidate(args, pair).await);
    }
    decisions
}

async fn confirm_candidate(args: &HeaderSearchArgs<'_>, pair: &HeaderPair) -> Decision {
    let pairs = std::slice::from_ref(pair);
    let key = cache_buster();

    let Some(with_header) = fetch(args, &key, pairs).await else {
        return Decision::discard();
    };
    let first = (args.oracle)(pairs, args.baseline, &with_header);
    let unconfirmed = Decision {
        keep: false,
        reasons: first.reasons.clone(),
    };

    let Some(same_key) = fetch(args, &key, &[]).await else {
        return unconfirmed;
    };
    let second = (args.oracle)(pairs, args.baseline, &same_key);
    if !(first.keep && second.keep) {
        return unconfirmed;
    }

    let Some(control) = fetch(args, &cache_buster(), &[]).await else {
        return unconfirmed;
    };
    let control = (args.oracle)(pairs, args.baseline, &control);
    tokio::time::sleep(args.backoff).await;

    if control.keep {
        debug!(url = %args.target_url, header = %pair.0, "Effect also seen on a fresh key, not cached");
        return unconfirmed;
    }
    Decision::keep(first.reasons)
}

async fn fetch(args: &HeaderSearchArgs<'_>, key: &str, pairs: &[HeaderPair]) -> Option<ProbeResponse> {
    let probe = args.probe(key, pairs);
    match args.transport.send(&probe).await {
        Ok(response) => Some(response),
        Err(e) => {
            debug!(url = %args.target_url, error = %e, "Confirmation probe failed, dropping candidate");
            None
        }
    }
}
