//! Second opinion on raw attack results before anything is reported.
//!
//! Noisy results (many headers for one attack, a flood of bruteforce hits) are usually a target
//! that reacts to everything, so they are filtered out. Whatever survives is re-attacked from
//! scratch and only findings seen both times are reported.

use tracing::{debug, info};

use crate::attacks::Attacker;
use crate::models::{AttackKind, AttackResult, Vuln};

/// At or above this many bruteforce hits the whole bruteforce family is treated as noise.
pub const MAX_BRUTEFORCE_HITS: usize = 10;
/// Non-bruteforce vulns need fewer offending headers than this.
pub const MAX_OFFENDING_HEADERS: usize = 5;
/// A retest with this many findings or more is not reported.
pub const MAX_REPORTED_VULNS: usize = 15;

/// Drop noisy vulns in place. Returns the bruteforce hit count seen before filtering.
pub fn filter(result: &mut AttackResult) -> usize {
    let bruteforce_hits = result
        .vulns
        .iter()
        .filter(|v| v.kind == AttackKind::HeaderBruteforce)
        .map(|v| v.offending_headers.len())
        .sum::<usize>();

    result.vulns.retain(|v| match v.kind {
        AttackKind::ReflectedCookie => true,
        AttackKind::HeaderBruteforce => bruteforce_hits < MAX_BRUTEFORCE_HITS,
        _ => v.offending_headers.len() < MAX_OFFENDING_HEADERS,
    });
    bruteforce_hits
}

pub fn needs_retest(filtered: &AttackResult, bruteforce_count: usize) -> bool {
    !filtered.vulns.is_empty() && bruteforce_count < MAX_BRUTEFORCE_HITS
}

fn same_finding(a: &Vuln, b: &Vuln) -> bool {
    a.kind == b.kind && a.first_header() == b.first_header()
}

/// Retest vulns that were also found originally. Bruteforce findings must agree on the header;
/// other attacks only on the kind. Adjacent repeats are collapsed.
pub fn intersect(originals: &[Vuln], retest: Vec<Vuln>) -> Vec<Vuln> {
    let mut kept: Vec<Vuln> = retest
        .into_iter()
        .filter(|tv| {
            originals.iter().any(|v| match tv.kind {
                AttackKind::HeaderBruteforce => same_finding(v, tv),
                _ => v.kind == tv.kind,
            })
        })
        .collect();
    kept.dedup_by(|a, b| same_finding(a, b));
    kept
}

pub fn is_reportable(vulns: &[Vuln]) -> bool {
    !vulns.is_empty() && vulns.len() < MAX_REPORTED_VULNS
}

/// Filter, re-attack and intersect. `Some` carries the retest result trimmed to the findings
/// that reproduced.
pub async fn triage(attacker: &Attacker, mut result: AttackResult) -> Option<AttackResult> {
    let raw = result.vulns.len();
    let bruteforce_count = filter(&mut result);
    if !needs_retest(&result, bruteforce_count) {
        debug!(
            target_url = %result.target.url,
            raw,
            kept = result.vulns.len(),
            bruteforce_count,
            "Result discarded by triage filter"
        );
        return None;
    }

    let mut retest = attacker.run(&result.target).await;
    let confirmed = intersect(&result.vulns, std::mem::take(&mut retest.vulns));
    if !is_reportable(&confirmed) {
        debug!(target_url = %result.target.url, confirmed = confirmed.len(), "Retest did not reproduce");
        return None;
    }

    info!(target_url = %result.target.url, vulns = confirmed.len(), "Findings confirmed by retest");
    retest.vulns = confirmed;
    Some(retest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Impact, Program, Subdomain, Target};
    use std::sync::Arc;

    fn result_with(vulns: Vec<Vuln>) -> AttackResult {
        let subdomain = Arc::new(Subdomain::new("a.com", Arc::new(Program::default())));
        let mut result = AttackResult::new(Arc::new(Target::new("https://a.com/", subdomain)));
        result.vulns = vulns;
        result
    }

    fn vuln(kind: AttackKind, headers: &[&str]) -> Vuln {
        Vuln::new(kind, "", headers.iter().map(|h| h.to_string()).collect(), vec![Impact::Dos])
    }

    #[test]
    fn test_bruteforce_flood_dropped_cookies_kept() {
        let mut vulns: Vec<Vuln> = (0..12)
            .map(|i| vuln(AttackKind::HeaderBruteforce, &[&format!("X-H{i}")]))
            .collect();
        for c in ["a=1", "b=2", "c=3"] {
            vulns.push(vuln(AttackKind::ReflectedCookie, &[c]));
        }
        let mut result = result_with(vulns);

        let count = filter(&mut result);
        assert_eq!(count, 12);
        assert_eq!(result.vulns.len(), 3);
        assert!(result.vulns.iter().all(|v| v.kind == AttackKind::ReflectedCookie));
        assert!(!needs_retest(&result, count));
    }

    #[test]
    fn test_few_bruteforce_hits_kept() {
        let mut result = result_with(vec![
            vuln(AttackKind::HeaderBruteforce, &["X-Site"]),
            vuln(AttackKind::HeaderBruteforce, &["X-Env"]),
            vuln(AttackKind::HostOverride, &["X-Forwarded-Host"]),
        ]);
        let count = filter(&mut result);
        assert_eq!(count, 2);
        assert_eq!(result.vulns.len(), 3);
        assert!(needs_retest(&result, count));
    }

    #[test]
    fn test_wide_header_lists_dropped() {
        let mut result = result_with(vec![
            vuln(AttackKind::PathOverride, &["A", "B", "C", "D", "E"]),
            vuln(AttackKind::HostOverride, &["A", "B", "C", "D"]),
        ]);
        filter(&mut result);
        assert_eq!(result.vulns.len(), 1);
        assert_eq!(result.vulns[0].kind, AttackKind::HostOverride);
    }

    #[test]
    fn test_nothing_left_means_no_retest() {
        let mut result = result_with(vec![vuln(AttackKind::PathOverride, &["A", "B", "C", "D", "E", "F"])]);
        let count = filter(&mut result);
        assert!(!needs_retest(&result, count));
    }

    #[test]
    fn test_intersect() {
        let originals = vec![
            vuln(AttackKind::HostOverride, &["X-Forwarded-Host"]),
            vuln(AttackKind::HeaderBruteforce, &["X-Site"]),
        ];
        let retest = vec![
            // Other attacks match on kind alone.
            vuln(AttackKind::HostOverride, &["X-Host"]),
            vuln(AttackKind::HeaderBruteforce, &["X-Site"]),
            vuln(AttackKind::HeaderBruteforce, &["X-Site"]),
            vuln(AttackKind::HeaderBruteforce, &["X-Env"]),
            vuln(AttackKind::PathOverride, &["X-Original-URL"]),
        ];
        let kept = intersect(&originals, retest);
        let summary: Vec<(AttackKind, Option<&str>)> = kept.iter().map(|v| (v.kind, v.first_header())).collect();
        assert_eq!(
            summary,
            vec![
                (AttackKind::HostOverride, Some("X-Host")),
                (AttackKind::HeaderBruteforce, Some("X-Site")),
            ]
        );
    }

    #[test]
    fn test_is_reportable_bounds() {
        assert!(!is_reportable(&[]));
        let one = vec![vuln(AttackKind::HostOverride, &["X"])];
        assert!(is_reportable(&one));
        let many: Vec<Vuln> = (0..15).map(|_| vuln(AttackKind::HostOverride, &["X"])).collect();
        assert!(!is_reportable(&many));
        assert!(is_reportable(&many[..14]));
    }
}
