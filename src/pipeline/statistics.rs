use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Run-wide counters. Advisory only; every field is independent.
#[derive(Debug)]
pub struct Statistics {
    started: DateTime<Utc>,
    programs_seen: AtomicU64,
    subdomains_fetched: AtomicU64,
    subdomains_crawled: AtomicU64,
    targets_fetched: AtomicU64,
    targets_attacked: AtomicU64,
    vulns_found: AtomicU64,
    vulns_reported: AtomicU64,
    transport_errors: AtomicU64,
    probes_rejected: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatisticsSnapshot {
    pub started: DateTime<Utc>,
    pub programs_seen: u64,
    pub subdomains_fetched: u64,
    pub subdomains_crawled: u64,
    pub targets_fetched: u64,
    pub targets_attacked: u64,
    pub vulns_found: u64,
    pub vulns_reported: u64,
    pub transport_errors: u64,
    /// Probes refused before reaching the network, such as an unparseable URL.
    pub probes_rejected: u64,
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Statistics {
    pub fn new() -> Self {
        Self {
            started: Utc::now(),
            programs_seen: AtomicU64::new(0),
            subdomains_fetched: AtomicU64::new(0),
            subdomains_crawled: AtomicU64::new(0),
            targets_fetched: AtomicU64::new(0),
            targets_attacked: AtomicU64::new(0),
            vulns_found: AtomicU64::new(0),
            vulns_reported: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
            probes_rejected: AtomicU64::new(0),
        }
    }

    pub fn record_program(&self) {
        bump(&self.programs_seen);
    }

    pub fn record_subdomain_fetched(&self) {
        bump(&self.subdomains_fetched);
    }

    pub fn record_subdomain_crawled(&self) {
        bump(&self.subdomains_crawled);
    }

    pub fn record_target_fetched(&self) {
        bump(&self.targets_fetched);
    }

    pub fn record_target_attacked(&self) {
        bump(&self.targets_attacked);
    }

    pub fn record_vulns_found(&self, n: usize) {
        self.vulns_found.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_vulns_reported(&self, n: usize) {
        self.vulns_reported.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_transport_error(&self) {
        bump(&self.transport_errors);
    }

    pub fn record_probe_rejected(&self) {
        bump(&self.probes_rejected);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatisticsSnapshot {
            started: self.started,
            programs_seen: load(&self.programs_seen),
            subdomains_fetched: load(&self.subdomains_fetched),
            subdomains_crawled: load(&self.subdomains_crawled),
            targets_fetched: load(&self.targets_fetched),
            targets_attacked: load(&self.targets_attacked),
            vulns_found: load(&self.vulns_found),
            vulns_reported: load(&self.vulns_reported),
            transport_errors: load(&self.transport_errors),
            probes_rejected: load(&self.probes_rejected),
        }
    }
}

impl StatisticsSnapshot {
    /// One-paragraph status line for logs and webhooks.
    pub fn render(&self) -> String {
        let uptime = Utc::now() - self.started;
        format!(
            "Uptime: {}h{:02}m. Subdomains: {} fetched, {} crawled. Targets: {} fetched, {} attacked. \
             Vulns: {} found, {} reported. Transport errors: {}. Rejected probes: {}.",
            uptime.num_hours(),
            uptime.num_minutes() % 60,
            self.subdomains_fetched,
            self.subdomains_crawled,
            self.targets_fetched,
            self.targets_attacked,
            self.vulns_found,
            self.vulns_reported,
            self.transport_errors,
            self.probes_rejected,
        )
    }
}
