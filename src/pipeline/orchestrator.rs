use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::statistics::Statistics;
use super::triage;
use crate::attacks::Attacker;
use crate::crawler::Crawler;
use crate::models::{AttackResult, Subdomain, Target};

pub const SUBDOMAIN_QUEUE: usize = 50;
pub const TARGET_QUEUE: usize = 700;
pub const RESULT_QUEUE: usize = 20;
pub const CONFIRMED_QUEUE: usize = 10;

/// Where confirmed results end up.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn report(&self, result: &AttackResult);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageWorkers {
    pub crawler: usize,
    pub attack: usize,
    pub triage: usize,
}

impl Default for StageWorkers {
    fn default() -> Self {
        Self {
            crawler: 10,
            attack: 20,
            triage: 5,
        }
    }
}

/// Subdomains → crawler → attackers → triage → sink, each stage a pool of tasks pulling from a
/// bounded queue.
pub struct PipelineOrchestrator {
    crawler: Arc<Crawler>,
    attacker: Attacker,
    stats: Arc<Statistics>,
    workers: StageWorkers,
    cancel_token: CancellationToken,
}

impl PipelineOrchestrator {
    pub fn new(crawler: Arc<Crawler>, attacker: Attacker, stats: Arc<Statistics>, workers: StageWorkers) -> Self {
        Self {
            crawler,
            attacker,
            stats,
            workers,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Share an external token (Ctrl-C handler) with the source and crawler stages.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn statistics(&self) -> Arc<Statistics> {
        Arc::clone(&self.stats)
    }

    /// Crawl and attack `subdomains`. Returns once every stage has drained.
    pub async fn run(&self, subdomains: Vec<Arc<Subdomain>>, sink: Arc<dyn ResultSink>) {
        info!(subdomains = subdomains.len(), "Starting pipeline");
        self.stats.record_program();

        let (subdomain_tx, subdomain_rx) = mpsc::channel(SUBDOMAIN_QUEUE);
        let (target_tx, target_rx) = mpsc::channel(TARGET_QUEUE);

        let source = {
            let stats = Arc::clone(&self.stats);
            let cancel = self.cancel_token.clone();
            tokio::spawn(async move {
                for subdomain in subdomains {
                    if cancel.is_cancelled() {
                        info!("Subdomain source cancelled");
                        break;
                    }
                    if subdomain_tx.send(subdomain).await.is_err() {
                        break;
                    }
                    stats.record_subdomain_fetched();
                }
            })
        };

        let crawl = {
            let crawler = Arc::clone(&self.crawler);
            let stats = Arc::clone(&self.stats);
            let cancel = self.cancel_token.clone();
            spawn_stage("crawler", self.workers.crawler, subdomain_rx, move |_, subdomain: Arc<Subdomain>| {
                let crawler = Arc::clone(&crawler);
                let stats = Arc::clone(&stats);
                let cancel = cancel.clone();
                let target_tx = target_tx.clone();
                async move {
                    crawler.crawl(&subdomain, &target_tx, &cancel).await;
                    stats.record_subdomain_crawled();
                }
            })
        };

        let downstream = self.run_attack_stages(target_rx, sink);
        let (source, crawl, ()) = tokio::join!(source, crawl, downstream);
        for (stage, joined) in [("source", source), ("crawler", crawl)] {
            if let Err(e) = joined {
                error!(stage, error = %e, "Stage task panicked");
            }
        }
        info!("Pipeline finished");
    }

    /// Attack a fixed target list, skipping discovery.
    pub async fn run_from_targets(&self, targets: Vec<Arc<Target>>, sink: Arc<dyn ResultSink>) {
        info!(targets = targets.len(), "Starting pipeline from targets");
        let (target_tx, target_rx) = mpsc::channel(TARGET_QUEUE);
        let source = tokio::spawn(async move {
            for target in targets {
                if target_tx.send(target).await.is_err() {
                    break;
                }
            }
        });
        let (source, ()) = tokio::join!(source, self.run_attack_stages(target_rx, sink));
        if let Err(e) = source {
            error!(stage = "source", error = %e, "Stage task panicked");
        }
        info!("Pipeline finished");
    }

    async fn run_attack_stages(&self, target_rx: mpsc::Receiver<Arc<Target>>, sink: Arc<dyn ResultSink>) {
        let (result_tx, result_rx) = mpsc::channel(RESULT_QUEUE);
        let (confirmed_tx, mut confirmed_rx) = mpsc::channel::<AttackResult>(CONFIRMED_QUEUE);

        let attack = {
            let attacker = self.attacker.clone();
            let stats = Arc::clone(&self.stats);
            spawn_stage("attack", self.workers.attack, target_rx, move |_, target: Arc<Target>| {
                let attacker = attacker.clone();
                let stats = Arc::clone(&stats);
                let result_tx = result_tx.clone();
                async move {
                    stats.record_target_fetched();
                    let result = attacker.run(&target).await;
                    stats.record_target_attacked();
                    if result.vulns.is_empty() {
                        return;
                    }
                    stats.record_vulns_found(result.vulns.len());
                    debug!(target_url = %target.url, vulns = result.vulns.len(), "Raw result queued for triage");
                    let _ = result_tx.send(result).await;
                }
            })
        };

        let triage = {
            let attacker = self.attacker.clone();
            spawn_stage("triage", self.workers.triage, result_rx, move |_, result: AttackResult| {
                let attacker = attacker.clone();
                let confirmed_tx = confirmed_tx.clone();
                async move {
                    if let Some(confirmed) = triage::triage(&attacker, result).await {
                        let _ = confirmed_tx.send(confirmed).await;
                    }
                }
            })
        };

        let stats = Arc::clone(&self.stats);
        let report = async move {
            while let Some(result) = confirmed_rx.recv().await {
                stats.record_vulns_reported(result.vulns.len());
                sink.report(&result).await;
            }
        };

        let (attack, triage, ()) = tokio::join!(attack, triage, report);
        for (stage, joined) in [("attack", attack), ("triage", triage)] {
            if let Err(e) = joined {
                error!(stage, error = %e, "Stage task panicked");
            }
        }
    }
}

/// Run `workers` tasks that share `rx` and call `handle` per item. The returned task finishes
/// once the queue is closed and every worker has exited; `handle` (with any senders it owns) is
/// dropped at that point, closing the next stage.
fn spawn_stage<T, F, Fut>(name: &'static str, workers: usize, rx: mpsc::Receiver<T>, handle: F) -> JoinHandle<()>
where
    T: Send + 'static,
    F: Fn(usize, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let rx = Arc::new(Mutex::new(rx));
    let handle = Arc::new(handle);

    let handles: Vec<_> = (0..workers.max(1))
        .map(|worker| {
            let rx = Arc::clone(&rx);
            let handle = Arc::clone(&handle);
            tokio::spawn(async move {
                debug!(stage = name, worker, "Worker started");
                loop {
                    let item = rx.lock().await.recv().await;
                    let Some(item) = item else {
                        break;
                    };
                    handle(worker, item).await;
                }
                debug!(stage = name, worker, "Worker exited");
            })
        })
        .collect();
    drop(handle);

    tokio::spawn(async move {
        let results = futures::future::join_all(handles).await;
        for (worker, result) in results.iter().enumerate() {
            if let Err(e) = result {
                error!(stage = name, worker, error = %e, "Worker task panicked");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeaderCatalogues;
    use crate::crawler::SubdomainRegistry;
    use crate::http::{MockTransport, ProbeResponse};
    use crate::models::{AttackKind, Program};
    use std::time::Duration;

    #[derive(Default)]
    struct Collect(std::sync::Mutex<Vec<AttackResult>>);

    #[async_trait]
    impl ResultSink for Collect {
        async fn report(&self, result: &AttackResult) {
            self.0.lock().unwrap().push(result.clone());
        }
    }

    fn orchestrator(mock: Arc<MockTransport>) -> PipelineOrchestrator {
        let registry = Arc::new(SubdomainRegistry::new(Arc::new(Program {
            in_scope: vec!["acme.com".into()],
            ..Default::default()
        })));
        let crawler = Crawler::new(mock.clone(), registry, Vec::new(), Duration::ZERO, 5);
        let attacker = Attacker::new(mock, Arc::new(HeaderCatalogues::default()), Duration::ZERO, "ua");
        PipelineOrchestrator::new(
            Arc::new(crawler),
            attacker,
            Arc::new(Statistics::new()),
            StageWorkers {
                crawler: 2,
                attack: 3,
                triage: 2,
            },
        )
    }

    /// Reflects `X-Forwarded-Host` on `vuln.acme.com`, static everywhere else.
    fn origin() -> Arc<MockTransport> {
        Arc::new(MockTransport::caching(|p| {
            if p.url.contains("vuln.acme.com") {
                if let Some(host) = p.header("X-Forwarded-Host") {
                    return Ok(ProbeResponse::new(200, format!("<script src=//{host}/a.js>")));
                }
            }
            Ok(ProbeResponse::new(200, "<html>static</html>"))
        }))
    }

    #[tokio::test]
    async fn test_pipeline_reports_confirmed_findings() {
        let mock = origin();
        let orchestrator = orchestrator(mock);
        let registry = SubdomainRegistry::new(Arc::new(Program::default()));
        let subdomains = vec![registry.get_or_insert("vuln.acme.com"), registry.get_or_insert("www.acme.com")];

        let sink = Arc::new(Collect::default());
        orchestrator.run(subdomains, sink.clone()).await;

        let reported = sink.0.lock().unwrap().clone();
        assert!(!reported.is_empty());
        assert!(reported.iter().all(|r| r.target.url.contains("vuln.acme.com")));
        assert!(reported
            .iter()
            .all(|r| r.vulns.iter().any(|v| v.kind == AttackKind::HostOverride)));

        let snap = orchestrator.statistics().snapshot();
        assert_eq!(snap.subdomains_fetched, 2);
        assert_eq!(snap.subdomains_crawled, 2);
        assert_eq!(snap.targets_fetched, 4);
        assert_eq!(snap.targets_attacked, 4);
        assert_eq!(snap.vulns_reported as usize, reported.iter().map(|r| r.vulns.len()).sum::<usize>());
    }

    #[tokio::test]
    async fn test_run_from_targets_clean_site() {
        let mock = Arc::new(MockTransport::caching(|_| Ok(ProbeResponse::new(200, "<html>static</html>"))));
        let orchestrator = orchestrator(mock);
        let registry = SubdomainRegistry::new(Arc::new(Program::default()));
        let targets: Vec<Arc<Target>> = (0..5)
            .map(|i| Arc::new(Target::new(format!("https://www.acme.com/{i}"), registry.get_or_insert("www.acme.com"))))
            .collect();

        let sink = Arc::new(Collect::default());
        orchestrator.run_from_targets(targets, sink.clone()).await;

        assert!(sink.0.lock().unwrap().is_empty());
        let snap = orchestrator.statistics().snapshot();
        assert_eq!(snap.targets_attacked, 5);
        assert_eq!(snap.vulns_found, 0);
    }

    #[tokio::test]
    async fn test_cancelled_source_still_drains() {
        let mock = origin();
        let orchestrator = orchestrator(mock.clone());
        orchestrator.cancel_token().cancel();
        let registry = SubdomainRegistry::new(Arc::new(Program::default()));

        let sink = Arc::new(Collect::default());
        orchestrator.run(vec![registry.get_or_insert("vuln.acme.com")], sink.clone()).await;
        assert!(sink.0.lock().unwrap().is_empty());
        assert_eq!(mock.probe_count(), 0);
    }
}
