use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument};

use super::commands::RunArgs;
use super::progress::{render_summary, RunProgress};
use crate::attacks::Attacker;
use crate::config::{self, parser::validate_semantics, CachesnakeConfig, HeaderCatalogues};
use crate::crawler::{load_subdomains, load_targets, Crawler, SubdomainRegistry};
use crate::errors::CachesnakeError;
use crate::http::HttpTransport;
use crate::models::{Subdomain, Target};
use crate::pipeline::{PipelineOrchestrator, StageWorkers, Statistics};
use crate::reporting::{spawn_status_reporter, ReportSink, WebhookNotifier};

pub async fn handle_run(args: RunArgs, quiet: bool) -> Result<(), CachesnakeError> {
    let file_config = match &args.config {
        Some(path) => config::parse_config(&PathBuf::from(path)).await?,
        None => CachesnakeConfig::default(),
    };
    let config = apply_overrides(file_config, &args);
    validate_semantics(&config)?;

    let run_id = args
        .run_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let span = tracing::info_span!("run", run_id = %run_id);
    execute(config, args, run_id, quiet).instrument(span).await
}

enum Source {
    Subdomains(Vec<Arc<Subdomain>>),
    Targets(Vec<Arc<Target>>),
}

async fn execute(config: CachesnakeConfig, args: RunArgs, run_id: String, quiet: bool) -> Result<(), CachesnakeError> {
    let registry = Arc::new(SubdomainRegistry::new(Arc::new(config.scope.clone())));
    let source = match &args.targets {
        Some(path) => Source::Targets(load_targets(&PathBuf::from(path), &registry).await?),
        None => {
            let path = config.subdomain_file.clone().ok_or_else(|| {
                CachesnakeError::Config("No subdomain file given (use --subdomains or subdomain_file)".into())
            })?;
            Source::Subdomains(load_subdomains(&path, &registry).await?)
        }
    };

    let catalogues = match &config.catalogues.directory {
        Some(dir) => HeaderCatalogues::load_dir(dir)?,
        None => HeaderCatalogues::default(),
    };

    let stats = Arc::new(Statistics::new());

    let transport = HttpTransport::new(config.attack.timeout.get(), &config.user_agent)?
        .with_statistics(Arc::clone(&stats));
    let attacker = Attacker::new(
        Arc::new(transport),
        Arc::new(catalogues),
        config.attack.backoff.get(),
        config.user_agent.clone(),
    );
    let crawler = Crawler::from_config(&config.crawler, Arc::clone(&registry), Arc::clone(&stats))?;

    let cancel = CancellationToken::new();
    let orchestrator = PipelineOrchestrator::new(
        Arc::new(crawler),
        attacker,
        Arc::clone(&stats),
        StageWorkers {
            crawler: config.crawler.workers,
            attack: config.attack.workers,
            triage: config.triage.workers,
        },
    )
    .with_cancel_token(cancel.clone());

    let notifier = webhook(&config)?;
    let status_notifier = if config.notifications.send_status {
        notifier.clone()
    } else {
        None
    };
    let sink = Arc::new(ReportSink::new(
        run_id.clone(),
        config.output.results_file.clone(),
        notifier,
    ));

    let status_stop = CancellationToken::new();
    let status = spawn_status_reporter(
        Arc::clone(&stats),
        config.notifications.status_interval.get(),
        status_notifier,
        status_stop.clone(),
    );

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, draining in-flight attacks");
                cancel.cancel();
            }
        });
    }

    let progress = (!quiet).then(|| RunProgress::start(Arc::clone(&stats)));
    let started = Instant::now();

    match source {
        Source::Targets(targets) => orchestrator.run_from_targets(targets, sink).await,
        Source::Subdomains(subdomains) => orchestrator.run(subdomains, sink).await,
    }

    status_stop.cancel();
    let _ = status.await;
    if let Some(progress) = progress {
        progress.finish().await;
    }

    let snapshot = stats.snapshot();
    info!(
        targets = snapshot.targets_attacked,
        vulns_reported = snapshot.vulns_reported,
        transport_errors = snapshot.transport_errors,
        "Run completed"
    );
    if !quiet {
        println!("{}", render_summary(&run_id, &snapshot, started.elapsed()));
    }
    Ok(())
}

/// CLI flags win over file values.
fn apply_overrides(mut config: CachesnakeConfig, args: &RunArgs) -> CachesnakeConfig {
    if let Some(path) = &args.subdomains {
        config.subdomain_file = Some(PathBuf::from(path));
    }
    if let Some(n) = args.crawler_workers {
        config.crawler.workers = n;
    }
    if let Some(n) = args.attack_workers {
        config.attack.workers = n;
    }
    if let Some(n) = args.triage_workers {
        config.triage.workers = n;
    }
    if let Some(backoff) = args.backoff {
        config.attack.backoff = backoff;
    }
    if let Some(timeout) = args.timeout {
        config.attack.timeout = timeout;
    }
    if let Some(ua) = &args.user_agent {
        config.user_agent = ua.clone();
    }
    if let Some(path) = &args.output {
        config.output.results_file = Some(PathBuf::from(path));
    }
    config
}

fn webhook(config: &CachesnakeConfig) -> Result<Option<WebhookNotifier>, CachesnakeError> {
    let Some(raw) = &config.notifications.webhook_url else {
        return Ok(None);
    };
    match config::resolve_secret(raw) {
        Some(url) => Ok(Some(WebhookNotifier::new(url)?)),
        None => {
            warn!(webhook_url = %raw, "Webhook URL resolved to nothing, notifications disabled");
            Ok(None)
        }
    }
}
