use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::formatter::format_result;
use super::webhook::WebhookNotifier;
use crate::errors::CachesnakeError;
use crate::models::{AttackResult, Vuln};
use crate::pipeline::ResultSink;

/// One JSON line per confirmed result.
#[derive(Debug, Serialize)]
pub struct ResultRecord<'a> {
    pub run_id: &'a str,
    pub program: &'a str,
    pub subdomain: &'a str,
    pub url: &'a str,
    pub time_started: DateTime<Utc>,
    pub time_stopped: DateTime<Utc>,
    pub vulns: &'a [Vuln],
}

impl<'a> ResultRecord<'a> {
    pub fn new(run_id: &'a str, result: &'a AttackResult) -> Self {
        Self {
            run_id,
            program: &result.target.subdomain.program.name,
            subdomain: &result.target.subdomain.hostname,
            url: &result.target.url,
            time_started: result.time_started,
            time_stopped: result.time_stopped,
            vulns: &result.vulns,
        }
    }
}

/// Logs confirmed results, appends them to the results file and forwards them to the webhook.
/// Delivery failures are logged and never stop the run.
pub struct ReportSink {
    run_id: String,
    results_file: Option<PathBuf>,
    notifier: Option<WebhookNotifier>,
    write_lock: Mutex<()>,
}

impl ReportSink {
    pub fn new(run_id: impl Into<String>, results_file: Option<PathBuf>, notifier: Option<WebhookNotifier>) -> Self {
        Self {
            run_id: run_id.into(),
            results_file,
            notifier,
            write_lock: Mutex::new(()),
        }
    }

    async fn append(&self, result: &AttackResult) -> Result<(), CachesnakeError> {
        let Some(path) = &self.results_file else {
            return Ok(());
        };
        let mut line = serde_json::to_string(&ResultRecord::new(&self.run_id, result))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl ResultSink for ReportSink {
    async fn report(&self, result: &AttackResult) {
        let kinds: Vec<String> = result.vulns.iter().map(|v| v.kind.to_string()).collect();
        info!(
            run_id = %self.run_id,
            target_url = %result.target.url,
            vulns = %kinds.join(", "),
            "Confirmed cache poisoning"
        );

        if let Err(e) = self.append(result).await {
            warn!(error = %e, "Failed to write result");
        }
        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.send(&format_result(result)).await {
                warn!(error = %e, "Failed to deliver result notification");
            }
        }
    }
}
