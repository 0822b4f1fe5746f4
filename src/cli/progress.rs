use std::sync::Arc;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::pipeline::{Statistics, StatisticsSnapshot};

/// Spinner refreshed from the live counters while the pipeline runs.
pub struct RunProgress {
    bar: ProgressBar,
    refresher: Option<(JoinHandle<()>, CancellationToken)>,
}

impl RunProgress {
    pub fn start(stats: Arc<Statistics>) -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(spinner) = ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}") {
            bar.set_style(spinner);
        }
        bar.set_message("Starting...");
        bar.enable_steady_tick(Duration::from_millis(120));

        let stop = CancellationToken::new();
        let refresher = {
            let bar = bar.clone();
            let stop = stop.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_millis(500));
                loop {
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = ticker.tick() => bar.set_message(live_message(&stats.snapshot())),
                    }
                }
            })
        };

        Self {
            bar,
            refresher: Some((refresher, stop)),
        }
    }

    pub async fn finish(mut self) {
        if let Some((handle, stop)) = self.refresher.take() {
            stop.cancel();
            let _ = handle.await;
        }
        self.bar.finish_and_clear();
    }
}

fn live_message(s: &StatisticsSnapshot) -> String {
    format!(
        "{} subdomains crawled | {}/{} targets attacked | {} vulns reported | {} transport errors",
        s.subdomains_crawled, s.targets_attacked, s.targets_fetched, s.vulns_reported, s.transport_errors,
    )
}

/// Final run summary for the terminal.
pub fn render_summary(run_id: &str, s: &StatisticsSnapshot, elapsed: Duration) -> String {
    let vulns = if s.vulns_reported > 0 {
        style(s.vulns_reported.to_string()).red().bold()
    } else {
        style(s.vulns_reported.to_string()).green()
    };
    format!(
        "\n  {} {}\n  {} {}\n  {} {} fetched, {} crawled\n  {} {} fetched, {} attacked\n  {} {} reported ({} found before triage)\n  {} {}\n",
        style("Run:").dim(),
        style(run_id).white().bold(),
        style("Elapsed:").dim(),
        format_elapsed(elapsed),
        style("Subdomains:").dim(),
        s.subdomains_fetched,
        s.subdomains_crawled,
        style("Targets:").dim(),
        s.targets_fetched,
        s.targets_attacked,
        style("Vulns:").dim(),
        vulns,
        s.vulns_found,
        style("Transport errors:").dim(),
        s.transport_errors,
    )
}

fn format_elapsed(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}.{}s", secs, d.subsec_millis() / 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_elapsed(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_elapsed(Duration::from_secs(7260)), "2h 1m");
    }

    #[test]
    fn test_summary_mentions_counts() {
        console::set_colors_enabled(false);
        let stats = Statistics::new();
        stats.record_subdomain_fetched();
        stats.record_target_fetched();
        stats.record_target_attacked();
        stats.record_vulns_found(3);
        stats.record_vulns_reported(2);
        let text = render_summary("run-1", &stats.snapshot(), Duration::from_secs(3));
        assert!(text.contains("run-1"));
        assert!(text.contains("1 fetched, 1 attacked"));
        assert!(text.contains("2 reported (3 found before triage)"));
    }

    #[tokio::test]
    async fn test_spinner_lifecycle() {
        let stats = Arc::new(Statistics::new());
        let progress = RunProgress::start(Arc::clone(&stats));
        stats.record_target_attacked();
        progress.finish().await;
    }
}
