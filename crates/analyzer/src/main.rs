use anyhow::Result;
use std::sync::Arc;
use tracing::Instrument;

use common::scheduler;
use common::snapshot::{LedgerSnapshot, RefreshOutcome, SharedSnapshot};
use common::source::LedgerSource;

mod cli;
mod metrics;

#[tokio::main]
async fn main() -> Result<()> {
    let config = common::config::Config::load()?;

    let (dispatch, _otel_guard) =
        common::observability::build_dispatch("analyzer", &config.general.log_level);
    tracing::dispatcher::set_global_default(dispatch).map_err(anyhow::Error::msg)?;

    let invocation = cli::parse_args(std::env::args()).map_err(anyhow::Error::msg)?;
    let source = LedgerSource::from_config(&config.source)?;

    // One-shot reports load once, print, and exit.
    if invocation.command != cli::Command::Run {
        let snapshot = LedgerSnapshot::build(source.load().await, &config.aggregation);
        return cli::run_command(&snapshot, &invocation);
    }

    tracing::info!(source = %source.location(), "analyzer starting");

    metrics::install_prometheus(config.observability.prometheus_port)?;
    metrics::describe();

    let initial = LedgerSnapshot::build(source.load().await, &config.aggregation);
    metrics::publish_snapshot(&initial);
    let shared = Arc::new(SharedSnapshot::new(initial));
    let aggregation = config.aggregation;

    let (refresh_tx, mut refresh_rx) = tokio::sync::mpsc::channel::<()>(8);

    tokio::spawn({
        let shared = shared.clone();
        async move {
            while refresh_rx.recv().await.is_some() {
                let outcome = shared
                    .refresh(&source, &aggregation)
                    .instrument(tracing::info_span!("job_run", job = "ledger_refresh"))
                    .await;
                match outcome {
                    RefreshOutcome::Rebuilt => {
                        let snapshot = shared.current().await;
                        metrics::publish_snapshot(&snapshot);
                        tracing::info!(
                            rows = snapshot.records().len(),
                            addresses = snapshot.book.len(),
                            "ledger changed, snapshot rebuilt"
                        );
                    }
                    RefreshOutcome::Unchanged => tracing::debug!("ledger unchanged"),
                    RefreshOutcome::Failed { reason } => {
                        let snapshot = shared.current().await;
                        metrics::publish_snapshot(&snapshot);
                        tracing::warn!(%reason, "ledger refresh failed, keeping previous snapshot");
                    }
                }
            }
        }
    });

    let _scheduler_handles = scheduler::start(vec![scheduler::JobSpec {
        name: "ledger_refresh".to_string(),
        interval: std::time::Duration::from_secs(config.refresh.interval_secs),
        tick: refresh_tx,
    }]);
    tracing::info!(
        interval_secs = config.refresh.interval_secs,
        "scheduler started"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    Ok(())
}
