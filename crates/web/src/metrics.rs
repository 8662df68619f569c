use anyhow::Result;
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub fn describe() {
    describe_gauge!(
        "web_build_info",
        "Build info for the ledger API (value is always 1)."
    );
    describe_counter!(
        "web_requests_total",
        "API requests served, labelled by route and status class."
    );
    describe_counter!(
        "snapshot_refresh_total",
        "Refresh attempts, labelled by outcome."
    );
}

/// Install the global recorder; `/metrics` renders through the returned handle.
///
/// The recorder needs periodic upkeep, which the `/metrics` handler runs on each scrape.
pub fn install() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe();

    let git_sha = std::env::var("GIT_SHA").unwrap_or_else(|_| "unknown".to_string());
    ::metrics::gauge!(
        "web_build_info",
        "version" => env!("CARGO_PKG_VERSION"),
        "git_sha" => git_sha,
    )
    .set(1.0);

    Ok(handle)
}
