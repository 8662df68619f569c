use anyhow::Result;
use common::snapshot::LedgerSnapshot;
use common::types::RiskCategory;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use rust_decimal::prelude::ToPrimitive;
use std::net::SocketAddr;

pub fn describe() {
    describe_counter!(
        "ledger_rows_parsed_total",
        "Ledger rows parsed into transaction records."
    );
    describe_counter!(
        "ledger_rows_flagged_total",
        "Ledger rows with at least one value that failed coercion."
    );
    describe_counter!(
        "ledger_loads_total",
        "Ledger load attempts, labelled by resulting status."
    );
    describe_counter!(
        "ledger_load_errors_total",
        "Ledger fetch failures, labelled by error kind."
    );
    describe_histogram!(
        "ledger_fetch_latency_ms",
        "Time to fetch the ledger text in milliseconds."
    );
    describe_histogram!(
        "snapshot_build_ms",
        "Time to aggregate a ledger into a snapshot in milliseconds."
    );
    describe_counter!(
        "snapshot_refresh_total",
        "Refresh attempts, labelled by outcome."
    );
    describe_gauge!("ledger_records", "Records in the current snapshot.");
    describe_gauge!(
        "ledger_addresses",
        "Distinct real addresses in the current snapshot."
    );
    describe_gauge!(
        "ledger_addresses_by_risk",
        "Addresses per inherited risk category."
    );
    describe_gauge!("ledger_risk_alerts", "Records flagged High_Risk.");
    describe_gauge!("ledger_total_volume", "Sum of record values.");
    describe_gauge!(
        "ledger_available",
        "1 when the last snapshot came from a reachable source."
    );
}

pub fn install_prometheus(port: u16) -> Result<PrometheusHandle> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    Ok(PrometheusBuilder::new()
        .with_http_listener(addr)
        .install_recorder()?)
}

/// Mirror the current snapshot into gauges.
pub fn publish_snapshot(snapshot: &LedgerSnapshot) {
    let summary = &snapshot.summary;
    metrics::gauge!("ledger_records").set(summary.total_transactions as f64);
    metrics::gauge!("ledger_addresses").set(summary.active_addresses as f64);
    metrics::gauge!("ledger_risk_alerts").set(summary.risk_alerts as f64);
    metrics::gauge!("ledger_total_volume").set(summary.total_volume.to_f64().unwrap_or(0.0));
    metrics::gauge!("ledger_available").set(if snapshot.status.is_available() {
        1.0
    } else {
        0.0
    });
    for category in [RiskCategory::Low, RiskCategory::Medium, RiskCategory::High] {
        metrics::gauge!("ledger_addresses_by_risk", "category" => category.as_str())
            .set(snapshot.book.count_by_category(category) as f64);
    }
}
