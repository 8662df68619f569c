use metrics_exporter_prometheus::PrometheusBuilder;

#[test]
fn level_counters_track_warn_and_error_events() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    metrics::with_local_recorder(&recorder, || {
        let (dispatch, _guard) = common::observability::build_dispatch("ledger-test", "info");

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::warn!(row = 3, column = "value", "row flagged");
            tracing::error!(reason = "missing file", "ledger unavailable");
        });
    });

    let rendered = handle.render();
    assert!(
        rendered.contains("tracing_error_events"),
        "expected tracing_error_events in rendered metrics, got:\n{rendered}"
    );
    assert!(
        rendered.contains("tracing_warn_events"),
        "expected tracing_warn_events in rendered metrics, got:\n{rendered}"
    );
}

#[test]
fn parse_metrics_are_recorded_through_public_api() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    metrics::with_local_recorder(&recorder, || {
        let ledger = common::ledger::parse_ledger("tx_id,value\nt1,1.5\nt2,abc\n");
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.flagged_rows(), 1);
    });

    let rendered = handle.render();
    assert!(rendered.contains("ledger_rows_parsed_total"), "{rendered}");
    assert!(rendered.contains("ledger_rows_flagged_total"), "{rendered}");
}
