//! Metrics for dispatch outcomes
//!
//! Counters recorded by the dispatcher:
//!
//! - `dispatch_batches_total` (counter): label `strategy`
//! - `dispatch_items_total` (counter): label `strategy`
//! - `dispatch_quota_exhaustions_total` (counter)
//! - `dispatch_permanent_failures_total` (counter)
//! - `dispatch_pool_exhausted_total` (counter)

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering.
///
/// The handle's `render()` output is the Prometheus text exposition format,
/// suitable for serving on a `/metrics` endpoint by whatever hosts the
/// dispatcher. Call once per process.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record one dispatched batch and its item count, labelled by strategy
/// (`small_batch` or `partitioned`).
pub fn record_batch(strategy: &'static str, items: usize) {
    metrics::counter!("dispatch_batches_total", "strategy" => strategy).increment(1);
    metrics::counter!("dispatch_items_total", "strategy" => strategy).increment(items as u64);
}

/// Record a quota-exhaustion classification.
pub fn record_quota_exhausted() {
    metrics::counter!("dispatch_quota_exhaustions_total").increment(1);
}

/// Record a permanent-failure classification.
pub fn record_permanent_failure() {
    metrics::counter!("dispatch_permanent_failures_total").increment(1);
}

/// Record a batch or chunk abandoned because no credential remained.
pub fn record_pool_exhausted() {
    metrics::counter!("dispatch_pool_exhausted_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        // Without an installed recorder metrics calls are no-ops.
        record_batch("small_batch", 3);
        record_quota_exhausted();
        record_permanent_failure();
        record_pool_exhausted();
    }

    /// Isolated recorder/handle pair; install_recorder() would hit the
    /// one-global-recorder-per-process constraint under `cargo test`.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn record_batch_carries_strategy_label() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_batch("small_batch", 2);
        record_batch("partitioned", 40);

        let output = handle.render();
        assert!(
            output.contains("dispatch_batches_total"),
            "batch counter must render: {output}"
        );
        assert!(
            output.contains("strategy=\"small_batch\""),
            "small_batch label must appear"
        );
        assert!(
            output.contains("strategy=\"partitioned\""),
            "partitioned label must appear"
        );
        assert!(
            output.contains("dispatch_items_total"),
            "item counter must render"
        );
    }

    #[test]
    fn failure_counters_render() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_quota_exhausted();
        record_permanent_failure();
        record_pool_exhausted();

        let output = handle.render();
        assert!(output.contains("dispatch_quota_exhaustions_total"));
        assert!(output.contains("dispatch_permanent_failures_total"));
        assert!(output.contains("dispatch_pool_exhausted_total"));
    }
}
