//! Prometheus metrics
//!
//! Thin wrappers over the `metrics` facade. Without an installed recorder
//! every call is a no-op.

/// Monotonic counters
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Bars persisted by live pollers
    BarsWritten,
    /// Fetched bars not newer than the stored latest
    DedupSkips,
    /// Failed poller iterations
    PollerErrors,
    /// Symbols not streamed because the stream limit was reached
    CapacitySkips,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Running stream tasks
    ActiveStreams,
    /// Current watchlist size
    WatchlistSize,
}

/// Result of a backfill job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillOutcome {
    Success,
    NoData,
    Failed,
}

impl BackfillOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackfillOutcome::Success => "success",
            BackfillOutcome::NoData => "no_data",
            BackfillOutcome::Failed => "failed",
        }
    }
}

/// Increment a counter
pub fn increment(metric: CounterMetric, value: u64) {
    let metric_name = match metric {
        CounterMetric::BarsWritten => "tickwatch_bars_written_total",
        CounterMetric::DedupSkips => "tickwatch_dedup_skips_total",
        CounterMetric::PollerErrors => "tickwatch_poller_errors_total",
        CounterMetric::CapacitySkips => "tickwatch_capacity_skips_total",
    };

    ::metrics::counter!(metric_name).increment(value);
}

/// Count a finished backfill job by outcome
pub fn record_backfill(outcome: BackfillOutcome) {
    ::metrics::counter!("tickwatch_backfills_total", "outcome" => outcome.as_str()).increment(1);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    let metric_name = match metric {
        GaugeMetric::ActiveStreams => "tickwatch_active_streams",
        GaugeMetric::WatchlistSize => "tickwatch_watchlist_size",
    };

    ::metrics::gauge!(metric_name).set(value);
}
