/// Metrics module — Prometheus instrumentation (spec C11)
///
/// Grounded on the teacher's `metrics.rs` (`lazy_static!` + `Registry` +
/// `IntGauge`/`IntCounter` construction, `register`-in-`init_metrics`
/// pattern), trimmed from the teacher's ~45 indexer-specific metrics down to
/// the handful this monitor's state actually has, renamed from the
/// `rustyblox_` prefix to `reorg_monitor_`. These are a read-only projection
/// for scraping: `HOURLY_REPORT`'s `threat_assessment` is always computed
/// from the aggregator's own counters (spec §4.7), never from these gauges,
/// so there is exactly one source of truth.
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    /// Current number of heights held in the block cache.
    pub static ref CACHE_SIZE: IntGauge =
        IntGauge::new("reorg_monitor_cache_size", "Number of heights currently cached").unwrap();

    /// Highest height ever observed in this run.
    pub static ref MAX_OBSERVED_HEIGHT: IntGauge = IntGauge::new(
        "reorg_monitor_max_observed_height",
        "Highest block height ever observed in this run"
    )
    .unwrap();

    /// Tip of the last successful forward sync.
    pub static ref LAST_PROCESSED_HEIGHT: IntGauge = IntGauge::new(
        "reorg_monitor_last_processed_height",
        "Height of the last successfully processed block"
    )
    .unwrap();

    /// Mirrors `hourly_stats.blocks_processed`: successful fetch-and-compare
    /// calls, including no-op rechecks.
    pub static ref BLOCKS_PROCESSED: IntCounter = IntCounter::new(
        "reorg_monitor_blocks_processed_total",
        "Total successful process_block calls, including recheck no-ops"
    )
    .unwrap();

    pub static ref BLOCKS_REPLACED: IntCounter = IntCounter::new(
        "reorg_monitor_blocks_replaced_total",
        "Total BLOCK_REPLACED events emitted"
    )
    .unwrap();

    pub static ref REORGS_DETECTED: IntCounter = IntCounter::new(
        "reorg_monitor_reorgs_detected_total",
        "Total PARENT_HASH_MISMATCH events emitted"
    )
    .unwrap();

    pub static ref CHAIN_REWINDS: IntCounter = IntCounter::new(
        "reorg_monitor_chain_rewinds_total",
        "Total CHAIN_REWIND events emitted"
    )
    .unwrap();

    /// RPC errors surfaced to operators, labeled by the phase that raised
    /// them (startup, forward_sync, deep_recheck).
    pub static ref RPC_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("reorg_monitor_rpc_errors_total", "Total RPC_ERROR events emitted, by phase"),
        &["phase"]
    )
    .unwrap();
}

pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    REGISTRY.register(Box::new(CACHE_SIZE.clone()))?;
    REGISTRY.register(Box::new(MAX_OBSERVED_HEIGHT.clone()))?;
    REGISTRY.register(Box::new(LAST_PROCESSED_HEIGHT.clone()))?;
    REGISTRY.register(Box::new(BLOCKS_PROCESSED.clone()))?;
    REGISTRY.register(Box::new(BLOCKS_REPLACED.clone()))?;
    REGISTRY.register(Box::new(REORGS_DETECTED.clone()))?;
    REGISTRY.register(Box::new(CHAIN_REWINDS.clone()))?;
    REGISTRY.register(Box::new(RPC_ERRORS.clone()))?;
    Ok(())
}

/// Renders the registry in Prometheus text exposition format, for a
/// `/metrics` endpoint when `metrics_port` is configured.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

pub fn record_rpc_error(phase: &str) {
    RPC_ERRORS.with_label_values(&[phase]).inc();
}
