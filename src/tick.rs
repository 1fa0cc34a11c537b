/// Tick controller (spec C6)
///
/// One pass of the polling loop: identity probe → tip fetch → cold-start →
/// rewind check → forward-sync → deep-recheck → prune. Grounded on the
/// teacher's `monitor.rs::run_block_monitor` loop shape (tip fetch → reorg
/// check → forward index loop → sleep), generalized to the full phase
/// ordering and partial-failure policy the spec requires; the teacher's loop
/// has no deep-recheck phase or cold-start/rewind-reset logic, so that
/// control flow is built fresh here, in the teacher's idiom of small
/// `match`-per-call-site error handling rather than one big combinator
/// chain.
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::aggregator::HourlyAggregator;
use crate::cache::BlockCache;
use crate::config::MonitorConfig;
use crate::error::RpcError;
use crate::events::{EventPayload, EventSink, SEVERITY_CRITICAL};
use crate::identity::ChainIdentityProber;
use crate::metrics;
use crate::processor::process_block;
use crate::rpc::RpcClient;

/// Process-wide detector state (spec §3's `MonitorState`), owned exclusively
/// by the tick controller and mutated only from `run_tick`.
pub struct MonitorState {
    pub cache: BlockCache,
    pub max_observed_height: AtomicU64,
    /// `-1` before the first tick; signed so the sentinel is representable.
    pub last_processed_height: std::sync::atomic::AtomicI64,
}

impl MonitorState {
    pub fn new() -> Self {
        Self {
            cache: BlockCache::new(),
            max_observed_height: AtomicU64::new(0),
            last_processed_height: std::sync::atomic::AtomicI64::new(-1),
        }
    }
}

impl Default for MonitorState {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs one full tick. Never propagates an error to the caller: every
/// failure is classified and turned into either an `RPC_ERROR` event or a
/// silent swallow, per spec §4.6/§7.
#[allow(clippy::too_many_arguments)]
pub async fn run_tick(
    now_ms: i64,
    state: &MonitorState,
    config: &MonitorConfig,
    rpc: &Arc<dyn RpcClient>,
    emitter: &Arc<dyn EventSink>,
    prober: &ChainIdentityProber,
    aggregator: &HourlyAggregator,
) {
    if let Err(e) = run_tick_inner(now_ms, state, config, rpc, emitter, prober, aggregator).await {
        if e.is_block_not_found() {
            return;
        }
        metrics::record_rpc_error("startup");
        emitter.emit(EventPayload::RpcError { error: e.to_string(), message: None }).await;
    }
}

async fn run_tick_inner(
    now_ms: i64,
    state: &MonitorState,
    config: &MonitorConfig,
    rpc: &Arc<dyn RpcClient>,
    emitter: &Arc<dyn EventSink>,
    prober: &ChainIdentityProber,
    aggregator: &HourlyAggregator,
) -> Result<(), RpcError> {
    // Phase 1: identity probe.
    prober.maybe_probe(now_ms, rpc, emitter).await?;

    // Phase 2: tip fetch.
    let tip = rpc.get_block_latest().await?;
    let latest_height = tip.number;

    let last_processed = state.last_processed_height.load(Ordering::SeqCst);

    // Phase 3: cold start.
    if last_processed == -1 && latest_height > 0 {
        emitter
            .emit(EventPayload::MonitorSkipHistory {
                message: "cold start: skipping historical backfill to current tip".to_string(),
                skipped_to_height: latest_height,
            })
            .await;
        state
            .last_processed_height
            .store(latest_height as i64 - 1, Ordering::SeqCst);
    }

    // Phase 4: rewind check.
    let max_observed = state.max_observed_height.load(Ordering::SeqCst);
    if latest_height < max_observed {
        aggregator.record_chain_rewind();
        metrics::CHAIN_REWINDS.inc();
        emitter
            .emit(EventPayload::ChainRewind {
                from_height: max_observed,
                to_height: latest_height,
                severity: SEVERITY_CRITICAL,
            })
            .await;
        state.max_observed_height.store(latest_height, Ordering::SeqCst);
        state.last_processed_height.store(latest_height as i64, Ordering::SeqCst);
    }

    // Phase 5: forward sync. Advance only on success; stop at the first
    // failure so gaps in BLOCK_RECEIVED coverage aren't introduced silently.
    let mut cursor = state.last_processed_height.load(Ordering::SeqCst);
    while cursor < latest_height as i64 {
        let h = (cursor + 1) as u64;
        match process_block(h, &state.cache, rpc, emitter, aggregator, &state.max_observed_height).await {
            Ok(()) => {
                cursor = h as i64;
                state.last_processed_height.store(cursor, Ordering::SeqCst);
            }
            Err(e) => {
                if e.is_block_not_found() {
                    return Err(e);
                }
                metrics::record_rpc_error("forward_sync");
                emitter
                    .emit(EventPayload::RpcError {
                        error: e.to_string(),
                        message: Some(format!("Failed to process block {h}")),
                    })
                    .await;
                break;
            }
        }
    }

    // Phase 6: deep recheck. Errors here are logged individually and do not
    // stop recheck of the other recent heights.
    let last_processed = state.last_processed_height.load(Ordering::SeqCst).max(0) as u64;
    let recheck_floor = latest_height.saturating_sub(config.recheck_depth.saturating_sub(1));
    for h in recheck_floor..=last_processed {
        if let Err(e) = process_block(h, &state.cache, rpc, emitter, aggregator, &state.max_observed_height).await {
            if e.is_block_not_found() {
                continue;
            }
            metrics::record_rpc_error("deep_recheck");
            emitter.emit(EventPayload::RpcError { error: e.to_string(), message: None }).await;
        }
    }

    // Phase 7: prune.
    let prune_floor = latest_height.saturating_sub(config.cache_depth.saturating_sub(1));
    state.cache.prune(prune_floor).await;

    metrics::CACHE_SIZE.set(state.cache.len().await as i64);
    metrics::MAX_OBSERVED_HEIGHT.set(state.max_observed_height.load(Ordering::SeqCst) as i64);
    metrics::LAST_PROCESSED_HEIGHT.set(state.last_processed_height.load(Ordering::SeqCst));

    aggregator.maybe_report(now_ms, emitter).await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::rpc::mock::MockRpcClient;
    use crate::types::{Block, Transaction};

    fn block(number: u64, hash: &str, parent: &str) -> Block {
        Block {
            number,
            hash: hash.to_string(),
            parent_hash: parent.to_string(),
            state_root: None,
            base_fee_per_gas: None,
            gas_used: None,
            transactions: vec![Transaction { hash: format!("0xtx{number}") }],
        }
    }

    fn test_config() -> MonitorConfig {
        MonitorConfig {
            rpc_url: "http://localhost:8545".to_string(),
            recheck_depth: 16,
            cache_depth: 2048,
            chain_metadata_poll_ms: 10_000,
            hourly_report_interval_ms: 3_600_000,
            ..Default::default()
        }
    }

    struct Harness {
        state: MonitorState,
        config: MonitorConfig,
        mock: Arc<MockRpcClient>,
        rpc: Arc<dyn RpcClient>,
        collecting: Arc<CollectingEventSink>,
        emitter: Arc<dyn EventSink>,
        prober: ChainIdentityProber,
        aggregator: HourlyAggregator,
    }

    fn harness(config: MonitorConfig) -> Harness {
        let mock = Arc::new(MockRpcClient::new());
        let collecting = Arc::new(CollectingEventSink::new());
        Harness {
            state: MonitorState::new(),
            prober: ChainIdentityProber::new(config.chain_metadata_poll_ms),
            aggregator: HourlyAggregator::with_interval(0, config.hourly_report_interval_ms),
            config,
            rpc: mock.clone(),
            mock,
            emitter: collecting.clone(),
            collecting,
        }
    }

    // S1: linear chain 0-5 on tick 1, tick 2 rewinds to latest=3.
    #[tokio::test]
    async fn scenario_s1_linear_then_rewind() {
        let h = harness(test_config());
        h.mock.push_latest(block(5, "0xh5", "0xh4"));
        for i in 0..=5u64 {
            let parent = if i == 0 { "0xgenesis".to_string() } else { format!("0xh{}", i - 1) };
            h.mock.push_block_at(i, Ok(block(i, &format!("0xh{i}"), &parent)));
        }
        // Deep recheck on tick 1 will re-fetch the same heights; script enough responses.
        for i in 0..=5u64 {
            let parent = if i == 0 { "0xgenesis".to_string() } else { format!("0xh{}", i - 1) };
            h.mock.push_block_at(i, Ok(block(i, &format!("0xh{i}"), &parent)));
        }

        run_tick(0, &h.state, &h.config, &h.rpc, &h.emitter, &h.prober, &h.aggregator).await;
        let types_tick1 = h.collecting.event_types().await;
        assert_eq!(types_tick1.iter().filter(|t| **t == "BLOCK_RECEIVED").count(), 6);

        h.mock.push_latest(block(3, "0xh3", "0xh2"));
        run_tick(1000, &h.state, &h.config, &h.rpc, &h.emitter, &h.prober, &h.aggregator).await;

        let types_all = h.collecting.event_types().await;
        assert!(types_all.contains(&"CHAIN_REWIND"));
        assert_eq!(h.state.max_observed_height.load(Ordering::SeqCst), 3);
    }

    // S5: linear 0-10, CACHE_DEPTH=3, one tick -> cache keys exactly {8,9,10}.
    #[tokio::test]
    async fn scenario_s5_cache_pruned_to_depth() {
        let mut config = test_config();
        config.cache_depth = 3;
        config.recheck_depth = 3;
        let h = harness(config);
        h.mock.push_latest(block(10, "0xh10", "0xh9"));
        for i in 0..=10u64 {
            let parent = if i == 0 { "0xgenesis".to_string() } else { format!("0xh{}", i - 1) };
            h.mock.push_block_at(i, Ok(block(i, &format!("0xh{i}"), &parent)));
        }
        // Deep recheck of the last 3 heights re-fetches them again.
        for i in 8..=10u64 {
            h.mock.push_block_at(i, Ok(block(i, &format!("0xh{i}"), &format!("0xh{}", i - 1))));
        }

        run_tick(0, &h.state, &h.config, &h.rpc, &h.emitter, &h.prober, &h.aggregator).await;

        let mut heights = h.state.cache.heights().await;
        heights.sort();
        assert_eq!(heights, vec![8, 9, 10]);
    }

    // S7: "Block not found" swallowed silently, then "boom" surfaces once.
    #[tokio::test]
    async fn scenario_s7_block_not_found_then_boom() {
        let h = harness(test_config());
        h.mock.push_latest(block(0, "0xh0", "0xgenesis"));
        h.mock
            .push_block_at(0, Err(crate::error::RpcError::BlockNotFound("Block not found".to_string())));

        run_tick(0, &h.state, &h.config, &h.rpc, &h.emitter, &h.prober, &h.aggregator).await;
        assert!(h.collecting.events().await.is_empty());

        h.mock.push_latest(block(0, "0xh0", "0xgenesis"));
        h.mock.push_block_at(0, Err(crate::error::RpcError::Protocol("boom".to_string())));

        run_tick(1, &h.state, &h.config, &h.rpc, &h.emitter, &h.prober, &h.aggregator).await;

        let events = h.collecting.events().await;
        let rpc_errors: Vec<_> = events
            .iter()
            .filter(|e| e.event_type() == "RPC_ERROR")
            .collect();
        assert_eq!(rpc_errors.len(), 1);
        match &rpc_errors[0].payload {
            EventPayload::RpcError { error, .. } => assert!(error.contains("boom")),
            other => panic!("expected RpcError, got {other:?}"),
        }
    }
}
