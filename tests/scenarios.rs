//! End-to-end scenario coverage driving the tick controller through the
//! library's public surface rather than module-internal test helpers.
//! Grounded on the teacher's convention of keeping unit tests colocated in
//! `#[cfg(test)]` modules for single-component behavior and reserving a
//! top-level `tests/` directory for scenarios that span several components
//! wired together (here: cache + processor + tick, per spec §8's S4).
use std::sync::Arc;
use std::sync::atomic::Ordering;

use reorg_monitor::config::MonitorConfig;
use reorg_monitor::events::{CollectingEventSink, EventSink};
use reorg_monitor::identity::ChainIdentityProber;
use reorg_monitor::aggregator::HourlyAggregator;
use reorg_monitor::rpc::mock::MockRpcClient;
use reorg_monitor::rpc::RpcClient;
use reorg_monitor::tick::{run_tick, MonitorState};
use reorg_monitor::types::{Block, Transaction};

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

fn test_config(recheck_depth: u64) -> MonitorConfig {
    MonitorConfig {
        rpc_url: "http://localhost:8545".to_string(),
        recheck_depth,
        cache_depth: 2048,
        chain_metadata_poll_ms: 10_000,
        hourly_report_interval_ms: 3_600_000,
        ..Default::default()
    }
}

/// S4: heights 0-10 cached with RECHECK_DEPTH=5; tick 2 swaps out height 8
/// (five below the tip) without touching the tip itself. The deep-recheck
/// phase, not forward sync, is what must surface this BLOCK_REPLACED.
#[tokio::test]
async fn scenario_s4_deep_recheck_catches_non_tip_replacement() {
    let config = test_config(5);
    let state = MonitorState::new();
    let mock = Arc::new(MockRpcClient::new());
    let rpc: Arc<dyn RpcClient> = mock.clone();
    let collecting = Arc::new(CollectingEventSink::new());
    let emitter: Arc<dyn EventSink> = collecting.clone();
    let prober = ChainIdentityProber::new(config.chain_metadata_poll_ms);
    let aggregator = HourlyAggregator::with_interval(0, config.hourly_report_interval_ms);

    // Tick 1: populate heights 0..=10. Deep recheck (depth 5) re-fetches 6..=10.
    mock.push_latest(block(10, "0xh10", "0xh9"));
    for i in 0..=10u64 {
        let parent = if i == 0 { "0xgenesis".to_string() } else { format!("0xh{}", i - 1) };
        mock.push_block_at(i, Ok(block(i, &format!("0xh{i}"), &parent)));
    }
    for i in 6..=10u64 {
        mock.push_block_at(i, Ok(block(i, &format!("0xh{i}"), &format!("0xh{}", i - 1))));
    }
    run_tick(0, &state, &config, &rpc, &emitter, &prober, &aggregator).await;
    assert_eq!(state.max_observed_height.load(Ordering::SeqCst), 10);

    // Tick 2: tip unchanged, but height 8 now returns a different block.
    // Forward sync has nothing new to do (cursor already at 10); deep
    // recheck re-walks 6..=10 and must catch the swap at height 8.
    mock.push_latest(block(10, "0xh10", "0xh9"));
    mock.push_block_at(6, Ok(block(6, "0xh6", "0xh5")));
    mock.push_block_at(7, Ok(block(7, "0xh7", "0xh6")));
    mock.push_block_at(8, Ok(block(8, "0xh8_new", "0xh7")));
    mock.push_block_at(9, Ok(block(9, "0xh9", "0xh8_new")));
    mock.push_block_at(10, Ok(block(10, "0xh10", "0xh9")));
    run_tick(1000, &state, &config, &rpc, &emitter, &prober, &aggregator).await;

    let events = collecting.events().await;
    let replaced: Vec<_> = events
        .iter()
        .filter(|e| e.event_type() == "BLOCK_REPLACED")
        .collect();
    assert_eq!(replaced.len(), 1);
    match &replaced[0].payload {
        reorg_monitor::events::EventPayload::BlockReplaced { height, old_hash, new_hash, .. } => {
            assert_eq!(*height, 8);
            assert_eq!(old_hash, "0xh8");
            assert_eq!(new_hash, "0xh8_new");
        }
        other => panic!("expected BlockReplaced, got {other:?}"),
    }
}

/// Two independent ticks, no reorgs: blocks_processed climbs monotonically
/// and the cache holds exactly the heights seen so far (below cache_depth).
#[tokio::test]
async fn scenario_steady_state_forward_sync_across_ticks() {
    let config = test_config(16);
    let state = MonitorState::new();
    let mock = Arc::new(MockRpcClient::new());
    let rpc: Arc<dyn RpcClient> = mock.clone();
    let collecting = Arc::new(CollectingEventSink::new());
    let emitter: Arc<dyn EventSink> = collecting.clone();
    let prober = ChainIdentityProber::new(config.chain_metadata_poll_ms);
    let aggregator = HourlyAggregator::with_interval(0, config.hourly_report_interval_ms);

    mock.push_latest(block(2, "0xh2", "0xh1"));
    for i in 0..=2u64 {
        let parent = if i == 0 { "0xgenesis".to_string() } else { format!("0xh{}", i - 1) };
        mock.push_block_at(i, Ok(block(i, &format!("0xh{i}"), &parent)));
    }
    // deep recheck re-walks the same 3 heights
    for i in 0..=2u64 {
        let parent = if i == 0 { "0xgenesis".to_string() } else { format!("0xh{}", i - 1) };
        mock.push_block_at(i, Ok(block(i, &format!("0xh{i}"), &parent)));
    }
    run_tick(0, &state, &config, &rpc, &emitter, &prober, &aggregator).await;

    mock.push_latest(block(4, "0xh4", "0xh3"));
    for i in 3..=4u64 {
        mock.push_block_at(i, Ok(block(i, &format!("0xh{i}"), &format!("0xh{}", i - 1))));
    }
    for i in 0..=4u64 {
        let parent = if i == 0 { "0xgenesis".to_string() } else { format!("0xh{}", i - 1) };
        mock.push_block_at(i, Ok(block(i, &format!("0xh{i}"), &parent)));
    }
    run_tick(1000, &state, &config, &rpc, &emitter, &prober, &aggregator).await;

    let mut heights = state.cache.heights().await;
    heights.sort();
    assert_eq!(heights, vec![0, 1, 2, 3, 4]);
    assert_eq!(
        collecting
            .events()
            .await
            .iter()
            .filter(|e| e.event_type() == "BLOCK_REPLACED" || e.event_type() == "PARENT_HASH_MISMATCH")
            .count(),
        0
    );
}
