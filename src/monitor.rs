/// Monitor composition root (wraps C1, C2/C3 wiring, C4, C6, C7).
///
/// Grounded on the teacher's `monitor.rs::run_block_monitor` outer
/// `loop { sleep; ... }` shape and the `main.rs` graceful-composition style
/// (`tokio::spawn` for background services, a `tokio::time::sleep` pacing
/// loop) — generalized here to a single non-overlapping tick loop that
/// awaits one tick's completion before sleeping for the residual interval,
/// per spec §4.6's "ticks do not overlap".
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::aggregator::HourlyAggregator;
use crate::alert::{AlertDispatcher, AlertSink};
use crate::clock::Clock;
use crate::config::MonitorConfig;
use crate::events::{EventPayload, EventSink, StdoutEventSink};
use crate::identity::ChainIdentityProber;
use crate::rpc::RpcClient;
use crate::tick::{run_tick, MonitorState};

pub struct Monitor {
    config: MonitorConfig,
    rpc: Arc<dyn RpcClient>,
    emitter: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    state: MonitorState,
    prober: ChainIdentityProber,
    aggregator: HourlyAggregator,
}

impl Monitor {
    /// Production constructor: builds a stdout event sink wired to an
    /// alert dispatcher for the configured webhook (or a no-op one).
    pub fn new(config: MonitorConfig, rpc: Arc<dyn RpcClient>, clock: Arc<dyn Clock>) -> Self {
        let alert: Arc<dyn AlertSink> = Arc::new(AlertDispatcher::new(config.alert_webhook_url.clone()));
        let emitter: Arc<dyn EventSink> = Arc::new(StdoutEventSink::new(alert));
        Self::with_sink(config, rpc, clock, emitter)
    }

    /// Test/injection constructor: takes the event sink directly so tests
    /// substitute a `CollectingEventSink` (spec §9's testability
    /// requirement).
    pub fn with_sink(
        config: MonitorConfig,
        rpc: Arc<dyn RpcClient>,
        clock: Arc<dyn Clock>,
        emitter: Arc<dyn EventSink>,
    ) -> Self {
        let now_ms = clock.now_ms();
        Self {
            prober: ChainIdentityProber::new(config.chain_metadata_poll_ms),
            aggregator: HourlyAggregator::with_interval(now_ms, config.hourly_report_interval_ms),
            state: MonitorState::new(),
            config,
            rpc,
            emitter,
            clock,
        }
    }

    /// Runs ticks at `poll_interval_ms` spacing until `shutdown` fires.
    /// Ticks never overlap: the loop awaits one tick's completion, then
    /// sleeps for whatever remains of the interval (zero if the tick itself
    /// overran it) before starting the next.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        self.emitter
            .emit(EventPayload::MonitorStart {
                message: "chain-reorg monitor starting".to_string(),
                chain: self.config.chain_name.clone(),
                rpc: Some(self.config.rpc_url.clone()),
            })
            .await;

        let interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            if *shutdown.borrow() {
                info!("shutdown signal received, stopping tick loop");
                return;
            }

            let tick_start = tokio::time::Instant::now();
            let now_ms = self.clock.now_ms();

            run_tick(
                now_ms,
                &self.state,
                &self.config,
                &self.rpc,
                &self.emitter,
                &self.prober,
                &self.aggregator,
            )
            .await;

            let elapsed = tick_start.elapsed();
            let residual = interval.saturating_sub(elapsed);

            tokio::select! {
                _ = tokio::time::sleep(residual) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("shutdown signal received during sleep, stopping tick loop");
                        return;
                    }
                }
            }
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &MonitorState {
        &self.state
    }
}
