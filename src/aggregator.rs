/// Hourly aggregator (spec C7)
///
/// Maintains counters from the event stream and, on a coarse timer, emits a
/// summary event and escalates via the alert dispatcher if thresholds are
/// crossed. Grounded on the teacher's `mempool.rs::MempoolState` (counters
/// updated in lockstep with events, read out for a summary) and the
/// `metrics.rs` priority-style gauge-labeling convention, generalized here
/// to the first-match-wins threat-assessment table of spec §4.7.
use std::sync::Mutex;

use crate::events::{EventPayload, EventSink, HourlyStatsPayload};

#[derive(Debug, Clone, Default)]
pub struct HourlyStats {
    pub blocks_processed: u64,
    pub reorgs_detected: u64,
    pub blocks_replaced: u64,
    pub chain_rewinds: u64,
}

struct Inner {
    stats: HourlyStats,
    start_time_ms: i64,
}

pub struct HourlyAggregator {
    inner: Mutex<Inner>,
    report_interval_ms: i64,
}

impl HourlyAggregator {
    pub fn new(start_time_ms: i64) -> Self {
        Self::with_interval(start_time_ms, 3_600_000)
    }

    pub fn with_interval(start_time_ms: i64, report_interval_ms: i64) -> Self {
        Self {
            inner: Mutex::new(Inner { stats: HourlyStats::default(), start_time_ms }),
            report_interval_ms,
        }
    }

    pub fn record_block_processed(&self) {
        self.inner.lock().unwrap().stats.blocks_processed += 1;
    }

    pub fn record_block_replaced(&self) {
        self.inner.lock().unwrap().stats.blocks_replaced += 1;
    }

    pub fn record_reorg_detected(&self) {
        self.inner.lock().unwrap().stats.reorgs_detected += 1;
    }

    pub fn record_chain_rewind(&self) {
        self.inner.lock().unwrap().stats.chain_rewinds += 1;
    }

    pub fn stats(&self) -> HourlyStats {
        self.inner.lock().unwrap().stats.clone()
    }

    /// If `report_interval_ms` has elapsed since the last report, emits
    /// `HOURLY_REPORT` (dispatching to the alert sink when the assessment is
    /// not `LOW`) and resets the counters with a fresh `start_time_ms`.
    pub async fn maybe_report(&self, now_ms: i64, emitter: &std::sync::Arc<dyn EventSink>) {
        let (stats, start_time_ms) = {
            let guard = self.inner.lock().unwrap();
            if now_ms - guard.start_time_ms < self.report_interval_ms {
                return;
            }
            (guard.stats.clone(), guard.start_time_ms)
        };

        let (assessment, details) = assess_threat(&stats);
        let duration_minutes = (now_ms - start_time_ms) as f64 / 60_000.0;

        emitter
            .emit(EventPayload::HourlyReport {
                duration_minutes,
                stats: HourlyStatsPayload {
                    blocks_processed: stats.blocks_processed,
                    reorgs_detected: stats.reorgs_detected,
                    blocks_replaced: stats.blocks_replaced,
                    chain_rewinds: stats.chain_rewinds,
                },
                threat_assessment: assessment,
                threat_details: details,
            })
            .await;

        let mut guard = self.inner.lock().unwrap();
        guard.stats = HourlyStats::default();
        guard.start_time_ms = now_ms;
    }
}

/// First-match-wins priority table from spec §4.7. Returns the assessment
/// string plus the specific counters that tripped it, so an alert read in
/// isolation (without the full `stats` block) is still self-explanatory.
fn assess_threat(stats: &HourlyStats) -> (&'static str, Vec<String>) {
    if stats.chain_rewinds > 0 {
        return ("CRITICAL", vec![format!("chain_rewinds={}", stats.chain_rewinds)]);
    }
    if stats.reorgs_detected > 5 || stats.blocks_replaced > 10 {
        let mut details = Vec::new();
        if stats.reorgs_detected > 5 {
            details.push(format!("reorgs_detected={}", stats.reorgs_detected));
        }
        if stats.blocks_replaced > 10 {
            details.push(format!("blocks_replaced={}", stats.blocks_replaced));
        }
        return ("HIGH", details);
    }
    if stats.reorgs_detected > 0 || stats.blocks_replaced > 0 {
        let mut details = Vec::new();
        if stats.reorgs_detected > 0 {
            details.push(format!("reorgs_detected={}", stats.reorgs_detected));
        }
        if stats.blocks_replaced > 0 {
            details.push(format!("blocks_replaced={}", stats.blocks_replaced));
        }
        return ("MEDIUM", details);
    }
    ("LOW", Vec::new())
}
