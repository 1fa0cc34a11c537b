/// Event emitter (spec C2)
///
/// One event = one structured record: an ISO-8601 UTC timestamp, an
/// `event_type`, and type-specific payload fields. The tagged-enum shape
/// mirrors the teacher's `websocket.rs::BlockchainEvent`
/// (`#[serde(tag = "type")]`), but where the teacher fans events out over a
/// `tokio::sync::broadcast` channel to WebSocket subscribers, here emission
/// is synchronous: the record is written before `emit` returns, so tests can
/// assert against the exact point in the tick where an event was raised.
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::alert::AlertSink;

pub const SEVERITY_CRITICAL: &str = "CRITICAL";

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type")]
pub enum EventPayload {
    #[serde(rename = "MONITOR_START")]
    MonitorStart {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        chain: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        rpc: Option<String>,
    },
    #[serde(rename = "MONITOR_SKIP_HISTORY")]
    MonitorSkipHistory { message: String, skipped_to_height: u64 },
    #[serde(rename = "BLOCK_RECEIVED")]
    BlockReceived {
        height: u64,
        hash: String,
        parent_hash: String,
        state_root: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        base_fee: Option<u64>,
        gas_used: Option<u64>,
        tx_count: usize,
        transactions: Vec<String>,
    },
    #[serde(rename = "BLOCK_REPLACED")]
    BlockReplaced {
        height: u64,
        old_hash: String,
        new_hash: String,
        old_state_root: Option<String>,
        new_state_root: Option<String>,
        tx_diff: TxDiff,
        severity: &'static str,
    },
    #[serde(rename = "PARENT_HASH_MISMATCH")]
    ParentHashMismatch {
        at_height: u64,
        expected_parent: String,
        actual_parent: String,
        severity: &'static str,
    },
    #[serde(rename = "CHAIN_REWIND")]
    ChainRewind { from_height: u64, to_height: u64, severity: &'static str },
    #[serde(rename = "CHAIN_ID_CHANGED")]
    ChainIdChanged { old_chain_id: u64, new_chain_id: u64, severity: &'static str },
    #[serde(rename = "GENESIS_CHANGED")]
    GenesisChanged { old_genesis_hash: String, new_genesis_hash: String, severity: &'static str },
    #[serde(rename = "HOURLY_REPORT")]
    HourlyReport {
        duration_minutes: f64,
        stats: HourlyStatsPayload,
        threat_assessment: &'static str,
        threat_details: Vec<String>,
    },
    #[serde(rename = "RPC_ERROR")]
    RpcError { error: String, #[serde(skip_serializing_if = "Option::is_none")] message: Option<String> },
}

#[derive(Debug, Clone, Serialize)]
pub struct TxDiff {
    pub dropped: Vec<String>,
    pub added: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HourlyStatsPayload {
    pub blocks_processed: u64,
    pub reorgs_detected: u64,
    pub blocks_replaced: u64,
    pub chain_rewinds: u64,
}

impl EventPayload {
    /// True for events whose severity field is `CRITICAL` (spec §4.2).
    pub fn severity_critical(&self) -> bool {
        matches!(
            self,
            EventPayload::BlockReplaced { .. }
                | EventPayload::ParentHashMismatch { .. }
                | EventPayload::ChainRewind { .. }
                | EventPayload::ChainIdChanged { .. }
                | EventPayload::GenesisChanged { .. }
        )
    }

    /// True for events that must be forwarded to the alert dispatcher: every
    /// `severity_critical()` event, plus an `HOURLY_REPORT` whose
    /// `threat_assessment` is not `LOW` (spec §4.7: "If assessment != LOW,
    /// also dispatch to C3").
    pub fn is_alert_worthy(&self) -> bool {
        match self {
            EventPayload::HourlyReport { threat_assessment, .. } => *threat_assessment != "LOW",
            other => other.severity_critical(),
        }
    }

    fn event_type_name(&self) -> &'static str {
        match self {
            EventPayload::MonitorStart { .. } => "MONITOR_START",
            EventPayload::MonitorSkipHistory { .. } => "MONITOR_SKIP_HISTORY",
            EventPayload::BlockReceived { .. } => "BLOCK_RECEIVED",
            EventPayload::BlockReplaced { .. } => "BLOCK_REPLACED",
            EventPayload::ParentHashMismatch { .. } => "PARENT_HASH_MISMATCH",
            EventPayload::ChainRewind { .. } => "CHAIN_REWIND",
            EventPayload::ChainIdChanged { .. } => "CHAIN_ID_CHANGED",
            EventPayload::GenesisChanged { .. } => "GENESIS_CHANGED",
            EventPayload::HourlyReport { .. } => "HOURLY_REPORT",
            EventPayload::RpcError { .. } => "RPC_ERROR",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub timestamp: String,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    pub fn event_type(&self) -> &'static str {
        self.payload.event_type_name()
    }
}

/// Injected at construction so tests substitute an in-memory sink for
/// production's stdout-plus-`tracing` one (spec §9's testability
/// requirement).
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, payload: EventPayload);
}

/// Production sink: one JSON line per record to stdout (so log shippers get
/// exactly one parseable object per line regardless of the console's
/// `tracing` format), plus a matching `tracing` call so `RUST_LOG`-filtered
/// console output mirrors the stream. `is_alert_worthy()` events are
/// additionally forwarded to the alert dispatcher. The dispatcher is held
/// behind `Arc<dyn AlertSink>` rather than the concrete `AlertDispatcher` so
/// tests can substitute a `CollectingAlertSink` and assert dispatch actually
/// happened, the same injection pattern as `EventSink` itself.
pub struct StdoutEventSink {
    alert: Arc<dyn AlertSink>,
}

impl StdoutEventSink {
    pub fn new(alert: Arc<dyn AlertSink>) -> Self {
        Self { alert }
    }
}

#[async_trait]
impl EventSink for StdoutEventSink {
    async fn emit(&self, payload: EventPayload) {
        let event = Event { timestamp: Utc::now().to_rfc3339(), payload };
        let event_type = event.event_type();
        let alert_worthy = event.payload.is_alert_worthy();

        let line = match serde_json::to_string(&event) {
            Ok(line) => {
                println!("{line}");
                line
            }
            Err(e) => {
                warn!(error = %e, "failed to serialize event");
                String::new()
            }
        };

        if alert_worthy {
            warn!(event_type, payload = %line, "alert-worthy event");
        } else {
            info!(event_type, payload = %line, "event");
        }

        if alert_worthy {
            self.alert.dispatch(event_type, event.payload.clone()).await;
        }
    }
}

/// Test-only sink: an in-memory ordered log of every emitted event, so
/// scenario tests can assert exact emission order (spec §8).
#[cfg(any(test, feature = "test-support"))]
pub struct CollectingEventSink {
    events: tokio::sync::Mutex<Vec<Event>>,
}

#[cfg(any(test, feature = "test-support"))]
impl CollectingEventSink {
    pub fn new() -> Self {
        Self { events: tokio::sync::Mutex::new(Vec::new()) }
    }

    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    pub async fn event_types(&self) -> Vec<&'static str> {
        self.events.lock().await.iter().map(|e| e.event_type()).collect()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Default for CollectingEventSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, payload: EventPayload) {
        let event = Event { timestamp: Utc::now().to_rfc3339(), payload };
        self.events.lock().await.push(event);
    }
}
