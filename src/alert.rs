/// Alert dispatcher (spec C3)
///
/// Fire-and-forget delivery to an optional webhook. Grounded on the
/// teacher's outbound-HTTP idiom in `monitor.rs` (`reqwest::Client` +
/// `.json(&serde_json::json!(...))`), repurposed from an inbound RPC call to
/// an outbound POST, and on `main.rs`'s pattern of `tokio::spawn`ing
/// background services — here a single dispatch, not a whole service.
use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use crate::events::EventPayload;

/// Injected into the event emitter so tests substitute an in-memory sink that
/// records whether dispatch actually happened, the same pattern as
/// `EventSink`/`RpcClient`.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn dispatch(&self, event_type: &'static str, payload: EventPayload);
}

#[derive(Clone)]
pub struct AlertDispatcher {
    http: reqwest::Client,
    webhook_url: Option<String>,
}

impl AlertDispatcher {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self { http: reqwest::Client::new(), webhook_url }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl AlertSink for AlertDispatcher {
    /// Returns immediately if no sink is configured. Otherwise spawns a
    /// detached task so the caller (the event emitter) never awaits the HTTP
    /// round-trip — a slow or unreachable webhook must never widen detection
    /// latency.
    async fn dispatch(&self, event_type: &'static str, payload: EventPayload) {
        let Some(url) = self.webhook_url.clone() else { return };

        let severity = if payload.severity_critical() { "CRITICAL" } else { "INFO" };
        let pretty = serde_json::to_string_pretty(&payload).unwrap_or_default();
        let message = format!("[{severity}] {event_type}\n{pretty}");
        let http = self.http.clone();

        tokio::spawn(async move {
            let body = json!({ "content": message, "text": message });
            if let Err(e) = http.post(&url).json(&body).send().await {
                warn!(error = %e, url, "alert dispatch failed");
            }
        });
    }
}

/// Test-only sink: an in-memory ordered log of every dispatched alert, so
/// tests can assert the dispatcher was actually invoked rather than just
/// inspecting the emitted event's fields.
#[cfg(any(test, feature = "test-support"))]
pub struct CollectingAlertSink {
    calls: tokio::sync::Mutex<Vec<(&'static str, EventPayload)>>,
}

#[cfg(any(test, feature = "test-support"))]
impl CollectingAlertSink {
    pub fn new() -> Self {
        Self { calls: tokio::sync::Mutex::new(Vec::new()) }
    }

    pub async fn calls(&self) -> Vec<(&'static str, EventPayload)> {
        self.calls.lock().await.clone()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Default for CollectingAlertSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl AlertSink for CollectingAlertSink {
    async fn dispatch(&self, event_type: &'static str, payload: EventPayload) {
        self.calls.lock().await.push((event_type, payload));
    }
}
