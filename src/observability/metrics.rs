//! Metrics collection and exposition.
//!
//! # Metrics
//! - `sockjs_sessions_opened_total` (counter)
//! - `sockjs_sessions_closed_total` (counter): by reason
//! - `sockjs_sessions_active` (gauge): registry size
//! - `sockjs_frames_sent_total` (counter): by frame kind
//! - `sockjs_exchanges_total` (counter): by transport
//! - `sockjs_streaming_recycled_total` (counter): streaming exchanges ended at the byte limit
//! - `sockjs_send_requests_total` (counter): by outcome

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_session_opened() {
    counter!("sockjs_sessions_opened_total").increment(1);
}

pub fn record_session_closed(reason: &'static str) {
    counter!("sockjs_sessions_closed_total", "reason" => reason).increment(1);
}

pub fn record_active_sessions(count: usize) {
    gauge!("sockjs_sessions_active").set(count as f64);
}

pub fn record_frame_sent(kind: &'static str) {
    counter!("sockjs_frames_sent_total", "frame" => kind).increment(1);
}

pub fn record_exchange(transport: &'static str) {
    counter!("sockjs_exchanges_total", "transport" => transport).increment(1);
}

pub fn record_streaming_recycled() {
    counter!("sockjs_streaming_recycled_total").increment(1);
}

pub fn record_send(outcome: &'static str) {
    counter!("sockjs_send_requests_total", "outcome" => outcome).increment(1);
}
