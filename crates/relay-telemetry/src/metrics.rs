//! Prometheus metrics for the relay gateway.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means a duplicate metric name, which is a fatal configuration error that
//! should crash at startup, not at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_int_counter, register_int_gauge, CounterVec,
    Gauge, IntCounter, IntGauge,
};

/// Exchange stream connection state (1 = open, 0 = not open).
pub static STREAM_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("relay_stream_connected", "Exchange stream state (1=open)").unwrap()
});

/// Total exchange stream reconnection attempts.
pub static STREAM_RECONNECT_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "relay_stream_reconnect_total",
        "Total exchange stream reconnection attempts"
    )
    .unwrap()
});

/// Events decoded from the exchange stream, by channel.
pub static EVENTS_ROUTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "relay_events_routed_total",
        "Events decoded and published on the internal bus",
        &["channel"]
    )
    .unwrap()
});

/// Currently connected dashboard clients.
pub static CLIENTS_CONNECTED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "relay_clients_connected",
        "Currently connected dashboard clients"
    )
    .unwrap()
});

/// Frames delivered to clients by fan-out.
pub static FANOUT_DELIVERED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "relay_fanout_delivered_total",
        "Data frames delivered to subscribed clients"
    )
    .unwrap()
});

/// REST attempts, by outcome (ok / retried / terminal).
pub static REST_ATTEMPTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "relay_rest_attempts_total",
        "REST request attempts by outcome",
        &["outcome"]
    )
    .unwrap()
});
