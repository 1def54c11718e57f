use lazy_static::lazy_static;
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, TextEncoder, register_int_counter,
    register_int_counter_vec, register_int_gauge,
};

lazy_static! {
    pub static ref DECISIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "rate_guard_decisions_total",
        "Admission decisions by outcome",
        &["outcome"]
    )
    .expect("rate_guard_decisions_total registers once");
    pub static ref BLOCKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "rate_guard_blocks_total",
        "Blocks triggered, by profile",
        &["profile"]
    )
    .expect("rate_guard_blocks_total registers once");
    pub static ref EVICTIONS_TOTAL: IntCounter = register_int_counter!(
        "rate_guard_evictions_total",
        "Stale tracking records removed by the sweeper"
    )
    .expect("rate_guard_evictions_total registers once");
    pub static ref TRACKED_KEYS: IntGauge = register_int_gauge!(
        "rate_guard_tracked_keys",
        "Current number of tracked keys"
    )
    .expect("rate_guard_tracked_keys registers once");
}

// Render the default registry in the Prometheus text format
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
