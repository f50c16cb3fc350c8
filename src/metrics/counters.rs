//! Counter helpers

use metrics::counter;

/// Authentication attempt with a mechanism
pub fn auth_attempted(mechanism: &'static str) {
    counter!("mysql_wire_auth_attempted_total", "mechanism" => mechanism).increment(1);
}

/// Authentication completed successfully
pub fn auth_successful(mechanism: &'static str) {
    counter!("mysql_wire_auth_successful_total", "mechanism" => mechanism).increment(1);
}

/// Authentication failed
pub fn auth_failed(mechanism: &'static str, reason: &'static str) {
    counter!(
        "mysql_wire_auth_failed_total",
        "mechanism" => mechanism,
        "reason" => reason
    )
    .increment(1);
}

/// TLS upgrade outcome (`established`, `failed`)
pub fn tls_upgrade(outcome: &'static str) {
    counter!("mysql_wire_tls_upgrade_total", "outcome" => outcome).increment(1);
}

/// Statement sent to the server
pub fn statement_executed(protocol: &'static str) {
    counter!("mysql_wire_statements_total", "protocol" => protocol).increment(1);
}

/// Statement terminated with an error
pub fn statement_failed(reason: &'static str) {
    counter!("mysql_wire_statement_errors_total", "reason" => reason).increment(1);
}

/// Cache lookup hit
pub fn cache_hit(cache: &'static str) {
    counter!("mysql_wire_cache_hits_total", "cache" => cache).increment(1);
}

/// Cache lookup miss
pub fn cache_miss(cache: &'static str) {
    counter!("mysql_wire_cache_misses_total", "cache" => cache).increment(1);
}

/// Entry evicted from a cache
pub fn cache_eviction(cache: &'static str) {
    counter!("mysql_wire_cache_evictions_total", "cache" => cache).increment(1);
}

/// Server-side statement deallocation failed (best effort)
pub fn deallocation_failed() {
    counter!("mysql_wire_deallocation_failures_total").increment(1);
}

/// Session closed (`client`, `abandoned`, `failed`)
pub fn session_closed(reason: &'static str) {
    counter!("mysql_wire_sessions_closed_total", "reason" => reason).increment(1);
}
