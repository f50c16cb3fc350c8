//! Histogram helpers

use metrics::histogram;

/// Time spent authenticating, in milliseconds
pub fn auth_duration(mechanism: &'static str, millis: u64) {
    histogram!("mysql_wire_auth_duration_ms", "mechanism" => mechanism).record(millis as f64);
}

/// Time from transport connect to a ready session, in milliseconds
pub fn connect_duration(millis: u64) {
    histogram!("mysql_wire_connect_duration_ms").record(millis as f64);
}

/// Time from sending a statement to its stream terminating, in milliseconds
pub fn statement_duration(protocol: &'static str, millis: u64) {
    histogram!("mysql_wire_statement_duration_ms", "protocol" => protocol).record(millis as f64);
}

/// Rows produced by one statement
pub fn rows_per_statement(rows: u64) {
    histogram!("mysql_wire_rows_per_statement").record(rows as f64);
}
