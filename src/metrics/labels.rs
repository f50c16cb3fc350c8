//! Label values shared by counters and histograms

/// mysql_native_password
pub const MECHANISM_NATIVE: &str = "mysql_native_password";
/// caching_sha2_password
pub const MECHANISM_CACHING_SHA2: &str = "caching_sha2_password";
/// sha256_password
pub const MECHANISM_SHA256: &str = "sha256_password";
/// mysql_clear_password
pub const MECHANISM_CLEAR: &str = "mysql_clear_password";

/// Query cache
pub const CACHE_QUERY: &str = "query";
/// Prepared-statement cache
pub const CACHE_PREPARE: &str = "prepare";

/// Text protocol (COM_QUERY)
pub const PROTOCOL_TEXT: &str = "text";
/// Binary protocol (COM_STMT_EXECUTE)
pub const PROTOCOL_BINARY: &str = "binary";

/// TLS upgrade completed
pub const TLS_ESTABLISHED: &str = "established";
/// TLS upgrade attempted and failed
pub const TLS_FAILED: &str = "failed";

/// Session closed by the caller while ready
pub const CLOSE_CLIENT: &str = "client";
/// Result stream dropped mid-statement
pub const CLOSE_ABANDONED: &str = "abandoned";
/// Session closed after it had failed
pub const CLOSE_FAILED: &str = "failed";
