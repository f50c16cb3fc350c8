//! Authentication
//!
//! This module handles:
//! * Asynchronous credential supply ([`CredentialSource`])
//! * MySQL authentication plugins (`mysql_native_password`,
//!   `caching_sha2_password`, `sha256_password`, `mysql_clear_password`)

mod credential;
mod plugin;

pub use credential::{credential_fn, Credential, CredentialSource, FnCredentialSource, StaticCredential};
pub use plugin::{
    encrypt_password_rsa, scramble_caching_sha2, scramble_native, AuthPlugin, AuthStep,
};

/// SHA1-based challenge-response plugin
pub const MYSQL_NATIVE_PASSWORD: &str = "mysql_native_password";
/// SHA256-based plugin with a server-side cache (MySQL 8 default)
pub const CACHING_SHA2_PASSWORD: &str = "caching_sha2_password";
/// SHA256-based plugin requiring TLS or RSA
pub const SHA256_PASSWORD: &str = "sha256_password";
/// Cleartext plugin, only over a secure channel
pub const MYSQL_CLEAR_PASSWORD: &str = "mysql_clear_password";
