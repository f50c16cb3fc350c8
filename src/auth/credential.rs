//! Credential supply

use crate::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use zeroize::Zeroizing;

/// Authentication secret
///
/// The backing buffer is wiped on drop. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Zeroizing<String>);

impl Credential {
    /// Wrap a secret
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Zeroizing::new(secret.into()))
    }

    /// Empty secret (user without password)
    pub fn empty() -> Self {
        Self::new(String::new())
    }

    /// Secret value
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the secret is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl From<&str> for Credential {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Credential {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Asynchronous, single-value provider of the authentication secret
///
/// Invoked once per negotiation, after the greeting (and TLS upgrade, if any)
/// and before the authentication response is computed. A failure aborts
/// authentication with that same error.
pub trait CredentialSource: Send + Sync + fmt::Debug {
    /// Resolve the secret
    fn credential(&self) -> BoxFuture<'_, Result<Credential>>;
}

/// Credential known up front
#[derive(Clone, Debug)]
pub struct StaticCredential(Credential);

impl StaticCredential {
    /// Wrap a fixed secret
    pub fn new(secret: impl Into<Credential>) -> Self {
        Self(secret.into())
    }
}

impl CredentialSource for StaticCredential {
    fn credential(&self) -> BoxFuture<'_, Result<Credential>> {
        futures::future::ready(Ok(self.0.clone())).boxed()
    }
}

/// Credential produced by an async closure
///
/// Built with [`credential_fn`].
pub struct FnCredentialSource<F> {
    f: F,
}

impl<F> fmt::Debug for FnCredentialSource<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCredentialSource").finish_non_exhaustive()
    }
}

impl<F, Fut> CredentialSource for FnCredentialSource<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Credential>> + Send + 'static,
{
    fn credential(&self) -> BoxFuture<'_, Result<Credential>> {
        (self.f)().boxed()
    }
}

/// Build a credential source from an async closure
///
/// # Examples
///
/// ```
/// use mysql_wire::auth::{credential_fn, Credential};
///
/// let source = credential_fn(|| async {
///     // fetch from a secret store
///     Ok::<_, mysql_wire::Error>(Credential::new("rotated-secret"))
/// });
/// # let _ = source;
/// ```
pub fn credential_fn<F, Fut>(f: F) -> FnCredentialSource<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Credential>> + Send + 'static,
{
    FnCredentialSource { f }
}
