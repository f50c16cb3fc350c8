//! Session configuration

use super::tls::{HostnameVerifier, SslConfiguration, SslMode, SslPolicy, TlsCustomizer, TlsVersion};
use super::transport::{TcpOptions, TransportKind};
use crate::auth::{CredentialSource, StaticCredential};
use crate::codec::ZeroDateOption;
use crate::extension::{Extension, Extensions};
use crate::{Error, Result};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default MySQL TCP port
pub const DEFAULT_PORT: u16 = 3306;

/// Default capacity of both statement caches
pub const DEFAULT_CACHE_SIZE: usize = 256;

/// Where the session connects to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// TCP host and port
    Tcp {
        /// Host name or address
        host: String,
        /// Port
        port: u16,
    },
    /// Unix domain socket
    Unix {
        /// Socket path
        path: PathBuf,
    },
}

impl Target {
    /// Transport kind for this target
    pub fn kind(&self) -> TransportKind {
        match self {
            Target::Tcp { .. } => TransportKind::Tcp,
            Target::Unix { .. } => TransportKind::Unix,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Target::Unix { path } => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Validated, immutable session parameters
///
/// Built with [`SessionConfiguration::builder`]. Equality and hashing cover
/// every connection-relevant field; the credential source, TLS hooks,
/// explicitly registered extensions and the free-form label are ignored.
#[derive(Clone)]
pub struct SessionConfiguration {
    target: Target,
    user: String,
    credential: Option<Arc<dyn CredentialSource>>,
    database: Option<String>,
    connect_timeout: Option<Duration>,
    socket_timeout: Option<Duration>,
    tcp: TcpOptions,
    ssl: SslConfiguration,
    zero_date: ZeroDateOption,
    query_cache_size: usize,
    prepare_cache_size: usize,
    autodetect_extensions: bool,
    extensions: Extensions,
    server_prepare: bool,
    label: Option<String>,
}

impl SessionConfiguration {
    /// Start building a configuration
    pub fn builder() -> SessionConfigurationBuilder {
        SessionConfigurationBuilder::default()
    }

    /// Connection target
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Transport kind implied by the target
    pub fn transport_kind(&self) -> TransportKind {
        self.target.kind()
    }

    /// Principal name
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Credential source, if any
    pub fn credential_source(&self) -> Option<&Arc<dyn CredentialSource>> {
        self.credential.as_ref()
    }

    /// Initial database
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Bound on connect plus negotiation
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    /// Bound on each socket read or write once the session is ready
    pub fn socket_timeout(&self) -> Option<Duration> {
        self.socket_timeout
    }

    /// TCP socket options
    pub fn tcp_options(&self) -> TcpOptions {
        self.tcp
    }

    /// SSL sub-configuration
    pub fn ssl(&self) -> &SslConfiguration {
        &self.ssl
    }

    /// Zero-date handling
    pub fn zero_date(&self) -> ZeroDateOption {
        self.zero_date
    }

    /// Query cache capacity (0 disables)
    pub fn query_cache_size(&self) -> usize {
        self.query_cache_size
    }

    /// Prepared statement cache capacity (0 disables)
    pub fn prepare_cache_size(&self) -> usize {
        self.prepare_cache_size
    }

    /// Whether built-in extensions are discovered
    pub fn autodetect_extensions(&self) -> bool {
        self.autodetect_extensions
    }

    /// Effective extension set: discovered ones first, then registered ones
    pub fn extensions(&self) -> Extensions {
        let mut out = if self.autodetect_extensions {
            Extensions::discover()
        } else {
            Extensions::empty()
        };
        out.extend(&self.extensions);
        out
    }

    /// Whether preparable statements go through COM_STMT_PREPARE
    pub fn server_prepare(&self) -> bool {
        self.server_prepare
    }

    /// Free-form label
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Validate the SSL sub-configuration for this target
    pub fn ssl_policy(&self) -> Result<SslPolicy> {
        SslPolicy::new(&self.ssl, self.transport_kind())
    }
}

impl PartialEq for SessionConfiguration {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
            && self.user == other.user
            && self.database == other.database
            && self.connect_timeout == other.connect_timeout
            && self.socket_timeout == other.socket_timeout
            && self.tcp == other.tcp
            && self.ssl == other.ssl
            && self.zero_date == other.zero_date
            && self.query_cache_size == other.query_cache_size
            && self.prepare_cache_size == other.prepare_cache_size
            && self.autodetect_extensions == other.autodetect_extensions
            && self.server_prepare == other.server_prepare
    }
}

impl Eq for SessionConfiguration {}

impl Hash for SessionConfiguration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.target.hash(state);
        self.user.hash(state);
        self.database.hash(state);
        self.connect_timeout.hash(state);
        self.socket_timeout.hash(state);
        self.tcp.keepalive.hash(state);
        self.tcp.nodelay.hash(state);
        self.ssl.hash(state);
        self.zero_date.hash(state);
        self.query_cache_size.hash(state);
        self.prepare_cache_size.hash(state);
        self.autodetect_extensions.hash(state);
        self.server_prepare.hash(state);
    }
}

impl fmt::Debug for SessionConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfiguration")
            .field("target", &self.target)
            .field("user", &self.user)
            .field("credential", &self.credential)
            .field("database", &self.database)
            .field("connect_timeout", &self.connect_timeout)
            .field("socket_timeout", &self.socket_timeout)
            .field("tcp", &self.tcp)
            .field("ssl", &self.ssl)
            .field("zero_date", &self.zero_date)
            .field("query_cache_size", &self.query_cache_size)
            .field("prepare_cache_size", &self.prepare_cache_size)
            .field("autodetect_extensions", &self.autodetect_extensions)
            .field("extensions", &self.extensions.names())
            .field("server_prepare", &self.server_prepare)
            .field("label", &self.label)
            .finish()
    }
}

/// Builder for [`SessionConfiguration`]
///
/// Nothing is validated until [`build`](Self::build); a partially configured
/// builder is never observable as a configuration.
///
/// # Examples
///
/// ```
/// use mysql_wire::connection::{SessionConfiguration, SslMode};
/// use std::time::Duration;
///
/// let config = SessionConfiguration::builder()
///     .host("db.internal")
///     .port(3307)
///     .user("app")
///     .password("secret")
///     .ssl_mode(SslMode::Required)
///     .connect_timeout(Duration::from_secs(5))
///     .build()
///     .unwrap();
/// assert_eq!(config.user(), "app");
/// ```
#[derive(Clone, Default)]
pub struct SessionConfigurationBuilder {
    host: Option<String>,
    port: Option<u16>,
    unix_socket: Option<PathBuf>,
    user: Option<String>,
    credential: Option<Arc<dyn CredentialSource>>,
    database: Option<String>,
    connect_timeout: Option<Duration>,
    socket_timeout: Option<Duration>,
    tcp: TcpOptions,
    ssl_mode: Option<SslMode>,
    ssl_ca: Option<PathBuf>,
    ssl_cert: Option<PathBuf>,
    ssl_key: Option<PathBuf>,
    ssl_key_password: Option<String>,
    tls_versions: Option<Vec<TlsVersion>>,
    hostname_verifier: Option<Arc<dyn HostnameVerifier>>,
    customizer: Option<TlsCustomizer>,
    zero_date: ZeroDateOption,
    query_cache_size: Option<usize>,
    prepare_cache_size: Option<usize>,
    autodetect_extensions: Option<bool>,
    extensions: Extensions,
    server_prepare: bool,
    label: Option<String>,
}

impl SessionConfigurationBuilder {
    /// Set the TCP host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the TCP port
    ///
    /// Default: 3306
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Connect through a unix domain socket instead of TCP
    ///
    /// # Arguments
    ///
    /// * `path` - Socket path; mutually exclusive with [`host`](Self::host)
    pub fn unix_socket(mut self, path: impl AsRef<Path>) -> Self {
        self.unix_socket = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the principal name (required)
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Use a fixed password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.credential = Some(Arc::new(StaticCredential::new(password.into())));
        self
    }

    /// Resolve the password through `source` during negotiation
    ///
    /// The source is awaited exactly once per connection attempt.
    pub fn credential_source(mut self, source: Arc<dyn CredentialSource>) -> Self {
        self.credential = Some(source);
        self
    }

    /// Set the initial database
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Bound connect plus negotiation
    ///
    /// Default: None (no timeout)
    ///
    /// # Arguments
    ///
    /// * `duration` - Timeout covering transport connect, TLS and authentication
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.connect_timeout = Some(duration);
        self
    }

    /// Bound each socket read or write once the session is ready
    ///
    /// Default: None (no timeout)
    pub fn socket_timeout(mut self, duration: Duration) -> Self {
        self.socket_timeout = Some(duration);
        self
    }

    /// Enable SO_KEEPALIVE
    pub fn tcp_keepalive(mut self, enabled: bool) -> Self {
        self.tcp.keepalive = enabled;
        self
    }

    /// Enable TCP_NODELAY
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp.nodelay = enabled;
        self
    }

    /// Set the SSL mode
    ///
    /// Default: `Preferred` over TCP, `Disabled` over a unix socket
    pub fn ssl_mode(mut self, mode: SslMode) -> Self {
        self.ssl_mode = Some(mode);
        self
    }

    /// CA certificate file (PEM)
    pub fn ssl_ca(mut self, path: impl AsRef<Path>) -> Self {
        self.ssl_ca = Some(path.as_ref().to_path_buf());
        self
    }

    /// Client certificate file (PEM)
    pub fn ssl_cert(mut self, path: impl AsRef<Path>) -> Self {
        self.ssl_cert = Some(path.as_ref().to_path_buf());
        self
    }

    /// Client key file (PEM)
    pub fn ssl_key(mut self, path: impl AsRef<Path>) -> Self {
        self.ssl_key = Some(path.as_ref().to_path_buf());
        self
    }

    /// Passphrase of the client key
    pub fn ssl_key_password(mut self, password: impl Into<String>) -> Self {
        self.ssl_key_password = Some(password.into());
        self
    }

    /// Accepted TLS versions
    ///
    /// Default: TLSv1.2 and TLSv1.3
    pub fn tls_versions(mut self, versions: impl IntoIterator<Item = TlsVersion>) -> Self {
        self.tls_versions = Some(versions.into_iter().collect());
        self
    }

    /// Replace the hostname check used by `VerifyIdentity`
    pub fn ssl_hostname_verifier(mut self, verifier: Arc<dyn HostnameVerifier>) -> Self {
        self.hostname_verifier = Some(verifier);
        self
    }

    /// Rewrite the rustls client config before each TLS handshake
    pub fn ssl_customizer(mut self, customizer: TlsCustomizer) -> Self {
        self.customizer = Some(customizer);
        self
    }

    /// Zero-date handling
    ///
    /// Default: [`ZeroDateOption::UseNull`]
    pub fn zero_date(mut self, option: ZeroDateOption) -> Self {
        self.zero_date = option;
        self
    }

    /// Query cache capacity; 0 disables the cache
    ///
    /// Default: 256
    pub fn query_cache_size(mut self, size: usize) -> Self {
        self.query_cache_size = Some(size);
        self
    }

    /// Prepared statement cache capacity; 0 disables the cache
    ///
    /// Default: 256
    pub fn prepare_cache_size(mut self, size: usize) -> Self {
        self.prepare_cache_size = Some(size);
        self
    }

    /// Discover built-in extensions
    ///
    /// Default: true
    pub fn autodetect_extensions(mut self, enabled: bool) -> Self {
        self.autodetect_extensions = Some(enabled);
        self
    }

    /// Register an extension explicitly
    pub fn extension(mut self, extension: Arc<dyn Extension>) -> Self {
        self.extensions.register(extension);
        self
    }

    /// Use COM_STMT_PREPARE for preparable statements
    ///
    /// Default: false (text protocol)
    pub fn server_prepare(mut self, enabled: bool) -> Self {
        self.server_prepare = enabled;
        self
    }

    /// Free-form label, ignored by equality
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Validate and build
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if:
    /// - neither or both of host and unix socket are set
    /// - the user is missing or empty
    /// - the SSL settings are invalid for the target (see [`SslPolicy::new`])
    pub fn build(self) -> Result<SessionConfiguration> {
        let target = match (self.host, self.unix_socket) {
            (Some(_), Some(_)) => {
                return Err(Error::Config(
                    "host and unix socket are mutually exclusive".into(),
                ))
            }
            (None, None) => {
                return Err(Error::Config("either host or unix socket is required".into()))
            }
            (Some(host), None) => {
                if host.is_empty() {
                    return Err(Error::Config("host must not be empty".into()));
                }
                Target::Tcp {
                    host,
                    port: self.port.unwrap_or(DEFAULT_PORT),
                }
            }
            (None, Some(path)) => {
                if self.port.is_some() {
                    return Err(Error::Config(
                        "port cannot be combined with a unix socket".into(),
                    ));
                }
                Target::Unix { path }
            }
        };

        let user = match self.user {
            Some(user) if !user.is_empty() => user,
            _ => return Err(Error::Config("user is required".into())),
        };

        let mode = self.ssl_mode.unwrap_or(match target.kind() {
            TransportKind::Tcp => SslMode::Preferred,
            TransportKind::Unix => SslMode::Disabled,
        });
        let mut ssl = SslConfiguration::new(mode);
        ssl.ca = self.ssl_ca;
        ssl.cert = self.ssl_cert;
        ssl.key = self.ssl_key;
        ssl.key_password = self.ssl_key_password;
        if let Some(versions) = self.tls_versions {
            ssl.tls_versions = versions;
        }
        ssl.hostname_verifier = self.hostname_verifier;
        ssl.customizer = self.customizer;
        SslPolicy::new(&ssl, target.kind())?;

        Ok(SessionConfiguration {
            target,
            user,
            credential: self.credential,
            database: self.database.filter(|d| !d.is_empty()),
            connect_timeout: self.connect_timeout,
            socket_timeout: self.socket_timeout,
            tcp: self.tcp,
            ssl,
            zero_date: self.zero_date,
            query_cache_size: self.query_cache_size.unwrap_or(DEFAULT_CACHE_SIZE),
            prepare_cache_size: self.prepare_cache_size.unwrap_or(DEFAULT_CACHE_SIZE),
            autodetect_extensions: self.autodetect_extensions.unwrap_or(true),
            extensions: self.extensions,
            server_prepare: self.server_prepare,
            label: self.label,
        })
    }
}

impl fmt::Debug for SessionConfigurationBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfigurationBuilder")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("unix_socket", &self.unix_socket)
            .field("user", &self.user)
            .field("database", &self.database)
            .field("ssl_mode", &self.ssl_mode)
            .finish_non_exhaustive()
    }
}
