//! TLS policy and support for secure connections to MySQL.
//!
//! [`SslPolicy`] validates an [`SslConfiguration`] against the transport kind
//! and, during negotiation, decides whether to request TLS and performs the
//! in-place upgrade after the SSL request has been sent.

use super::transport::{Transport, TransportKind};
use crate::protocol::constants::capabilities;
use crate::{Error, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// SSL mode, matching MySQL's `ssl-mode` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SslMode {
    /// Never encrypt
    Disabled,
    /// Encrypt when the server offers it, otherwise continue in plaintext
    Preferred,
    /// Must encrypt; the certificate is not verified
    Required,
    /// Must encrypt; the chain is verified, the hostname is not
    VerifyCa,
    /// Must encrypt; chain and hostname are verified
    VerifyIdentity,
}

impl SslMode {
    /// Whether TLS must be established
    pub fn requires_tls(&self) -> bool {
        matches!(self, Self::Required | Self::VerifyCa | Self::VerifyIdentity)
    }

    /// Whether this mode attempts TLS at all
    pub fn starts_tls(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Whether this mode verifies the certificate chain
    pub fn requires_verification(&self) -> bool {
        matches!(self, Self::VerifyCa | Self::VerifyIdentity)
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::Preferred => write!(f, "preferred"),
            Self::Required => write!(f, "required"),
            Self::VerifyCa => write!(f, "verify_ca"),
            Self::VerifyIdentity => write!(f, "verify_identity"),
        }
    }
}

impl std::str::FromStr for SslMode {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "disabled" => Ok(Self::Disabled),
            "preferred" => Ok(Self::Preferred),
            "required" => Ok(Self::Required),
            "verify_ca" => Ok(Self::VerifyCa),
            "verify_identity" => Ok(Self::VerifyIdentity),
            _ => Err(Error::Config(format!(
                "invalid ssl_mode '{}': expected disabled, preferred, required, verify_ca, or verify_identity",
                s
            ))),
        }
    }
}

/// TLS protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TlsVersion {
    /// TLS 1.2
    #[serde(rename = "TLSv1.2")]
    Tls12,
    /// TLS 1.3
    #[serde(rename = "TLSv1.3")]
    Tls13,
}

impl TlsVersion {
    fn rustls_version(&self) -> &'static rustls::SupportedProtocolVersion {
        match self {
            Self::Tls12 => &rustls::version::TLS12,
            Self::Tls13 => &rustls::version::TLS13,
        }
    }
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tls12 => write!(f, "TLSv1.2"),
            Self::Tls13 => write!(f, "TLSv1.3"),
        }
    }
}

impl std::str::FromStr for TlsVersion {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tlsv1.2" | "tls1.2" | "1.2" => Ok(Self::Tls12),
            "tlsv1.3" | "tls1.3" | "1.3" => Ok(Self::Tls13),
            "tlsv1" | "tlsv1.1" | "tls1.0" | "tls1.1" => Err(Error::Config(format!(
                "TLS version '{}' is not supported; use TLSv1.2 or TLSv1.3",
                s
            ))),
            _ => Err(Error::Config(format!("invalid TLS version '{}'", s))),
        }
    }
}

/// Replaces the built-in hostname check under [`SslMode::VerifyIdentity`]
///
/// The certificate chain has already been verified when this is called.
pub trait HostnameVerifier: Send + Sync + fmt::Debug {
    /// Accept or reject `hostname` for the presented end-entity certificate
    fn verify(&self, hostname: &str, end_entity: &CertificateDer<'_>) -> bool;
}

/// Hook that may rewrite the rustls client config before the handshake
///
/// An error returned here aborts the upgrade and reaches the caller unchanged.
pub type TlsCustomizer = Arc<dyn Fn(ClientConfig) -> Result<ClientConfig> + Send + Sync>;

/// SSL sub-configuration
#[derive(Clone)]
pub struct SslConfiguration {
    pub(crate) mode: SslMode,
    pub(crate) ca: Option<PathBuf>,
    pub(crate) cert: Option<PathBuf>,
    pub(crate) key: Option<PathBuf>,
    pub(crate) key_password: Option<String>,
    pub(crate) tls_versions: Vec<TlsVersion>,
    pub(crate) hostname_verifier: Option<Arc<dyn HostnameVerifier>>,
    pub(crate) customizer: Option<TlsCustomizer>,
}

impl SslConfiguration {
    /// Configuration with the given mode and no material
    pub fn new(mode: SslMode) -> Self {
        Self {
            mode,
            ca: None,
            cert: None,
            key: None,
            key_password: None,
            tls_versions: vec![TlsVersion::Tls12, TlsVersion::Tls13],
            hostname_verifier: None,
            customizer: None,
        }
    }

    /// SSL mode
    pub fn mode(&self) -> SslMode {
        self.mode
    }

    /// CA certificate file
    pub fn ca(&self) -> Option<&Path> {
        self.ca.as_deref()
    }

    /// Client certificate file
    pub fn cert(&self) -> Option<&Path> {
        self.cert.as_deref()
    }

    /// Client key file
    pub fn key(&self) -> Option<&Path> {
        self.key.as_deref()
    }

    /// Accepted TLS versions
    pub fn tls_versions(&self) -> &[TlsVersion] {
        &self.tls_versions
    }

    /// Whether a hostname verifier override is installed
    pub fn has_hostname_verifier(&self) -> bool {
        self.hostname_verifier.is_some()
    }

    /// Whether a customization hook is installed
    pub fn has_customizer(&self) -> bool {
        self.customizer.is_some()
    }
}

// Hook and verifier do not take part in equality
impl PartialEq for SslConfiguration {
    fn eq(&self, other: &Self) -> bool {
        self.mode == other.mode
            && self.ca == other.ca
            && self.cert == other.cert
            && self.key == other.key
            && self.key_password == other.key_password
            && self.tls_versions == other.tls_versions
    }
}

impl Eq for SslConfiguration {}

impl Hash for SslConfiguration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.mode.hash(state);
        self.ca.hash(state);
        self.cert.hash(state);
        self.key.hash(state);
        self.key_password.hash(state);
        self.tls_versions.hash(state);
    }
}

impl fmt::Debug for SslConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SslConfiguration")
            .field("mode", &self.mode)
            .field("ca", &self.ca)
            .field("cert", &self.cert)
            .field("key", &self.key)
            .field("key_password", &self.key_password.as_ref().map(|_| "***"))
            .field("tls_versions", &self.tls_versions)
            .field("hostname_verifier", &self.hostname_verifier)
            .field("customizer", &self.customizer.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Validated SSL policy for one transport kind
#[derive(Debug, Clone)]
pub struct SslPolicy {
    config: SslConfiguration,
    transport: TransportKind,
}

impl SslPolicy {
    /// Validate `config` for `transport`
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if:
    /// - an encrypting mode is combined with a unix socket
    /// - no TLS version is accepted
    /// - a client certificate is given without a key, or the reverse
    pub fn new(config: &SslConfiguration, transport: TransportKind) -> Result<Self> {
        if transport == TransportKind::Unix && config.mode != SslMode::Disabled {
            return Err(Error::Config(format!(
                "ssl_mode must be disabled over a unix socket (got {})",
                config.mode
            )));
        }
        if config.mode.starts_tls() && config.tls_versions.is_empty() {
            return Err(Error::Config(
                "at least one TLS version must be accepted".into(),
            ));
        }
        if config.cert.is_some() != config.key.is_some() {
            return Err(Error::Config(
                "client certificate and key must be supplied together".into(),
            ));
        }
        Ok(Self {
            config: config.clone(),
            transport,
        })
    }

    /// Configured mode
    pub fn mode(&self) -> SslMode {
        self.config.mode
    }

    /// Transport this policy was validated for
    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    /// Decide whether to send the SSL request, given the greeting's capabilities
    ///
    /// `Preferred` falls back to plaintext when the server lacks `CLIENT_SSL`;
    /// the verifying and required modes fail instead.
    pub fn should_request(&self, server_capabilities: u32) -> Result<bool> {
        let offered = server_capabilities & capabilities::CLIENT_SSL != 0;
        match self.config.mode {
            SslMode::Disabled => Ok(false),
            SslMode::Preferred => {
                if !offered {
                    tracing::debug!("server does not offer TLS, continuing unencrypted");
                }
                Ok(offered)
            }
            mode => {
                if offered {
                    Ok(true)
                } else {
                    Err(Error::Tls(format!(
                        "server does not support TLS (ssl_mode={})",
                        mode
                    )))
                }
            }
        }
    }

    /// Build the rustls client config, then pass it through the customization hook
    pub fn client_config(&self, hostname: &str) -> Result<Arc<ClientConfig>> {
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let versions: Vec<&'static rustls::SupportedProtocolVersion> = self
            .config
            .tls_versions
            .iter()
            .map(TlsVersion::rustls_version)
            .collect();

        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_protocol_versions(&versions)
            .map_err(|e| Error::Tls(format!("unsupported TLS versions: {}", e)))?;

        let builder = match (self.config.mode, &self.config.hostname_verifier) {
            (SslMode::VerifyIdentity, None) => {
                builder.with_root_certificates(self.root_store()?)
            }
            (SslMode::VerifyIdentity, Some(verifier)) => {
                let inner = self.webpki_verifier(&provider)?;
                builder
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(OverrideHostnameVerifier {
                        inner,
                        hostname_verifier: verifier.clone(),
                        hostname: hostname.to_string(),
                    }))
            }
            (SslMode::VerifyCa, _) => {
                let inner = self.webpki_verifier(&provider)?;
                builder
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(ChainOnlyVerifier { inner }))
            }
            _ => builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate { provider })),
        };

        let config = match self.client_identity()? {
            Some((chain, key)) => builder
                .with_client_auth_cert(chain, key)
                .map_err(|e| Error::Config(format!("invalid client certificate or key: {}", e)))?,
            None => builder.with_no_client_auth(),
        };

        let config = match &self.config.customizer {
            Some(hook) => hook(config)?,
            None => config,
        };
        Ok(Arc::new(config))
    }

    /// Upgrade a plain TCP transport in place; the SSL request must already be on the wire
    pub async fn upgrade(&self, transport: Transport, hostname: &str) -> Result<Transport> {
        let client_config = self.client_config(hostname)?;
        let server_name = server_name(hostname)?;
        let transport = transport.upgrade_to_tls(client_config, server_name).await?;
        tracing::info!(mode = %self.config.mode, "TLS connection established");
        Ok(transport)
    }

    fn root_store(&self) -> Result<RootCertStore> {
        match &self.config.ca {
            Some(path) => load_ca_file(path),
            None => {
                let result = rustls_native_certs::load_native_certs();
                let mut store = RootCertStore::empty();
                let (added, _ignored) = store.add_parsable_certificates(result.certs);
                if added == 0 {
                    tracing::debug!("no native root certificates, using bundled roots");
                    store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
                }
                Ok(store)
            }
        }
    }

    fn webpki_verifier(&self, provider: &Arc<CryptoProvider>) -> Result<Arc<WebPkiServerVerifier>> {
        WebPkiServerVerifier::builder_with_provider(Arc::new(self.root_store()?), provider.clone())
            .build()
            .map_err(|e| Error::Config(format!("cannot build certificate verifier: {}", e)))
    }

    fn client_identity(
        &self,
    ) -> Result<Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>> {
        let (cert_path, key_path) = match (&self.config.cert, &self.config.key) {
            (Some(c), Some(k)) => (c, k),
            _ => return Ok(None),
        };

        let chain = read_certificates(cert_path)?;
        if chain.is_empty() {
            return Err(Error::Config(format!(
                "No valid certificates found in '{}'",
                cert_path.display()
            )));
        }

        let key_data = read_file(key_path, "client key")?;
        let key = rustls_pemfile::private_key(&mut BufReader::new(key_data.as_slice()))
            .map_err(|e| {
                Error::Config(format!(
                    "Failed to parse client key '{}': {}",
                    key_path.display(),
                    e
                ))
            })?;
        match key {
            Some(key) => Ok(Some((chain, key))),
            None if self.config.key_password.is_some()
                || contains_encrypted_key(&key_data) =>
            {
                Err(Error::Config(format!(
                    "encrypted private key '{}' is not supported; decrypt it first",
                    key_path.display()
                )))
            }
            None => Err(Error::Config(format!(
                "No private key found in '{}'",
                key_path.display()
            ))),
        }
    }
}

fn contains_encrypted_key(pem: &[u8]) -> bool {
    pem.windows(b"ENCRYPTED".len()).any(|w| w == b"ENCRYPTED")
}

fn read_file(path: &Path, what: &str) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read {} file '{}': {}",
            what,
            path.display(),
            e
        ))
    })
}

fn read_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let data = read_file(path, "certificate")?;
    rustls_pemfile::certs(&mut BufReader::new(data.as_slice()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| {
            Error::Config(format!(
                "Failed to parse certificate from '{}'",
                path.display()
            ))
        })
}

/// Load a CA bundle (PEM) into a root store
fn load_ca_file(path: &Path) -> Result<RootCertStore> {
    let certs = read_certificates(path)?;
    let mut store = RootCertStore::empty();
    let (added, _) = store.add_parsable_certificates(certs);
    if added == 0 {
        return Err(Error::Config(format!(
            "No valid certificates found in '{}'",
            path.display()
        )));
    }
    Ok(store)
}

/// Server name for SNI and certificate checks
///
/// Accepts DNS names (a trailing dot is dropped) and IP addresses.
pub fn server_name(hostname: &str) -> Result<ServerName<'static>> {
    let trimmed = hostname.trim_end_matches('.');
    let trimmed = trimmed
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(trimmed);
    if trimmed.is_empty() || trimmed.len() > 253 {
        return Err(Error::Config(format!(
            "Invalid hostname for TLS: '{}'",
            hostname
        )));
    }
    ServerName::try_from(trimmed.to_string())
        .map_err(|_| Error::Config(format!("Invalid hostname for TLS: '{}'", hostname)))
}

fn is_name_mismatch(err: &CertificateError) -> bool {
    // newer rustls reports the mismatch with context attached
    matches!(err, CertificateError::NotValidForName)
        || format!("{:?}", err).starts_with("NotValidForName")
}

/// `Required`/`Preferred`: any chain is accepted, handshake signatures are still checked
#[derive(Debug)]
struct AcceptAnyCertificate {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// `VerifyCa`: chain verified, hostname mismatch tolerated
#[derive(Debug)]
struct ChainOnlyVerifier {
    inner: Arc<WebPkiServerVerifier>,
}

impl ServerCertVerifier for ChainOnlyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        match self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            Err(rustls::Error::InvalidCertificate(ref e)) if is_name_mismatch(e) => {
                Ok(ServerCertVerified::assertion())
            }
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// `VerifyIdentity` with a user hostname check in place of the built-in one
#[derive(Debug)]
struct OverrideHostnameVerifier {
    inner: Arc<WebPkiServerVerifier>,
    hostname_verifier: Arc<dyn HostnameVerifier>,
    hostname: String,
}

impl ServerCertVerifier for OverrideHostnameVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        match self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            Ok(_) => {}
            Err(rustls::Error::InvalidCertificate(ref e)) if is_name_mismatch(e) => {}
            Err(e) => return Err(e),
        }
        if self.hostname_verifier.verify(&self.hostname, end_entity) {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(rustls::Error::InvalidCertificate(
                CertificateError::NotValidForName,
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}
