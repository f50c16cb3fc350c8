//! MySQL authentication plugins
//!
//! `mysql_native_password`:
//! ```text
//! SHA1(password) XOR SHA1(salt + SHA1(SHA1(password)))
//! ```
//!
//! `caching_sha2_password` fast path:
//! ```text
//! SHA256(password) XOR SHA256(SHA256(SHA256(password)) + salt)
//! ```
//! Full authentication sends the cleartext password over a secure channel,
//! or RSA-OAEP encrypts it with the server's public key otherwise.

use super::{Credential, CACHING_SHA2_PASSWORD, MYSQL_CLEAR_PASSWORD, MYSQL_NATIVE_PASSWORD, SHA256_PASSWORD};
use crate::metrics::labels;
use crate::protocol::constants::sha2_status;
use crate::{Error, Result};
use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Supported authentication mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPlugin {
    /// mysql_native_password
    Native,
    /// caching_sha2_password
    CachingSha2,
    /// sha256_password
    Sha256,
    /// mysql_clear_password
    Clear,
}

/// What to do after a plugin-specific continuation packet
#[derive(Debug, PartialEq, Eq)]
pub enum AuthStep {
    /// Send this payload and keep reading
    Send(Vec<u8>),
    /// Nothing to send; the final OK or ERR follows
    Wait,
}

impl AuthPlugin {
    /// Resolve a plugin by its wire name
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            MYSQL_NATIVE_PASSWORD => Ok(Self::Native),
            CACHING_SHA2_PASSWORD => Ok(Self::CachingSha2),
            SHA256_PASSWORD => Ok(Self::Sha256),
            MYSQL_CLEAR_PASSWORD => Ok(Self::Clear),
            other => Err(Error::Authentication(format!(
                "unsupported authentication plugin '{}'",
                other
            ))),
        }
    }

    /// Wire name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Native => MYSQL_NATIVE_PASSWORD,
            Self::CachingSha2 => CACHING_SHA2_PASSWORD,
            Self::Sha256 => SHA256_PASSWORD,
            Self::Clear => MYSQL_CLEAR_PASSWORD,
        }
    }

    /// Metrics label
    pub fn metric_label(&self) -> &'static str {
        match self {
            Self::Native => labels::MECHANISM_NATIVE,
            Self::CachingSha2 => labels::MECHANISM_CACHING_SHA2,
            Self::Sha256 => labels::MECHANISM_SHA256,
            Self::Clear => labels::MECHANISM_CLEAR,
        }
    }

    /// First response for this mechanism, sent in the handshake response or
    /// after an auth switch
    ///
    /// `secure` is true over TLS or a unix socket.
    pub fn initial_response(
        &self,
        credential: &Credential,
        salt: &[u8],
        secure: bool,
    ) -> Result<Vec<u8>> {
        let password = credential.expose().as_bytes();
        match self {
            Self::Native => Ok(scramble_native(password, salt)),
            Self::CachingSha2 => Ok(scramble_caching_sha2(password, salt)),
            Self::Sha256 => {
                if password.is_empty() {
                    Ok(vec![0])
                } else if secure {
                    Ok(with_nul(password))
                } else {
                    // ask for the public key
                    Ok(vec![1])
                }
            }
            Self::Clear => {
                if !secure {
                    return Err(Error::Authentication(
                        "mysql_clear_password requires a secure connection".into(),
                    ));
                }
                Ok(with_nul(password))
            }
        }
    }

    /// React to an auth more-data packet (header byte already stripped)
    pub fn on_more_data(
        &self,
        data: &[u8],
        credential: &Credential,
        salt: &[u8],
        secure: bool,
    ) -> Result<AuthStep> {
        let password = credential.expose().as_bytes();
        match self {
            Self::CachingSha2 => match data.first() {
                Some(&sha2_status::FAST_AUTH_SUCCESS) => {
                    tracing::debug!("caching_sha2_password fast auth succeeded");
                    Ok(AuthStep::Wait)
                }
                Some(&sha2_status::PERFORM_FULL_AUTH) => {
                    tracing::debug!(secure, "caching_sha2_password full auth requested");
                    if secure {
                        Ok(AuthStep::Send(with_nul(password)))
                    } else {
                        Ok(AuthStep::Send(vec![sha2_status::REQUEST_PUBLIC_KEY]))
                    }
                }
                _ if looks_like_pem(data) => {
                    Ok(AuthStep::Send(encrypt_password_rsa(password, salt, data)?))
                }
                other => Err(Error::Protocol(format!(
                    "unexpected caching_sha2_password status: {:?}",
                    other
                ))),
            },
            Self::Sha256 if looks_like_pem(data) => {
                Ok(AuthStep::Send(encrypt_password_rsa(password, salt, data)?))
            }
            _ => Err(Error::Protocol(format!(
                "unexpected auth more-data packet for {}",
                self.name()
            ))),
        }
    }
}

fn looks_like_pem(data: &[u8]) -> bool {
    data.starts_with(b"-----BEGIN")
}

fn with_nul(password: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(password.len() + 1);
    out.extend_from_slice(password);
    out.push(0);
    out
}

/// mysql_native_password scramble; empty for an empty password
pub fn scramble_native(password: &[u8], salt: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let salt = &salt[..salt.len().min(20)];

    let stage1: Zeroizing<[u8; 20]> = Zeroizing::new(Sha1::digest(password).into());
    let stage2: [u8; 20] = Sha1::digest(*stage1).into();

    let mut hasher = Sha1::new();
    hasher.update(salt);
    hasher.update(stage2);
    let stage3: [u8; 20] = hasher.finalize().into();

    stage1.iter().zip(stage3.iter()).map(|(a, b)| a ^ b).collect()
}

/// caching_sha2_password scramble; empty for an empty password
pub fn scramble_caching_sha2(password: &[u8], salt: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let salt = if salt.len() == 21 && salt.last() == Some(&0) {
        &salt[..20]
    } else {
        salt
    };

    let hash1: Zeroizing<[u8; 32]> = Zeroizing::new(Sha256::digest(password).into());
    let hash2: [u8; 32] = Sha256::digest(*hash1).into();

    let mut hasher = Sha256::new();
    hasher.update(hash2);
    hasher.update(salt);
    let hash3: [u8; 32] = hasher.finalize().into();

    hash1.iter().zip(hash3.iter()).map(|(a, b)| a ^ b).collect()
}

/// RSA-OAEP encrypt `password + NUL`, XORed with the rotating salt
pub fn encrypt_password_rsa(password: &[u8], salt: &[u8], public_key_pem: &[u8]) -> Result<Vec<u8>> {
    if salt.is_empty() {
        return Err(Error::Authentication("empty salt for RSA encryption".into()));
    }
    let mut plain = Zeroizing::new(with_nul(password));
    for (i, b) in plain.iter_mut().enumerate() {
        *b ^= salt[i % salt.len()];
    }

    let pem = std::str::from_utf8(public_key_pem)
        .map_err(|e| Error::Authentication(format!("server public key is not PEM: {}", e)))?;
    let key = RsaPublicKey::from_public_key_pem(pem.trim_end_matches('\0'))
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem.trim_end_matches('\0')))
        .map_err(|e| Error::Authentication(format!("invalid server public key: {}", e)))?;

    key.encrypt(&mut OsRng, rsa::Oaep::new::<Sha1>(), &plain)
        .map_err(|e| Error::Authentication(format!("RSA encryption failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALT: &[u8; 20] = b"0123456789abcdefghij";

    #[test]
    fn test_plugin_from_name() {
        assert_eq!(
            AuthPlugin::from_name("caching_sha2_password").unwrap(),
            AuthPlugin::CachingSha2
        );
        assert!(matches!(
            AuthPlugin::from_name("dialog"),
            Err(Error::Authentication(_))
        ));
    }

    #[test]
    fn test_empty_password_sends_empty_response() {
        let empty = Credential::empty();
        for plugin in [AuthPlugin::Native, AuthPlugin::CachingSha2] {
            assert!(plugin.initial_response(&empty, SALT, false).unwrap().is_empty());
        }
    }

    #[test]
    fn test_native_scramble_is_deterministic() {
        let a = scramble_native(b"secret", SALT);
        assert_eq!(a.len(), 20);
        assert_eq!(a, scramble_native(b"secret", SALT));
        assert_ne!(a, scramble_native(b"other", SALT));
    }

    #[test]
    fn test_native_scramble_reverses_with_stored_hash() {
        // Server check: SHA1(response XOR SHA1(salt + stored)) == stored
        let stored: [u8; 20] = Sha1::digest(Sha1::digest(b"secret")).into();
        let response = scramble_native(b"secret", SALT);

        let mut hasher = Sha1::new();
        hasher.update(SALT);
        hasher.update(stored);
        let mask: [u8; 20] = hasher.finalize().into();
        let candidate: Vec<u8> = response.iter().zip(mask.iter()).map(|(a, b)| a ^ b).collect();
        let check: [u8; 20] = Sha1::digest(&candidate).into();
        assert_eq!(check, stored);
    }

    #[test]
    fn test_caching_sha2_strips_trailing_nul() {
        let mut salt = SALT.to_vec();
        salt.push(0);
        assert_eq!(
            scramble_caching_sha2(b"secret", &salt),
            scramble_caching_sha2(b"secret", SALT)
        );
        assert_eq!(scramble_caching_sha2(b"secret", SALT).len(), 32);
    }

    #[test]
    fn test_clear_password_requires_secure_channel() {
        let c = Credential::new("pw");
        assert!(AuthPlugin::Clear.initial_response(&c, SALT, false).is_err());
        assert_eq!(
            AuthPlugin::Clear.initial_response(&c, SALT, true).unwrap(),
            b"pw\0".to_vec()
        );
    }

    #[test]
    fn test_caching_sha2_full_auth_paths() {
        let c = Credential::new("pw");
        let plugin = AuthPlugin::CachingSha2;
        assert_eq!(
            plugin.on_more_data(&[0x03], &c, SALT, false).unwrap(),
            AuthStep::Wait
        );
        assert_eq!(
            plugin.on_more_data(&[0x04], &c, SALT, true).unwrap(),
            AuthStep::Send(b"pw\0".to_vec())
        );
        assert_eq!(
            plugin.on_more_data(&[0x04], &c, SALT, false).unwrap(),
            AuthStep::Send(vec![0x02])
        );
    }

    #[test]
    fn test_rsa_rejects_garbage_key() {
        let err = encrypt_password_rsa(b"pw", SALT, b"-----BEGIN PUBLIC KEY-----\nnope\n").unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }
}
