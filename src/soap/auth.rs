//! WS-UsernameToken credential verification
//!
//! Every inbound SOAP request is checked against configured per-device or
//! global credentials before dispatch. PasswordDigest is
//! `Base64(SHA1(nonce || created || password))` per the UsernameToken
//! profile; PasswordText is accepted for clients that send it over a trusted
//! network. With no credentials configured, requests pass.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha1::{Digest, Sha1};
use uuid::Uuid;

use crate::error::ServiceError;

use super::envelope::UsernameToken;

/// One username/password pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Username
    pub username: String,
    /// Password (stored in clear; the digest is computed per request)
    pub password: String,
}

impl Credentials {
    /// Create a credentials pair
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Credential configuration for the dispatcher
///
/// Per-device credentials take precedence over the global pair; a device
/// with neither configured accepts unauthenticated requests.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Credentials applied to every device without a per-device entry
    pub global: Option<Credentials>,
    /// Per-device overrides
    pub per_device: HashMap<Uuid, Credentials>,
}

impl AuthConfig {
    /// No credentials; every request passes
    pub fn open() -> Self {
        Self::default()
    }

    /// Set the global credentials
    pub fn global(mut self, credentials: Credentials) -> Self {
        self.global = Some(credentials);
        self
    }

    /// Set credentials for one device
    pub fn device(mut self, device_id: Uuid, credentials: Credentials) -> Self {
        self.per_device.insert(device_id, credentials);
        self
    }

    fn expected(&self, device_id: Uuid) -> Option<&Credentials> {
        self.per_device.get(&device_id).or(self.global.as_ref())
    }

    /// Verify a request's security token for the given device
    ///
    /// Returns `NotAuthorized` on any mismatch; the reason is never
    /// distinguished on the wire.
    pub fn verify(
        &self,
        device_id: Uuid,
        token: Option<&UsernameToken>,
    ) -> Result<(), ServiceError> {
        let expected = match self.expected(device_id) {
            Some(expected) => expected,
            None => return Ok(()),
        };

        let token = token.ok_or(ServiceError::NotAuthorized)?;
        if token.username != expected.username {
            return Err(ServiceError::NotAuthorized);
        }

        let ok = if token.is_digest {
            match (&token.nonce, &token.created) {
                (Some(nonce), Some(created)) => {
                    password_digest(nonce, created, &expected.password)
                        .map(|digest| digest == token.password)
                        .unwrap_or(false)
                }
                _ => false,
            }
        } else {
            token.password == expected.password
        };

        if ok {
            Ok(())
        } else {
            Err(ServiceError::NotAuthorized)
        }
    }
}

/// Compute the UsernameToken password digest for a base64 nonce, created
/// timestamp and clear-text password
pub fn password_digest(nonce_b64: &str, created: &str, password: &str) -> Option<String> {
    let nonce = BASE64.decode(nonce_b64).ok()?;

    let mut hasher = Sha1::new();
    hasher.update(&nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());

    Some(BASE64.encode(hasher.finalize()))
}
