//! # Session Key Schedule
//!
//! HKDF-SHA256 over the X25519 shared secret, salted with the handshake
//! transcript hash. Two keys are expanded from one PRK under distinct
//! labels, plus HMAC-SHA256 key confirmation tags.

use crate::{CryptoError, Hash, SecretKey, SharedSecret};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HKDF info label for the AEAD key.
pub const ENCRYPTION_LABEL: &[u8] = b"wavelink/v1/session/encryption";

/// HKDF info label for the authentication (key confirmation) key.
pub const AUTHENTICATION_LABEL: &[u8] = b"wavelink/v1/session/authentication";

/// Keys owned by one established session.
///
/// Both keys are zeroized when dropped.
#[derive(Debug)]
pub struct SessionKeys {
    encryption: SecretKey,
    authentication: SecretKey,
    expires_at_ms: Option<u64>,
}

impl SessionKeys {
    /// AEAD key.
    pub fn encryption_key(&self) -> &SecretKey {
        &self.encryption
    }

    /// HMAC key for confirmation tags.
    pub fn authentication_key(&self) -> &SecretKey {
        &self.authentication
    }

    /// Attach an expiry instant (Unix millis).
    pub fn with_expiry(mut self, expires_at_ms: u64) -> Self {
        self.expires_at_ms = Some(expires_at_ms);
        self
    }

    /// Expiry instant, if any.
    pub fn expires_at_ms(&self) -> Option<u64> {
        self.expires_at_ms
    }

    /// Fail with [`CryptoError::ExpiredKey`] once `now_ms` passes the expiry.
    pub fn check_fresh(&self, now_ms: u64) -> Result<(), CryptoError> {
        match self.expires_at_ms {
            Some(expired_at_ms) if now_ms >= expired_at_ms => Err(CryptoError::ExpiredKey {
                expired_at_ms,
                now_ms,
            }),
            _ => Ok(()),
        }
    }
}

/// Derive the session key pair.
///
/// # Errors
///
/// - `WeakSharedSecret` if the exchange was non-contributory
/// - `KeyDerivationFailed` if HKDF expansion fails
pub fn derive_session_keys(
    shared_secret: &SharedSecret,
    transcript_hash: &Hash,
) -> Result<SessionKeys, CryptoError> {
    shared_secret.ensure_contributory()?;

    let hk = Hkdf::<Sha256>::new(Some(&transcript_hash[..]), shared_secret.as_bytes());

    let mut encryption = [0u8; 32];
    hk.expand(ENCRYPTION_LABEL, &mut encryption)
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;

    let mut authentication = [0u8; 32];
    hk.expand(AUTHENTICATION_LABEL, &mut authentication)
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;

    Ok(SessionKeys {
        encryption: SecretKey::from_bytes(encryption),
        authentication: SecretKey::from_bytes(authentication),
        expires_at_ms: None,
    })
}

fn confirmation_mac(
    auth_key: &SecretKey,
    label: &[u8],
    transcript_hash: &Hash,
) -> Result<HmacSha256, CryptoError> {
    let mut mac = HmacSha256::new_from_slice(auth_key.as_bytes())
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
    mac.update(label);
    mac.update(transcript_hash);
    Ok(mac)
}

/// HMAC-SHA256 tag over `label || transcript_hash`.
pub fn key_confirmation(
    auth_key: &SecretKey,
    label: &[u8],
    transcript_hash: &Hash,
) -> Result<[u8; 32], CryptoError> {
    let mac = confirmation_mac(auth_key, label, transcript_hash)?;
    Ok(mac.finalize().into_bytes().into())
}

/// Constant-time check of a confirmation tag.
pub fn verify_key_confirmation(
    auth_key: &SecretKey,
    label: &[u8],
    transcript_hash: &Hash,
    tag: &[u8],
) -> bool {
    match confirmation_mac(auth_key, label, transcript_hash) {
        Ok(mac) => mac.verify_slice(tag).is_ok(),
        Err(_) => false,
    }
}
