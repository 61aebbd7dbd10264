//! Per-fleet message cryptography - spec.md §4.1.
//!
//! Keys are derived deterministically from the fleet's live API key so that
//! any hub node and the agent SDK arrive at identical keys without a
//! round-trip:
//!
//! ```text
//! fleet_secret   = HMAC-SHA256(api_key, "ringforge:fleet:"  || fleet_id)
//! signing_key    = HMAC-SHA256(fleet_secret, "ringforge:sign")
//! encryption_key = HMAC-SHA256(fleet_secret, "ringforge:encrypt")
//! ```

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use ringforge_core::{CryptoError, FleetId};
use serde_json::Value as JsonValue;
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const AAD: &[u8] = b"ringforge-msg";
const FLEET_SALT_PREFIX: &str = "ringforge:fleet:";
const SIGN_SALT: &str = "ringforge:sign";
const ENCRYPT_SALT: &str = "ringforge:encrypt";

/// Derived, per-fleet cryptographic material. Never logged or displayed.
#[derive(Clone)]
pub struct FleetKeys {
    signing_key: [u8; 32],
    encryption_key: [u8; 32],
}

impl std::fmt::Debug for FleetKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FleetKeys(REDACTED)")
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    let out = mac.finalize().into_bytes();
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&out);
    buf
}

impl FleetKeys {
    /// Derive fresh keys for `fleet_id` from the fleet's live API key secret.
    pub fn derive(live_api_key: &str, fleet_id: &FleetId) -> Self {
        let fleet_salt = format!("{FLEET_SALT_PREFIX}{fleet_id}");
        let fleet_secret = hmac_sha256(live_api_key.as_bytes(), fleet_salt.as_bytes());
        let signing_key = hmac_sha256(&fleet_secret, SIGN_SALT.as_bytes());
        let encryption_key = hmac_sha256(&fleet_secret, ENCRYPT_SALT.as_bytes());
        Self { signing_key, encryption_key }
    }
}

/// Signed-then-encrypted wire envelope body, per spec.md §4.1's "Seal".
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct SignedBody {
    body: JsonValue,
    sig: String,
}

/// Process-local cache of derived fleet keys, keyed by fleet id. Eviction is
/// unbounded within a process since the number of fleets is small - spec.md
/// §4.1.
#[derive(Clone, Default)]
pub struct FleetKeyCache {
    keys: Arc<DashMap<FleetId, Arc<FleetKeys>>>,
}

/// Looks up the current live API key secret for a fleet. Implemented by the
/// caller (backed by whatever store holds `ApiKey` rows); kept abstract here
/// so `ringforge-crypto` has no storage dependency.
pub trait LiveKeyLookup: Send + Sync {
    fn live_key_secret(&self, fleet_id: &FleetId) -> Option<String>;
}

impl FleetKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch (deriving and caching on first use) the keys for a fleet.
    pub fn keys_for(
        &self,
        fleet_id: &FleetId,
        lookup: &dyn LiveKeyLookup,
    ) -> Result<Arc<FleetKeys>, CryptoError> {
        if let Some(existing) = self.keys.get(fleet_id) {
            return Ok(existing.clone());
        }
        let secret = lookup.live_key_secret(fleet_id).ok_or_else(|| CryptoError::NoFleetKeys {
            fleet_id: fleet_id.to_string(),
        })?;
        let derived = Arc::new(FleetKeys::derive(&secret, fleet_id));
        self.keys.insert(fleet_id.clone(), derived.clone());
        Ok(derived)
    }

    pub fn invalidate(&self, fleet_id: &FleetId) {
        self.keys.remove(fleet_id);
    }
}

/// Sign `body` with the fleet's signing key. Returns a base64url (no
/// padding) signature.
pub fn sign(body: &[u8], keys: &FleetKeys) -> String {
    let mac_bytes = hmac_sha256(&keys.signing_key, body);
    URL_SAFE_NO_PAD.encode(mac_bytes)
}

/// Verify `signature` over `body` in constant time.
pub fn verify(body: &[u8], signature: &str, keys: &FleetKeys) -> Result<(), CryptoError> {
    let expected = sign(body, keys);
    let ok: bool = expected.as_bytes().ct_eq(signature.as_bytes()).into();
    if ok {
        Ok(())
    } else {
        Err(CryptoError::InvalidSignature)
    }
}

/// Encrypt `plaintext` with AES-256-GCM, a fresh random 12-byte IV, and the
/// fixed associated data `"ringforge-msg"`. Wire form is three base64url
/// (no padding) segments joined by `:` - `iv:ct:tag`.
pub fn encrypt(plaintext: &[u8], keys: &FleetKeys) -> Result<String, CryptoError> {
    let key = Key::<Aes256Gcm>::from_slice(&keys.encryption_key);
    let cipher = Aes256Gcm::new(key);

    let mut iv_bytes = [0u8; 12];
    rand::Rng::fill(&mut rand::rng(), &mut iv_bytes);
    let nonce = Nonce::from_slice(&iv_bytes);

    let ciphertext_and_tag = cipher
        .encrypt(nonce, Payload { msg: plaintext, aad: AAD })
        .map_err(|e| CryptoError::DecryptionFailed { reason: e.to_string() })?;

    // aes-gcm appends the 16-byte tag to the ciphertext; split them so the
    // wire form can carry them as two distinct segments.
    let tag_start = ciphertext_and_tag.len() - 16;
    let (ct, tag) = ciphertext_and_tag.split_at(tag_start);

    Ok(format!(
        "{}:{}:{}",
        URL_SAFE_NO_PAD.encode(iv_bytes),
        URL_SAFE_NO_PAD.encode(ct),
        URL_SAFE_NO_PAD.encode(tag)
    ))
}

/// Decrypt a wire-form `iv:ct:tag` string produced by [`encrypt`].
pub fn decrypt(wire: &str, keys: &FleetKeys) -> Result<Vec<u8>, CryptoError> {
    let mut parts = wire.split(':');
    let (iv_b64, ct_b64, tag_b64) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(iv), Some(ct), Some(tag), None) => (iv, ct, tag),
        _ => {
            return Err(CryptoError::DecryptionFailed {
                reason: "expected iv:ct:tag wire form".to_string(),
            })
        }
    };

    let iv = URL_SAFE_NO_PAD
        .decode(iv_b64)
        .map_err(|e| CryptoError::DecryptionFailed { reason: e.to_string() })?;
    let ct = URL_SAFE_NO_PAD
        .decode(ct_b64)
        .map_err(|e| CryptoError::DecryptionFailed { reason: e.to_string() })?;
    let tag = URL_SAFE_NO_PAD
        .decode(tag_b64)
        .map_err(|e| CryptoError::DecryptionFailed { reason: e.to_string() })?;

    if iv.len() != 12 {
        return Err(CryptoError::DecryptionFailed { reason: "iv must be 12 bytes".to_string() });
    }

    let key = Key::<Aes256Gcm>::from_slice(&keys.encryption_key);
    let cipher = Aes256Gcm::new(key);
    let nonce = Nonce::from_slice(&iv);

    let mut combined = ct;
    combined.extend_from_slice(&tag);

    cipher
        .decrypt(nonce, Payload { msg: &combined, aad: AAD })
        .map_err(|_| CryptoError::DecryptionFailed { reason: "authentication failed".to_string() })
}

/// Sign-then-encrypt: package `{body, sig}` as JSON, then encrypt the whole
/// thing - spec.md §4.1's "Seal".
pub fn seal(body: &JsonValue, keys: &FleetKeys) -> Result<String, CryptoError> {
    let body_bytes = serde_json::to_vec(body)
        .map_err(|e| CryptoError::DecryptionFailed { reason: e.to_string() })?;
    let sig = sign(&body_bytes, keys);
    let packaged = SignedBody { body: body.clone(), sig };
    let packaged_bytes = serde_json::to_vec(&packaged)
        .map_err(|e| CryptoError::DecryptionFailed { reason: e.to_string() })?;
    encrypt(&packaged_bytes, keys)
}

/// Decrypt, verify, and return the body map - spec.md §4.1's "Unseal".
pub fn unseal(wire: &str, keys: &FleetKeys) -> Result<JsonValue, CryptoError> {
    let plaintext = decrypt(wire, keys)?;
    let packaged: SignedBody = serde_json::from_slice(&plaintext)
        .map_err(|e| CryptoError::DecryptionFailed { reason: e.to_string() })?;
    let body_bytes = serde_json::to_vec(&packaged.body)
        .map_err(|e| CryptoError::DecryptionFailed { reason: e.to_string() })?;
    verify(&body_bytes, &packaged.sig, keys)?;
    Ok(packaged.body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_keys() -> FleetKeys {
        FleetKeys::derive("live_sk_test_secret", &FleetId::new_v4())
    }

    #[test]
    fn sign_verify_roundtrip() {
        let keys = test_keys();
        let body = b"hello ringforge";
        let sig = sign(body, &keys);
        assert!(verify(body, &sig, &keys).is_ok());
    }

    #[test]
    fn verify_rejects_mutated_signature() {
        let keys = test_keys();
        let body = b"hello ringforge";
        let mut sig = sign(body, &keys);
        sig.push('x');
        assert!(verify(body, &sig, &keys).is_err());
    }

    #[test]
    fn seal_unseal_roundtrip() {
        let keys = test_keys();
        let body = serde_json::json!({"kind": "info", "description": "hi"});
        let sealed = seal(&body, &keys).unwrap();
        let opened = unseal(&sealed, &keys).unwrap();
        assert_eq!(opened, body);
    }

    #[test]
    fn unseal_rejects_bit_flipped_ciphertext() {
        let keys = test_keys();
        let body = serde_json::json!({"a": 1});
        let sealed = seal(&body, &keys).unwrap();
        let mut parts: Vec<&str> = sealed.split(':').collect();
        let mut ct = URL_SAFE_NO_PAD.decode(parts[1]).unwrap();
        ct[0] ^= 0x01;
        let mutated_ct = URL_SAFE_NO_PAD.encode(ct);
        parts[1] = &mutated_ct;
        let mutated = parts.join(":");
        assert!(unseal(&mutated, &keys).is_err());
    }

    #[test]
    fn different_fleets_derive_different_keys() {
        let k1 = FleetKeys::derive("same_live_key", &FleetId::new_v4());
        let k2 = FleetKeys::derive("same_live_key", &FleetId::new_v4());
        assert_ne!(k1.signing_key, k2.signing_key);
    }

    proptest! {
        #[test]
        fn roundtrip_holds_for_arbitrary_ascii_bodies(s in "[a-zA-Z0-9 ]{0,200}") {
            let keys = test_keys();
            let body = serde_json::json!({"text": s});
            let sealed = seal(&body, &keys).unwrap();
            let opened = unseal(&sealed, &keys).unwrap();
            prop_assert_eq!(opened, body);
        }
    }
}
