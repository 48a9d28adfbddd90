//! Credential sealing (XChaCha20-Poly1305) and the store-backed resolver.
//!
//! # Wire format
//!
//! `encrypted_value` is standard base64 of `nonce (24 bytes) || ciphertext || tag (16 bytes)`.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::XChaCha20Poly1305;
use thiserror::Error;
use tracing::warn;

use nodes::{CredentialError, CredentialResolver, Secret};

use crate::store::{CredentialStore, StoreError};

/// Size of the XChaCha20-Poly1305 nonce in bytes.
pub const NONCE_SIZE: usize = 24;

/// Size of the Poly1305 authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

pub const KEY_SIZE: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("encryption key must be {KEY_SIZE} bytes of base64")]
    InvalidKey,

    #[error("sealed value is not valid base64")]
    InvalidEncoding,

    #[error("sealed value is shorter than nonce and tag")]
    CiphertextTooShort,

    /// Wrong key, corrupted data or tampering.
    #[error("decryption failed")]
    DecryptionFailed,

    #[error("encryption failed")]
    EncryptionFailed,
}

/// 256-bit key used to seal every stored credential.
#[derive(Clone)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| CryptoError::InvalidKey)?;
        let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self(bytes))
    }

    pub fn generate() -> Self {
        let key = XChaCha20Poly1305::generate_key(&mut OsRng);
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&key);
        Self(bytes)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new((&self.0).into())
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Seal `plaintext` into the stored credential format.
pub fn encrypt_secret(key: &EncryptionKey, plaintext: &str) -> Result<String, CryptoError> {
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = key
        .cipher()
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(sealed))
}

/// Open a value produced by [`encrypt_secret`].
pub fn decrypt_secret(key: &EncryptionKey, sealed: &str) -> Result<String, CryptoError> {
    let bytes = STANDARD
        .decode(sealed.trim())
        .map_err(|_| CryptoError::InvalidEncoding)?;
    if bytes.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::CiphertextTooShort);
    }

    let (nonce, ciphertext) = bytes.split_at(NONCE_SIZE);
    let plaintext = key
        .cipher()
        .decrypt(nonce.into(), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
}

/// Resolves credentials from a [`CredentialStore`], decrypting on demand.
pub struct StoreCredentialResolver {
    store: Arc<dyn CredentialStore>,
    key: EncryptionKey,
}

impl StoreCredentialResolver {
    pub fn new(store: Arc<dyn CredentialStore>, key: EncryptionKey) -> Self {
        Self { store, key }
    }
}

#[async_trait]
impl CredentialResolver for StoreCredentialResolver {
    async fn resolve(&self, credential_id: &str, user_id: &str) -> Result<Secret, CredentialError> {
        let credential = match self.store.get_credential(credential_id, user_id).await {
            Ok(credential) => credential,
            Err(StoreError::NotFound(_)) => {
                return Err(CredentialError::NotFound(credential_id.to_owned()))
            }
            Err(other) => return Err(CredentialError::Store(other.to_string())),
        };

        let value = decrypt_secret(&self.key, &credential.encrypted_value).map_err(|e| {
            warn!(credential_id, error = %e, "credential could not be decrypted");
            CredentialError::Decryption(credential_id.to_owned())
        })?;
        Ok(Secret::new(credential.kind, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Credential;
    use crate::store::MemoryStore;
    use nodes::CredentialType;

    #[test]
    fn sealed_values_open_with_the_same_key_only() {
        let key = EncryptionKey::generate();
        let sealed = encrypt_secret(&key, "sk-live-abc").unwrap();

        assert!(!sealed.contains("sk-live-abc"));
        assert_eq!(decrypt_secret(&key, &sealed).unwrap(), "sk-live-abc");
        assert_eq!(
            decrypt_secret(&EncryptionKey::generate(), &sealed),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn sealing_twice_uses_fresh_nonces() {
        let key = EncryptionKey::generate();
        assert_ne!(encrypt_secret(&key, "x").unwrap(), encrypt_secret(&key, "x").unwrap());
    }

    #[test]
    fn malformed_input_is_rejected() {
        let key = EncryptionKey::generate();
        assert_eq!(decrypt_secret(&key, "%%%"), Err(CryptoError::InvalidEncoding));
        assert_eq!(decrypt_secret(&key, "AAAA"), Err(CryptoError::CiphertextTooShort));
        assert_eq!(EncryptionKey::from_base64("c2hvcnQ=").unwrap_err(), CryptoError::InvalidKey);
    }

    #[test]
    fn key_survives_base64_round_trip() {
        let key = EncryptionKey::generate();
        let restored = EncryptionKey::from_base64(&key.to_base64()).unwrap();
        let sealed = encrypt_secret(&key, "v").unwrap();
        assert_eq!(decrypt_secret(&restored, &sealed).unwrap(), "v");
        assert!(!format!("{key:?}").contains(&key.to_base64()));
    }

    async fn resolver_with(encrypted_value: String, key: EncryptionKey) -> StoreCredentialResolver {
        let store = Arc::new(MemoryStore::new());
        store
            .save_credential(&Credential {
                id: "cred-1".into(),
                user_id: "alice".into(),
                name: "openai".into(),
                kind: CredentialType::Openai,
                encrypted_value,
            })
            .await
            .unwrap();
        StoreCredentialResolver::new(store, key)
    }

    #[tokio::test]
    async fn resolves_and_decrypts_for_the_owner() {
        let key = EncryptionKey::generate();
        let resolver = resolver_with(encrypt_secret(&key, "sk-1").unwrap(), key).await;

        let secret = resolver.resolve("cred-1", "alice").await.unwrap();
        assert_eq!(secret.expose(), "sk-1");
        assert_eq!(secret.kind(), CredentialType::Openai);
    }

    #[tokio::test]
    async fn other_users_get_not_found() {
        let key = EncryptionKey::generate();
        let resolver = resolver_with(encrypt_secret(&key, "sk-1").unwrap(), key).await;

        assert_eq!(
            resolver.resolve("cred-1", "mallory").await.unwrap_err(),
            CredentialError::NotFound("cred-1".into())
        );
    }

    #[tokio::test]
    async fn wrong_key_material_is_a_decryption_error() {
        let sealed = encrypt_secret(&EncryptionKey::generate(), "sk-1").unwrap();
        let resolver = resolver_with(sealed, EncryptionKey::generate()).await;

        assert_eq!(
            resolver.resolve("cred-1", "alice").await.unwrap_err(),
            CredentialError::Decryption("cred-1".into())
        );
    }
}
