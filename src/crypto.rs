//! Cryptographic identity and message security
//!
//! A node's identity is an Ed25519 signing keypair; its overlay identifier
//! is derived by Blake3-hashing the verifying key and truncating to the
//! width of the identifier space. Payload security is symmetric: each
//! message is sealed under a fresh ChaCha20-Poly1305 key carried in the
//! message header (the header itself is protected by the transport's
//! session layer, which is outside this crate's contract).
//!
//! All primitives come from audited RustCrypto / dalek crates.

use crate::error::{Error, Result};
use crate::id::Id;
use crate::proto::Message;
use chacha20poly1305::aead::{Aead, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use zeroize::Zeroize;

/// ChaCha20-Poly1305 key width in bytes
const SYM_KEY_LEN: usize = 32;

/// ChaCha20-Poly1305 nonce width in bytes
const SYM_NONCE_LEN: usize = 12;

/// A node's cryptographic identity
///
/// Must be kept secret; share only the [`VerifyingKey`] obtained from
/// [`Identity::verifying_key`].
pub struct Identity {
    signing_key: SigningKey,
}

impl Identity {
    /// Generate a new random identity from the system CSPRNG
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        Self {
            signing_key: SigningKey::generate(&mut csprng),
        }
    }

    /// Deterministic identity from a 32-byte seed
    ///
    /// Intended for tests and reproducible setups.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// The shareable half of the identity
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// The overlay identifier derived from this identity
    pub fn node_id(&self) -> Id {
        node_id_of(&self.verifying_key())
    }

    /// Sign a byte string
    pub fn sign(&self, msg: &[u8]) -> Signature {
        self.signing_key.sign(msg)
    }
}

/// Derive the overlay identifier of a verifying key
///
/// The identifier is the first 16 bytes of the Blake3 hash of the key,
/// interpreted big-endian, so identifiers are uniformly spread over the
/// circle regardless of key structure.
pub fn node_id_of(key: &VerifyingKey) -> Id {
    let digest = blake3::hash(key.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest.as_bytes()[..16]);
    Id::from_be_bytes(bytes)
}

/// Verify a signature over a byte string
pub fn verify(key: &VerifyingKey, msg: &[u8], signature: &Signature) -> bool {
    key.verify(msg, signature).is_ok()
}

impl Message {
    /// Encrypt the payload under a fresh symmetric key
    ///
    /// The key and nonce are stored in the message header for the session
    /// layer to protect in transit.
    pub fn encrypt(&mut self) -> Result<()> {
        if self.encrypted() {
            return Err(Error::Crypto("message is already encrypted".into()));
        }

        let mut key = [0u8; SYM_KEY_LEN];
        let mut nonce = [0u8; SYM_NONCE_LEN];
        OsRng.fill_bytes(&mut key);
        OsRng.fill_bytes(&mut nonce);

        let cipher = ChaCha20Poly1305::new(&key.into());
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), self.data.as_slice())
            .map_err(|e| Error::Crypto(format!("payload encryption failed: {}", e)))?;

        self.data = sealed;
        self.head.key = Some(key.to_vec());
        self.head.iv = Some(nonce.to_vec());
        key.zeroize();
        Ok(())
    }

    /// Decrypt the payload and clear the key material from the header
    pub fn decrypt(&mut self) -> Result<()> {
        let mut key = self
            .head
            .key
            .take()
            .ok_or_else(|| Error::Crypto("message is not encrypted".into()))?;
        let nonce = self
            .head
            .iv
            .take()
            .ok_or_else(|| Error::Crypto("encrypted message is missing its nonce".into()))?;

        if key.len() != SYM_KEY_LEN || nonce.len() != SYM_NONCE_LEN {
            key.zeroize();
            return Err(Error::Crypto("malformed key material in header".into()));
        }

        let cipher = ChaCha20Poly1305::new(
            chacha20poly1305::Key::from_slice(&key),
        );
        let opened = cipher
            .decrypt(Nonce::from_slice(&nonce), self.data.as_slice())
            .map_err(|_| Error::Crypto("payload decryption failed (tag mismatch)".into()))?;

        self.data = opened;
        key.zeroize();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_is_stable() {
        let identity = Identity::from_seed(&[7u8; 32]);
        assert_eq!(identity.node_id(), node_id_of(&identity.verifying_key()));
        assert_eq!(identity.node_id(), Identity::from_seed(&[7u8; 32]).node_id());
    }

    #[test]
    fn distinct_seeds_give_distinct_ids() {
        let a = Identity::from_seed(&[1u8; 32]);
        let b = Identity::from_seed(&[2u8; 32]);
        assert_ne!(a.node_id(), b.node_id());
    }

    #[test]
    fn sign_verify_round_trip() {
        let identity = Identity::generate();
        let signature = identity.sign(b"hello overlay");

        assert!(verify(&identity.verifying_key(), b"hello overlay", &signature));
        assert!(!verify(&identity.verifying_key(), b"tampered", &signature));
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let mut msg = Message::new(b"confidential payload".to_vec());
        let original = msg.data.clone();

        msg.encrypt().unwrap();
        assert_ne!(msg.data, original);
        assert!(msg.head.key.is_some());
        assert!(msg.head.iv.is_some());

        msg.decrypt().unwrap();
        assert_eq!(msg.data, original);
        assert!(msg.head.key.is_none());
        assert!(msg.head.iv.is_none());
    }

    #[test]
    fn encrypt_various_sizes() {
        for len in [0usize, 1, 16, 1024, 64 * 1024] {
            let payload = vec![0x5a; len];
            let mut msg = Message::new(payload.clone());
            msg.encrypt().unwrap();
            msg.decrypt().unwrap();
            assert_eq!(msg.data, payload);
        }
    }

    #[test]
    fn double_encrypt_is_rejected() {
        let mut msg = Message::new(b"x".to_vec());
        msg.encrypt().unwrap();
        assert!(msg.encrypt().is_err());
    }

    #[test]
    fn decrypt_without_key_fails() {
        let mut msg = Message::new(b"x".to_vec());
        assert!(msg.decrypt().is_err());
    }

    #[test]
    fn tampered_payload_fails_decryption() {
        let mut msg = Message::new(b"payload".to_vec());
        msg.encrypt().unwrap();
        msg.data[0] ^= 0xff;
        assert!(msg.decrypt().is_err());
    }
}
