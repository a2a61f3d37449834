//! Payload encryption and key material.
//!
//! Encrypted packet bodies use ChaCha20-Poly1305 with a random 12-byte nonce.
//! Session keys and challenge digests are derived with BLAKE2s.

use blake2::{Blake2s256, Digest};
use chacha20poly1305::{
    aead::{Aead, NewAead},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::Rng;

use crate::CryptoError;

/// Session key size in bytes.
pub const KEY_SIZE: usize = 32;

/// AEAD nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// Challenge digest size in bytes.
pub const DIGEST_SIZE: usize = 32;

/// A symmetric session key.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey(pub [u8; KEY_SIZE]);

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionKey({}..)", hex::encode(&self.0[..2]))
    }
}

// ============================================================================
// Encryption Functions
// ============================================================================

/// Encrypt data with the given key.
///
/// Returns (nonce, ciphertext).
pub fn encrypt_data(
    plaintext: &[u8],
    key: &SessionKey,
) -> Result<([u8; NONCE_SIZE], Vec<u8>), CryptoError> {
    let nonce = random_bytes::<NONCE_SIZE>();
    let ciphertext = encrypt_data_with_nonce(plaintext, key, &nonce)?;
    Ok((nonce, ciphertext))
}

/// Encrypt data with a provided nonce.
pub fn encrypt_data_with_nonce(
    plaintext: &[u8],
    key: &SessionKey,
    nonce_bytes: &[u8; NONCE_SIZE],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key.0));
    cipher
        .encrypt(Nonce::from_slice(nonce_bytes), plaintext)
        .map_err(|e| CryptoError::Encrypt(e.to_string()))
}

/// Decrypt data with the given key and nonce.
pub fn decrypt_data(
    ciphertext: &[u8],
    key: &SessionKey,
    nonce_bytes: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if nonce_bytes.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidNonce(nonce_bytes.len()));
    }

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key.0));
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| CryptoError::Decrypt(e.to_string()))
}

// ============================================================================
// Key Derivation
// ============================================================================

/// Derive a session key from a shared secret, the auth mode and both nonces.
pub fn derive_session_key(
    secret: &[u8],
    auth_mode: u8,
    client_nonce: &[u8],
    server_nonce: &[u8],
) -> SessionKey {
    let mut hasher = Blake2s256::new();
    hasher.update(secret);
    hasher.update([auth_mode]);
    hasher.update(client_nonce);
    hasher.update(server_nonce);
    let result = hasher.finalize();

    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&result);
    SessionKey(key)
}

/// Keyed digest proving possession of the session key.
///
/// The side that speaks first puts its own nonce in `first`, so the two
/// directions produce different digests.
pub fn challenge_digest(key: &SessionKey, first: &[u8], second: &[u8]) -> [u8; DIGEST_SIZE] {
    let mut hasher = Blake2s256::new();
    hasher.update(key.0);
    hasher.update(first);
    hasher.update(second);
    let result = hasher.finalize();

    let mut digest = [0u8; DIGEST_SIZE];
    digest.copy_from_slice(&result);
    digest
}

/// Check a peer's digest.
pub fn verify_digest(
    key: &SessionKey,
    first: &[u8],
    second: &[u8],
    digest: &[u8],
) -> Result<(), CryptoError> {
    let expected = challenge_digest(key, first, second);
    let matches = digest.len() == DIGEST_SIZE
        && expected
            .iter()
            .zip(digest)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0;
    if matches {
        Ok(())
    } else {
        Err(CryptoError::DigestMismatch)
    }
}

// ============================================================================
// Random Material
// ============================================================================

/// Fill a fixed-size array from the thread RNG.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill(&mut bytes[..]);
    bytes
}

/// Generate a random session key.
pub fn generate_random_key() -> SessionKey {
    SessionKey(random_bytes())
}
