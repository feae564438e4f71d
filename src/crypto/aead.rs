use super::{KEY_LEN, NONCE_LEN, SALT_LEN};
use crate::error::{Result, VaultError};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit},
};
use getrandom::fill;
use zeroize::Zeroizing;

/// Fill buffer with cryptographically secure random bytes
pub(crate) fn secure_random(buf: &mut [u8]) -> Result<()> {
    fill(buf).map_err(|_| VaultError::Random)
}

/// Generate salt
pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    secure_random(&mut salt)?;
    Ok(salt)
}

/// Generate a fresh nonce. Never reuse one under the same key.
pub fn generate_nonce() -> Result<[u8; NONCE_LEN]> {
    let mut nonce = [0u8; NONCE_LEN];
    secure_random(&mut nonce)?;
    Ok(nonce)
}

/// Encrypt plaintext under `key` with a freshly generated nonce.
///
/// Returns the nonce together with the ciphertext (tag appended).
pub fn seal(plaintext: &[u8], key: &[u8; KEY_LEN]) -> Result<([u8; NONCE_LEN], Vec<u8>)> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let nonce = generate_nonce()?;

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| VaultError::Encryption)?;

    tracing::trace!(
        plaintext_len = plaintext.len(),
        ciphertext_len = ciphertext.len(),
        "sealed data"
    );

    Ok((nonce, ciphertext))
}

/// Decrypt and authenticate ciphertext.
///
/// A wrong key and a tampered ciphertext fail the same way.
pub fn open(
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    key: &[u8; KEY_LEN],
) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| VaultError::AuthenticationFailure)?;
    Ok(Zeroizing::new(plaintext))
}
