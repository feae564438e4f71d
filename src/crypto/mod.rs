//! Cryptographic primitives for the vault.
//!
//! Provides PIN-based key derivation, authenticated encryption, and the
//! JSON envelope formats that are persisted next to the ciphertext.

pub mod aead;
pub mod envelope;
pub mod kdf;
pub mod key;

pub use aead::{generate_nonce, generate_salt, open, seal};
pub use envelope::{Envelope, PinVerifier};
pub use kdf::{derive_key, hash_pin, verify_pin_hash};
pub use key::MasterKey;

/// Length of the salt (16 bytes).
pub const SALT_LEN: usize = 16;
/// Length of the nonce (12 bytes for ChaCha20-Poly1305).
pub const NONCE_LEN: usize = 12;
/// Length of the encryption key (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
/// Length of the Poly1305 authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;
/// PBKDF2-HMAC-SHA256 rounds used for both the PIN verifier and the wrap key.
///
/// Fixed for the life of a vault: changing it makes every stored verifier and
/// wrapped master key unreadable.
pub const PBKDF2_ITERATIONS: u32 = 100_000;
