use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use super::{KEY_LEN, PBKDF2_ITERATIONS, PinVerifier, generate_salt};
use crate::error::Result;

/// PBKDF2-HMAC-SHA256 into `out`, whose length picks the derived key length.
pub(crate) fn pbkdf2_sha256(secret: &[u8], salt: &[u8], iterations: u32, out: &mut [u8]) {
    pbkdf2_hmac::<Sha256>(secret, salt, iterations, out);
}

/// Derive a 256-bit key from a PIN and salt.
///
/// Always runs [`PBKDF2_ITERATIONS`] rounds so the same PIN and salt give the
/// same key on every run.
pub fn derive_key(secret: &str, salt: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_sha256(secret.as_bytes(), salt, PBKDF2_ITERATIONS, key.as_mut_slice());
    key
}

/// Build a verifier for `pin` under a fresh random salt.
pub fn hash_pin(pin: &str) -> Result<PinVerifier> {
    let salt = generate_salt()?;
    let hash = derive_key(pin, &salt);
    Ok(PinVerifier::new(salt, *hash))
}

/// Re-derive with the stored salt and compare against the stored hash.
pub fn verify_pin_hash(pin: &str, verifier: &PinVerifier) -> bool {
    let derived = derive_key(pin, verifier.salt());
    derived.as_slice().ct_eq(verifier.hash()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kdf_is_deterministic() {
        let salt = [42u8; 16];

        let k1 = derive_key("1234", &salt);
        let k2 = derive_key("1234", &salt);

        assert_eq!(*k1, *k2);
    }

    #[test]
    fn kdf_salt_affects_output() {
        let k1 = derive_key("1234", &[7u8; 16]);
        let k2 = derive_key("1234", &[8u8; 16]);

        assert_ne!(*k1, *k2);
    }

    #[test]
    fn kdf_matches_pbkdf2_sha256_reference() {
        // RFC 7914 section 11, first PBKDF2-HMAC-SHA256 vector.
        let mut out = [0u8; 64];
        pbkdf2_sha256(b"passwd", b"salt", 1, &mut out);

        assert_eq!(
            &out[..8],
            &[0x55, 0xac, 0x04, 0x6e, 0x56, 0xe3, 0x08, 0x9f]
        );
    }

    #[test]
    fn hashing_same_pin_twice_uses_fresh_salt() {
        let v1 = hash_pin("1234").unwrap();
        let v2 = hash_pin("1234").unwrap();

        assert_ne!(v1.salt(), v2.salt());
        assert_ne!(v1.hash(), v2.hash());
    }

    #[test]
    fn verifier_accepts_only_the_hashed_pin() {
        let verifier = hash_pin("1234").unwrap();

        assert!(verify_pin_hash("1234", &verifier));
        assert!(!verify_pin_hash("0000", &verifier));
        assert!(!verify_pin_hash("12345", &verifier));
    }
}
