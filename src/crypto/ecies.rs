//! ECIES key wrapping using secp256k1.
//!
//! Wrap format: ephemeral public key (65) || nonce || ciphertext || tag (16),
//! as produced by the `ecies` crate. Used for every key that travels inside
//! an encrypted envelope and for the device registry blob.

use thiserror::Error;

/// secp256k1 uncompressed public key size in bytes (04 prefix + x + y coordinates).
pub const SECP256K1_PUBLIC_KEY_SIZE: usize = 65;

/// secp256k1 private key size in bytes.
pub const SECP256K1_PRIVATE_KEY_SIZE: usize = 32;

/// ECIES minimum ciphertext size: ephemeral pubkey (65) + auth tag (16).
pub const ECIES_MIN_CIPHERTEXT_SIZE: usize = SECP256K1_PUBLIC_KEY_SIZE + 16;

#[derive(Debug, Error)]
pub enum EciesError {
    #[error("Key wrapping failed")]
    WrappingFailed,
    /// Tag mismatch (wrong recipient key or tampered ciphertext).
    #[error("Key unwrapping failed")]
    UnwrappingFailed,
    /// Truncated or structurally invalid ciphertext.
    #[error("Malformed wrapped key")]
    MalformedCiphertext,
    #[error("Invalid public key size")]
    InvalidPublicKeySize,
    #[error("Invalid public key format")]
    InvalidPublicKeyFormat,
    #[error("Invalid private key size")]
    InvalidPrivateKeySize,
}

/// Wrap (encrypt) data to a recipient's uncompressed secp256k1 public key.
pub fn wrap_key(data: &[u8], recipient_public_key: &[u8]) -> Result<Vec<u8>, EciesError> {
    if recipient_public_key.len() != SECP256K1_PUBLIC_KEY_SIZE {
        return Err(EciesError::InvalidPublicKeySize);
    }

    // Uncompressed public key prefix
    if recipient_public_key[0] != 0x04 {
        return Err(EciesError::InvalidPublicKeyFormat);
    }

    ecies::encrypt(recipient_public_key, data).map_err(|_| EciesError::WrappingFailed)
}

/// Unwrap (decrypt) data using ECIES with secp256k1.
pub fn unwrap_key(wrapped: &[u8], private_key: &[u8]) -> Result<Vec<u8>, EciesError> {
    if private_key.len() != SECP256K1_PRIVATE_KEY_SIZE {
        return Err(EciesError::InvalidPrivateKeySize);
    }

    if wrapped.len() < ECIES_MIN_CIPHERTEXT_SIZE {
        return Err(EciesError::MalformedCiphertext);
    }

    ecies::decrypt(private_key, wrapped).map_err(|_| EciesError::UnwrappingFailed)
}

/// Derive the uncompressed public key (65 bytes, 0x04 prefix) from a 32-byte
/// secp256k1 private key.
pub fn derive_public_key(private_key: &[u8]) -> Result<Vec<u8>, EciesError> {
    let sk = ecies::SecretKey::parse_slice(private_key)
        .map_err(|_| EciesError::InvalidPrivateKeySize)?;
    let pk = ecies::PublicKey::from_secret_key(&sk);
    Ok(pk.serialize().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::utils::generate_random_bytes;

    fn test_keypair() -> (Vec<u8>, Vec<u8>) {
        // Loop until a scalar in range; overwhelmingly the first draw works.
        loop {
            let private = generate_random_bytes(32);
            if let Ok(public) = derive_public_key(&private) {
                return (private, public);
            }
        }
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let (private, public) = test_keypair();
        let key_material = generate_random_bytes(32);

        let wrapped = wrap_key(&key_material, &public).unwrap();
        assert!(wrapped.len() >= ECIES_MIN_CIPHERTEXT_SIZE + 32);

        let unwrapped = unwrap_key(&wrapped, &private).unwrap();
        assert_eq!(unwrapped, key_material);
    }

    #[test]
    fn test_unwrap_with_wrong_key_fails() {
        let (_, public) = test_keypair();
        let (other_private, _) = test_keypair();

        let wrapped = wrap_key(&[0xAAu8; 32], &public).unwrap();
        assert!(matches!(
            unwrap_key(&wrapped, &other_private),
            Err(EciesError::UnwrappingFailed)
        ));
    }

    #[test]
    fn test_wrap_rejects_bad_public_key() {
        assert!(matches!(
            wrap_key(b"data", &[0u8; 33]),
            Err(EciesError::InvalidPublicKeySize)
        ));

        let mut not_uncompressed = vec![0x02u8];
        not_uncompressed.extend_from_slice(&[0u8; 64]);
        assert!(matches!(
            wrap_key(b"data", &not_uncompressed),
            Err(EciesError::InvalidPublicKeyFormat)
        ));
    }

    #[test]
    fn test_unwrap_rejects_truncated_input() {
        let (private, _) = test_keypair();
        assert!(matches!(
            unwrap_key(&[0u8; 40], &private),
            Err(EciesError::MalformedCiphertext)
        ));
    }

    #[test]
    fn test_derive_public_key_shape() {
        let (_, public) = test_keypair();
        assert_eq!(public.len(), 65);
        assert_eq!(public[0], 0x04);
    }

    #[test]
    fn test_derive_public_key_invalid_size() {
        assert!(derive_public_key(&[0u8; 16]).is_err());
    }

    #[test]
    fn test_same_plaintext_wraps_differ() {
        let (_, public) = test_keypair();
        let a = wrap_key(&[0x42u8; 32], &public).unwrap();
        let b = wrap_key(&[0x42u8; 32], &public).unwrap();
        assert_ne!(a, b);
    }
}
