//! HKDF-SHA256 deterministic name-signing keypair derivation.
//!
//! Derives deterministic Ed25519 keypairs from the user's secp256k1 private
//! key using HKDF-SHA256 with domain-separated info strings. Given the same
//! private key, derivation always yields the same mutable name, which is what
//! lets any device of the same user find the vault root and each file's
//! metadata record without a directory service.
//!
//! Derivation path:
//!   secp256k1 privateKey (32 bytes)
//!     -> HKDF-SHA256(salt="CipherBox-v1", info=<domain-specific>)
//!     -> 32-byte Ed25519 seed
//!     -> Ed25519 keypair
//!     -> IPNS name (k51...)
//!
//! Subfolder signing keys are NOT derived this way; they are random per
//! folder and travel ECIES-wrapped inside the parent envelope.

use ed25519_dalek::SigningKey;
use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroize;

use super::ipns;

/// Common HKDF salt for all derivations.
const HKDF_SALT: &[u8] = b"CipherBox-v1";

/// HKDF info for the vault root keypair.
const VAULT_HKDF_INFO: &[u8] = b"cipherbox-vault-ipns-v1";

/// HKDF info for the device registry keypair.
const REGISTRY_HKDF_INFO: &[u8] = b"cipherbox-device-registry-ipns-v1";

/// HKDF info prefix for per-file metadata record keypairs.
const FILE_HKDF_INFO_PREFIX: &str = "cipherbox-file-ipns-v1:";

/// Minimum file ID length accepted for per-file derivation.
const MIN_FILE_ID_LENGTH: usize = 10;

#[derive(Debug, Error)]
pub enum HkdfError {
    #[error("Invalid key size")]
    InvalidKeySize,
    #[error("HKDF derivation failed")]
    DerivationFailed,
    #[error("IPNS name derivation failed")]
    IpnsDerivationFailed,
    #[error("Invalid file ID: must be at least {MIN_FILE_ID_LENGTH} characters")]
    InvalidFileId,
}

/// Derived Ed25519 keypair plus its mutable name.
pub struct DerivedIpnsKeypair {
    pub private_key: Vec<u8>,
    pub public_key: Vec<u8>,
    pub ipns_name: String,
}

/// Plain HKDF-SHA256 extract-and-expand.
///
/// The caller owns zeroization of the returned buffer when it holds key
/// material.
pub fn hkdf_sha256(
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
    length: usize,
) -> Result<Vec<u8>, HkdfError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = vec![0u8; length];
    hk.expand(info, &mut okm)
        .map_err(|_| HkdfError::DerivationFailed)?;
    Ok(okm)
}

/// Internal helper: derive an Ed25519 keypair and IPNS name from HKDF output.
fn derive_ipns_keypair(
    user_private_key: &[u8; 32],
    info: &[u8],
) -> Result<DerivedIpnsKeypair, HkdfError> {
    // 1. HKDF-SHA256: extract + expand
    let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), user_private_key);
    let mut okm = [0u8; 32];
    hk.expand(info, &mut okm)
        .map_err(|_| HkdfError::DerivationFailed)?;

    // 2. Ed25519 keypair from 32-byte seed
    let signing_key = SigningKey::from_bytes(&okm);
    okm.zeroize();
    let verifying_key = signing_key.verifying_key();

    // 3. Mutable name from the public key
    let pk_array: [u8; 32] = verifying_key.to_bytes();
    let ipns_name =
        ipns::derive_ipns_name(&pk_array).map_err(|_| HkdfError::IpnsDerivationFailed)?;

    Ok(DerivedIpnsKeypair {
        private_key: signing_key.to_bytes().to_vec(),
        public_key: verifying_key.to_bytes().to_vec(),
        ipns_name,
    })
}

/// Derive the deterministic keypair for the user's vault root.
pub fn derive_vault_ipns_keypair(
    user_private_key: &[u8; 32],
) -> Result<DerivedIpnsKeypair, HkdfError> {
    derive_ipns_keypair(user_private_key, VAULT_HKDF_INFO)
}

/// Derive the deterministic keypair for a specific file's metadata record.
///
/// Uses info "cipherbox-file-ipns-v1:{fileId}" for per-file domain separation.
pub fn derive_file_ipns_keypair(
    user_private_key: &[u8; 32],
    file_id: &str,
) -> Result<DerivedIpnsKeypair, HkdfError> {
    if file_id.len() < MIN_FILE_ID_LENGTH {
        return Err(HkdfError::InvalidFileId);
    }

    let info = format!("{}{}", FILE_HKDF_INFO_PREFIX, file_id);
    derive_ipns_keypair(user_private_key, info.as_bytes())
}

/// Derive the deterministic keypair for the device registry.
pub fn derive_registry_ipns_keypair(
    user_private_key: &[u8; 32],
) -> Result<DerivedIpnsKeypair, HkdfError> {
    derive_ipns_keypair(user_private_key, REGISTRY_HKDF_INFO)
}
