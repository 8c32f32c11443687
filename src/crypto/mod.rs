//! Cryptographic primitives and formats for the vault core.
//!
//! Fixed algorithms, no negotiation: AES-256-GCM for metadata and generic
//! content, AES-256-CTR for streamable media, ECIES over secp256k1 for key
//! wrapping, Ed25519 for name records, HKDF-SHA256 for deterministic name
//! keypairs. The only mode field on the wire is the per-file GCM/CTR tag.

pub mod aes;
pub mod aes_ctr;
pub mod ecies;
pub mod ed25519;
pub mod file;
pub mod folder;
pub mod hkdf;
pub mod ipns;
pub mod utils;

// Re-export primary functions for convenience
pub use aes::{decrypt_aes_gcm, encrypt_aes_gcm, seal_aes_gcm, unseal_aes_gcm};
pub use ecies::{derive_public_key, unwrap_key, wrap_key};
pub use ed25519::{generate_ed25519_keypair, get_public_key, sign_ed25519, verify_ed25519};
pub use file::{
    decrypt_file_ctr, decrypt_file_gcm, encrypt_file, select_mode, ContentAddressWitness,
    CtrPlaintextStream, EncryptedFile, EncryptionMode, PlaintextHandle,
};
pub use folder::{
    decrypt_file_metadata, decrypt_folder_metadata, encrypt_file_metadata,
    encrypt_folder_metadata, FileMetadata, FilePointer, FolderChild, FolderEntry, FolderMetadata,
};
pub use hkdf::{derive_file_ipns_keypair, derive_vault_ipns_keypair, hkdf_sha256};
pub use ipns::{marshal_record, sign_record, unmarshal_record, verify_record, NameRecord};
pub use utils::{generate_file_key, generate_iv, generate_random_bytes, sha256};
