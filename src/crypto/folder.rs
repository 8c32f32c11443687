//! Folder and file metadata envelopes and their encryption.
//!
//! The whole envelope is sealed as a single AES-256-GCM blob with the folder
//! key, so child names are hidden by the envelope itself. Wrapped keys inside
//! the envelope are ECIES ciphertexts against the vault owner's public key:
//! opening an envelope shows the tree shape, but descending further still
//! requires the user's private key.
//!
//! File pointers do not carry the file key or content address; those live in
//! the file's own metadata record so an update rewrites one record, not the
//! parent folder.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroize;

use super::aes::{self, AesError};
use super::file::EncryptionMode;

#[derive(Debug, Error)]
pub enum FolderError {
    #[error("Encryption failed")]
    EncryptionFailed(#[from] AesError),
    #[error("Serialization failed")]
    SerializationFailed,
    #[error("Deserialization failed")]
    DeserializationFailed,
}

/// Created/modified timestamps carried by every envelope (Unix ms).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeTimes {
    pub created: u64,
    pub modified: u64,
}

/// Decrypted folder metadata. Serialized to JSON and sealed as one blob.
///
/// The plaintext JSON is stable for an unchanged children list; only the
/// sealed form varies (fresh IV per encrypt).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderMetadata {
    /// Files and subfolders in this folder.
    pub children: Vec<FolderChild>,
    /// Folder-level timestamps.
    pub metadata: EnvelopeTimes,
}

/// A child entry is either a subfolder or a file pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FolderChild {
    Folder(FolderEntry),
    File(FilePointer),
}

impl FolderChild {
    pub fn id(&self) -> &str {
        match self {
            FolderChild::Folder(f) => &f.id,
            FolderChild::File(f) => &f.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FolderChild::Folder(f) => &f.name,
            FolderChild::File(f) => &f.name,
        }
    }
}

/// Subfolder entry within folder metadata.
///
/// Carries the ECIES-wrapped keys needed to open and republish the subfolder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderEntry {
    /// UUID for internal reference.
    pub id: String,
    /// Folder name (plaintext here; the envelope hides it).
    pub name: String,
    /// Mutable name of the subfolder's metadata record.
    pub ipns_name: String,
    /// Hex-encoded ECIES-wrapped AES-256 folder key.
    pub folder_key_encrypted: String,
    /// Hex-encoded ECIES-wrapped Ed25519 record-signing key.
    pub ipns_private_key_encrypted: String,
    /// Creation timestamp (Unix ms).
    pub created_at: u64,
    /// Last modification timestamp (Unix ms).
    pub modified_at: u64,
}

/// Slim file reference stored in folder metadata.
///
/// Points at the file's own metadata record; key material and content
/// address live there, one indirection away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePointer {
    /// UUID for internal reference.
    pub id: String,
    /// File name (plaintext here; the envelope hides it).
    pub name: String,
    /// Mutable name of the file's own metadata record.
    pub file_meta_ipns_name: String,
    /// Creation timestamp (Unix ms).
    pub created_at: u64,
    /// Last modification timestamp (Unix ms).
    pub modified_at: u64,
}

/// A prior content version of a file, oldest first in `versions[]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileVersion {
    /// Content address of the superseded ciphertext.
    pub cid: String,
    /// Hex-encoded SHA-256 of that ciphertext.
    pub content_sha256: String,
    /// Hex-encoded ECIES-wrapped file key for that ciphertext.
    pub file_key_encrypted: String,
    /// Hex-encoded IV.
    pub file_iv: String,
    /// Encryption mode of that version.
    pub encryption_mode: EncryptionMode,
    /// Original size in bytes.
    pub size: u64,
    /// When this version was superseded (Unix ms).
    pub timestamp: u64,
}

/// Decrypted per-file metadata, stored in the file's own record and sealed
/// with the parent folder's key (NOT the file's own key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    /// Content address of the encrypted file content.
    pub cid: String,
    /// Hex-encoded SHA-256 of the ciphertext. For CTR content this is the
    /// integrity witness: the record is authenticated, so a fetched blob
    /// matching this hash is the blob the owner published.
    pub content_sha256: String,
    /// Hex-encoded ECIES-wrapped AES-256 file key.
    pub file_key_encrypted: String,
    /// Hex-encoded IV used for content encryption.
    pub file_iv: String,
    /// Content encryption mode.
    pub encryption_mode: EncryptionMode,
    /// Original file size in bytes (before encryption).
    pub size: u64,
    /// Original file name.
    pub name: String,
    /// MIME type of the original file.
    pub mime_type: String,
    /// Creation timestamp (Unix ms).
    pub created_at: u64,
    /// Last modification timestamp (Unix ms).
    pub modified_at: u64,
    /// Prior versions, oldest first.
    #[serde(default)]
    pub versions: Vec<FileVersion>,
}

/// Encrypt folder metadata with AES-256-GCM.
///
/// JSON-serializes, then seals with the folder key.
/// Returns the sealed bytes: IV (12) || ciphertext || tag (16).
pub fn encrypt_folder_metadata(
    metadata: &FolderMetadata,
    folder_key: &[u8; 32],
) -> Result<Vec<u8>, FolderError> {
    let mut json = serde_json::to_vec(metadata).map_err(|_| FolderError::SerializationFailed)?;
    let result = aes::seal_aes_gcm(&json, folder_key).map_err(FolderError::EncryptionFailed);
    json.zeroize();
    result
}

/// Decrypt folder metadata from AES-256-GCM sealed bytes.
pub fn decrypt_folder_metadata(
    sealed: &[u8],
    folder_key: &[u8; 32],
) -> Result<FolderMetadata, FolderError> {
    let mut json = aes::unseal_aes_gcm(sealed, folder_key).map_err(FolderError::EncryptionFailed)?;
    let result = serde_json::from_slice(&json).map_err(|e| {
        log::error!("Folder metadata deserialization failed: {}", e);
        FolderError::DeserializationFailed
    });
    json.zeroize();
    result
}

/// Encrypt file metadata with the parent folder's key.
pub fn encrypt_file_metadata(
    metadata: &FileMetadata,
    folder_key: &[u8; 32],
) -> Result<Vec<u8>, FolderError> {
    let mut json = serde_json::to_vec(metadata).map_err(|_| FolderError::SerializationFailed)?;
    let result = aes::seal_aes_gcm(&json, folder_key).map_err(FolderError::EncryptionFailed);
    json.zeroize();
    result
}

/// Decrypt file metadata with the parent folder's key.
pub fn decrypt_file_metadata(
    sealed: &[u8],
    folder_key: &[u8; 32],
) -> Result<FileMetadata, FolderError> {
    let mut json = aes::unseal_aes_gcm(sealed, folder_key).map_err(FolderError::EncryptionFailed)?;
    let result = serde_json::from_slice(&json).map_err(|e| {
        log::error!("File metadata deserialization failed: {}", e);
        FolderError::DeserializationFailed
    });
    json.zeroize();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::utils::generate_file_key;

    fn sample_metadata() -> FolderMetadata {
        FolderMetadata {
            children: vec![
                FolderChild::Folder(FolderEntry {
                    id: "folder-1".to_string(),
                    name: "docs".to_string(),
                    ipns_name: "k51abc".to_string(),
                    folder_key_encrypted: "aabb".to_string(),
                    ipns_private_key_encrypted: "ccdd".to_string(),
                    created_at: 1_700_000_000_000,
                    modified_at: 1_700_000_000_000,
                }),
                FolderChild::File(FilePointer {
                    id: "file-1".to_string(),
                    name: "blob.bin".to_string(),
                    file_meta_ipns_name: "k51def".to_string(),
                    created_at: 1_700_000_000_000,
                    modified_at: 1_700_000_001_000,
                }),
            ],
            metadata: EnvelopeTimes {
                created: 1_700_000_000_000,
                modified: 1_700_000_001_000,
            },
        }
    }

    #[test]
    fn test_folder_metadata_roundtrip() {
        let key = generate_file_key();
        let metadata = sample_metadata();

        let sealed = encrypt_folder_metadata(&metadata, &key).unwrap();
        let opened = decrypt_folder_metadata(&sealed, &key).unwrap();
        assert_eq!(opened, metadata);
    }

    #[test]
    fn test_plaintext_json_is_stable() {
        let metadata = sample_metadata();
        let a = serde_json::to_vec(&metadata).unwrap();
        let b = serde_json::to_vec(&metadata).unwrap();
        assert_eq!(a, b);

        // The sealed form differs per call (fresh IV), the plaintext does not.
        let key = generate_file_key();
        let sealed_a = encrypt_folder_metadata(&metadata, &key).unwrap();
        let sealed_b = encrypt_folder_metadata(&metadata, &key).unwrap();
        assert_ne!(sealed_a, sealed_b);
    }

    #[test]
    fn test_child_serialization_shape() {
        let metadata = sample_metadata();
        let json = serde_json::to_string(&metadata).unwrap();
        assert!(json.contains("\"type\":\"folder\""));
        assert!(json.contains("\"type\":\"file\""));
        assert!(json.contains("\"ipnsName\":\"k51abc\""));
        assert!(json.contains("\"folderKeyEncrypted\":\"aabb\""));
        assert!(json.contains("\"fileMetaIpnsName\":\"k51def\""));
        assert!(json.contains("\"createdAt\""));
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let key = generate_file_key();
        let other = generate_file_key();
        let sealed = encrypt_folder_metadata(&sample_metadata(), &key).unwrap();
        assert!(matches!(
            decrypt_folder_metadata(&sealed, &other),
            Err(FolderError::EncryptionFailed(_))
        ));
    }

    #[test]
    fn test_malformed_metadata_detected() {
        let key = generate_file_key();
        // Sealed blob of something that is not a folder envelope
        let sealed = aes::seal_aes_gcm(b"not json at all", &key).unwrap();
        assert!(matches!(
            decrypt_folder_metadata(&sealed, &key),
            Err(FolderError::DeserializationFailed)
        ));
    }

    #[test]
    fn test_file_metadata_roundtrip_with_versions() {
        let key = generate_file_key();
        let metadata = FileMetadata {
            cid: "bafyabc".to_string(),
            content_sha256: "11".repeat(32),
            file_key_encrypted: "00ff".to_string(),
            file_iv: "0011".to_string(),
            encryption_mode: EncryptionMode::Gcm,
            size: 256,
            name: "blob.bin".to_string(),
            mime_type: "application/octet-stream".to_string(),
            created_at: 1_700_000_000_000,
            modified_at: 1_700_000_002_000,
            versions: vec![FileVersion {
                cid: "bafyold".to_string(),
                content_sha256: "22".repeat(32),
                file_key_encrypted: "ee".to_string(),
                file_iv: "dd".to_string(),
                encryption_mode: EncryptionMode::Ctr,
                size: 128,
                timestamp: 1_700_000_001_000,
            }],
        };

        let sealed = encrypt_file_metadata(&metadata, &key).unwrap();
        let opened = decrypt_file_metadata(&sealed, &key).unwrap();
        assert_eq!(opened, metadata);

        let json = serde_json::to_string(&metadata).unwrap();
        assert!(json.contains("\"encryptionMode\":\"GCM\""));
        assert!(json.contains("\"encryptionMode\":\"CTR\""));
    }

    #[test]
    fn test_versions_default_empty_for_older_records() {
        let key = generate_file_key();
        let json = br#"{"cid":"bafy","contentSha256":"ab","fileKeyEncrypted":"00","fileIv":"11","encryptionMode":"GCM","size":1,"name":"a","mimeType":"text/plain","createdAt":1,"modifiedAt":2}"#;
        let sealed = aes::seal_aes_gcm(json, &key).unwrap();
        let metadata = decrypt_file_metadata(&sealed, &key).unwrap();
        assert!(metadata.versions.is_empty());
    }
}
