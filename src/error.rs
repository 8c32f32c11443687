//! Crate-level error taxonomy.
//!
//! Narrow crypto errors (AesError, EciesError, ...) stay local to their
//! modules; everything that crosses a public API boundary is folded into
//! `VaultError` so callers can branch on kind. Only the publish pipeline
//! retries, and only on `NetworkTransient`.

use thiserror::Error;

use crate::crypto::aes::AesError;
use crate::crypto::aes_ctr::AesCtrError;
use crate::crypto::ecies::EciesError;
use crate::crypto::ed25519::Ed25519Error;
use crate::crypto::folder::FolderError;
use crate::crypto::hkdf::HkdfError;
use crate::crypto::ipns::IpnsError;

#[derive(Debug, Error)]
pub enum VaultError {
    /// GCM tag mismatch, Ed25519 verification failure, or ECIES tag mismatch.
    /// Integrity breach: fatal to the operation, never retried.
    #[error("Authentication failure")]
    AuthFailure,

    /// Ciphertext too short, bad prefix, or otherwise structurally invalid.
    #[error("Malformed ciphertext")]
    MalformedCiphertext,

    /// Decrypted metadata failed JSON or schema validation.
    #[error("Malformed metadata")]
    MalformedMetadata,

    /// File record carries an encryption mode this client does not know.
    #[error("Unknown encryption mode: {0}")]
    UnknownMode(String),

    #[error("Parent folder not found: {0}")]
    ParentNotFound(String),

    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Name already exists in folder: {0}")]
    NameCollision(String),

    #[error("Maximum folder depth exceeded")]
    MaxDepthExceeded,

    #[error("Move would make a folder its own ancestor")]
    WouldCreateCycle,

    #[error("Version index out of range: {0}")]
    VersionOutOfRange(usize),

    #[error("Vault quota exceeded")]
    QuotaExceeded,

    /// Relay 5xx or request timeout. The publish pipeline retries these with
    /// backoff; every other caller surfaces them on first failure.
    #[error("Transient network failure: {0}")]
    NetworkTransient(String),

    /// Relay 4xx other than 401/403. Not retried.
    #[error("Network failure: {0}")]
    NetworkFatal(String),

    /// Relay 401/403. The session must be torn down.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Operation cancelled")]
    Cancelled,

    /// Session misuse: an operation that needs live keys ran after logout.
    #[error("No active session")]
    NoSession,
}

impl VaultError {
    /// True for errors the publish pipeline is allowed to retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, VaultError::NetworkTransient(_))
    }
}

impl From<AesError> for VaultError {
    fn from(err: AesError) -> Self {
        match err {
            AesError::DecryptionFailed => VaultError::AuthFailure,
            _ => VaultError::MalformedCiphertext,
        }
    }
}

impl From<AesCtrError> for VaultError {
    fn from(_: AesCtrError) -> Self {
        VaultError::MalformedCiphertext
    }
}

impl From<EciesError> for VaultError {
    fn from(err: EciesError) -> Self {
        match err {
            EciesError::UnwrappingFailed => VaultError::AuthFailure,
            _ => VaultError::MalformedCiphertext,
        }
    }
}

impl From<Ed25519Error> for VaultError {
    fn from(_: Ed25519Error) -> Self {
        VaultError::AuthFailure
    }
}

impl From<FolderError> for VaultError {
    fn from(err: FolderError) -> Self {
        match err {
            FolderError::EncryptionFailed(AesError::DecryptionFailed) => VaultError::AuthFailure,
            FolderError::EncryptionFailed(_) => VaultError::MalformedCiphertext,
            _ => VaultError::MalformedMetadata,
        }
    }
}

impl From<HkdfError> for VaultError {
    fn from(_: HkdfError) -> Self {
        VaultError::MalformedCiphertext
    }
}

impl From<IpnsError> for VaultError {
    fn from(err: IpnsError) -> Self {
        match err {
            IpnsError::VerificationFailed => VaultError::AuthFailure,
            _ => VaultError::MalformedMetadata,
        }
    }
}
