//! File content cryptor.
//!
//! Per-file random key + IV. Small and generic files are sealed with
//! AES-256-GCM (self-authenticating). Streamable media goes through
//! AES-256-CTR so playback can start before the download finishes and can
//! seek; CTR authenticity is external, so CTR decryption demands a witness:
//! the content address of the ciphertext as recorded in the file's signed
//! metadata record.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::aes::{self, AES_IV_SIZE, AES_TAG_SIZE};
use super::aes_ctr::{self, CtrChunker, AES_CTR_IV_SIZE, CTR_CHUNK_SIZE};
use super::ecies;
use super::utils::{generate_ctr_iv, generate_file_key, generate_iv, sha256};
use crate::error::VaultError;

/// Content encryption mode recorded in the file's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionMode {
    #[serde(rename = "GCM")]
    Gcm,
    #[serde(rename = "CTR")]
    Ctr,
}

impl fmt::Display for EncryptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncryptionMode::Gcm => f.write_str("GCM"),
            EncryptionMode::Ctr => f.write_str("CTR"),
        }
    }
}

impl FromStr for EncryptionMode {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GCM" => Ok(EncryptionMode::Gcm),
            "CTR" => Ok(EncryptionMode::Ctr),
            other => Err(VaultError::UnknownMode(other.to_string())),
        }
    }
}

/// Select the encryption mode from the file's MIME type.
///
/// Audio and video get CTR when streaming is enabled; everything else is
/// sealed whole with GCM.
pub fn select_mode(mime_type: &str, streaming_enabled: bool) -> EncryptionMode {
    if streaming_enabled && (mime_type.starts_with("audio/") || mime_type.starts_with("video/")) {
        EncryptionMode::Ctr
    } else {
        EncryptionMode::Gcm
    }
}

/// Result of encrypting one file: ciphertext plus everything the file's
/// metadata record needs. The plaintext file key never leaves this module;
/// only the ECIES-wrapped copy is exposed.
pub struct EncryptedFile {
    pub ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
    pub wrapped_file_key: Vec<u8>,
    pub original_size: u64,
    pub mode: EncryptionMode,
}

/// Decrypted file content in an owning buffer that is wiped on drop.
///
/// Callers hand this to previews/editors and must release it before logout;
/// dropping it is the release.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PlaintextHandle {
    bytes: Vec<u8>,
}

impl PlaintextHandle {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for PlaintextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaintextHandle")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Witness that the ciphertext about to be CTR-decrypted is the one named by
/// an authenticated metadata record: sha256 of the ciphertext, as recorded
/// under the signed record's content address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentAddressWitness(pub [u8; 32]);

impl ContentAddressWitness {
    pub fn for_ciphertext(ciphertext: &[u8]) -> Self {
        Self(sha256(ciphertext))
    }
}

/// Encrypt file content with a fresh random key, wrapped to the user.
///
/// Key and IV are drawn fresh from the OS CSPRNG per call, so the same
/// plaintext never yields the same ciphertext or address twice. The
/// plaintext key is zeroized before returning.
pub fn encrypt_file(
    plaintext: &[u8],
    user_public_key: &[u8],
    mode: EncryptionMode,
) -> Result<EncryptedFile, VaultError> {
    let mut file_key = generate_file_key();

    let result = match mode {
        EncryptionMode::Gcm => {
            let iv = generate_iv();
            let ciphertext = aes::encrypt_aes_gcm(plaintext, &file_key, &iv)
                .map_err(|_| VaultError::MalformedCiphertext)?;
            (ciphertext, iv.to_vec())
        }
        EncryptionMode::Ctr => {
            let iv = generate_ctr_iv();
            let ciphertext = aes_ctr::encrypt_aes_ctr(plaintext, &file_key, &iv)
                .map_err(|_| VaultError::MalformedCiphertext)?;
            (ciphertext, iv.to_vec())
        }
    };

    let wrapped_file_key = ecies::wrap_key(&file_key, user_public_key);
    file_key.zeroize();
    let wrapped_file_key = wrapped_file_key?;

    Ok(EncryptedFile {
        ciphertext: result.0,
        iv: result.1,
        wrapped_file_key,
        original_size: plaintext.len() as u64,
        mode,
    })
}

/// Decrypt a GCM-mode file. The tag is verified before any plaintext is
/// returned.
pub fn decrypt_file_gcm(
    ciphertext: &[u8],
    iv: &[u8],
    file_key: &[u8; 32],
) -> Result<PlaintextHandle, VaultError> {
    if iv.len() != AES_IV_SIZE || ciphertext.len() < AES_TAG_SIZE {
        return Err(VaultError::MalformedCiphertext);
    }
    let iv_arr: [u8; AES_IV_SIZE] = iv
        .try_into()
        .map_err(|_| VaultError::MalformedCiphertext)?;

    let plaintext = aes::decrypt_aes_gcm(ciphertext, file_key, &iv_arr)
        .map_err(|_| VaultError::AuthFailure)?;
    Ok(PlaintextHandle::new(plaintext))
}

/// Decrypt a CTR-mode file in one buffer.
///
/// Refuses to touch the ciphertext unless `witness` matches its hash: CTR
/// has no tag, so authenticity comes entirely from the content address named
/// by the signed metadata record. Comparison is constant-time.
pub fn decrypt_file_ctr(
    ciphertext: &[u8],
    iv: &[u8],
    file_key: &[u8; 32],
    witness: &ContentAddressWitness,
) -> Result<PlaintextHandle, VaultError> {
    verify_ctr_witness(ciphertext, witness)?;

    let iv_arr: [u8; AES_CTR_IV_SIZE] = iv
        .try_into()
        .map_err(|_| VaultError::MalformedCiphertext)?;
    let plaintext = aes_ctr::decrypt_aes_ctr(ciphertext, file_key, &iv_arr)
        .map_err(|_| VaultError::MalformedCiphertext)?;
    Ok(PlaintextHandle::new(plaintext))
}

/// Chunked CTR plaintext stream for media playback.
///
/// Yields plaintext in 64 KiB chunks, driven by the consumer. Construction
/// verifies the witness over the complete ciphertext first; the iterator
/// itself never fails.
pub struct CtrPlaintextStream<'a> {
    ciphertext: &'a [u8],
    chunker: CtrChunker,
    offset: usize,
}

impl<'a> CtrPlaintextStream<'a> {
    pub fn new(
        ciphertext: &'a [u8],
        iv: &[u8],
        file_key: &[u8; 32],
        witness: &ContentAddressWitness,
    ) -> Result<Self, VaultError> {
        verify_ctr_witness(ciphertext, witness)?;

        let iv_arr: [u8; AES_CTR_IV_SIZE] = iv
            .try_into()
            .map_err(|_| VaultError::MalformedCiphertext)?;
        Ok(Self {
            ciphertext,
            chunker: CtrChunker::new(file_key, &iv_arr),
            offset: 0,
        })
    }
}

impl Iterator for CtrPlaintextStream<'_> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.ciphertext.len() {
            return None;
        }
        let end = (self.offset + CTR_CHUNK_SIZE).min(self.ciphertext.len());
        let mut chunk = self.ciphertext[self.offset..end].to_vec();
        self.chunker.apply(&mut chunk);
        self.offset = end;
        Some(chunk)
    }
}

fn verify_ctr_witness(
    ciphertext: &[u8],
    witness: &ContentAddressWitness,
) -> Result<(), VaultError> {
    let actual = sha256(ciphertext);
    if actual.ct_eq(&witness.0).into() {
        Ok(())
    } else {
        Err(VaultError::AuthFailure)
    }
}
