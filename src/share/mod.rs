//! Share protocol: re-wrap an item's key subtree for a recipient.
//!
//! A share hands a recipient read access to one item and everything under
//! it. The owner walks the subtree breadth-first, unwraps every key with
//! their private key, re-wraps each to the recipient's public key, and
//! uploads the resulting catalog to the relay's share index. Every plaintext
//! key obtained during the walk lives in an owning handle that is wiped as
//! soon as its scope ends.
//!
//! Consumption is strictly read-only: a recipient resolves, fetches, and
//! decrypts through `ReadAuthority::ShareRecipient`, and never publishes.
//! Revocation is a relay index mutation; bytes a recipient already fetched
//! stay readable to them.

use tokio::sync::watch;
use zeroize::Zeroize;

use crate::api::types::{ShareChildKey, ShareCreateRequest, ShareRecord};
use crate::api::RelayStore;
use crate::crypto::file::{ContentAddressWitness, EncryptionMode, PlaintextHandle};
use crate::crypto::folder::{self, FileMetadata, FolderChild, FolderEntry, FilePointer};
use crate::crypto::{self, ecies};
use crate::error::VaultError;
use crate::keys::{FileKey, FolderKey};
use crate::tree::MAX_DEPTH;

/// Item kind strings used on the wire.
pub const ITEM_TYPE_FILE: &str = "file";
pub const ITEM_TYPE_FOLDER: &str = "folder";

/// A share assembled locally, ready for POST /shares.
pub struct PreparedShare {
    pub item_type: String,
    pub ipns_name: String,
    pub item_name: String,
    /// Hex-encoded top-level key wrapped to the recipient: the folder's own
    /// key for a folder share, the parent folder's key for a file share.
    pub encrypted_key: String,
    pub child_keys: Vec<ShareChildKey>,
}

impl PreparedShare {
    pub fn into_request(self, recipient_public_key: &[u8]) -> ShareCreateRequest {
        ShareCreateRequest {
            recipient_public_key: hex::encode(recipient_public_key),
            item_type: self.item_type,
            ipns_name: self.ipns_name,
            item_name: self.item_name,
            encrypted_key: self.encrypted_key,
            child_keys: self.child_keys,
        }
    }
}

/// Who is asking to read, and with what key material.
///
/// Owner reads unwrap the wrapped keys carried inside envelopes with the
/// user's private key. Share-recipient reads ignore those (they are wrapped
/// to the owner) and look the key up in the share's re-wrapped catalog
/// instead. Decryption logic dispatches here once, at the boundary.
pub enum ReadAuthority<'a> {
    Owner { user_private_key: &'a [u8] },
    ShareRecipient {
        recipient_private_key: &'a [u8],
        share: &'a ShareRecord,
    },
}

impl ReadAuthority<'_> {
    /// Top-level key of a share; owner reads have no use for it.
    pub fn top_level_folder_key(&self) -> Result<FolderKey, VaultError> {
        match self {
            ReadAuthority::Owner { .. } => Err(VaultError::NotFound(
                "top-level share key on an owner read".to_string(),
            )),
            ReadAuthority::ShareRecipient {
                recipient_private_key,
                share,
            } => {
                let wrapped = hex::decode(&share.encrypted_key)
                    .map_err(|_| VaultError::MalformedCiphertext)?;
                FolderKey::unwrap_with(&wrapped, recipient_private_key)
            }
        }
    }

    /// Unwrap a folder key for the given item.
    pub fn unwrap_folder_key(
        &self,
        item_id: &str,
        wrapped_from_envelope_hex: &str,
    ) -> Result<FolderKey, VaultError> {
        match self {
            ReadAuthority::Owner { user_private_key } => {
                let wrapped = hex::decode(wrapped_from_envelope_hex)
                    .map_err(|_| VaultError::MalformedCiphertext)?;
                FolderKey::unwrap_with(&wrapped, user_private_key)
            }
            ReadAuthority::ShareRecipient {
                recipient_private_key,
                share,
            } => {
                let wrapped = catalog_lookup(share, item_id)?;
                FolderKey::unwrap_with(&wrapped, recipient_private_key)
            }
        }
    }

    /// Unwrap a file content key for the given item.
    pub fn unwrap_file_key(
        &self,
        item_id: &str,
        wrapped_from_metadata_hex: &str,
    ) -> Result<FileKey, VaultError> {
        match self {
            ReadAuthority::Owner { user_private_key } => {
                let wrapped = hex::decode(wrapped_from_metadata_hex)
                    .map_err(|_| VaultError::MalformedCiphertext)?;
                FileKey::unwrap_with(&wrapped, user_private_key)
            }
            ReadAuthority::ShareRecipient {
                recipient_private_key,
                share,
            } => {
                let wrapped = catalog_lookup(share, item_id)?;
                FileKey::unwrap_with(&wrapped, recipient_private_key)
            }
        }
    }
}

fn catalog_lookup(share: &ShareRecord, item_id: &str) -> Result<Vec<u8>, VaultError> {
    let entry = share
        .child_keys
        .iter()
        .find(|k| k.item_id == item_id)
        .ok_or_else(|| VaultError::NotFound(item_id.to_string()))?;
    hex::decode(&entry.encrypted_key).map_err(|_| VaultError::MalformedCiphertext)
}

/// Share a single file.
///
/// The top-level key is the *parent folder's* key (the file's metadata
/// record is sealed with it); the catalog holds the file key itself.
pub async fn create_file_share<R: RelayStore>(
    relay: &R,
    pointer: &FilePointer,
    parent_folder_key: &FolderKey,
    owner_private_key: &[u8],
    recipient_public_key: &[u8],
) -> Result<PreparedShare, VaultError> {
    let metadata =
        fetch_file_metadata(relay, &pointer.file_meta_ipns_name, parent_folder_key).await?;

    let file_key = {
        let wrapped = hex::decode(&metadata.file_key_encrypted)
            .map_err(|_| VaultError::MalformedCiphertext)?;
        FileKey::unwrap_with(&wrapped, owner_private_key)?
    };
    let rewrapped = file_key.wrap_for_recipient(recipient_public_key)?;
    drop(file_key);

    Ok(PreparedShare {
        item_type: ITEM_TYPE_FILE.to_string(),
        ipns_name: pointer.file_meta_ipns_name.clone(),
        item_name: pointer.name.clone(),
        encrypted_key: hex::encode(parent_folder_key.wrap_for_recipient(recipient_public_key)?),
        child_keys: vec![ShareChildKey {
            item_id: pointer.id.clone(),
            item_type: ITEM_TYPE_FILE.to_string(),
            encrypted_key: hex::encode(rewrapped),
        }],
    })
}

/// Share a folder and its whole subtree.
///
/// Breadth-first walk with an explicit work queue: no recursion, a depth
/// check at enqueue time, and one cancellation check per dequeued folder.
pub async fn create_folder_share<R: RelayStore>(
    relay: &R,
    entry: &FolderEntry,
    owner_private_key: &[u8],
    recipient_public_key: &[u8],
    cancel: &watch::Receiver<bool>,
) -> Result<PreparedShare, VaultError> {
    let top_key = {
        let wrapped = hex::decode(&entry.folder_key_encrypted)
            .map_err(|_| VaultError::MalformedCiphertext)?;
        FolderKey::unwrap_with(&wrapped, owner_private_key)?
    };
    let top_wrapped = top_key.wrap_for_recipient(recipient_public_key)?;

    let mut child_keys = Vec::new();
    let mut queue: std::collections::VecDeque<(String, FolderKey, usize)> =
        std::collections::VecDeque::new();
    queue.push_back((entry.ipns_name.clone(), top_key, 1));

    while let Some((ipns_name, folder_key, depth)) = queue.pop_front() {
        if *cancel.borrow() {
            return Err(VaultError::Cancelled);
        }

        let envelope = fetch_folder_envelope(relay, &ipns_name, &folder_key).await?;

        for child in envelope.children {
            match child {
                FolderChild::File(pointer) => {
                    let metadata =
                        fetch_file_metadata(relay, &pointer.file_meta_ipns_name, &folder_key)
                            .await?;
                    let file_key = {
                        let wrapped = hex::decode(&metadata.file_key_encrypted)
                            .map_err(|_| VaultError::MalformedCiphertext)?;
                        FileKey::unwrap_with(&wrapped, owner_private_key)?
                    };
                    child_keys.push(ShareChildKey {
                        item_id: pointer.id.clone(),
                        item_type: ITEM_TYPE_FILE.to_string(),
                        encrypted_key: hex::encode(
                            file_key.wrap_for_recipient(recipient_public_key)?,
                        ),
                    });
                }
                FolderChild::Folder(sub) => {
                    if depth + 1 > MAX_DEPTH {
                        return Err(VaultError::MaxDepthExceeded);
                    }
                    let sub_key = {
                        let wrapped = hex::decode(&sub.folder_key_encrypted)
                            .map_err(|_| VaultError::MalformedCiphertext)?;
                        FolderKey::unwrap_with(&wrapped, owner_private_key)?
                    };
                    child_keys.push(ShareChildKey {
                        item_id: sub.id.clone(),
                        item_type: ITEM_TYPE_FOLDER.to_string(),
                        encrypted_key: hex::encode(
                            sub_key.wrap_for_recipient(recipient_public_key)?,
                        ),
                    });
                    queue.push_back((sub.ipns_name.clone(), sub_key, depth + 1));
                }
            }
        }
    }

    log::info!(
        "Prepared share of '{}' with {} descendant key(s)",
        entry.name,
        child_keys.len()
    );

    Ok(PreparedShare {
        item_type: ITEM_TYPE_FOLDER.to_string(),
        ipns_name: entry.ipns_name.clone(),
        item_name: entry.name.clone(),
        encrypted_key: hex::encode(top_wrapped),
        child_keys,
    })
}

/// Resolve a mutable name and decrypt the folder envelope behind it.
pub async fn fetch_folder_envelope<R: RelayStore>(
    relay: &R,
    ipns_name: &str,
    folder_key: &FolderKey,
) -> Result<folder::FolderMetadata, VaultError> {
    let resolved = relay
        .resolve(ipns_name)
        .await?
        .ok_or_else(|| VaultError::NotFound(ipns_name.to_string()))?;
    let sealed = relay.fetch(&resolved.cid).await?;
    Ok(folder::decrypt_folder_metadata(&sealed, folder_key.as_bytes())?)
}

/// Resolve a file's record name and decrypt its metadata with the parent
/// folder key.
pub async fn fetch_file_metadata<R: RelayStore>(
    relay: &R,
    meta_ipns_name: &str,
    parent_folder_key: &FolderKey,
) -> Result<FileMetadata, VaultError> {
    let resolved = relay
        .resolve(meta_ipns_name)
        .await?
        .ok_or_else(|| VaultError::NotFound(meta_ipns_name.to_string()))?;
    let sealed = relay.fetch(&resolved.cid).await?;
    Ok(folder::decrypt_file_metadata(&sealed, parent_folder_key.as_bytes())?)
}

/// Fetch and decrypt a file's content given its metadata and unwrapped key.
///
/// GCM content authenticates itself; CTR content is checked against the
/// metadata's recorded ciphertext hash before any plaintext is produced.
pub async fn fetch_and_decrypt_content<R: RelayStore>(
    relay: &R,
    metadata: &FileMetadata,
    file_key: &FileKey,
) -> Result<PlaintextHandle, VaultError> {
    let ciphertext = relay.fetch(&metadata.cid).await?;
    let mut iv = hex::decode(&metadata.file_iv).map_err(|_| VaultError::MalformedCiphertext)?;

    let result = match metadata.encryption_mode {
        EncryptionMode::Gcm => {
            crypto::file::decrypt_file_gcm(&ciphertext, &iv, file_key.as_bytes())
        }
        EncryptionMode::Ctr => {
            let digest: [u8; 32] = hex::decode(&metadata.content_sha256)
                .ok()
                .and_then(|d| d.try_into().ok())
                .ok_or(VaultError::MalformedMetadata)?;
            crypto::file::decrypt_file_ctr(
                &ciphertext,
                &iv,
                file_key.as_bytes(),
                &ContentAddressWitness(digest),
            )
        }
    };
    iv.zeroize();
    result
}

/// Convenience read path used by both owner and recipient: look up the key
/// through the authority, then fetch and decrypt.
pub async fn read_file<R: RelayStore>(
    relay: &R,
    authority: &ReadAuthority<'_>,
    file_id: &str,
    metadata: &FileMetadata,
) -> Result<PlaintextHandle, VaultError> {
    let file_key = authority.unwrap_file_key(file_id, &metadata.file_key_encrypted)?;
    fetch_and_decrypt_content(relay, metadata, &file_key).await
}

/// Re-wrap one symmetric key to a recipient (used when amending a share
/// after new uploads into an already-shared folder).
pub fn rewrap_key_for_recipient(
    wrapped_to_owner_hex: &str,
    owner_private_key: &[u8],
    recipient_public_key: &[u8],
) -> Result<String, VaultError> {
    let wrapped =
        hex::decode(wrapped_to_owner_hex).map_err(|_| VaultError::MalformedCiphertext)?;
    let mut key = ecies::unwrap_key(&wrapped, owner_private_key)?;
    let rewrapped = ecies::wrap_key(&key, recipient_public_key);
    key.zeroize();
    Ok(hex::encode(rewrapped?))
}

#[cfg(test)]
mod tests;
