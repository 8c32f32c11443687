//! Request and response types for the relay API.
//!
//! All structs use camelCase serialization to match the relay's JSON format.
//! Key material travels hex-encoded; signed records travel base64-encoded.

use serde::{Deserialize, Serialize};

/// Response from POST /ipfs/add.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddResponse {
    pub cid: String,
}

/// Request body for POST /vault/unpin.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnpinRequest {
    pub cid: String,
}

/// Response from GET /ipns/resolve.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    /// CID the name currently points to.
    pub cid: String,
    /// Current sequence number of the published record.
    pub sequence_number: u64,
}

/// Request body for POST /ipns/publish.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    /// The mutable name being updated.
    pub ipns_name: String,
    /// Base64-encoded signed name record.
    pub record: String,
    /// CID of the sealed envelope the record points at.
    pub metadata_cid: String,
    /// Record-signing key wrapped to the current TEE epoch key, when the
    /// relay requested enclave republishing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_ipns_private_key: Option<String>,
    /// Epoch of the TEE key used for `encrypted_ipns_private_key`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_epoch: Option<u32>,
}

/// Request body for POST /my-vault/initialize.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultInitRequest {
    /// Hex-encoded uncompressed secp256k1 public key.
    pub public_key: String,
    /// Hex-encoded ECIES-wrapped root folder key.
    pub encrypted_root_folder_key: String,
    /// Hex-encoded ECIES-wrapped root record-signing key.
    pub encrypted_root_ipns_private_key: String,
    /// Mutable name of the vault root.
    pub root_ipns_name: String,
}

/// TEE public keys included in the vault response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeeKeysResponse {
    pub current_epoch: u32,
    pub current_public_key: String,
    pub previous_epoch: Option<u32>,
    pub previous_public_key: Option<String>,
}

/// Response from GET /my-vault.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultResponse {
    pub encrypted_root_folder_key: String,
    pub encrypted_root_ipns_private_key: String,
    pub root_ipns_name: String,
    pub tee_keys: Option<TeeKeysResponse>,
}

/// A re-wrapped descendant key inside a share, indexed by item id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareChildKey {
    /// Id of the descendant file or folder.
    pub item_id: String,
    /// "file" or "folder".
    pub item_type: String,
    /// Hex-encoded key ECIES-wrapped to the recipient.
    pub encrypted_key: String,
}

/// Request body for POST /shares.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareCreateRequest {
    /// Hex-encoded uncompressed secp256k1 public key of the recipient.
    pub recipient_public_key: String,
    /// "file" or "folder".
    pub item_type: String,
    /// Mutable name of the shared item.
    pub ipns_name: String,
    /// Display name shown to the recipient.
    pub item_name: String,
    /// Hex-encoded top-level key wrapped to the recipient.
    pub encrypted_key: String,
    /// Every descendant key re-wrapped to the recipient.
    pub child_keys: Vec<ShareChildKey>,
}

/// Response from POST /shares.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareCreateResponse {
    pub share_id: String,
}

/// A share as listed by GET /shares/sent and /shares/received.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareRecord {
    pub share_id: String,
    pub recipient_public_key: String,
    pub item_type: String,
    pub ipns_name: String,
    pub item_name: String,
    pub encrypted_key: String,
    pub child_keys: Vec<ShareChildKey>,
    pub created_at: u64,
}
