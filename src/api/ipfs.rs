//! Content storage operations against the relay.
//!
//! Content is always encrypted before it reaches this layer; the relay never
//! sees plaintext.

use super::client::{check_status, ApiClient};
use super::types::{AddResponse, UnpinRequest};
use crate::error::VaultError;

/// Add encrypted bytes to storage via the relay.
///
/// POST /ipfs/add with an opaque body. Returns the content address.
pub async fn add_content(client: &ApiClient, data: Vec<u8>) -> Result<String, VaultError> {
    let resp = client.post_bytes("/ipfs/add", data).await?;
    let resp = check_status(resp).await?;

    let add: AddResponse = resp
        .json()
        .await
        .map_err(|e| VaultError::NetworkFatal(format!("bad add response: {}", e)))?;
    Ok(add.cid)
}

/// Fetch encrypted content by its address.
///
/// GET /ipfs/{cid} returns raw encrypted bytes.
pub async fn fetch_content(client: &ApiClient, cid: &str) -> Result<Vec<u8>, VaultError> {
    let resp = client.get(&format!("/ipfs/{}", cid)).await?;
    let resp = check_status(resp).await?;

    let bytes = resp
        .bytes()
        .await
        .map_err(|e| VaultError::NetworkTransient(format!("body read failed: {}", e)))?;
    Ok(bytes.to_vec())
}

/// Ask the relay to release a content address it pins for this vault.
///
/// POST /vault/unpin. Best-effort from the caller's perspective; an address
/// that is already unpinned is not an error.
pub async fn unpin_content(client: &ApiClient, cid: &str) -> Result<(), VaultError> {
    let req = UnpinRequest {
        cid: cid.to_string(),
    };
    let resp = client.post_json("/vault/unpin", &req).await?;
    check_status(resp).await?;
    Ok(())
}
