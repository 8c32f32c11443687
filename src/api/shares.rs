//! Share index endpoints.
//!
//! The relay keeps the share catalog (who may read what, with which wrapped
//! keys) but cannot open any of the keys it stores. Revocation is an index
//! mutation only; there is no cryptographic revocation of bytes a recipient
//! already observed.

use super::client::{check_status, ApiClient};
use super::types::{ShareCreateRequest, ShareCreateResponse, ShareRecord};
use crate::error::VaultError;

/// Register a share with the relay. Returns the assigned share id.
pub async fn create_share(
    client: &ApiClient,
    request: &ShareCreateRequest,
) -> Result<String, VaultError> {
    let resp = client.post_json("/shares", request).await?;
    let resp = check_status(resp).await?;

    let created: ShareCreateResponse = resp
        .json()
        .await
        .map_err(|e| VaultError::NetworkFatal(format!("bad share response: {}", e)))?;
    Ok(created.share_id)
}

/// List shares this user has granted.
pub async fn list_sent(client: &ApiClient) -> Result<Vec<ShareRecord>, VaultError> {
    let resp = client.get("/shares/sent").await?;
    let resp = check_status(resp).await?;
    resp.json()
        .await
        .map_err(|e| VaultError::NetworkFatal(format!("bad shares response: {}", e)))
}

/// List shares granted to this user.
pub async fn list_received(client: &ApiClient) -> Result<Vec<ShareRecord>, VaultError> {
    let resp = client.get("/shares/received").await?;
    let resp = check_status(resp).await?;
    resp.json()
        .await
        .map_err(|e| VaultError::NetworkFatal(format!("bad shares response: {}", e)))
}

/// Revoke a share. Server-side index mutation only.
pub async fn revoke_share(client: &ApiClient, share_id: &str) -> Result<(), VaultError> {
    let resp = client
        .delete(&format!("/shares/{}", urlencoding::encode(share_id)))
        .await?;
    check_status(resp).await?;
    Ok(())
}
