//! Vault bootstrap endpoints: initialize a fresh vault, fetch the wrapped
//! root keys of an existing one.

use super::client::{check_status, ApiClient};
use super::types::{VaultInitRequest, VaultResponse};
use crate::error::VaultError;

/// Register a fresh vault with the relay.
///
/// POST /my-vault/initialize. The root folder key and root record-signing
/// key are ECIES-wrapped to the user's public key before they get here; the
/// relay stores them without being able to open them.
pub async fn initialize_vault(
    client: &ApiClient,
    request: &VaultInitRequest,
) -> Result<(), VaultError> {
    let resp = client.post_json("/my-vault/initialize", request).await?;
    check_status(resp).await?;
    Ok(())
}

/// Fetch the wrapped root keys and TEE key material for the current user.
///
/// GET /my-vault.
pub async fn fetch_vault(client: &ApiClient) -> Result<VaultResponse, VaultError> {
    let resp = client.get("/my-vault").await?;
    let resp = check_status(resp).await?;

    resp.json()
        .await
        .map_err(|e| VaultError::NetworkFatal(format!("bad vault response: {}", e)))
}
