//! Mutable-name resolution and publishing via the relay.

use super::client::{check_status, ApiClient};
use super::types::{PublishRequest, ResolveResponse};
use crate::error::VaultError;

/// Resolve a mutable name to its current CID and sequence number.
///
/// GET /ipns/resolve?ipnsName={name}. Returns `None` when the name has never
/// been published (relay 404).
pub async fn resolve_name(
    client: &ApiClient,
    ipns_name: &str,
) -> Result<Option<ResolveResponse>, VaultError> {
    let path = format!("/ipns/resolve?ipnsName={}", urlencoding::encode(ipns_name));
    let resp = client.get(&path).await?;

    if resp.status().as_u16() == 404 {
        return Ok(None);
    }

    let resp = check_status(resp).await?;
    let resolved: ResolveResponse = resp
        .json()
        .await
        .map_err(|e| VaultError::NetworkFatal(format!("bad resolve response: {}", e)))?;
    Ok(Some(resolved))
}

/// Publish a signed name record.
///
/// POST /ipns/publish with the base64 record, the envelope CID, and the
/// TEE-wrapped signing key when enclave republishing is enabled.
pub async fn publish_name(client: &ApiClient, request: &PublishRequest) -> Result<(), VaultError> {
    let resp = client.post_json("/ipns/publish", request).await?;
    check_status(resp).await?;
    Ok(())
}
