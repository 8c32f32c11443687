//! Relay API client.
//!
//! The relay proxies content storage, mutable-name resolution/publishing,
//! vault bootstrap, and the share index. Everything it stores for us is
//! either encrypted or signed; this module is the only place HTTP happens.

pub mod client;
pub mod ipfs;
pub mod ipns;
pub mod shares;
pub mod types;
pub mod vault;

pub use client::ApiClient;

use crate::error::VaultError;
use types::{PublishRequest, ResolveResponse};

/// Narrow relay surface needed by the publish pipeline, sync engine, and
/// share traversal. `ApiClient` implements it over HTTP; tests substitute an
/// in-memory store.
#[allow(async_fn_in_trait)]
pub trait RelayStore {
    /// Store encrypted bytes, returning their content address.
    async fn add(&self, bytes: Vec<u8>) -> Result<String, VaultError>;

    /// Fetch encrypted bytes by content address.
    async fn fetch(&self, cid: &str) -> Result<Vec<u8>, VaultError>;

    /// Release a pinned content address.
    async fn unpin(&self, cid: &str) -> Result<(), VaultError>;

    /// Resolve a mutable name; `None` when never published.
    async fn resolve(&self, ipns_name: &str) -> Result<Option<ResolveResponse>, VaultError>;

    /// Publish a signed record for a mutable name.
    async fn publish(&self, request: &PublishRequest) -> Result<(), VaultError>;
}

impl RelayStore for ApiClient {
    async fn add(&self, bytes: Vec<u8>) -> Result<String, VaultError> {
        ipfs::add_content(self, bytes).await
    }

    async fn fetch(&self, cid: &str) -> Result<Vec<u8>, VaultError> {
        ipfs::fetch_content(self, cid).await
    }

    async fn unpin(&self, cid: &str) -> Result<(), VaultError> {
        ipfs::unpin_content(self, cid).await
    }

    async fn resolve(&self, ipns_name: &str) -> Result<Option<ResolveResponse>, VaultError> {
        ipns::resolve_name(self, ipns_name).await
    }

    async fn publish(&self, request: &PublishRequest) -> Result<(), VaultError> {
        ipns::publish_name(self, request).await
    }
}
