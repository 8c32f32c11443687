//! Encrypted device registry.
//!
//! A registry of the user's known devices, sealed as one ECIES blob to the
//! user's own public key and stored at a deterministic derived mutable name.
//! It gives every logged-in device the same view of which devices exist and
//! which are authorized, without the relay learning anything.
//!
//! Registry writes must never block or fail a login; callers run
//! `register_device` in a spawned task and only log errors.

use serde::{Deserialize, Serialize};

use crate::api::types::PublishRequest;
use crate::api::RelayStore;
use crate::crypto::utils::now_ms;
use crate::crypto::{self, ecies, hkdf};
use crate::error::VaultError;
use crate::keys::NameKeypair;

use base64::Engine;

/// Authorization status for a device in the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceAuthStatus {
    Pending,
    Authorized,
    Revoked,
}

/// Individual device entry in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEntry {
    /// Stable identifier chosen by the device.
    pub device_id: String,
    /// Device's public key (hex), for future device-to-device exchange.
    pub public_key: String,
    /// Human-readable device name.
    pub name: String,
    /// Platform identifier, e.g. "web", "macos", "linux".
    pub platform: String,
    /// Client version string.
    pub app_version: String,
    /// Authorization status.
    pub status: DeviceAuthStatus,
    /// When the device was first registered (Unix ms).
    pub created_at: u64,
    /// Last time the device touched the registry (Unix ms).
    pub last_seen_at: u64,
    /// When the device was revoked (Unix ms, absent if not revoked).
    pub revoked_at: Option<u64>,
}

/// The full registry, including revoked devices for the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRegistry {
    /// Schema version for future migrations.
    pub version: String,
    /// Monotonically increasing update counter, also used as the record
    /// sequence number.
    pub sequence_number: u64,
    /// Every known device.
    pub devices: Vec<DeviceEntry>,
}

/// Facts about the current device that go into its registry entry.
pub struct DeviceDescriptor {
    pub device_id: String,
    pub name: String,
    pub platform: String,
    pub app_version: String,
}

/// Register (or refresh) this device in the encrypted registry.
///
/// Fetches and decrypts the existing registry if one exists, upserts this
/// device, re-seals the whole blob to the user's public key, and publishes
/// it under the derived registry name. The first device of a vault is
/// auto-authorized; later devices start pending.
pub async fn register_device<R: RelayStore>(
    relay: &R,
    user_private_key: &[u8; 32],
    user_public_key: &[u8],
    device: DeviceDescriptor,
) -> Result<(), VaultError> {
    let derived = hkdf::derive_registry_ipns_keypair(user_private_key)?;
    let signing = NameKeypair::from_parts(derived.public_key, derived.private_key)?;
    let registry_name = derived.ipns_name;

    let existing = fetch_registry(relay, &registry_name, user_private_key)
        .await
        .ok();

    let first_device = existing.is_none();
    let mut registry = existing.unwrap_or(DeviceRegistry {
        version: "v1".to_string(),
        sequence_number: 0,
        devices: Vec::new(),
    });

    if let Some(entry) = registry
        .devices
        .iter_mut()
        .find(|d| d.device_id == device.device_id)
    {
        entry.last_seen_at = now_ms();
        entry.app_version = device.app_version;
    } else {
        registry.devices.push(DeviceEntry {
            device_id: device.device_id.clone(),
            public_key: hex::encode(user_public_key),
            name: device.name,
            platform: device.platform,
            app_version: device.app_version,
            status: if first_device {
                DeviceAuthStatus::Authorized
            } else {
                DeviceAuthStatus::Pending
            },
            created_at: now_ms(),
            last_seen_at: now_ms(),
            revoked_at: None,
        });
    }
    registry.sequence_number += 1;

    let json = serde_json::to_vec(&registry).map_err(|_| VaultError::MalformedMetadata)?;
    let sealed = ecies::wrap_key(&json, user_public_key)?;
    let cid = relay.add(sealed.clone()).await?;

    // The registry blob is ECIES-sealed, so the record carries no separate IV
    let record =
        crypto::ipns::sign_record(&sealed, &[], registry.sequence_number, signing.private_key())?;
    let record_bytes = crypto::ipns::marshal_record(&record)?;

    relay
        .publish(&PublishRequest {
            ipns_name: registry_name,
            record: base64::engine::general_purpose::STANDARD.encode(&record_bytes),
            metadata_cid: cid,
            encrypted_ipns_private_key: None,
            key_epoch: None,
        })
        .await?;

    log::info!("Device {} registered in encrypted registry", device.device_id);
    Ok(())
}

/// Fetch and decrypt the registry blob for the derived name.
pub async fn fetch_registry<R: RelayStore>(
    relay: &R,
    registry_name: &str,
    user_private_key: &[u8],
) -> Result<DeviceRegistry, VaultError> {
    let resolved = relay
        .resolve(registry_name)
        .await?
        .ok_or_else(|| VaultError::NotFound(registry_name.to_string()))?;
    let sealed = relay.fetch(&resolved.cid).await?;
    let json = ecies::unwrap_key(&sealed, user_private_key)?;
    serde_json::from_slice(&json).map_err(|_| VaultError::MalformedMetadata)
}
