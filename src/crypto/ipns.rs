//! Mutable-name record engine: build, sign, verify, and encode name records,
//! plus IPNS name derivation from an Ed25519 public key.
//!
//! A record binds an encrypted metadata envelope to a name at a sequence
//! number. The signature covers `sha256(ciphertext || iv || LE64(sequence))`,
//! so any change to the payload or the sequence falsifies it. `validity` is
//! informational (consumed by the republisher) and is not signed.
//!
//! Sequence numbers start at 1 on the first publish; 0 is reserved as the
//! never-published / not-yet-loaded sentinel.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ed25519::{sign_ed25519, verify_ed25519, ED25519_SIGNATURE_SIZE};
use super::utils::sha256;

/// Wire format version of the name record.
pub const RECORD_VERSION: &str = "1.0";

/// Default record lifetime: 24 hours in milliseconds.
pub const DEFAULT_RECORD_LIFETIME_MS: u64 = 86_400_000;

#[derive(Debug, Error)]
pub enum IpnsError {
    #[error("Record creation failed")]
    CreationFailed,
    #[error("Record encoding failed")]
    EncodingFailed,
    #[error("Record decoding failed")]
    DecodingFailed,
    #[error("Record verification failed")]
    VerificationFailed,
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid sequence number")]
    InvalidSequence,
    #[error("IPNS name derivation failed")]
    DerivationFailed,
}

/// A signed mutable-name record.
///
/// `encrypted_metadata` is the GCM ciphertext+tag (hex), `iv` the 12-byte
/// GCM nonce (hex), `signature` the Ed25519 signature (base64) over the
/// payload hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NameRecord {
    pub version: String,
    pub encrypted_metadata: String,
    pub iv: String,
    pub sequence_number: u64,
    pub signature: String,
    pub validity: String,
}

/// Hash that the record signature covers:
/// sha256(ciphertext || iv || LE64(sequence)).
fn signing_payload(encrypted_metadata: &[u8], iv: &[u8], sequence: u64) -> [u8; 32] {
    let mut buf =
        Vec::with_capacity(encrypted_metadata.len() + iv.len() + std::mem::size_of::<u64>());
    buf.extend_from_slice(encrypted_metadata);
    buf.extend_from_slice(iv);
    buf.extend_from_slice(&sequence.to_le_bytes());
    sha256(&buf)
}

/// Build and sign a name record for the given encrypted envelope.
///
/// `sequence` must be >= 1 (0 is the never-published sentinel).
pub fn sign_record(
    encrypted_metadata: &[u8],
    iv: &[u8],
    sequence: u64,
    name_private_key: &[u8],
) -> Result<NameRecord, IpnsError> {
    if sequence == 0 {
        return Err(IpnsError::InvalidSequence);
    }

    let digest = signing_payload(encrypted_metadata, iv, sequence);
    let signature =
        sign_ed25519(&digest, name_private_key).map_err(|_| IpnsError::InvalidPrivateKey)?;

    let validity_time = SystemTime::now() + Duration::from_millis(DEFAULT_RECORD_LIFETIME_MS);

    Ok(NameRecord {
        version: RECORD_VERSION.to_string(),
        encrypted_metadata: hex::encode(encrypted_metadata),
        iv: hex::encode(iv),
        sequence_number: sequence,
        signature: base64::engine::general_purpose::STANDARD.encode(&signature),
        validity: format_validity_timestamp(validity_time),
    })
}

/// Verify a name record against the expected Ed25519 public key.
///
/// Checks the signature over the payload hash and that the sequence number
/// is positive. Returns false on any decode failure; never panics.
pub fn verify_record(record: &NameRecord, expected_public_key: &[u8]) -> bool {
    if record.sequence_number == 0 {
        return false;
    }

    let Ok(encrypted_metadata) = hex::decode(&record.encrypted_metadata) else {
        return false;
    };
    let Ok(iv) = hex::decode(&record.iv) else {
        return false;
    };
    let Ok(signature) =
        base64::engine::general_purpose::STANDARD.decode(&record.signature)
    else {
        return false;
    };
    if signature.len() != ED25519_SIGNATURE_SIZE {
        return false;
    }

    let digest = signing_payload(&encrypted_metadata, &iv, record.sequence_number);
    verify_ed25519(&digest, &signature, expected_public_key)
}

/// Serialize a record to its canonical JSON bytes for transport.
pub fn marshal_record(record: &NameRecord) -> Result<Vec<u8>, IpnsError> {
    serde_json::to_vec(record).map_err(|_| IpnsError::EncodingFailed)
}

/// Parse a record from JSON bytes, checking the version tag.
pub fn unmarshal_record(bytes: &[u8]) -> Result<NameRecord, IpnsError> {
    let record: NameRecord =
        serde_json::from_slice(bytes).map_err(|_| IpnsError::DecodingFailed)?;
    if record.version != RECORD_VERSION {
        return Err(IpnsError::DecodingFailed);
    }
    Ok(record)
}

/// Format a timestamp as RFC3339 with nanosecond precision,
/// e.g. "2026-02-08T23:31:12.138000000Z".
fn format_validity_timestamp(validity_time: SystemTime) -> String {
    let duration = validity_time
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    let secs = duration.as_secs();
    let nanos = duration.subsec_nanos();

    let days = secs / 86400;
    let time_of_day = secs % 86400;
    let hours = time_of_day / 3600;
    let minutes = (time_of_day % 3600) / 60;
    let seconds = time_of_day % 60;

    let (year, month, day) = civil_from_days(days as i64);

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:09}Z",
        year, month, day, hours, minutes, seconds, nanos
    )
}

/// Convert days since Unix epoch to (year, month, day).
/// Algorithm from Howard Hinnant's civil_from_days.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64; // day of era [0, 146096]
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365; // year of era [0, 399]
    let y = (yoe as i64) + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100); // day of year [0, 365]
    let mp = (5 * doy + 2) / 153; // [0, 11]
    let d = doy - (153 * mp + 2) / 5 + 1; // day [1, 31]
    let m = if mp < 10 { mp + 3 } else { mp - 9 }; // month [1, 12]
    let y = if m <= 2 { y + 1 } else { y };
    (y, m as u32, d as u32)
}

/// Derive the IPNS name (CIDv1 base36) from an Ed25519 public key.
///
/// Steps:
/// 1. Wrap public key in libp2p PublicKey protobuf
/// 2. Create identity multihash: 0x00 (identity) + varint(len) + data
/// 3. Create CIDv1: version=1, codec=0x72 (libp2p-key), multihash
/// 4. Encode as base36 (k... prefix)
pub fn derive_ipns_name(ed25519_public_key: &[u8; 32]) -> Result<String, IpnsError> {
    // Step 1: Wrap in libp2p PublicKey protobuf
    let libp2p_pub_key = encode_libp2p_public_key(ed25519_public_key);

    // Step 2: Identity multihash: code=0x00, length=varint(data.len()), data
    let mut identity_multihash = Vec::new();
    identity_multihash.push(0x00);
    encode_unsigned_varint(&mut identity_multihash, libp2p_pub_key.len() as u64);
    identity_multihash.extend_from_slice(&libp2p_pub_key);

    // Step 3: CIDv1 binary: version(1) + codec(0x72, libp2p-key) + multihash
    let mut cid_bytes = Vec::new();
    encode_unsigned_varint(&mut cid_bytes, 1);
    encode_unsigned_varint(&mut cid_bytes, 0x72);
    cid_bytes.extend_from_slice(&identity_multihash);

    // Step 4: base36 with 'k' multibase prefix
    let base36 = encode_base36(&cid_bytes);
    Ok(format!("k{}", base36))
}

/// Encode the Ed25519 public key in libp2p PublicKey protobuf format.
///
/// message PublicKey { KeyType Type = 1; bytes Data = 2; }
/// where KeyType.Ed25519 = 1
fn encode_libp2p_public_key(ed25519_public_key: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    // Field 1 (Type): varint, field_number=1, wire_type=0 => tag = 0x08
    buf.push(0x08);
    // Value: 1 (Ed25519)
    buf.push(0x01);
    // Field 2 (Data): length-delimited, field_number=2, wire_type=2 => tag = 0x12
    buf.push(0x12);
    buf.push(ed25519_public_key.len() as u8);
    buf.extend_from_slice(ed25519_public_key);
    buf
}

/// Encode an unsigned varint (LEB128).
fn encode_unsigned_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            break;
        } else {
            buf.push(byte | 0x80);
        }
    }
}

/// Encode bytes as base36 (lowercase).
///
/// Base36 alphabet: 0123456789abcdefghijklmnopqrstuvwxyz
fn encode_base36(data: &[u8]) -> String {
    if data.is_empty() {
        return String::new();
    }

    const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    // Count leading zeros
    let leading_zeros = data.iter().take_while(|&&b| b == 0).count();

    // Convert byte array to big integer using repeated division
    let mut num = data.to_vec();
    let mut result = Vec::new();

    while !num.is_empty() {
        let mut remainder: u32 = 0;
        let mut quotient = Vec::new();

        for &byte in &num {
            let acc = (remainder << 8) | (byte as u32);
            let digit = acc / 36;
            remainder = acc % 36;

            if !quotient.is_empty() || digit > 0 {
                quotient.push(digit as u8);
            }
        }

        result.push(ALPHABET[remainder as usize]);
        num = quotient;
    }

    // Add leading '0's for each leading zero byte
    for _ in 0..leading_zeros {
        result.push(b'0');
    }

    result.reverse();
    String::from_utf8(result).unwrap_or_default()
}
