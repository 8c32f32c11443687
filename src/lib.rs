//! Client-side cryptographic core of the CipherBox zero-knowledge vault.
//!
//! Everything the relay stores for a vault is encrypted or signed before it
//! leaves this crate: file content under per-file AES-256 keys, folder and
//! file metadata under per-folder keys, every key ECIES-wrapped to the
//! owner's secp256k1 public key, and every metadata update bound to its
//! mutable name by an Ed25519-signed record with a strictly increasing
//! sequence number.
//!
//! Entry point: [`VaultSession`], created at login with the user's keypair
//! and threaded through every operation. The session wires together the
//! in-memory folder tree, the per-name publish pipeline, the background
//! sync engine, and the share protocol.

pub mod api;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod publish;
pub mod registry;
pub mod session;
pub mod share;
pub mod sync;
pub mod tree;

pub use error::VaultError;
pub use keys::{FileKey, FolderKey, NameKeypair};
pub use session::{UploadInput, VaultConfig, VaultSession};
pub use share::ReadAuthority;
pub use sync::SyncEvent;
