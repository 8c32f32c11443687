//! Key hierarchy: owning handles for folder, file, and name-signing keys.
//!
//! Every handle owns its plaintext key material uniquely and wipes it on
//! drop. Handles are deliberately not `Clone`: a key moves between owners,
//! it is never duplicated. The user's secp256k1 private key is only ever
//! accepted by reference here and never stored or returned.
//!
//! Wrapping to the owner and to a share recipient is the same ECIES
//! operation against a different public key; both are exposed so call sites
//! say which trust relationship they mean.

use std::fmt;

use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::ecies;
use crate::crypto::ed25519::{generate_ed25519_keypair, ED25519_PRIVATE_KEY_SIZE};
use crate::crypto::ipns;
use crate::crypto::utils::generate_file_key as generate_key_bytes;
use crate::error::VaultError;

/// AES-256 key protecting one folder's metadata envelope.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct FolderKey([u8; 32]);

/// AES-256 key protecting one file's content. Invalidated on every update:
/// a new upload gets a new key.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct FileKey([u8; 32]);

macro_rules! impl_symmetric_key {
    ($name:ident) => {
        impl $name {
            /// Generate a fresh key from the OS CSPRNG, independent of every
            /// prior key.
            pub fn generate() -> Self {
                Self(generate_key_bytes())
            }

            /// Take ownership of raw key bytes, zeroizing the source buffer.
            pub fn from_bytes(mut bytes: Vec<u8>) -> Result<Self, VaultError> {
                if bytes.len() != 32 {
                    bytes.zeroize();
                    return Err(VaultError::MalformedCiphertext);
                }
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&bytes);
                bytes.zeroize();
                Ok(Self(arr))
            }

            /// Borrow the raw key for a cipher call. The borrow must not
            /// outlive the handle.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// ECIES-wrap this key to the vault owner's public key.
            pub fn wrap_for_owner(&self, owner_public: &[u8]) -> Result<Vec<u8>, VaultError> {
                Ok(ecies::wrap_key(&self.0, owner_public)?)
            }

            /// ECIES-wrap this key to a share recipient's public key.
            pub fn wrap_for_recipient(
                &self,
                recipient_public: &[u8],
            ) -> Result<Vec<u8>, VaultError> {
                Ok(ecies::wrap_key(&self.0, recipient_public)?)
            }

            /// Unwrap a key wrapped to the given private key's public half.
            pub fn unwrap_with(wrapped: &[u8], private_key: &[u8]) -> Result<Self, VaultError> {
                let bytes = ecies::unwrap_key(wrapped, private_key)?;
                Self::from_bytes(bytes)
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.0.ct_eq(&other.0).into()
            }
        }

        impl Eq for $name {}

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(concat!(stringify!($name), "([redacted])"))
            }
        }
    };
}

impl_symmetric_key!(FolderKey);
impl_symmetric_key!(FileKey);

/// Ed25519 keypair that signs one mutable name's records, plus the name
/// derived from its public half.
pub struct NameKeypair {
    public: [u8; 32],
    private: SigningSecret,
    ipns_name: String,
}

/// Owning wrapper for the 32-byte signing seed.
#[derive(Zeroize, ZeroizeOnDrop)]
struct SigningSecret([u8; 32]);

impl NameKeypair {
    /// Generate a random signing keypair (used for created subfolders; the
    /// vault root and per-file keypairs are HKDF-derived instead).
    pub fn generate() -> Result<Self, VaultError> {
        let (public, private) = generate_ed25519_keypair();
        Self::from_parts(public, private)
    }

    /// Rebuild a keypair from its raw halves, taking ownership of the
    /// private bytes.
    pub fn from_parts(public: Vec<u8>, mut private: Vec<u8>) -> Result<Self, VaultError> {
        if public.len() != 32 || private.len() != ED25519_PRIVATE_KEY_SIZE {
            private.zeroize();
            return Err(VaultError::MalformedCiphertext);
        }
        let public_arr: [u8; 32] = public
            .try_into()
            .map_err(|_| VaultError::MalformedCiphertext)?;
        let mut private_arr = [0u8; 32];
        private_arr.copy_from_slice(&private);
        private.zeroize();

        let ipns_name = ipns::derive_ipns_name(&public_arr)?;
        Ok(Self {
            public: public_arr,
            private: SigningSecret(private_arr),
            ipns_name,
        })
    }

    /// Rebuild a keypair from just the private seed.
    pub fn from_private(private: Vec<u8>) -> Result<Self, VaultError> {
        let public = crate::crypto::ed25519::get_public_key(&private)?;
        Self::from_parts(public, private)
    }

    pub fn public_key(&self) -> &[u8; 32] {
        &self.public
    }

    pub fn private_key(&self) -> &[u8; 32] {
        &self.private.0
    }

    /// The mutable name this keypair controls.
    pub fn ipns_name(&self) -> &str {
        &self.ipns_name
    }

    /// ECIES-wrap the signing seed to the vault owner's public key.
    pub fn wrap_for_owner(&self, owner_public: &[u8]) -> Result<Vec<u8>, VaultError> {
        Ok(ecies::wrap_key(&self.private.0, owner_public)?)
    }

    /// ECIES-wrap the signing seed to another party (the TEE republisher).
    pub fn wrap_for_recipient(&self, recipient_public: &[u8]) -> Result<Vec<u8>, VaultError> {
        Ok(ecies::wrap_key(&self.private.0, recipient_public)?)
    }

    /// Unwrap a signing keypair wrapped to the given private key.
    pub fn unwrap_with(wrapped: &[u8], private_key: &[u8]) -> Result<Self, VaultError> {
        let seed = ecies::unwrap_key(wrapped, private_key)?;
        Self::from_private(seed)
    }
}

impl fmt::Debug for NameKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameKeypair")
            .field("ipns_name", &self.ipns_name)
            .field("private", &"[redacted]")
            .finish()
    }
}
