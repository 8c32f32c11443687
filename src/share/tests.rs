//! Share protocol tests: traverse-and-rewrap over an in-memory relay, then
//! consume the share with only the recipient's private key.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;

use tokio::sync::watch;

use super::*;
use crate::api::types::{PublishRequest, ResolveResponse, ShareRecord};
use crate::crypto::ecies::derive_public_key;
use crate::crypto::folder::{EnvelopeTimes, FolderMetadata};
use crate::crypto::utils::{generate_random_bytes, now_ms, sha256};
use crate::keys::NameKeypair;

#[derive(Default)]
struct MockRelay {
    resolved: StdMutex<HashMap<String, ResolveResponse>>,
    content: StdMutex<HashMap<String, Vec<u8>>>,
}

impl MockRelay {
    fn put(&self, ipns_name: &str, cid: &str, seq: u64, bytes: Vec<u8>) {
        self.resolved.lock().unwrap().insert(
            ipns_name.to_string(),
            ResolveResponse {
                cid: cid.to_string(),
                sequence_number: seq,
            },
        );
        self.content.lock().unwrap().insert(cid.to_string(), bytes);
    }

    fn put_content(&self, cid: &str, bytes: Vec<u8>) {
        self.content.lock().unwrap().insert(cid.to_string(), bytes);
    }
}

impl crate::api::RelayStore for MockRelay {
    async fn add(&self, _bytes: Vec<u8>) -> Result<String, VaultError> {
        unreachable!("share tests never add")
    }

    async fn fetch(&self, cid: &str) -> Result<Vec<u8>, VaultError> {
        self.content
            .lock()
            .unwrap()
            .get(cid)
            .cloned()
            .ok_or_else(|| VaultError::NetworkFatal(format!("unknown cid {}", cid)))
    }

    async fn unpin(&self, _cid: &str) -> Result<(), VaultError> {
        Ok(())
    }

    async fn resolve(&self, ipns_name: &str) -> Result<Option<ResolveResponse>, VaultError> {
        Ok(self.resolved.lock().unwrap().get(ipns_name).cloned())
    }

    async fn publish(&self, _request: &PublishRequest) -> Result<(), VaultError> {
        unreachable!("recipients never publish")
    }
}

fn secp_keypair() -> (Vec<u8>, Vec<u8>) {
    loop {
        let private = generate_random_bytes(32);
        if let Ok(public) = derive_public_key(&private) {
            return (private, public);
        }
    }
}

fn envelope(children: Vec<FolderChild>) -> FolderMetadata {
    FolderMetadata {
        children,
        metadata: EnvelopeTimes {
            created: now_ms(),
            modified: now_ms(),
        },
    }
}

/// Owner-side fixture: /docs/{report.pdf, drafts/{v1.txt}} on the relay.
struct Vault {
    relay: MockRelay,
    owner_private: Vec<u8>,
    docs_entry: FolderEntry,
    docs_key: FolderKey,
    report_pointer: FilePointer,
    report_content: Vec<u8>,
    v1_content: Vec<u8>,
    report_id: String,
    drafts_id: String,
    v1_id: String,
}

fn upload_file(
    relay: &MockRelay,
    owner_public: &[u8],
    parent_key: &FolderKey,
    name: &str,
    content: &[u8],
    mode: EncryptionMode,
    cid: &str,
) -> FilePointer {
    let encrypted = crypto::file::encrypt_file(content, owner_public, mode).unwrap();
    relay.put_content(cid, encrypted.ciphertext.clone());

    let meta_keypair = NameKeypair::generate().unwrap();
    let metadata = FileMetadata {
        cid: cid.to_string(),
        content_sha256: hex::encode(sha256(&encrypted.ciphertext)),
        file_key_encrypted: hex::encode(&encrypted.wrapped_file_key),
        file_iv: hex::encode(&encrypted.iv),
        encryption_mode: mode,
        size: encrypted.original_size,
        name: name.to_string(),
        mime_type: "application/octet-stream".to_string(),
        created_at: now_ms(),
        modified_at: now_ms(),
        versions: Vec::new(),
    };
    let sealed = folder::encrypt_file_metadata(&metadata, parent_key.as_bytes()).unwrap();
    let meta_cid = format!("{}-meta", cid);
    relay.put(meta_keypair.ipns_name(), &meta_cid, 1, sealed);

    FilePointer {
        id: format!("id-{}", name),
        name: name.to_string(),
        file_meta_ipns_name: meta_keypair.ipns_name().to_string(),
        created_at: now_ms(),
        modified_at: now_ms(),
    }
}

fn build_vault() -> Vault {
    let relay = MockRelay::default();
    let (owner_private, owner_public) = secp_keypair();

    let docs_key = FolderKey::generate();
    let docs_keypair = NameKeypair::generate().unwrap();
    let drafts_key = FolderKey::generate();
    let drafts_keypair = NameKeypair::generate().unwrap();

    let report_content = b"annual report body".to_vec();
    let v1_content: Vec<u8> = (0..70_000).map(|i| (i % 256) as u8).collect();

    let report_pointer = upload_file(
        &relay,
        &owner_public,
        &docs_key,
        "report.pdf",
        &report_content,
        EncryptionMode::Gcm,
        "cid-report",
    );
    let v1_pointer = upload_file(
        &relay,
        &owner_public,
        &drafts_key,
        "v1.txt",
        &v1_content,
        EncryptionMode::Ctr,
        "cid-v1",
    );

    let drafts_entry = FolderEntry {
        id: "id-drafts".to_string(),
        name: "drafts".to_string(),
        ipns_name: drafts_keypair.ipns_name().to_string(),
        folder_key_encrypted: hex::encode(drafts_key.wrap_for_owner(&owner_public).unwrap()),
        ipns_private_key_encrypted: hex::encode(
            drafts_keypair.wrap_for_owner(&owner_public).unwrap(),
        ),
        created_at: now_ms(),
        modified_at: now_ms(),
    };

    let drafts_envelope = envelope(vec![FolderChild::File(v1_pointer.clone())]);
    let sealed =
        folder::encrypt_folder_metadata(&drafts_envelope, drafts_key.as_bytes()).unwrap();
    relay.put(drafts_keypair.ipns_name(), "cid-drafts-env", 1, sealed);

    let docs_envelope = envelope(vec![
        FolderChild::File(report_pointer.clone()),
        FolderChild::Folder(drafts_entry.clone()),
    ]);
    let sealed = folder::encrypt_folder_metadata(&docs_envelope, docs_key.as_bytes()).unwrap();
    relay.put(docs_keypair.ipns_name(), "cid-docs-env", 1, sealed);

    let docs_entry = FolderEntry {
        id: "id-docs".to_string(),
        name: "docs".to_string(),
        ipns_name: docs_keypair.ipns_name().to_string(),
        folder_key_encrypted: hex::encode(docs_key.wrap_for_owner(&owner_public).unwrap()),
        ipns_private_key_encrypted: hex::encode(
            docs_keypair.wrap_for_owner(&owner_public).unwrap(),
        ),
        created_at: now_ms(),
        modified_at: now_ms(),
    };

    Vault {
        relay,
        owner_private,
        docs_entry,
        docs_key,
        report_id: report_pointer.id.clone(),
        report_pointer,
        report_content,
        v1_content,
        drafts_id: "id-drafts".to_string(),
        v1_id: "id-v1.txt".to_string(),
    }
}

fn as_record(prepared: PreparedShare, recipient_public: &[u8]) -> ShareRecord {
    ShareRecord {
        share_id: "share-1".to_string(),
        recipient_public_key: hex::encode(recipient_public),
        item_type: prepared.item_type,
        ipns_name: prepared.ipns_name,
        item_name: prepared.item_name,
        encrypted_key: prepared.encrypted_key,
        child_keys: prepared.child_keys,
        created_at: now_ms(),
    }
}

#[tokio::test]
async fn test_folder_share_catalog_covers_every_descendant() {
    let vault = build_vault();
    let (_, recipient_public) = secp_keypair();
    let (_cancel_tx, cancel) = watch::channel(false);

    let prepared = create_folder_share(
        &vault.relay,
        &vault.docs_entry,
        &vault.owner_private,
        &recipient_public,
        &cancel,
    )
    .await
    .unwrap();

    assert_eq!(prepared.item_type, ITEM_TYPE_FOLDER);
    assert_eq!(prepared.item_name, "docs");
    assert_eq!(prepared.child_keys.len(), 3);

    let ids: Vec<&str> = prepared
        .child_keys
        .iter()
        .map(|k| k.item_id.as_str())
        .collect();
    assert!(ids.contains(&vault.report_id.as_str()));
    assert!(ids.contains(&vault.drafts_id.as_str()));
    assert!(ids.contains(&vault.v1_id.as_str()));

    let folder_kinds = prepared
        .child_keys
        .iter()
        .filter(|k| k.item_type == ITEM_TYPE_FOLDER)
        .count();
    assert_eq!(folder_kinds, 1);
}

#[tokio::test]
async fn test_recipient_reads_whole_subtree_with_own_key_only() {
    let vault = build_vault();
    let (recipient_private, recipient_public) = secp_keypair();
    let (_cancel_tx, cancel) = watch::channel(false);

    let prepared = create_folder_share(
        &vault.relay,
        &vault.docs_entry,
        &vault.owner_private,
        &recipient_public,
        &cancel,
    )
    .await
    .unwrap();
    let share = as_record(prepared, &recipient_public);
    let authority = ReadAuthority::ShareRecipient {
        recipient_private_key: &recipient_private,
        share: &share,
    };

    // Open the shared folder with the top-level key
    let docs_key = authority.top_level_folder_key().unwrap();
    let docs = fetch_folder_envelope(&vault.relay, &share.ipns_name, &docs_key)
        .await
        .unwrap();
    assert_eq!(docs.children.len(), 2);

    // report.pdf: GCM, metadata sealed with the docs key
    let report = docs
        .children
        .iter()
        .find_map(|c| match c {
            FolderChild::File(p) => Some(p.clone()),
            _ => None,
        })
        .unwrap();
    let report_meta =
        fetch_file_metadata(&vault.relay, &report.file_meta_ipns_name, &docs_key)
            .await
            .unwrap();
    let plaintext = read_file(&vault.relay, &authority, &report.id, &report_meta)
        .await
        .unwrap();
    assert_eq!(plaintext.as_bytes(), &vault.report_content[..]);

    // drafts/v1.txt: descend with the re-wrapped subfolder key, CTR content
    let drafts = docs
        .children
        .iter()
        .find_map(|c| match c {
            FolderChild::Folder(e) => Some(e.clone()),
            _ => None,
        })
        .unwrap();
    let drafts_key = authority
        .unwrap_folder_key(&drafts.id, &drafts.folder_key_encrypted)
        .unwrap();
    let drafts_env = fetch_folder_envelope(&vault.relay, &drafts.ipns_name, &drafts_key)
        .await
        .unwrap();
    let v1 = drafts_env
        .children
        .iter()
        .find_map(|c| match c {
            FolderChild::File(p) => Some(p.clone()),
            _ => None,
        })
        .unwrap();
    let v1_meta = fetch_file_metadata(&vault.relay, &v1.file_meta_ipns_name, &drafts_key)
        .await
        .unwrap();
    assert_eq!(v1_meta.encryption_mode, EncryptionMode::Ctr);
    let plaintext = read_file(&vault.relay, &authority, &v1.id, &v1_meta)
        .await
        .unwrap();
    assert_eq!(plaintext.as_bytes(), &vault.v1_content[..]);
}

#[tokio::test]
async fn test_wrong_recipient_key_cannot_open_share() {
    let vault = build_vault();
    let (_, recipient_public) = secp_keypair();
    let (outsider_private, _) = secp_keypair();
    let (_cancel_tx, cancel) = watch::channel(false);

    let prepared = create_folder_share(
        &vault.relay,
        &vault.docs_entry,
        &vault.owner_private,
        &recipient_public,
        &cancel,
    )
    .await
    .unwrap();
    let share = as_record(prepared, &recipient_public);
    let authority = ReadAuthority::ShareRecipient {
        recipient_private_key: &outsider_private,
        share: &share,
    };

    assert!(matches!(
        authority.top_level_folder_key(),
        Err(VaultError::AuthFailure)
    ));
    // Every catalog entry is equally unreadable
    assert!(matches!(
        authority.unwrap_file_key(&vault.report_id, ""),
        Err(VaultError::AuthFailure)
    ));
}

#[tokio::test]
async fn test_file_share_wraps_parent_folder_key() {
    let vault = build_vault();
    let (recipient_private, recipient_public) = secp_keypair();

    let prepared = create_file_share(
        &vault.relay,
        &vault.report_pointer,
        &vault.docs_key,
        &vault.owner_private,
        &recipient_public,
    )
    .await
    .unwrap();

    assert_eq!(prepared.item_type, ITEM_TYPE_FILE);
    assert_eq!(prepared.child_keys.len(), 1);
    assert_eq!(prepared.ipns_name, vault.report_pointer.file_meta_ipns_name);

    let share = as_record(prepared, &recipient_public);
    let authority = ReadAuthority::ShareRecipient {
        recipient_private_key: &recipient_private,
        share: &share,
    };

    // The top-level key opens the file's metadata record (sealed with the
    // parent folder key), and the catalog opens the content
    let parent_key = authority.top_level_folder_key().unwrap();
    let metadata = fetch_file_metadata(&vault.relay, &share.ipns_name, &parent_key)
        .await
        .unwrap();
    let plaintext = read_file(&vault.relay, &authority, &vault.report_id, &metadata)
        .await
        .unwrap();
    assert_eq!(plaintext.as_bytes(), &vault.report_content[..]);
}

#[tokio::test]
async fn test_owner_reads_through_the_same_dispatch() {
    let vault = build_vault();
    let authority = ReadAuthority::Owner {
        user_private_key: &vault.owner_private,
    };

    let docs_key = authority
        .unwrap_folder_key(&vault.docs_entry.id, &vault.docs_entry.folder_key_encrypted)
        .unwrap();
    let metadata = fetch_file_metadata(
        &vault.relay,
        &vault.report_pointer.file_meta_ipns_name,
        &docs_key,
    )
    .await
    .unwrap();
    let plaintext = read_file(&vault.relay, &authority, &vault.report_id, &metadata)
        .await
        .unwrap();
    assert_eq!(plaintext.as_bytes(), &vault.report_content[..]);
}

#[tokio::test]
async fn test_share_traversal_respects_cancellation() {
    let vault = build_vault();
    let (_, recipient_public) = secp_keypair();
    let (cancel_tx, cancel) = watch::channel(false);
    cancel_tx.send(true).unwrap();

    let result = create_folder_share(
        &vault.relay,
        &vault.docs_entry,
        &vault.owner_private,
        &recipient_public,
        &cancel,
    )
    .await;
    assert!(matches!(result, Err(VaultError::Cancelled)));
}

#[tokio::test]
async fn test_rewrap_key_for_recipient() {
    let (owner_private, owner_public) = secp_keypair();
    let (recipient_private, recipient_public) = secp_keypair();

    let key = FileKey::generate();
    let wrapped_to_owner = hex::encode(key.wrap_for_owner(&owner_public).unwrap());

    let rewrapped =
        rewrap_key_for_recipient(&wrapped_to_owner, &owner_private, &recipient_public).unwrap();
    let recovered =
        FileKey::unwrap_with(&hex::decode(rewrapped).unwrap(), &recipient_private).unwrap();
    assert_eq!(recovered.as_bytes(), key.as_bytes());
}
