//! Unit tests for the folder tree: invariants, atomicity, intents, rollback.

use super::*;
use crate::crypto::file::EncryptionMode;
use crate::keys::{FolderKey, NameKeypair};

fn new_tree(quota: Option<u64>) -> FolderTree {
    let signing = NameKeypair::generate().unwrap();
    let ipns = signing.ipns_name().to_string();
    FolderTree::new(ipns, FolderKey::generate(), signing, quota)
}

fn file_spec(name: &str, size: u64) -> AddFileSpec {
    let signing = NameKeypair::generate().unwrap();
    let now = now_ms();
    AddFileSpec {
        id: generate_uuid(),
        name: name.to_string(),
        metadata: FileMetadata {
            cid: format!("bafy-{}", name),
            content_sha256: "00".repeat(32),
            file_key_encrypted: "aabb".to_string(),
            file_iv: "ccdd".to_string(),
            encryption_mode: EncryptionMode::Gcm,
            size,
            name: name.to_string(),
            mime_type: "application/octet-stream".to_string(),
            created_at: now,
            modified_at: now,
            versions: Vec::new(),
        },
        signing_key: signing,
    }
}

fn folder_spec() -> CreateFolderSpec {
    CreateFolderSpec {
        id: generate_uuid(),
        folder_key: FolderKey::generate(),
        signing_key: NameKeypair::generate().unwrap(),
        folder_key_encrypted: "eeff".to_string(),
        ipns_private_key_encrypted: "0011".to_string(),
    }
}

fn add_one_file(tree: &mut FolderTree, parent: &str, name: &str, size: u64) -> String {
    let spec = file_spec(name, size);
    let id = spec.id.clone();
    tree.add_files(parent, vec![spec]).unwrap();
    id
}

fn create_one_folder(tree: &mut FolderTree, parent: &str, name: &str) -> String {
    let spec = folder_spec();
    let id = spec.id.clone();
    tree.create_folder(parent, name, spec).unwrap();
    id
}

// ── add_files ────────────────────────────────────────────────────────────

#[test]
fn test_add_files_inserts_pointers_and_emits_intents() {
    let mut tree = new_tree(None);
    let root = tree.root_id().to_string();

    let specs = vec![file_spec("a.bin", 100), file_spec("b.bin", 200)];
    let outcome = tree.add_files(&root, specs).unwrap();

    // One intent per file record plus one for the parent, parent last
    assert_eq!(outcome.intents.len(), 3);
    assert!(matches!(
        outcome.intents[0].target,
        IntentTarget::FileRecord { .. }
    ));
    assert!(matches!(
        outcome.intents[1].target,
        IntentTarget::FileRecord { .. }
    ));
    assert_eq!(
        outcome.intents[2].target,
        IntentTarget::Folder {
            folder_id: root.clone()
        }
    );

    let folder = tree.folder(&root).unwrap();
    assert_eq!(folder.children.len(), 2);
    assert_eq!(tree.used_bytes(), 300);
    assert!(outcome.unpins.is_empty());
}

#[test]
fn test_add_files_name_collision_is_atomic() {
    let mut tree = new_tree(None);
    let root = tree.root_id().to_string();
    add_one_file(&mut tree, &root, "taken.bin", 10);

    let result = tree.add_files(&root, vec![file_spec("fresh.bin", 10), file_spec("taken.bin", 10)]);
    assert!(matches!(result, Err(VaultError::NameCollision(_))));

    // Nothing from the failed batch may be visible
    let folder = tree.folder(&root).unwrap();
    assert_eq!(folder.children.len(), 1);
    assert_eq!(tree.used_bytes(), 10);
}

#[test]
fn test_add_files_collision_within_batch() {
    let mut tree = new_tree(None);
    let root = tree.root_id().to_string();
    let result = tree.add_files(&root, vec![file_spec("dup.bin", 1), file_spec("dup.bin", 1)]);
    assert!(matches!(result, Err(VaultError::NameCollision(_))));
    assert!(tree.folder(&root).unwrap().children.is_empty());
}

#[test]
fn test_add_files_parent_not_found() {
    let mut tree = new_tree(None);
    assert!(matches!(
        tree.add_files("missing", vec![file_spec("a", 1)]),
        Err(VaultError::ParentNotFound(_))
    ));
}

#[test]
fn test_add_files_quota_exceeded() {
    let mut tree = new_tree(Some(150));
    let root = tree.root_id().to_string();
    add_one_file(&mut tree, &root, "a.bin", 100);

    assert!(matches!(
        tree.add_files(&root, vec![file_spec("b.bin", 100)]),
        Err(VaultError::QuotaExceeded)
    ));
    assert_eq!(tree.used_bytes(), 100);
}

// ── create_folder ────────────────────────────────────────────────────────

#[test]
fn test_create_folder_emits_child_then_parent() {
    let mut tree = new_tree(None);
    let root = tree.root_id().to_string();

    let spec = folder_spec();
    let child_ipns = spec.signing_key.ipns_name().to_string();
    let outcome = tree.create_folder(&root, "docs", spec).unwrap();

    assert_eq!(outcome.intents.len(), 2);
    assert_eq!(outcome.intents[0].ipns_name, child_ipns);
    assert_eq!(
        outcome.intents[1].target,
        IntentTarget::Folder {
            folder_id: root.clone()
        }
    );

    let folder = tree.folder(&root).unwrap();
    assert_eq!(folder.children.len(), 1);
    assert_eq!(folder.children[0].name(), "docs");
}

#[test]
fn test_create_folder_collision_with_file_name() {
    let mut tree = new_tree(None);
    let root = tree.root_id().to_string();
    add_one_file(&mut tree, &root, "report", 1);

    assert!(matches!(
        tree.create_folder(&root, "report", folder_spec()),
        Err(VaultError::NameCollision(_))
    ));
}

#[test]
fn test_create_folder_depth_limit() {
    let mut tree = new_tree(None);
    let mut parent = tree.root_id().to_string();

    // Root is depth 1; nest down to the limit
    for i in 0..(MAX_DEPTH - 1) {
        parent = create_one_folder(&mut tree, &parent, &format!("level-{}", i));
    }
    assert_eq!(tree.depth_of(&parent), MAX_DEPTH);

    assert!(matches!(
        tree.create_folder(&parent, "too-deep", folder_spec()),
        Err(VaultError::MaxDepthExceeded)
    ));
}

// ── rename ───────────────────────────────────────────────────────────────

#[test]
fn test_rename_updates_entry() {
    let mut tree = new_tree(None);
    let root = tree.root_id().to_string();
    let file_id = add_one_file(&mut tree, &root, "old.bin", 1);

    let outcome = tree.rename(&root, &file_id, "new.bin").unwrap();
    assert_eq!(outcome.intents.len(), 1);

    let folder = tree.folder(&root).unwrap();
    assert_eq!(folder.children[0].name(), "new.bin");
}

#[test]
fn test_rename_collision_and_not_found() {
    let mut tree = new_tree(None);
    let root = tree.root_id().to_string();
    let a = add_one_file(&mut tree, &root, "a.bin", 1);
    add_one_file(&mut tree, &root, "b.bin", 1);

    assert!(matches!(
        tree.rename(&root, &a, "b.bin"),
        Err(VaultError::NameCollision(_))
    ));
    assert!(matches!(
        tree.rename(&root, "ghost", "x"),
        Err(VaultError::NotFound(_))
    ));

    // Renaming to its own name is a no-op, not a collision
    assert!(tree.rename(&root, &a, "a.bin").is_ok());
}

// ── move ─────────────────────────────────────────────────────────────────

#[test]
fn test_move_is_destination_first() {
    let mut tree = new_tree(None);
    let root = tree.root_id().to_string();
    let docs = create_one_folder(&mut tree, &root, "docs");
    let file_id = add_one_file(&mut tree, &root, "blob.bin", 10);

    let outcome = tree
        .move_items(&root, &[file_id.clone()], &docs)
        .unwrap();

    // Destination publish intent precedes the source's
    assert_eq!(outcome.intents.len(), 2);
    assert_eq!(
        outcome.intents[0].target,
        IntentTarget::Folder {
            folder_id: docs.clone()
        }
    );
    assert_eq!(
        outcome.intents[1].target,
        IntentTarget::Folder {
            folder_id: root.clone()
        }
    );

    assert!(tree.folder(&docs).unwrap().children.iter().any(|c| c.id() == file_id));
    assert!(!tree.folder(&root).unwrap().children.iter().any(|c| c.id() == file_id));
    assert_eq!(tree.parent_of(&file_id), Some(docs.as_str()));
}

#[test]
fn test_move_folder_into_itself_rejected() {
    let mut tree = new_tree(None);
    let root = tree.root_id().to_string();
    let docs = create_one_folder(&mut tree, &root, "docs");
    let inner = create_one_folder(&mut tree, &docs, "inner");

    assert!(matches!(
        tree.move_items(&root, &[docs.clone()], &docs),
        Err(VaultError::WouldCreateCycle)
    ));
    assert!(matches!(
        tree.move_items(&root, &[docs.clone()], &inner),
        Err(VaultError::WouldCreateCycle)
    ));

    // No folder may end up its own ancestor
    assert!(tree.is_same_or_descendant(&inner, &docs));
    assert!(!tree.is_same_or_descendant(&docs, &inner));
}

#[test]
fn test_move_name_collision_in_destination() {
    let mut tree = new_tree(None);
    let root = tree.root_id().to_string();
    let docs = create_one_folder(&mut tree, &root, "docs");
    let file_id = add_one_file(&mut tree, &root, "blob.bin", 1);
    add_one_file(&mut tree, &docs, "blob.bin", 1);

    assert!(matches!(
        tree.move_items(&root, &[file_id], &docs),
        Err(VaultError::NameCollision(_))
    ));
}

#[test]
fn test_move_depth_check_counts_subtree_height() {
    let mut tree = new_tree(None);
    let root = tree.root_id().to_string();

    // Build a chain at the depth limit
    let mut deep = root.clone();
    for i in 0..(MAX_DEPTH - 1) {
        deep = create_one_folder(&mut tree, &deep, &format!("chain-{}", i));
    }

    // A two-level subtree cannot move under the deepest folder's parent
    let movable = create_one_folder(&mut tree, &root, "movable");
    create_one_folder(&mut tree, &movable, "leaf");
    assert!(matches!(
        tree.move_items(&root, &[movable], &deep),
        Err(VaultError::MaxDepthExceeded)
    ));
}

// ── remove ───────────────────────────────────────────────────────────────

#[test]
fn test_remove_file_schedules_unpin_of_all_versions() {
    let mut tree = new_tree(None);
    let root = tree.root_id().to_string();
    let file_id = add_one_file(&mut tree, &root, "doc.bin", 10);
    tree.update_file(
        &root,
        &file_id,
        UpdatedFileContent {
            cid: "bafy-v2".to_string(),
            content_sha256: "aa".repeat(32),
            file_key_encrypted: "11".to_string(),
            file_iv: "22".to_string(),
            encryption_mode: EncryptionMode::Gcm,
            size: 20,
        },
    )
    .unwrap();
    let meta_name = tree.file(&file_id).unwrap().meta_ipns_name.clone();
    tree.record_published(&meta_name, 2, Some("bafy-meta".to_string()));

    let outcome = tree.remove(&root, &[file_id.clone()]).unwrap();
    assert_eq!(outcome.intents.len(), 1);

    // Current content, the superseded version, and the record envelope
    assert!(outcome.unpins.contains(&"bafy-v2".to_string()));
    assert!(outcome.unpins.contains(&"bafy-doc.bin".to_string()));
    assert!(outcome.unpins.contains(&"bafy-meta".to_string()));

    assert!(tree.file(&file_id).is_none());
    assert_eq!(tree.used_bytes(), 0);
}

#[test]
fn test_remove_folder_detaches_loaded_subtree() {
    let mut tree = new_tree(None);
    let root = tree.root_id().to_string();
    let docs = create_one_folder(&mut tree, &root, "docs");
    let drafts = create_one_folder(&mut tree, &docs, "drafts");
    let file_id = add_one_file(&mut tree, &drafts, "v1.txt", 5);

    let outcome = tree.remove(&root, &[docs.clone()]).unwrap();
    assert!(outcome.unpins.contains(&"bafy-v1.txt".to_string()));
    assert!(tree.folder(&docs).is_none());
    assert!(tree.folder(&drafts).is_none());
    assert!(tree.file(&file_id).is_none());
    assert_eq!(tree.used_bytes(), 0);
}

#[test]
fn test_remove_not_found_is_atomic() {
    let mut tree = new_tree(None);
    let root = tree.root_id().to_string();
    let a = add_one_file(&mut tree, &root, "a.bin", 1);

    assert!(matches!(
        tree.remove(&root, &[a.clone(), "ghost".to_string()]),
        Err(VaultError::NotFound(_))
    ));
    assert!(tree.file(&a).is_some());
}

// ── update / restore ─────────────────────────────────────────────────────

#[test]
fn test_update_file_pushes_version_and_unpins_replaced() {
    let mut tree = new_tree(None);
    let root = tree.root_id().to_string();
    let file_id = add_one_file(&mut tree, &root, "doc.bin", 10);

    let outcome = tree
        .update_file(
            &root,
            &file_id,
            UpdatedFileContent {
                cid: "bafy-new".to_string(),
                content_sha256: "bb".repeat(32),
                file_key_encrypted: "77".to_string(),
                file_iv: "88".to_string(),
                encryption_mode: EncryptionMode::Ctr,
                size: 30,
            },
        )
        .unwrap();

    // Only the file's own record is republished
    assert_eq!(outcome.intents.len(), 1);
    assert!(matches!(
        outcome.intents[0].target,
        IntentTarget::FileRecord { .. }
    ));
    assert_eq!(outcome.unpins, vec!["bafy-doc.bin".to_string()]);

    let file = tree.file(&file_id).unwrap();
    assert_eq!(file.metadata.cid, "bafy-new");
    assert_eq!(file.metadata.encryption_mode, EncryptionMode::Ctr);
    assert_eq!(file.metadata.versions.len(), 1);
    assert_eq!(file.metadata.versions[0].cid, "bafy-doc.bin");
    assert_eq!(tree.used_bytes(), 30);
}

#[test]
fn test_restore_version_swaps_current_and_history() {
    let mut tree = new_tree(None);
    let root = tree.root_id().to_string();
    let file_id = add_one_file(&mut tree, &root, "doc.bin", 10);
    tree.update_file(
        &root,
        &file_id,
        UpdatedFileContent {
            cid: "bafy-new".to_string(),
            content_sha256: "bb".repeat(32),
            file_key_encrypted: "77".to_string(),
            file_iv: "88".to_string(),
            encryption_mode: EncryptionMode::Gcm,
            size: 30,
        },
    )
    .unwrap();

    let outcome = tree.restore_version(&root, &file_id, 0).unwrap();
    assert_eq!(outcome.unpins, vec!["bafy-new".to_string()]);

    let file = tree.file(&file_id).unwrap();
    assert_eq!(file.metadata.cid, "bafy-doc.bin");
    assert_eq!(file.metadata.size, 10);
    // The displaced current took the history slot
    assert_eq!(file.metadata.versions.len(), 1);
    assert_eq!(file.metadata.versions[0].cid, "bafy-new");
    assert_eq!(tree.used_bytes(), 10);
}

#[test]
fn test_restore_version_out_of_range() {
    let mut tree = new_tree(None);
    let root = tree.root_id().to_string();
    let file_id = add_one_file(&mut tree, &root, "doc.bin", 10);

    assert!(matches!(
        tree.restore_version(&root, &file_id, 0),
        Err(VaultError::VersionOutOfRange(0))
    ));
}

// ── rollback ─────────────────────────────────────────────────────────────

#[test]
fn test_rollback_after_add_files() {
    let mut tree = new_tree(None);
    let root = tree.root_id().to_string();
    add_one_file(&mut tree, &root, "keep.bin", 5);

    let outcome = tree
        .add_files(&root, vec![file_spec("volatile.bin", 50)])
        .unwrap();
    assert_eq!(tree.folder(&root).unwrap().children.len(), 2);
    assert_eq!(tree.used_bytes(), 55);

    tree.rollback(outcome.snapshot);
    let folder = tree.folder(&root).unwrap();
    assert_eq!(folder.children.len(), 1);
    assert_eq!(folder.children[0].name(), "keep.bin");
    assert_eq!(tree.used_bytes(), 5);
}

#[test]
fn test_rollback_after_remove_restores_subtree() {
    let mut tree = new_tree(None);
    let root = tree.root_id().to_string();
    let docs = create_one_folder(&mut tree, &root, "docs");
    let file_id = add_one_file(&mut tree, &docs, "v1.txt", 5);

    let outcome = tree.remove(&root, &[docs.clone()]).unwrap();
    assert!(tree.folder(&docs).is_none());

    tree.rollback(outcome.snapshot);
    assert!(tree.folder(&docs).is_some());
    assert!(tree.file(&file_id).is_some());
    assert_eq!(tree.parent_of(&docs), Some(root.as_str()));
    assert_eq!(tree.parent_of(&file_id), Some(docs.as_str()));
    assert_eq!(tree.used_bytes(), 5);
}

#[test]
fn test_rollback_after_update_restores_metadata() {
    let mut tree = new_tree(None);
    let root = tree.root_id().to_string();
    let file_id = add_one_file(&mut tree, &root, "doc.bin", 10);

    let outcome = tree
        .update_file(
            &root,
            &file_id,
            UpdatedFileContent {
                cid: "bafy-new".to_string(),
                content_sha256: "bb".repeat(32),
                file_key_encrypted: "77".to_string(),
                file_iv: "88".to_string(),
                encryption_mode: EncryptionMode::Gcm,
                size: 30,
            },
        )
        .unwrap();

    tree.rollback(outcome.snapshot);
    let file = tree.file(&file_id).unwrap();
    assert_eq!(file.metadata.cid, "bafy-doc.bin");
    assert!(file.metadata.versions.is_empty());
    assert_eq!(tree.used_bytes(), 10);
}

// ── sync integration ─────────────────────────────────────────────────────

#[test]
fn test_apply_remote_children_replaces_and_drops_vanished() {
    let mut tree = new_tree(None);
    let root = tree.root_id().to_string();
    let root_ipns = tree.folder(&root).unwrap().ipns_name.clone();
    let docs = create_one_folder(&mut tree, &root, "docs");

    // Remote envelope no longer contains "docs"
    let remote = vec![FolderChild::File(FilePointer {
        id: "remote-file".to_string(),
        name: "theirs.bin".to_string(),
        file_meta_ipns_name: "k51remote".to_string(),
        created_at: 1,
        modified_at: 2,
    })];
    tree.apply_remote_children(&root_ipns, remote, 7, "bafy-root-7".to_string())
        .unwrap();

    let folder = tree.folder(&root).unwrap();
    assert_eq!(folder.sequence, 7);
    assert_eq!(folder.last_cid.as_deref(), Some("bafy-root-7"));
    assert_eq!(folder.children.len(), 1);
    assert_eq!(folder.children[0].name(), "theirs.bin");

    // The vanished subfolder's loaded state is gone
    assert!(tree.folder(&docs).is_none());
}

#[test]
fn test_record_published_updates_sequence() {
    let mut tree = new_tree(None);
    let root = tree.root_id().to_string();
    let root_ipns = tree.folder(&root).unwrap().ipns_name.clone();

    tree.record_published(&root_ipns, 1, Some("bafy-1".to_string()));
    assert_eq!(tree.folder(&root).unwrap().sequence, 1);

    tree.record_published(&root_ipns, 2, Some("bafy-2".to_string()));
    let folder = tree.folder(&root).unwrap();
    assert_eq!(folder.sequence, 2);
    assert_eq!(folder.last_cid.as_deref(), Some("bafy-2"));
}
