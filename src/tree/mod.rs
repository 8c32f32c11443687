//! In-memory folder tree state.
//!
//! Owns the authoritative folder graph for the current session. Every
//! mutation validates the tree invariants first and only then touches state,
//! so a failed operation leaves the tree exactly as it was. Successful
//! mutations return publish intents (what must be republished, in order) and
//! a snapshot that the caller holds until the publishes land; a fatal publish
//! failure rolls the tree back to the snapshot so the UI never shows state
//! the network refused.
//!
//! The tree holds state only for folders and file records that have been
//! loaded this session; envelope entries may reference unloaded subfolders.
//! Mutations are synchronous and never suspend; callers serialize them under
//! the session's tree lock.

use std::collections::HashMap;

use crate::crypto::folder::{
    EnvelopeTimes, FileMetadata, FilePointer, FileVersion, FolderChild, FolderEntry,
    FolderMetadata,
};
use crate::crypto::utils::{generate_uuid, now_ms};
use crate::error::VaultError;
use crate::keys::{FolderKey, NameKeypair};

/// Maximum folder nesting depth, root at depth 1.
pub const MAX_DEPTH: usize = 20;

/// Loaded state of one folder.
pub struct FolderState {
    pub id: String,
    pub name: String,
    pub ipns_name: String,
    /// Sequence of the last record seen or published for this folder.
    /// 0 means never published / not yet loaded from the network.
    pub sequence: u64,
    /// Envelope CID of the last publish or resolve, for unpin scheduling.
    pub last_cid: Option<String>,
    pub children: Vec<FolderChild>,
    pub created_at: u64,
    pub modified_at: u64,
    folder_key: FolderKey,
    signing_key: NameKeypair,
}

impl FolderState {
    pub fn folder_key(&self) -> &FolderKey {
        &self.folder_key
    }

    pub fn signing_key(&self) -> &NameKeypair {
        &self.signing_key
    }
}

/// Loaded state of one file's own metadata record.
pub struct FileState {
    pub id: String,
    pub meta_ipns_name: String,
    pub sequence: u64,
    pub last_cid: Option<String>,
    pub metadata: FileMetadata,
    signing_key: NameKeypair,
}

impl FileState {
    pub fn signing_key(&self) -> &NameKeypair {
        &self.signing_key
    }
}

/// What a publish intent points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentTarget {
    Folder { folder_id: String },
    FileRecord { file_id: String },
}

/// One pending publish, emitted by a successful mutation.
///
/// Intents for the same mutation are ordered: republishing them in order
/// preserves the destination-first guarantee for moves and child-before-
/// parent for creations.
#[derive(Debug, Clone)]
pub struct PublishIntent {
    pub intent_id: String,
    pub ipns_name: String,
    pub target: IntentTarget,
}

/// Everything a successful mutation hands back to the caller.
pub struct MutationOutcome {
    pub intents: Vec<PublishIntent>,
    /// Content addresses to release on the relay once the publishes land.
    pub unpins: Vec<String>,
    /// Pre-mutation state, held until the publishes succeed.
    pub snapshot: TreeSnapshot,
}

/// Pre-mutation state captured for rollback after a fatal publish failure.
///
/// Detached states are moved in here rather than cloned so key material
/// keeps a single owner; dropping the snapshot (on commit) zeroizes them.
#[derive(Default)]
pub struct TreeSnapshot {
    folder_children: Vec<(String, Vec<FolderChild>, u64)>,
    file_metadata: Vec<(String, FileMetadata)>,
    detached_folders: Vec<FolderState>,
    detached_files: Vec<FileState>,
    detached_parents: Vec<(String, String)>,
    created_folder_ids: Vec<String>,
    created_file_ids: Vec<String>,
    prior_used_bytes: u64,
}

/// Input for one file in `add_files`: content already encrypted, keys
/// already wrapped, per-file record keypair already derived.
pub struct AddFileSpec {
    pub id: String,
    pub name: String,
    pub signing_key: NameKeypair,
    pub metadata: FileMetadata,
}

/// Input for `create_folder`: fresh keys plus their owner-wrapped copies
/// destined for the parent envelope.
pub struct CreateFolderSpec {
    pub id: String,
    pub folder_key: FolderKey,
    pub signing_key: NameKeypair,
    pub folder_key_encrypted: String,
    pub ipns_private_key_encrypted: String,
}

/// Replacement content for `update_file`.
pub struct UpdatedFileContent {
    pub cid: String,
    pub content_sha256: String,
    pub file_key_encrypted: String,
    pub file_iv: String,
    pub encryption_mode: crate::crypto::file::EncryptionMode,
    pub size: u64,
}

pub struct FolderTree {
    root_id: String,
    folders: HashMap<String, FolderState>,
    files: HashMap<String, FileState>,
    /// Child id (folder or file) -> parent folder id, loaded edges only.
    parent_of: HashMap<String, String>,
    quota_bytes: Option<u64>,
    used_bytes: u64,
}

impl FolderTree {
    /// Create a tree with its root folder.
    pub fn new(
        root_ipns_name: String,
        root_folder_key: FolderKey,
        root_signing_key: NameKeypair,
        quota_bytes: Option<u64>,
    ) -> Self {
        let root_id = generate_uuid();
        let now = now_ms();
        let root = FolderState {
            id: root_id.clone(),
            name: String::new(),
            ipns_name: root_ipns_name,
            sequence: 0,
            last_cid: None,
            children: Vec::new(),
            created_at: now,
            modified_at: now,
            folder_key: root_folder_key,
            signing_key: root_signing_key,
        };
        let mut folders = HashMap::new();
        folders.insert(root_id.clone(), root);
        Self {
            root_id,
            folders,
            files: HashMap::new(),
            parent_of: HashMap::new(),
            quota_bytes,
            used_bytes: 0,
        }
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn folder(&self, folder_id: &str) -> Option<&FolderState> {
        self.folders.get(folder_id)
    }

    pub fn file(&self, file_id: &str) -> Option<&FileState> {
        self.files.get(file_id)
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    /// Loaded folder id for a mutable name, if any.
    pub fn folder_id_by_ipns(&self, ipns_name: &str) -> Option<&str> {
        self.folders
            .values()
            .find(|f| f.ipns_name == ipns_name)
            .map(|f| f.id.as_str())
    }

    /// Mutable names of every loaded folder, root first.
    pub fn loaded_folder_names(&self) -> Vec<String> {
        let mut names = vec![self.folders[&self.root_id].ipns_name.clone()];
        names.extend(
            self.folders
                .values()
                .filter(|f| f.id != self.root_id)
                .map(|f| f.ipns_name.clone()),
        );
        names
    }

    /// Snapshot of a loaded folder's key for decrypting a resolved envelope
    /// outside the tree lock. The snapshot is its own owning handle and is
    /// wiped when dropped.
    pub fn folder_key_snapshot(&self, ipns_name: &str) -> Option<FolderKey> {
        self.folders
            .values()
            .find(|f| f.ipns_name == ipns_name)
            .and_then(|f| FolderKey::from_bytes(f.folder_key.as_bytes().to_vec()).ok())
    }

    /// (sequence, last envelope CID) for a loaded folder.
    pub fn folder_sync_state(&self, ipns_name: &str) -> Option<(u64, Option<String>)> {
        self.folders
            .values()
            .find(|f| f.ipns_name == ipns_name)
            .map(|f| (f.sequence, f.last_cid.clone()))
    }

    /// Fresh plaintext envelope for a folder, for sealing at publish time.
    pub fn envelope_for(&self, folder_id: &str) -> Result<FolderMetadata, VaultError> {
        let folder = self
            .folders
            .get(folder_id)
            .ok_or_else(|| VaultError::NotFound(folder_id.to_string()))?;
        Ok(FolderMetadata {
            children: folder.children.clone(),
            metadata: EnvelopeTimes {
                created: folder.created_at,
                modified: folder.modified_at,
            },
        })
    }

    /// Parent folder id of a loaded item.
    pub fn parent_of(&self, item_id: &str) -> Option<&str> {
        self.parent_of.get(item_id).map(String::as_str)
    }

    /// Depth of a loaded folder, root at 1.
    pub fn depth_of(&self, folder_id: &str) -> usize {
        let mut depth = 1;
        let mut current = folder_id;
        while let Some(parent) = self.parent_of.get(current) {
            depth += 1;
            current = parent;
        }
        depth
    }

    /// True when `candidate` is `ancestor` or one of its loaded descendants.
    pub fn is_same_or_descendant(&self, candidate: &str, ancestor: &str) -> bool {
        let mut current = candidate;
        loop {
            if current == ancestor {
                return true;
            }
            match self.parent_of.get(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Height of a folder's loaded subtree (folder alone = 1).
    fn height_of(&self, folder_id: &str) -> usize {
        let mut height = 1;
        if let Some(folder) = self.folders.get(folder_id) {
            for child in &folder.children {
                if let FolderChild::Folder(entry) = child {
                    if self.folders.contains_key(&entry.id) {
                        height = height.max(1 + self.height_of(&entry.id));
                    }
                }
            }
        }
        height
    }

    /// Record a successful publish or resolve: bump the sequence and remember
    /// the envelope CID for later unpin scheduling.
    pub fn record_published(&mut self, ipns_name: &str, sequence: u64, cid: Option<String>) {
        if let Some(folder) = self.folders.values_mut().find(|f| f.ipns_name == ipns_name) {
            folder.sequence = sequence;
            if cid.is_some() {
                folder.last_cid = cid;
            }
            return;
        }
        if let Some(file) = self
            .files
            .values_mut()
            .find(|f| f.meta_ipns_name == ipns_name)
        {
            file.sequence = sequence;
            if cid.is_some() {
                file.last_cid = cid;
            }
        }
    }

    /// Attach a folder loaded from the network under a loaded parent.
    ///
    /// Used by the session/sync engine when the user descends into a
    /// subfolder; the entry must already exist in the parent envelope.
    pub fn register_loaded_folder(
        &mut self,
        parent_id: &str,
        entry_id: &str,
        folder_key: FolderKey,
        signing_key: NameKeypair,
        children: Vec<FolderChild>,
        sequence: u64,
        cid: Option<String>,
    ) -> Result<(), VaultError> {
        let parent = self
            .folders
            .get(parent_id)
            .ok_or_else(|| VaultError::ParentNotFound(parent_id.to_string()))?;
        let entry = parent
            .children
            .iter()
            .find_map(|c| match c {
                FolderChild::Folder(e) if e.id == entry_id => Some(e.clone()),
                _ => None,
            })
            .ok_or_else(|| VaultError::NotFound(entry_id.to_string()))?;

        let state = FolderState {
            id: entry.id.clone(),
            name: entry.name.clone(),
            ipns_name: entry.ipns_name.clone(),
            sequence,
            last_cid: cid,
            children,
            created_at: entry.created_at,
            modified_at: entry.modified_at,
            folder_key,
            signing_key,
        };
        self.folders.insert(entry.id.clone(), state);
        self.parent_of
            .insert(entry.id.clone(), parent_id.to_string());
        Ok(())
    }

    /// Attach a file record loaded from the network under a loaded parent.
    pub fn register_loaded_file(
        &mut self,
        parent_id: &str,
        file_id: &str,
        signing_key: NameKeypair,
        metadata: FileMetadata,
        sequence: u64,
        cid: Option<String>,
    ) -> Result<(), VaultError> {
        let parent = self
            .folders
            .get(parent_id)
            .ok_or_else(|| VaultError::ParentNotFound(parent_id.to_string()))?;
        let pointer = parent
            .children
            .iter()
            .find_map(|c| match c {
                FolderChild::File(p) if p.id == file_id => Some(p.clone()),
                _ => None,
            })
            .ok_or_else(|| VaultError::NotFound(file_id.to_string()))?;

        self.used_bytes += metadata.size;
        let state = FileState {
            id: pointer.id.clone(),
            meta_ipns_name: pointer.file_meta_ipns_name.clone(),
            sequence,
            last_cid: cid,
            metadata,
            signing_key,
        };
        self.files.insert(pointer.id.clone(), state);
        self.parent_of
            .insert(pointer.id.clone(), parent_id.to_string());
        Ok(())
    }

    /// Last-writer-wins replacement of a folder's children from a resolved
    /// remote envelope. Loaded state for children that no longer exist
    /// remotely is discarded.
    pub fn apply_remote_children(
        &mut self,
        ipns_name: &str,
        children: Vec<FolderChild>,
        sequence: u64,
        cid: String,
    ) -> Result<(), VaultError> {
        let folder_id = self
            .folder_id_by_ipns(ipns_name)
            .ok_or_else(|| VaultError::NotFound(ipns_name.to_string()))?
            .to_string();

        let remote_ids: Vec<String> = children.iter().map(|c| c.id().to_string()).collect();

        // Drop loaded state for locally-known children the remote no longer has
        let folder = self.folders.get(&folder_id).expect("folder id resolved above");
        let vanished: Vec<String> = folder
            .children
            .iter()
            .map(|c| c.id().to_string())
            .filter(|id| !remote_ids.contains(id))
            .collect();
        for id in vanished {
            self.detach_subtree(&id, &mut TreeSnapshot::default());
        }

        let folder = self.folders.get_mut(&folder_id).expect("still present");
        folder.children = children;
        folder.sequence = sequence;
        folder.last_cid = Some(cid);
        folder.modified_at = now_ms();
        Ok(())
    }

    // ── Mutations ────────────────────────────────────────────────────────

    /// Insert file pointers for already-encrypted uploads.
    ///
    /// Emits one intent per new file record plus one for the parent, file
    /// records first.
    pub fn add_files(
        &mut self,
        parent_id: &str,
        specs: Vec<AddFileSpec>,
    ) -> Result<MutationOutcome, VaultError> {
        let parent = self
            .folders
            .get(parent_id)
            .ok_or_else(|| VaultError::ParentNotFound(parent_id.to_string()))?;

        // Validate everything before mutating anything
        for (i, spec) in specs.iter().enumerate() {
            if Self::name_taken(&parent.children, &spec.name, None) {
                return Err(VaultError::NameCollision(spec.name.clone()));
            }
            if specs[..i].iter().any(|other| other.name == spec.name) {
                return Err(VaultError::NameCollision(spec.name.clone()));
            }
        }
        let added_bytes: u64 = specs.iter().map(|s| s.metadata.size).sum();
        if let Some(quota) = self.quota_bytes {
            if self.used_bytes + added_bytes > quota {
                return Err(VaultError::QuotaExceeded);
            }
        }

        let mut snapshot = TreeSnapshot {
            prior_used_bytes: self.used_bytes,
            ..Default::default()
        };
        snapshot.folder_children.push((
            parent_id.to_string(),
            parent.children.clone(),
            parent.modified_at,
        ));

        let now = now_ms();
        let mut intents = Vec::with_capacity(specs.len() + 1);

        for spec in specs {
            let meta_ipns_name = spec.signing_key.ipns_name().to_string();
            let pointer = FilePointer {
                id: spec.id.clone(),
                name: spec.name.clone(),
                file_meta_ipns_name: meta_ipns_name.clone(),
                created_at: now,
                modified_at: now,
            };

            self.used_bytes += spec.metadata.size;
            self.files.insert(
                spec.id.clone(),
                FileState {
                    id: spec.id.clone(),
                    meta_ipns_name: meta_ipns_name.clone(),
                    sequence: 0,
                    last_cid: None,
                    metadata: spec.metadata,
                    signing_key: spec.signing_key,
                },
            );
            self.parent_of
                .insert(spec.id.clone(), parent_id.to_string());
            snapshot.created_file_ids.push(spec.id.clone());

            let parent = self.folders.get_mut(parent_id).expect("validated above");
            parent.children.push(FolderChild::File(pointer));

            intents.push(PublishIntent {
                intent_id: generate_uuid(),
                ipns_name: meta_ipns_name,
                target: IntentTarget::FileRecord { file_id: spec.id },
            });
        }

        let parent = self.folders.get_mut(parent_id).expect("validated above");
        parent.modified_at = now;
        intents.push(PublishIntent {
            intent_id: generate_uuid(),
            ipns_name: parent.ipns_name.clone(),
            target: IntentTarget::Folder {
                folder_id: parent_id.to_string(),
            },
        });

        Ok(MutationOutcome {
            intents,
            unpins: Vec::new(),
            snapshot,
        })
    }

    /// Create an empty subfolder.
    ///
    /// Emits intents for the new folder's (empty) envelope and the parent.
    pub fn create_folder(
        &mut self,
        parent_id: &str,
        name: &str,
        spec: CreateFolderSpec,
    ) -> Result<MutationOutcome, VaultError> {
        let parent = self
            .folders
            .get(parent_id)
            .ok_or_else(|| VaultError::ParentNotFound(parent_id.to_string()))?;

        if Self::name_taken(&parent.children, name, None) {
            return Err(VaultError::NameCollision(name.to_string()));
        }
        if self.depth_of(parent_id) + 1 > MAX_DEPTH {
            return Err(VaultError::MaxDepthExceeded);
        }

        let mut snapshot = TreeSnapshot {
            prior_used_bytes: self.used_bytes,
            ..Default::default()
        };
        snapshot.folder_children.push((
            parent_id.to_string(),
            parent.children.clone(),
            parent.modified_at,
        ));

        let now = now_ms();
        let ipns_name = spec.signing_key.ipns_name().to_string();
        let entry = FolderEntry {
            id: spec.id.clone(),
            name: name.to_string(),
            ipns_name: ipns_name.clone(),
            folder_key_encrypted: spec.folder_key_encrypted,
            ipns_private_key_encrypted: spec.ipns_private_key_encrypted,
            created_at: now,
            modified_at: now,
        };

        self.folders.insert(
            spec.id.clone(),
            FolderState {
                id: spec.id.clone(),
                name: name.to_string(),
                ipns_name: ipns_name.clone(),
                sequence: 0,
                last_cid: None,
                children: Vec::new(),
                created_at: now,
                modified_at: now,
                folder_key: spec.folder_key,
                signing_key: spec.signing_key,
            },
        );
        self.parent_of
            .insert(spec.id.clone(), parent_id.to_string());
        snapshot.created_folder_ids.push(spec.id.clone());

        let parent = self.folders.get_mut(parent_id).expect("validated above");
        parent.children.push(FolderChild::Folder(entry));
        parent.modified_at = now;
        let parent_ipns = parent.ipns_name.clone();

        let intents = vec![
            PublishIntent {
                intent_id: generate_uuid(),
                ipns_name,
                target: IntentTarget::Folder {
                    folder_id: spec.id,
                },
            },
            PublishIntent {
                intent_id: generate_uuid(),
                ipns_name: parent_ipns,
                target: IntentTarget::Folder {
                    folder_id: parent_id.to_string(),
                },
            },
        ];

        Ok(MutationOutcome {
            intents,
            unpins: Vec::new(),
            snapshot,
        })
    }

    /// Rename a child within its parent envelope. One intent for the parent.
    pub fn rename(
        &mut self,
        parent_id: &str,
        item_id: &str,
        new_name: &str,
    ) -> Result<MutationOutcome, VaultError> {
        let parent = self
            .folders
            .get(parent_id)
            .ok_or_else(|| VaultError::ParentNotFound(parent_id.to_string()))?;

        if !parent.children.iter().any(|c| c.id() == item_id) {
            return Err(VaultError::NotFound(item_id.to_string()));
        }
        if Self::name_taken(&parent.children, new_name, Some(item_id)) {
            return Err(VaultError::NameCollision(new_name.to_string()));
        }

        let mut snapshot = TreeSnapshot {
            prior_used_bytes: self.used_bytes,
            ..Default::default()
        };
        snapshot.folder_children.push((
            parent_id.to_string(),
            parent.children.clone(),
            parent.modified_at,
        ));

        let now = now_ms();
        let parent = self.folders.get_mut(parent_id).expect("validated above");
        for child in &mut parent.children {
            if child.id() == item_id {
                match child {
                    FolderChild::Folder(entry) => {
                        entry.name = new_name.to_string();
                        entry.modified_at = now;
                    }
                    FolderChild::File(pointer) => {
                        pointer.name = new_name.to_string();
                        pointer.modified_at = now;
                    }
                }
            }
        }
        parent.modified_at = now;
        let parent_ipns = parent.ipns_name.clone();

        if let Some(folder) = self.folders.get_mut(item_id) {
            folder.name = new_name.to_string();
        }

        Ok(MutationOutcome {
            intents: vec![PublishIntent {
                intent_id: generate_uuid(),
                ipns_name: parent_ipns,
                target: IntentTarget::Folder {
                    folder_id: parent_id.to_string(),
                },
            }],
            unpins: Vec::new(),
            snapshot,
        })
    }

    /// Move items between folders.
    ///
    /// The emitted intents are destination-first: if the source publish later
    /// fails, the entries exist in both folders rather than in neither.
    pub fn move_items(
        &mut self,
        source_parent_id: &str,
        item_ids: &[String],
        dest_parent_id: &str,
    ) -> Result<MutationOutcome, VaultError> {
        if source_parent_id == dest_parent_id {
            return Err(VaultError::NameCollision(
                "source and destination are the same folder".to_string(),
            ));
        }
        let source = self
            .folders
            .get(source_parent_id)
            .ok_or_else(|| VaultError::ParentNotFound(source_parent_id.to_string()))?;
        let dest = self
            .folders
            .get(dest_parent_id)
            .ok_or_else(|| VaultError::ParentNotFound(dest_parent_id.to_string()))?;

        let mut moving = Vec::with_capacity(item_ids.len());
        for item_id in item_ids {
            let entry = source
                .children
                .iter()
                .find(|c| c.id() == item_id)
                .ok_or_else(|| VaultError::NotFound(item_id.clone()))?;
            if Self::name_taken(&dest.children, entry.name(), None) {
                return Err(VaultError::NameCollision(entry.name().to_string()));
            }
            if let FolderChild::Folder(_) = entry {
                // A folder must never move under itself or a descendant
                if self.is_same_or_descendant(dest_parent_id, item_id) {
                    return Err(VaultError::WouldCreateCycle);
                }
                let subtree_height = self.height_of(item_id);
                if self.depth_of(dest_parent_id) + subtree_height > MAX_DEPTH {
                    return Err(VaultError::MaxDepthExceeded);
                }
            }
            moving.push(entry.clone());
        }

        let mut snapshot = TreeSnapshot {
            prior_used_bytes: self.used_bytes,
            ..Default::default()
        };
        snapshot.folder_children.push((
            source_parent_id.to_string(),
            source.children.clone(),
            source.modified_at,
        ));
        snapshot.folder_children.push((
            dest_parent_id.to_string(),
            dest.children.clone(),
            dest.modified_at,
        ));

        let now = now_ms();

        // Destination first, then removal from the source
        let dest = self.folders.get_mut(dest_parent_id).expect("validated above");
        for entry in &moving {
            dest.children.push(entry.clone());
        }
        dest.modified_at = now;
        let dest_ipns = dest.ipns_name.clone();

        let source = self
            .folders
            .get_mut(source_parent_id)
            .expect("validated above");
        source
            .children
            .retain(|c| !item_ids.iter().any(|id| id == c.id()));
        source.modified_at = now;
        let source_ipns = source.ipns_name.clone();

        for item_id in item_ids {
            if self.parent_of.contains_key(item_id) {
                self.parent_of
                    .insert(item_id.clone(), dest_parent_id.to_string());
            }
        }

        Ok(MutationOutcome {
            intents: vec![
                PublishIntent {
                    intent_id: generate_uuid(),
                    ipns_name: dest_ipns,
                    target: IntentTarget::Folder {
                        folder_id: dest_parent_id.to_string(),
                    },
                },
                PublishIntent {
                    intent_id: generate_uuid(),
                    ipns_name: source_ipns,
                    target: IntentTarget::Folder {
                        folder_id: source_parent_id.to_string(),
                    },
                },
            ],
            unpins: Vec::new(),
            snapshot,
        })
    }

    /// Remove items from a folder, scheduling unpins for every content
    /// address the removed subtree is known to hold (current file content,
    /// all file versions, and published envelope CIDs of loaded descendants).
    pub fn remove(
        &mut self,
        parent_id: &str,
        item_ids: &[String],
    ) -> Result<MutationOutcome, VaultError> {
        let parent = self
            .folders
            .get(parent_id)
            .ok_or_else(|| VaultError::ParentNotFound(parent_id.to_string()))?;
        for item_id in item_ids {
            if !parent.children.iter().any(|c| c.id() == item_id) {
                return Err(VaultError::NotFound(item_id.clone()));
            }
        }

        let mut snapshot = TreeSnapshot {
            prior_used_bytes: self.used_bytes,
            ..Default::default()
        };
        snapshot.folder_children.push((
            parent_id.to_string(),
            parent.children.clone(),
            parent.modified_at,
        ));

        let now = now_ms();
        let parent = self.folders.get_mut(parent_id).expect("validated above");
        parent
            .children
            .retain(|c| !item_ids.iter().any(|id| id == c.id()));
        parent.modified_at = now;
        let parent_ipns = parent.ipns_name.clone();

        let mut unpins = Vec::new();
        for item_id in item_ids {
            unpins.extend(self.detach_subtree(item_id, &mut snapshot));
        }

        Ok(MutationOutcome {
            intents: vec![PublishIntent {
                intent_id: generate_uuid(),
                ipns_name: parent_ipns,
                target: IntentTarget::Folder {
                    folder_id: parent_id.to_string(),
                },
            }],
            unpins,
            snapshot,
        })
    }

    /// Replace a file's content, pushing the prior tuple into its version
    /// history and scheduling an unpin of the replaced content address.
    ///
    /// Only the file's own record is republished; the parent envelope is
    /// untouched.
    pub fn update_file(
        &mut self,
        parent_id: &str,
        file_id: &str,
        new_content: UpdatedFileContent,
    ) -> Result<MutationOutcome, VaultError> {
        self.expect_file_in_parent(parent_id, file_id)?;

        let file = self.files.get(file_id).expect("checked above");
        if let Some(quota) = self.quota_bytes {
            let adjusted = self.used_bytes - file.metadata.size + new_content.size;
            if adjusted > quota {
                return Err(VaultError::QuotaExceeded);
            }
        }

        let mut snapshot = TreeSnapshot {
            prior_used_bytes: self.used_bytes,
            ..Default::default()
        };
        snapshot
            .file_metadata
            .push((file_id.to_string(), file.metadata.clone()));

        let now = now_ms();
        let replaced_cid = file.metadata.cid.clone();
        let old_size = file.metadata.size;

        let file = self.files.get_mut(file_id).expect("checked above");
        let prior = FileVersion {
            cid: file.metadata.cid.clone(),
            content_sha256: file.metadata.content_sha256.clone(),
            file_key_encrypted: file.metadata.file_key_encrypted.clone(),
            file_iv: file.metadata.file_iv.clone(),
            encryption_mode: file.metadata.encryption_mode,
            size: file.metadata.size,
            timestamp: file.metadata.modified_at,
        };
        file.metadata.versions.push(prior);
        file.metadata.cid = new_content.cid;
        file.metadata.content_sha256 = new_content.content_sha256;
        file.metadata.file_key_encrypted = new_content.file_key_encrypted;
        file.metadata.file_iv = new_content.file_iv;
        file.metadata.encryption_mode = new_content.encryption_mode;
        file.metadata.size = new_content.size;
        file.metadata.modified_at = now;
        let meta_ipns = file.meta_ipns_name.clone();

        self.used_bytes = self.used_bytes - old_size + file.metadata.size;

        Ok(MutationOutcome {
            intents: vec![PublishIntent {
                intent_id: generate_uuid(),
                ipns_name: meta_ipns,
                target: IntentTarget::FileRecord {
                    file_id: file_id.to_string(),
                },
            }],
            unpins: vec![replaced_cid],
            snapshot,
        })
    }

    /// Swap a file's current content with one of its history entries.
    /// Symmetric with `update_file`.
    pub fn restore_version(
        &mut self,
        parent_id: &str,
        file_id: &str,
        version_index: usize,
    ) -> Result<MutationOutcome, VaultError> {
        self.expect_file_in_parent(parent_id, file_id)?;

        let file = self.files.get(file_id).expect("checked above");
        if version_index >= file.metadata.versions.len() {
            return Err(VaultError::VersionOutOfRange(version_index));
        }

        let mut snapshot = TreeSnapshot {
            prior_used_bytes: self.used_bytes,
            ..Default::default()
        };
        snapshot
            .file_metadata
            .push((file_id.to_string(), file.metadata.clone()));

        let now = now_ms();
        let old_size = file.metadata.size;
        let replaced_cid = file.metadata.cid.clone();

        let file = self.files.get_mut(file_id).expect("checked above");
        let displaced = FileVersion {
            cid: file.metadata.cid.clone(),
            content_sha256: file.metadata.content_sha256.clone(),
            file_key_encrypted: file.metadata.file_key_encrypted.clone(),
            file_iv: file.metadata.file_iv.clone(),
            encryption_mode: file.metadata.encryption_mode,
            size: file.metadata.size,
            timestamp: now,
        };
        let restored = std::mem::replace(&mut file.metadata.versions[version_index], displaced);
        file.metadata.cid = restored.cid;
        file.metadata.content_sha256 = restored.content_sha256;
        file.metadata.file_key_encrypted = restored.file_key_encrypted;
        file.metadata.file_iv = restored.file_iv;
        file.metadata.encryption_mode = restored.encryption_mode;
        file.metadata.size = restored.size;
        file.metadata.modified_at = now;
        let meta_ipns = file.meta_ipns_name.clone();

        self.used_bytes = self.used_bytes - old_size + file.metadata.size;

        Ok(MutationOutcome {
            intents: vec![PublishIntent {
                intent_id: generate_uuid(),
                ipns_name: meta_ipns,
                target: IntentTarget::FileRecord {
                    file_id: file_id.to_string(),
                },
            }],
            unpins: vec![replaced_cid],
            snapshot,
        })
    }

    // ── Snapshot lifecycle ───────────────────────────────────────────────

    /// Restore the tree to the state captured in a snapshot. Called after a
    /// fatal publish failure; the in-memory tree is the UI's source of truth
    /// and must not keep state the network refused.
    pub fn rollback(&mut self, snapshot: TreeSnapshot) {
        for id in &snapshot.created_file_ids {
            self.files.remove(id);
            self.parent_of.remove(id);
        }
        for id in &snapshot.created_folder_ids {
            self.folders.remove(id);
            self.parent_of.remove(id);
        }

        for folder in snapshot.detached_folders {
            self.folders.insert(folder.id.clone(), folder);
        }
        for file in snapshot.detached_files {
            self.files.insert(file.id.clone(), file);
        }
        for (child, parent) in snapshot.detached_parents {
            self.parent_of.insert(child, parent);
        }

        for (folder_id, children, modified_at) in snapshot.folder_children {
            if let Some(folder) = self.folders.get_mut(&folder_id) {
                folder.children = children;
                folder.modified_at = modified_at;
            }
        }
        for (file_id, metadata) in snapshot.file_metadata {
            if let Some(file) = self.files.get_mut(&file_id) {
                file.metadata = metadata;
            }
        }

        self.used_bytes = snapshot.prior_used_bytes;
        log::info!("Folder tree rolled back to pre-publish snapshot");
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    fn name_taken(children: &[FolderChild], name: &str, excluding: Option<&str>) -> bool {
        children
            .iter()
            .any(|c| c.name() == name && excluding != Some(c.id()))
    }

    fn expect_file_in_parent(&self, parent_id: &str, file_id: &str) -> Result<(), VaultError> {
        let parent = self
            .folders
            .get(parent_id)
            .ok_or_else(|| VaultError::ParentNotFound(parent_id.to_string()))?;
        let in_parent = parent
            .children
            .iter()
            .any(|c| matches!(c, FolderChild::File(p) if p.id == file_id));
        if !in_parent || !self.files.contains_key(file_id) {
            return Err(VaultError::NotFound(file_id.to_string()));
        }
        Ok(())
    }

    /// Detach an item's loaded subtree, moving states into the snapshot and
    /// collecting every known content address for unpinning.
    fn detach_subtree(&mut self, item_id: &str, snapshot: &mut TreeSnapshot) -> Vec<String> {
        let mut unpins = Vec::new();

        // Explicit work queue, no recursion
        let mut queue = vec![item_id.to_string()];
        while let Some(id) = queue.pop() {
            if let Some(file) = self.files.remove(&id) {
                self.used_bytes = self.used_bytes.saturating_sub(file.metadata.size);
                unpins.push(file.metadata.cid.clone());
                unpins.extend(file.metadata.versions.iter().map(|v| v.cid.clone()));
                if let Some(cid) = &file.last_cid {
                    unpins.push(cid.clone());
                }
                if let Some(parent) = self.parent_of.remove(&id) {
                    snapshot.detached_parents.push((id, parent));
                }
                snapshot.detached_files.push(file);
                continue;
            }
            if let Some(folder) = self.folders.remove(&id) {
                if let Some(cid) = &folder.last_cid {
                    unpins.push(cid.clone());
                }
                for child in &folder.children {
                    queue.push(child.id().to_string());
                }
                if let Some(parent) = self.parent_of.remove(&id) {
                    snapshot.detached_parents.push((id, parent));
                }
                snapshot.detached_folders.push(folder);
            }
        }

        unpins
    }
}

#[cfg(test)]
mod tests;
