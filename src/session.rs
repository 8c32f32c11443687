//! Vault session: the single value that owns the user's keys and wires the
//! tree, publish pipeline, and sync engine together.
//!
//! Created at login with the secp256k1 keypair received from the identity
//! service; the private half lives only inside this value and is wiped on
//! logout. Every public entry point threads through here, write paths take
//! `&self` and serialize on the internal locks.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use zeroize::Zeroize;

use crate::api::types::{ShareRecord, TeeKeysResponse, VaultInitRequest};
use crate::api::{self, ApiClient, RelayStore};
use crate::crypto::file::select_mode;
use crate::crypto::folder::{FileMetadata, FolderChild, FolderEntry};
use crate::crypto::utils::{bytes_to_hex, generate_uuid, now_ms, sha256};
use crate::crypto::{self, ecies, hkdf};
use crate::error::VaultError;
use crate::keys::{FolderKey, NameKeypair};
use crate::publish::{PublishJob, PublishOutcome, PublishPipeline, TeeRepublishKey};
use crate::share::{self, PreparedShare, ReadAuthority};
use crate::sync::{SyncEngine, SyncEvent};
use crate::tree::{
    AddFileSpec, CreateFolderSpec, FolderTree, IntentTarget, MutationOutcome, PublishIntent,
    UpdatedFileContent,
};

/// Session-wide configuration. Everything has a usable default except the
/// relay URL.
#[derive(Clone)]
pub struct VaultConfig {
    pub api_base_url: String,
    pub sync_interval: Duration,
    pub publish_retry_schedule: Vec<Duration>,
    /// Optional client-side cap on the sum of original file sizes.
    pub quota_bytes: Option<u64>,
    /// Streamable media (audio/video) uses CTR when enabled.
    pub streaming_enabled: bool,
}

impl VaultConfig {
    pub fn new(api_base_url: &str) -> Self {
        Self {
            api_base_url: api_base_url.to_string(),
            sync_interval: crate::sync::SYNC_INTERVAL,
            publish_retry_schedule: crate::publish::default_retry_schedule(),
            quota_bytes: None,
            streaming_enabled: true,
        }
    }
}

/// One file handed to `upload_files`.
pub struct UploadInput {
    pub name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

pub struct VaultSession {
    config: VaultConfig,
    api: Arc<ApiClient>,
    private_key: Vec<u8>,
    public_key: Vec<u8>,
    tree: Option<Arc<StdMutex<FolderTree>>>,
    pipeline: Arc<PublishPipeline>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
    tee_keys: Option<TeeKeysResponse>,
    root_ipns_name: Option<String>,
}

impl VaultSession {
    /// Start a session with the keypair received from the identity service.
    ///
    /// The private key is taken by value and owned here until `logout`.
    pub async fn login(
        config: VaultConfig,
        mut private_key: Vec<u8>,
        access_token: Option<String>,
    ) -> Result<Self, VaultError> {
        if private_key.len() != ecies::SECP256K1_PRIVATE_KEY_SIZE {
            private_key.zeroize();
            return Err(VaultError::MalformedCiphertext);
        }
        let public_key = ecies::derive_public_key(&private_key)?;

        let api = Arc::new(ApiClient::new(&config.api_base_url));
        if let Some(token) = access_token {
            api.set_access_token(token).await;
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let pipeline = Arc::new(PublishPipeline::with_retry_schedule(
            cancel_rx.clone(),
            config.publish_retry_schedule.clone(),
        ));

        Ok(Self {
            config,
            api,
            private_key,
            public_key,
            tree: None,
            pipeline,
            cancel_tx,
            cancel_rx,
            tee_keys: None,
            root_ipns_name: None,
        })
    }

    /// Uncompressed public key of the logged-in user.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn root_ipns_name(&self) -> Option<&str> {
        self.root_ipns_name.as_deref()
    }

    /// TEE key material announced by the relay at vault load, if any.
    pub fn tee_keys(&self) -> Option<&TeeKeysResponse> {
        self.tee_keys.as_ref()
    }

    /// Create a fresh vault: derive the root name keypair, generate the root
    /// folder key, register both (owner-wrapped) with the relay, and publish
    /// the empty root envelope at sequence 1.
    pub async fn initialize_vault(&mut self) -> Result<(), VaultError> {
        let user_key: [u8; 32] = self.private_key_array()?;
        let derived = hkdf::derive_vault_ipns_keypair(&user_key)?;
        let root_signing = NameKeypair::from_parts(derived.public_key, derived.private_key)?;
        let root_key = FolderKey::generate();

        let request = VaultInitRequest {
            public_key: bytes_to_hex(&self.public_key),
            encrypted_root_folder_key: hex::encode(root_key.wrap_for_owner(&self.public_key)?),
            encrypted_root_ipns_private_key: hex::encode(
                root_signing.wrap_for_owner(&self.public_key)?,
            ),
            root_ipns_name: derived.ipns_name.clone(),
        };
        api::vault::initialize_vault(&self.api, &request).await?;

        self.root_ipns_name = Some(derived.ipns_name.clone());
        let tree = FolderTree::new(
            derived.ipns_name.clone(),
            root_key,
            root_signing,
            self.config.quota_bytes,
        );
        let root_id = tree.root_id().to_string();
        let tree = Arc::new(StdMutex::new(tree));
        self.tree = Some(tree.clone());

        // First publish of the empty root envelope (seq 1)
        let intent = PublishIntent {
            intent_id: generate_uuid(),
            ipns_name: derived.ipns_name,
            target: IntentTarget::Folder { folder_id: root_id },
        };
        let outcomes = self.publish_intents(&[intent]).await.map_err(|e| {
            log::error!("Initial root publish failed: {}", e);
            e
        })?;
        self.commit_outcomes(&outcomes);
        log::info!("Vault initialized");
        Ok(())
    }

    /// Load an existing vault: fetch and unwrap the root keys, adopt the TEE
    /// republishing key, and seed the tree. The first sync cycle fills in
    /// the children.
    pub async fn load_vault(&mut self) -> Result<(), VaultError> {
        let vault = api::vault::fetch_vault(&self.api).await?;

        let wrapped_key = hex::decode(&vault.encrypted_root_folder_key)
            .map_err(|_| VaultError::MalformedCiphertext)?;
        let root_key = FolderKey::unwrap_with(&wrapped_key, &self.private_key)?;

        let wrapped_signing = hex::decode(&vault.encrypted_root_ipns_private_key)
            .map_err(|_| VaultError::MalformedCiphertext)?;
        let root_signing = NameKeypair::unwrap_with(&wrapped_signing, &self.private_key)?;

        if root_signing.ipns_name() != vault.root_ipns_name {
            log::error!("Root signing key does not match the vault's mutable name");
            return Err(VaultError::AuthFailure);
        }

        if let Some(ref tee) = vault.tee_keys {
            let public_key = hex::decode(&tee.current_public_key)
                .map_err(|_| VaultError::MalformedCiphertext)?;
            self.pipeline.set_tee_key(Some(TeeRepublishKey {
                public_key,
                epoch: tee.current_epoch,
            }));
        }
        self.tee_keys = vault.tee_keys;

        self.root_ipns_name = Some(vault.root_ipns_name.clone());
        self.tree = Some(Arc::new(StdMutex::new(FolderTree::new(
            vault.root_ipns_name,
            root_key,
            root_signing,
            self.config.quota_bytes,
        ))));
        log::info!("Vault keys decrypted and session ready");
        Ok(())
    }

    /// Spawn the background sync engine. Returns the manual-trigger handle
    /// and the event stream.
    pub fn spawn_sync(
        &self,
    ) -> Result<(mpsc::Sender<()>, mpsc::UnboundedReceiver<SyncEvent>), VaultError> {
        let tree = self.tree()?;
        let (mut engine, sync_now, events) =
            SyncEngine::with_interval(tree, self.cancel_rx.clone(), self.config.sync_interval);
        let relay = self.api.clone();
        tokio::spawn(async move {
            engine.run(relay).await;
        });
        Ok((sync_now, events))
    }

    // ── Folder tree operations ───────────────────────────────────────────

    /// Encrypt, upload, and register files under a parent folder.
    pub async fn upload_files(
        &self,
        parent_id: &str,
        uploads: Vec<UploadInput>,
    ) -> Result<Vec<String>, VaultError> {
        let user_key = self.private_key_array()?;
        let mut specs = Vec::with_capacity(uploads.len());

        for upload in uploads {
            let mode = select_mode(&upload.mime_type, self.config.streaming_enabled);
            let encrypted = crypto::file::encrypt_file(&upload.content, &self.public_key, mode)?;
            let cid = self.api.add(encrypted.ciphertext.clone()).await?;

            let file_id = generate_uuid();
            let derived = hkdf::derive_file_ipns_keypair(&user_key, &file_id)?;
            let signing_key = NameKeypair::from_parts(derived.public_key, derived.private_key)?;

            let now = now_ms();
            specs.push(AddFileSpec {
                id: file_id,
                name: upload.name.clone(),
                signing_key,
                metadata: FileMetadata {
                    cid,
                    content_sha256: hex::encode(sha256(&encrypted.ciphertext)),
                    file_key_encrypted: hex::encode(&encrypted.wrapped_file_key),
                    file_iv: hex::encode(&encrypted.iv),
                    encryption_mode: mode,
                    size: encrypted.original_size,
                    name: upload.name,
                    mime_type: upload.mime_type,
                    created_at: now,
                    modified_at: now,
                    versions: Vec::new(),
                },
            });
        }

        let ids: Vec<String> = specs.iter().map(|s| s.id.clone()).collect();
        let outcome = {
            let tree = self.tree()?;
            let mut tree = tree.lock().expect("tree lock");
            tree.add_files(parent_id, specs)?
        };
        self.apply_outcome(outcome).await?;
        Ok(ids)
    }

    /// Create an empty subfolder with fresh independent keys.
    pub async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String, VaultError> {
        let folder_key = FolderKey::generate();
        let signing_key = NameKeypair::generate()?;
        let spec = CreateFolderSpec {
            id: generate_uuid(),
            folder_key_encrypted: hex::encode(folder_key.wrap_for_owner(&self.public_key)?),
            ipns_private_key_encrypted: hex::encode(
                signing_key.wrap_for_owner(&self.public_key)?,
            ),
            folder_key,
            signing_key,
        };
        let folder_id = spec.id.clone();

        let outcome = {
            let tree = self.tree()?;
            let mut tree = tree.lock().expect("tree lock");
            tree.create_folder(parent_id, name, spec)?
        };
        self.apply_outcome(outcome).await?;
        Ok(folder_id)
    }

    pub async fn rename(
        &self,
        parent_id: &str,
        item_id: &str,
        new_name: &str,
    ) -> Result<(), VaultError> {
        let outcome = {
            let tree = self.tree()?;
            let mut tree = tree.lock().expect("tree lock");
            tree.rename(parent_id, item_id, new_name)?
        };
        self.apply_outcome(outcome).await
    }

    pub async fn move_items(
        &self,
        source_parent_id: &str,
        item_ids: &[String],
        dest_parent_id: &str,
    ) -> Result<(), VaultError> {
        let outcome = {
            let tree = self.tree()?;
            let mut tree = tree.lock().expect("tree lock");
            tree.move_items(source_parent_id, item_ids, dest_parent_id)?
        };
        self.apply_outcome(outcome).await
    }

    pub async fn remove(&self, parent_id: &str, item_ids: &[String]) -> Result<(), VaultError> {
        let outcome = {
            let tree = self.tree()?;
            let mut tree = tree.lock().expect("tree lock");
            tree.remove(parent_id, item_ids)?
        };
        self.apply_outcome(outcome).await
    }

    /// Re-encrypt a file with fresh key material and replace its record.
    pub async fn update_file(
        &self,
        parent_id: &str,
        file_id: &str,
        content: Vec<u8>,
        mime_type: &str,
    ) -> Result<(), VaultError> {
        let mode = select_mode(mime_type, self.config.streaming_enabled);
        let encrypted = crypto::file::encrypt_file(&content, &self.public_key, mode)?;
        let cid = self.api.add(encrypted.ciphertext.clone()).await?;

        let outcome = {
            let tree = self.tree()?;
            let mut tree = tree.lock().expect("tree lock");
            tree.update_file(
                parent_id,
                file_id,
                UpdatedFileContent {
                    cid,
                    content_sha256: hex::encode(sha256(&encrypted.ciphertext)),
                    file_key_encrypted: hex::encode(&encrypted.wrapped_file_key),
                    file_iv: hex::encode(&encrypted.iv),
                    encryption_mode: mode,
                    size: encrypted.original_size,
                },
            )?
        };
        self.apply_outcome(outcome).await
    }

    pub async fn restore_version(
        &self,
        parent_id: &str,
        file_id: &str,
        version_index: usize,
    ) -> Result<(), VaultError> {
        let outcome = {
            let tree = self.tree()?;
            let mut tree = tree.lock().expect("tree lock");
            tree.restore_version(parent_id, file_id, version_index)?
        };
        self.apply_outcome(outcome).await
    }

    // ── Read paths ───────────────────────────────────────────────────────

    /// Descend into a subfolder: unwrap its keys from the parent envelope,
    /// fetch and decrypt its envelope, and attach it to the loaded tree.
    pub async fn open_folder(&self, parent_id: &str, folder_id: &str) -> Result<(), VaultError> {
        let entry = self.folder_entry(parent_id, folder_id)?;

        let folder_key = {
            let wrapped = hex::decode(&entry.folder_key_encrypted)
                .map_err(|_| VaultError::MalformedCiphertext)?;
            FolderKey::unwrap_with(&wrapped, &self.private_key)?
        };
        let signing_key = {
            let wrapped = hex::decode(&entry.ipns_private_key_encrypted)
                .map_err(|_| VaultError::MalformedCiphertext)?;
            NameKeypair::unwrap_with(&wrapped, &self.private_key)?
        };

        // A folder created this session may not be published yet
        let (children, sequence, cid) =
            match self.api.resolve(&entry.ipns_name).await? {
                Some(resolved) => {
                    let sealed = self.api.fetch(&resolved.cid).await?;
                    let metadata =
                        crypto::folder::decrypt_folder_metadata(&sealed, folder_key.as_bytes())?;
                    (metadata.children, resolved.sequence_number, Some(resolved.cid))
                }
                None => (Vec::new(), 0, None),
            };

        let tree = self.tree()?;
        let mut tree = tree.lock().expect("tree lock");
        tree.register_loaded_folder(
            parent_id,
            folder_id,
            folder_key,
            signing_key,
            children,
            sequence,
            cid,
        )
    }

    /// Load a file's metadata record under a loaded parent folder.
    pub async fn open_file_record(&self, parent_id: &str, file_id: &str) -> Result<(), VaultError> {
        let (pointer, parent_key) = {
            let tree = self.tree()?;
            let tree = tree.lock().expect("tree lock");
            let parent = tree
                .folder(parent_id)
                .ok_or_else(|| VaultError::ParentNotFound(parent_id.to_string()))?;
            let pointer = parent
                .children
                .iter()
                .find_map(|c| match c {
                    FolderChild::File(p) if p.id == file_id => Some(p.clone()),
                    _ => None,
                })
                .ok_or_else(|| VaultError::NotFound(file_id.to_string()))?;
            let key = tree
                .folder_key_snapshot(&parent.ipns_name)
                .ok_or_else(|| VaultError::NotFound(parent_id.to_string()))?;
            (pointer, key)
        };

        let resolved = self
            .api
            .resolve(&pointer.file_meta_ipns_name)
            .await?
            .ok_or_else(|| VaultError::NotFound(pointer.file_meta_ipns_name.clone()))?;
        let sealed = self.api.fetch(&resolved.cid).await?;
        let metadata = crypto::folder::decrypt_file_metadata(&sealed, parent_key.as_bytes())?;

        let user_key = self.private_key_array()?;
        let derived = hkdf::derive_file_ipns_keypair(&user_key, file_id)?;
        let signing_key = NameKeypair::from_parts(derived.public_key, derived.private_key)?;

        let tree = self.tree()?;
        let mut tree = tree.lock().expect("tree lock");
        tree.register_loaded_file(
            parent_id,
            file_id,
            signing_key,
            metadata,
            resolved.sequence_number,
            Some(resolved.cid),
        )
    }

    /// Download and decrypt a loaded file's current content.
    pub async fn download_file(&self, file_id: &str) -> Result<crypto::PlaintextHandle, VaultError> {
        let metadata = {
            let tree = self.tree()?;
            let tree = tree.lock().expect("tree lock");
            tree.file(file_id)
                .ok_or_else(|| VaultError::NotFound(file_id.to_string()))?
                .metadata
                .clone()
        };
        let authority = ReadAuthority::Owner {
            user_private_key: &self.private_key,
        };
        share::read_file(self.api.as_ref(), &authority, file_id, &metadata).await
    }

    // ── Shares ───────────────────────────────────────────────────────────

    /// Share a folder subtree with a recipient. Returns the share id.
    pub async fn share_folder(
        &self,
        parent_id: &str,
        folder_id: &str,
        recipient_public_key: &[u8],
    ) -> Result<String, VaultError> {
        let entry = self.folder_entry(parent_id, folder_id)?;
        let prepared = share::create_folder_share(
            self.api.as_ref(),
            &entry,
            &self.private_key,
            recipient_public_key,
            &self.cancel_rx,
        )
        .await?;
        self.submit_share(prepared, recipient_public_key).await
    }

    /// Share a single file with a recipient. Returns the share id.
    pub async fn share_file(
        &self,
        parent_id: &str,
        file_id: &str,
        recipient_public_key: &[u8],
    ) -> Result<String, VaultError> {
        let (pointer, parent_key) = {
            let tree = self.tree()?;
            let tree = tree.lock().expect("tree lock");
            let parent = tree
                .folder(parent_id)
                .ok_or_else(|| VaultError::ParentNotFound(parent_id.to_string()))?;
            let pointer = parent
                .children
                .iter()
                .find_map(|c| match c {
                    FolderChild::File(p) if p.id == file_id => Some(p.clone()),
                    _ => None,
                })
                .ok_or_else(|| VaultError::NotFound(file_id.to_string()))?;
            let key = tree
                .folder_key_snapshot(&parent.ipns_name)
                .ok_or_else(|| VaultError::NotFound(parent_id.to_string()))?;
            (pointer, key)
        };

        let prepared = share::create_file_share(
            self.api.as_ref(),
            &pointer,
            &parent_key,
            &self.private_key,
            recipient_public_key,
        )
        .await?;
        self.submit_share(prepared, recipient_public_key).await
    }

    pub async fn shares_sent(&self) -> Result<Vec<ShareRecord>, VaultError> {
        api::shares::list_sent(&self.api).await
    }

    pub async fn shares_received(&self) -> Result<Vec<ShareRecord>, VaultError> {
        api::shares::list_received(&self.api).await
    }

    /// Revoke a share. Index mutation only; no re-encryption happens.
    pub async fn revoke_share(&self, share_id: &str) -> Result<(), VaultError> {
        api::shares::revoke_share(&self.api, share_id).await
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// End the session: cancel in-flight work, drop the tree (zeroizing
    /// every folder and signing key it owns), and wipe the user keypair.
    pub async fn logout(&mut self) {
        let _ = self.cancel_tx.send(true);
        self.tree = None;
        self.tee_keys = None;
        self.root_ipns_name = None;
        self.private_key.zeroize();
        self.public_key.zeroize();
        self.api.clear_access_token().await;
        log::info!("Session closed, key material wiped");
    }

    /// Whether the private key has been wiped.
    pub fn is_logged_out(&self) -> bool {
        self.private_key.iter().all(|&b| b == 0)
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn tree(&self) -> Result<Arc<StdMutex<FolderTree>>, VaultError> {
        self.tree.clone().ok_or(VaultError::NoSession)
    }

    fn private_key_array(&self) -> Result<[u8; 32], VaultError> {
        self.private_key
            .as_slice()
            .try_into()
            .map_err(|_| VaultError::NoSession)
    }

    fn folder_entry(&self, parent_id: &str, folder_id: &str) -> Result<FolderEntry, VaultError> {
        let tree = self.tree()?;
        let tree = tree.lock().expect("tree lock");
        let parent = tree
            .folder(parent_id)
            .ok_or_else(|| VaultError::ParentNotFound(parent_id.to_string()))?;
        parent
            .children
            .iter()
            .find_map(|c| match c {
                FolderChild::Folder(e) if e.id == folder_id => Some(e.clone()),
                _ => None,
            })
            .ok_or_else(|| VaultError::NotFound(folder_id.to_string()))
    }

    /// Publish a mutation's intents in order; on fatal failure roll the tree
    /// back to the snapshot, otherwise commit and schedule unpins.
    async fn apply_outcome(&self, outcome: MutationOutcome) -> Result<(), VaultError> {
        let MutationOutcome {
            intents,
            unpins,
            snapshot,
        } = outcome;

        match self.publish_intents(&intents).await {
            Ok(outcomes) => {
                self.commit_outcomes(&outcomes);
                for cid in unpins {
                    if let Err(e) = self.api.unpin(&cid).await {
                        log::warn!("Unpin of {} failed: {}", cid, e);
                    }
                }
                Ok(())
            }
            Err(error) => {
                if let Ok(tree) = self.tree() {
                    tree.lock().expect("tree lock").rollback(snapshot);
                }
                Err(error)
            }
        }
    }

    /// Materialize jobs for the intents, enqueue them, and pump each name
    /// in intent order.
    async fn publish_intents(
        &self,
        intents: &[PublishIntent],
    ) -> Result<Vec<PublishOutcome>, VaultError> {
        let mut names = Vec::new();
        {
            let tree = self.tree()?;
            let tree = tree.lock().expect("tree lock");
            for intent in intents {
                let job = self.materialize(&tree, intent)?;
                self.pipeline.enqueue(job);
                if !names.contains(&intent.ipns_name) {
                    names.push(intent.ipns_name.clone());
                }
            }
        }

        let mut outcomes = Vec::new();
        for name in names {
            let pumped = self
                .pipeline
                .pump_name(self.api.as_ref(), &name)
                .await
                .map_err(|failure| {
                    log::error!(
                        "Publish of {} failed fatally: {}",
                        failure.ipns_name,
                        failure.error
                    );
                    failure.error
                })?;
            outcomes.extend(pumped);
        }
        Ok(outcomes)
    }

    fn materialize(&self, tree: &FolderTree, intent: &PublishIntent) -> Result<PublishJob, VaultError> {
        match &intent.target {
            IntentTarget::Folder { folder_id } => {
                let envelope = tree.envelope_for(folder_id)?;
                let plaintext = serde_json::to_vec(&envelope)
                    .map_err(|_| VaultError::MalformedMetadata)?;
                let folder = tree
                    .folder(folder_id)
                    .ok_or_else(|| VaultError::NotFound(folder_id.clone()))?;
                Ok(PublishJob::new(
                    intent.intent_id.clone(),
                    intent.ipns_name.clone(),
                    plaintext,
                    *folder.folder_key().as_bytes(),
                    *folder.signing_key().private_key(),
                ))
            }
            IntentTarget::FileRecord { file_id } => {
                let file = tree
                    .file(file_id)
                    .ok_or_else(|| VaultError::NotFound(file_id.clone()))?;
                let parent_id = tree
                    .parent_of(file_id)
                    .ok_or_else(|| VaultError::NotFound(file_id.clone()))?;
                let parent = tree
                    .folder(parent_id)
                    .ok_or_else(|| VaultError::ParentNotFound(parent_id.to_string()))?;
                let plaintext = serde_json::to_vec(&file.metadata)
                    .map_err(|_| VaultError::MalformedMetadata)?;
                Ok(PublishJob::new(
                    intent.intent_id.clone(),
                    intent.ipns_name.clone(),
                    plaintext,
                    *parent.folder_key().as_bytes(),
                    *file.signing_key().private_key(),
                ))
            }
        }
    }

    fn commit_outcomes(&self, outcomes: &[PublishOutcome]) {
        if let Ok(tree) = self.tree() {
            let mut tree = tree.lock().expect("tree lock");
            for outcome in outcomes {
                tree.record_published(
                    &outcome.ipns_name,
                    outcome.sequence,
                    Some(outcome.cid.clone()),
                );
            }
        }
    }

    async fn submit_share(
        &self,
        prepared: PreparedShare,
        recipient_public_key: &[u8],
    ) -> Result<String, VaultError> {
        let request = prepared.into_request(recipient_public_key);
        let share_id = api::shares::create_share(&self.api, &request).await?;
        log::info!("Share {} registered", share_id);
        Ok(share_id)
    }
}

impl Drop for VaultSession {
    fn drop(&mut self) {
        let _ = self.cancel_tx.send(true);
        self.private_key.zeroize();
    }
}
