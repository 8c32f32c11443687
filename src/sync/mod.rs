//! Background sync engine.
//!
//! Polls the relay every 30 seconds (or on manual trigger) for every folder
//! the session currently has loaded, compares the resolved sequence number
//! with the in-memory one, and on a strictly greater sequence fetches and
//! decrypts the envelope and replaces the children list (last writer wins).
//! Equal sequences with a diverging CID mean two devices published the same
//! sequence number; the remote copy is refetched and wins.
//!
//! All loaded folders are checked each cycle, so a change applied to a
//! parent is followed by checks of its loaded subfolders in the same pass.
//! Resolves are idempotent; decryption works on a key snapshot taken under
//! the tree lock and wiped after use.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::api::RelayStore;
use crate::crypto::folder;
use crate::error::VaultError;
use crate::tree::FolderTree;

/// Default polling interval.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Notifications emitted toward the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A folder's children were replaced from a newer remote envelope.
    FolderChanged { ipns_name: String, sequence: u64 },
    /// A resolve returned our own sequence number with a different CID:
    /// another device published the same sequence. The remote copy won.
    SequenceDiverged { ipns_name: String, sequence: u64 },
    /// Connectivity lost; polling continues but is expected to fail.
    Offline,
    /// Connectivity restored.
    Online,
}

pub struct SyncEngine {
    tree: Arc<StdMutex<FolderTree>>,
    poll_interval: Duration,
    sync_now_rx: mpsc::Receiver<()>,
    events: mpsc::UnboundedSender<SyncEvent>,
    cancel: watch::Receiver<bool>,
    was_offline: bool,
    initial_sync_complete: bool,
}

impl SyncEngine {
    /// Create the engine plus its event stream and manual-trigger handle.
    pub fn new(
        tree: Arc<StdMutex<FolderTree>>,
        cancel: watch::Receiver<bool>,
    ) -> (Self, mpsc::Sender<()>, mpsc::UnboundedReceiver<SyncEvent>) {
        Self::with_interval(tree, cancel, SYNC_INTERVAL)
    }

    pub fn with_interval(
        tree: Arc<StdMutex<FolderTree>>,
        cancel: watch::Receiver<bool>,
        poll_interval: Duration,
    ) -> (Self, mpsc::Sender<()>, mpsc::UnboundedReceiver<SyncEvent>) {
        let (sync_now_tx, sync_now_rx) = mpsc::channel(1);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                tree,
                poll_interval,
                sync_now_rx,
                events: events_tx,
                cancel,
                was_offline: false,
                initial_sync_complete: false,
            },
            sync_now_tx,
            events_rx,
        )
    }

    /// Whether the first successful pass over the vault has completed.
    /// Until then an empty children list means "not yet loaded", not
    /// "empty folder".
    pub fn initial_sync_complete(&self) -> bool {
        self.initial_sync_complete
    }

    /// Main run loop. Call from a spawned task; returns when cancelled.
    pub async fn run<R: RelayStore>(&mut self, relay: Arc<R>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        // The first tick fires immediately; that one is the initial sync.
        log::info!(
            "Sync engine started (interval: {}s)",
            self.poll_interval.as_secs()
        );

        loop {
            let mut cancel = self.cancel.clone();
            tokio::select! {
                _ = ticker.tick() => {
                    self.sync_cycle(relay.as_ref()).await;
                }
                Some(()) = self.sync_now_rx.recv() => {
                    log::info!("Manual sync triggered");
                    self.sync_cycle(relay.as_ref()).await;
                }
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        log::info!("Sync engine stopping");
                        return;
                    }
                }
            }
            if *self.cancel.borrow() {
                return;
            }
        }
    }

    /// One full pass over every loaded folder.
    pub async fn sync_cycle<R: RelayStore>(&mut self, relay: &R) {
        let names: Vec<String> = {
            let tree = self.tree.lock().expect("tree lock");
            tree.loaded_folder_names()
        };

        let mut saw_network_error = false;
        for name in names {
            match self.poll_folder(relay, &name).await {
                Ok(()) => {}
                Err(err) if err.is_transient() => {
                    log::warn!("Sync poll failed for {}: {}", name, err);
                    saw_network_error = true;
                    break;
                }
                Err(err) => {
                    log::warn!("Sync poll failed for {}: {}", name, err);
                }
            }
        }

        if saw_network_error {
            if !self.was_offline {
                log::info!("Network appears offline, pausing active sync");
                self.was_offline = true;
                let _ = self.events.send(SyncEvent::Offline);
            }
        } else {
            if self.was_offline {
                log::info!("Connectivity restored, resuming sync");
                self.was_offline = false;
                let _ = self.events.send(SyncEvent::Online);
            }
            self.initial_sync_complete = true;
        }
    }

    /// Resolve one folder and apply the remote envelope when it is newer.
    async fn poll_folder<R: RelayStore>(
        &mut self,
        relay: &R,
        ipns_name: &str,
    ) -> Result<(), VaultError> {
        let Some(resolved) = relay.resolve(ipns_name).await? else {
            // Never published; nothing to compare against
            return Ok(());
        };

        let (local_seq, local_cid) = {
            let tree = self.tree.lock().expect("tree lock");
            match tree.folder_sync_state(ipns_name) {
                Some(state) => state,
                // Folder was unloaded between listing and resolve
                None => return Ok(()),
            }
        };

        let diverged = resolved.sequence_number == local_seq
            && local_seq > 0
            && local_cid.as_deref() != Some(resolved.cid.as_str());

        if resolved.sequence_number <= local_seq && !diverged {
            // Equal: nothing new. Lesser: stale resolve.
            return Ok(());
        }

        if diverged {
            log::warn!(
                "Sequence {} for {} resolved to a different envelope; \
                 concurrent publish from another device, remote copy wins",
                local_seq,
                ipns_name
            );
        } else {
            log::info!(
                "Change detected for {}: seq {} -> {}",
                ipns_name,
                local_seq,
                resolved.sequence_number
            );
        }

        // Key snapshot under the lock, fetch + decrypt outside it
        let key = {
            let tree = self.tree.lock().expect("tree lock");
            tree.folder_key_snapshot(ipns_name)
                .ok_or_else(|| VaultError::NotFound(ipns_name.to_string()))?
        };

        let sealed = relay.fetch(&resolved.cid).await?;
        let metadata = folder::decrypt_folder_metadata(&sealed, key.as_bytes())?;
        drop(key);

        {
            let mut tree = self.tree.lock().expect("tree lock");
            tree.apply_remote_children(
                ipns_name,
                metadata.children,
                resolved.sequence_number,
                resolved.cid.clone(),
            )?;
        }

        let event = if diverged {
            SyncEvent::SequenceDiverged {
                ipns_name: ipns_name.to_string(),
                sequence: resolved.sequence_number,
            }
        } else {
            SyncEvent::FolderChanged {
                ipns_name: ipns_name.to_string(),
                sequence: resolved.sequence_number,
            }
        };
        let _ = self.events.send(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests;
