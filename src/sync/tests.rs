//! Sync engine tests with an in-memory relay.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::watch;

use super::*;
use crate::api::types::{PublishRequest, ResolveResponse};
use crate::crypto::folder::{EnvelopeTimes, FilePointer, FolderChild, FolderMetadata};
use crate::crypto::utils::now_ms;
use crate::keys::{FolderKey, NameKeypair};

#[derive(Default)]
struct MockRelay {
    resolved: StdMutex<HashMap<String, ResolveResponse>>,
    content: StdMutex<HashMap<String, Vec<u8>>>,
    offline: AtomicBool,
}

impl MockRelay {
    fn put_envelope(&self, name: &str, seq: u64, cid: &str, sealed: Vec<u8>) {
        self.resolved.lock().unwrap().insert(
            name.to_string(),
            ResolveResponse {
                cid: cid.to_string(),
                sequence_number: seq,
            },
        );
        self.content.lock().unwrap().insert(cid.to_string(), sealed);
    }
}

impl crate::api::RelayStore for MockRelay {
    async fn add(&self, _bytes: Vec<u8>) -> Result<String, VaultError> {
        unreachable!("sync never adds content")
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
        if self.offline.load(Ordering::SeqCst) {
            return Err(VaultError::NetworkTransient("offline".to_string()));
        }
        Ok(self.resolved.lock().unwrap().get(ipns_name).cloned())
    }

    async fn publish(&self, _request: &PublishRequest) -> Result<(), VaultError> {
        unreachable!("sync never publishes")
    }
}

struct Fixture {
    tree: Arc<StdMutex<FolderTree>>,
    engine: SyncEngine,
    events: tokio::sync::mpsc::UnboundedReceiver<SyncEvent>,
    root_ipns: String,
    root_key_bytes: [u8; 32],
    _cancel_tx: watch::Sender<bool>,
}

fn fixture() -> Fixture {
    let signing = NameKeypair::generate().unwrap();
    let root_ipns = signing.ipns_name().to_string();
    let root_key = FolderKey::generate();
    let root_key_bytes = *root_key.as_bytes();

    let tree = Arc::new(StdMutex::new(FolderTree::new(
        root_ipns.clone(),
        root_key,
        signing,
        None,
    )));
    let (cancel_tx, cancel) = watch::channel(false);
    let (engine, _sync_now, events) = SyncEngine::new(tree.clone(), cancel);
    Fixture {
        tree,
        engine,
        events,
        root_ipns,
        root_key_bytes,
        _cancel_tx: cancel_tx,
    }
}

fn remote_envelope(children: Vec<FolderChild>, key: &[u8; 32]) -> Vec<u8> {
    let metadata = FolderMetadata {
        children,
        metadata: EnvelopeTimes {
            created: now_ms(),
            modified: now_ms(),
        },
    };
    crate::crypto::folder::encrypt_folder_metadata(&metadata, key).unwrap()
}

fn pointer(name: &str) -> FolderChild {
    FolderChild::File(FilePointer {
        id: format!("id-{}", name),
        name: name.to_string(),
        file_meta_ipns_name: format!("k51-{}", name),
        created_at: 1,
        modified_at: 2,
    })
}

#[tokio::test]
async fn test_newer_sequence_replaces_children() {
    let mut fx = fixture();
    let relay = MockRelay::default();
    let sealed = remote_envelope(vec![pointer("blob.bin")], &fx.root_key_bytes);
    relay.put_envelope(&fx.root_ipns, 2, "bafy-2", sealed);

    fx.engine.sync_cycle(&relay).await;

    let tree = fx.tree.lock().unwrap();
    let root = tree.folder(tree.root_id()).unwrap();
    assert_eq!(root.sequence, 2);
    assert_eq!(root.children.len(), 1);
    assert_eq!(root.children[0].name(), "blob.bin");
    drop(tree);

    assert_eq!(
        fx.events.try_recv().unwrap(),
        SyncEvent::FolderChanged {
            ipns_name: fx.root_ipns.clone(),
            sequence: 2
        }
    );
    assert!(fx.engine.initial_sync_complete());
}

#[tokio::test]
async fn test_equal_sequence_same_cid_is_noop() {
    let mut fx = fixture();
    let relay = MockRelay::default();
    let sealed = remote_envelope(vec![pointer("a")], &fx.root_key_bytes);
    relay.put_envelope(&fx.root_ipns, 3, "bafy-3", sealed);

    // First cycle loads seq 3
    fx.engine.sync_cycle(&relay).await;
    assert!(fx.events.try_recv().is_ok());

    // Second cycle sees the identical record
    fx.engine.sync_cycle(&relay).await;
    assert!(fx.events.try_recv().is_err());
}

#[tokio::test]
async fn test_equal_sequence_different_cid_refetches() {
    let mut fx = fixture();
    let relay = MockRelay::default();
    let sealed = remote_envelope(vec![pointer("ours")], &fx.root_key_bytes);
    relay.put_envelope(&fx.root_ipns, 3, "bafy-ours", sealed);
    fx.engine.sync_cycle(&relay).await;
    let _ = fx.events.try_recv();

    // Another device published the same sequence with different content
    let sealed = remote_envelope(vec![pointer("theirs")], &fx.root_key_bytes);
    relay.put_envelope(&fx.root_ipns, 3, "bafy-theirs", sealed);
    fx.engine.sync_cycle(&relay).await;

    let tree = fx.tree.lock().unwrap();
    let root = tree.folder(tree.root_id()).unwrap();
    assert_eq!(root.children[0].name(), "theirs");
    drop(tree);

    assert_eq!(
        fx.events.try_recv().unwrap(),
        SyncEvent::SequenceDiverged {
            ipns_name: fx.root_ipns.clone(),
            sequence: 3
        }
    );
}

#[tokio::test]
async fn test_lesser_sequence_is_stale_and_ignored() {
    let mut fx = fixture();
    let relay = MockRelay::default();
    let sealed = remote_envelope(vec![pointer("current")], &fx.root_key_bytes);
    relay.put_envelope(&fx.root_ipns, 5, "bafy-5", sealed);
    fx.engine.sync_cycle(&relay).await;
    let _ = fx.events.try_recv();

    // Stale resolve from a lagging node
    let sealed = remote_envelope(vec![pointer("old")], &fx.root_key_bytes);
    relay.put_envelope(&fx.root_ipns, 4, "bafy-4", sealed);
    fx.engine.sync_cycle(&relay).await;

    let tree = fx.tree.lock().unwrap();
    let root = tree.folder(tree.root_id()).unwrap();
    assert_eq!(root.sequence, 5);
    assert_eq!(root.children[0].name(), "current");
}

#[tokio::test]
async fn test_unpublished_name_is_noop_and_initial_sync_still_completes() {
    let mut fx = fixture();
    let relay = MockRelay::default();

    fx.engine.sync_cycle(&relay).await;

    let tree = fx.tree.lock().unwrap();
    let root = tree.folder(tree.root_id()).unwrap();
    // Never loaded from the network: the sentinel stays at 0
    assert_eq!(root.sequence, 0);
    drop(tree);
    assert!(fx.engine.initial_sync_complete());
}

#[tokio::test]
async fn test_offline_transitions_emit_events() {
    let mut fx = fixture();
    let relay = MockRelay::default();
    relay.offline.store(true, Ordering::SeqCst);

    fx.engine.sync_cycle(&relay).await;
    assert_eq!(fx.events.try_recv().unwrap(), SyncEvent::Offline);
    assert!(!fx.engine.initial_sync_complete());

    // Repeated offline cycles do not repeat the event
    fx.engine.sync_cycle(&relay).await;
    assert!(fx.events.try_recv().is_err());

    relay.offline.store(false, Ordering::SeqCst);
    fx.engine.sync_cycle(&relay).await;
    assert_eq!(fx.events.try_recv().unwrap(), SyncEvent::Online);
    assert!(fx.engine.initial_sync_complete());
}
