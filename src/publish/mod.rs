//! Publish pipeline: serializes publishes per mutable name.
//!
//! Contract: at most one publish in flight per name, jobs for the same name
//! execute in enqueue order with contiguous sequence numbers, distinct names
//! proceed independently. A job runs the five publish steps:
//!
//! 1. seal the plaintext envelope with the folder key (fresh IV),
//! 2. add the sealed bytes to the relay, obtaining a content address,
//! 3. take the current sequence number (cache, else resolve) and add one,
//! 4. sign the name record,
//! 5. publish the signed record.
//!
//! Network failures at steps 2 and 5 retry with exponential backoff; this is
//! the only component in the crate that retries anything. Cryptographic
//! failures are fatal, clear the name's queue, and surface to the caller so
//! the tree can roll back. Cancellation aborts between steps and drops the
//! job, wiping its key material.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use tokio::sync::watch;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::api::types::PublishRequest;
use crate::api::RelayStore;
use crate::crypto::aes::AES_IV_SIZE;
use crate::crypto::{self, ecies};
use crate::error::VaultError;

/// Backoff schedule for transient failures: 30s, 60s, 120s, 240s, cap 300s.
pub fn default_retry_schedule() -> Vec<Duration> {
    vec![
        Duration::from_secs(30),
        Duration::from_secs(60),
        Duration::from_secs(120),
        Duration::from_secs(240),
        Duration::from_secs(300),
    ]
}

/// TEE forward-encryption material attached to every publish.
#[derive(Clone)]
pub struct TeeRepublishKey {
    /// Uncompressed secp256k1 public key of the current enclave epoch.
    pub public_key: Vec<u8>,
    pub epoch: u32,
}

/// One queued publish. Owns copies of the folder key and signing seed for
/// the duration of the publish; both are wiped when the job is dropped,
/// whether it completed, failed, or was cancelled.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PublishJob {
    #[zeroize(skip)]
    pub intent_id: String,
    #[zeroize(skip)]
    pub ipns_name: String,
    plaintext_metadata: Vec<u8>,
    folder_key: [u8; 32],
    signing_seed: [u8; 32],
}

impl PublishJob {
    pub fn new(
        intent_id: String,
        ipns_name: String,
        plaintext_metadata: Vec<u8>,
        folder_key: [u8; 32],
        signing_seed: [u8; 32],
    ) -> Self {
        Self {
            intent_id,
            ipns_name,
            plaintext_metadata,
            folder_key,
            signing_seed,
        }
    }
}

/// Successful publish of one job.
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub intent_id: String,
    pub ipns_name: String,
    pub sequence: u64,
    pub cid: String,
}

/// Fatal failure of one job. Jobs still queued behind it for the same name
/// were prepared against tree state that is about to be rolled back, so the
/// queue for that name is cleared.
#[derive(Debug)]
pub struct PublishFailure {
    pub intent_id: String,
    pub ipns_name: String,
    pub error: VaultError,
}

pub struct PublishPipeline {
    queues: StdMutex<HashMap<String, VecDeque<PublishJob>>>,
    /// Per-name execution locks; tokio mutexes queue waiters fairly, which
    /// is what gives same-name pumps their FIFO order.
    name_locks: StdMutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    /// Last sequence number this client observed per name.
    sequences: StdMutex<HashMap<String, u64>>,
    retry_schedule: Vec<Duration>,
    cancel: watch::Receiver<bool>,
    tee: StdMutex<Option<TeeRepublishKey>>,
}

impl PublishPipeline {
    pub fn new(cancel: watch::Receiver<bool>) -> Self {
        Self::with_retry_schedule(cancel, default_retry_schedule())
    }

    /// Construct with a custom backoff schedule (tests use zero delays).
    pub fn with_retry_schedule(
        cancel: watch::Receiver<bool>,
        retry_schedule: Vec<Duration>,
    ) -> Self {
        Self {
            queues: StdMutex::new(HashMap::new()),
            name_locks: StdMutex::new(HashMap::new()),
            sequences: StdMutex::new(HashMap::new()),
            retry_schedule,
            cancel,
            tee: StdMutex::new(None),
        }
    }

    /// Install the enclave republishing key received from the relay at login.
    pub fn set_tee_key(&self, key: Option<TeeRepublishKey>) {
        *self.tee.lock().expect("tee lock") = key;
    }

    /// Seed the sequence cache from a resolve (used at vault load).
    pub fn record_sequence(&self, ipns_name: &str, sequence: u64) {
        self.sequences
            .lock()
            .expect("sequence lock")
            .insert(ipns_name.to_string(), sequence);
    }

    /// Last sequence this client observed for a name, if any.
    pub fn cached_sequence(&self, ipns_name: &str) -> Option<u64> {
        self.sequences
            .lock()
            .expect("sequence lock")
            .get(ipns_name)
            .copied()
    }

    /// Queue a job behind any previously enqueued work for its name.
    pub fn enqueue(&self, job: PublishJob) {
        let mut queues = self.queues.lock().expect("queue lock");
        let queue = queues.entry(job.ipns_name.clone()).or_default();
        queue.push_back(job);
        log::debug!(
            "Publish job queued (queue depth {} for name)",
            queue.len()
        );
    }

    /// Number of jobs currently queued for a name.
    pub fn pending(&self, ipns_name: &str) -> usize {
        self.queues
            .lock()
            .expect("queue lock")
            .get(ipns_name)
            .map(|q| q.len())
            .unwrap_or(0)
    }

    /// Drain and execute every queued job for one name, in order.
    ///
    /// Concurrent calls for the same name serialize on the per-name lock;
    /// calls for different names run independently.
    pub async fn pump_name<R: RelayStore>(
        &self,
        relay: &R,
        ipns_name: &str,
    ) -> Result<Vec<PublishOutcome>, PublishFailure> {
        let lock = self.name_lock(ipns_name);
        let _guard = lock.lock().await;

        let mut outcomes = Vec::new();
        loop {
            let job = {
                let mut queues = self.queues.lock().expect("queue lock");
                match queues.get_mut(ipns_name) {
                    Some(queue) => queue.pop_front(),
                    None => None,
                }
            };
            let Some(job) = job else {
                return Ok(outcomes);
            };

            match self.execute(relay, &job).await {
                Ok(outcome) => {
                    log::info!(
                        "Published seq {} for {}",
                        outcome.sequence,
                        outcome.ipns_name
                    );
                    outcomes.push(outcome);
                }
                Err(error) => {
                    let intent_id = job.intent_id.clone();
                    drop(job);
                    let dropped = self.clear_name(ipns_name);
                    if dropped > 0 {
                        log::warn!(
                            "Dropped {} queued publish(es) for {} after fatal failure",
                            dropped,
                            ipns_name
                        );
                    }
                    return Err(PublishFailure {
                        intent_id,
                        ipns_name: ipns_name.to_string(),
                        error,
                    });
                }
            }
        }
    }

    /// Drain every name with queued work, one name at a time. Callers that
    /// want cross-name parallelism spawn `pump_name` per name instead.
    pub async fn pump_all<R: RelayStore>(
        &self,
        relay: &R,
    ) -> Result<Vec<PublishOutcome>, PublishFailure> {
        let names: Vec<String> = {
            let queues = self.queues.lock().expect("queue lock");
            queues
                .iter()
                .filter(|(_, q)| !q.is_empty())
                .map(|(name, _)| name.clone())
                .collect()
        };

        let mut outcomes = Vec::new();
        for name in names {
            outcomes.extend(self.pump_name(relay, &name).await?);
        }
        Ok(outcomes)
    }

    // ── Execution ────────────────────────────────────────────────────────

    async fn execute<R: RelayStore>(
        &self,
        relay: &R,
        job: &PublishJob,
    ) -> Result<PublishOutcome, VaultError> {
        self.check_cancelled()?;

        // 1. Fresh sealed envelope (fresh IV per attempt sequence)
        let sealed = crypto::aes::seal_aes_gcm(&job.plaintext_metadata, &job.folder_key)
            .map_err(|_| VaultError::MalformedCiphertext)?;
        let iv = sealed[..AES_IV_SIZE].to_vec();
        let encrypted_metadata = sealed[AES_IV_SIZE..].to_vec();

        // 2. Add the sealed bytes, obtaining the content address
        let cid = self
            .with_retries("add", || relay.add(sealed.clone()))
            .await?;

        // 3. Current sequence number, cache first
        let current = match self.cached_sequence(&job.ipns_name) {
            Some(seq) => seq,
            None => {
                let resolved = self
                    .with_retries("resolve", || relay.resolve(&job.ipns_name))
                    .await?;
                resolved.map(|r| r.sequence_number).unwrap_or(0)
            }
        };
        let new_seq = current + 1;

        self.check_cancelled()?;

        // 4. Sign the record
        let record =
            crypto::ipns::sign_record(&encrypted_metadata, &iv, new_seq, &job.signing_seed)?;
        let record_bytes = crypto::ipns::marshal_record(&record)?;
        let record_base64 = base64::engine::general_purpose::STANDARD.encode(&record_bytes);

        // Forward-encrypt the signing key to the enclave when enabled
        let tee = self.tee.lock().expect("tee lock").clone();
        let (encrypted_ipns_private_key, key_epoch) = match tee {
            Some(tee_key) => {
                let wrapped = ecies::wrap_key(&job.signing_seed, &tee_key.public_key)?;
                (Some(hex::encode(wrapped)), Some(tee_key.epoch))
            }
            None => (None, None),
        };

        // 5. Publish
        let request = PublishRequest {
            ipns_name: job.ipns_name.clone(),
            record: record_base64,
            metadata_cid: cid.clone(),
            encrypted_ipns_private_key,
            key_epoch,
        };
        self.with_retries("publish", || relay.publish(&request))
            .await?;

        self.record_sequence(&job.ipns_name, new_seq);

        Ok(PublishOutcome {
            intent_id: job.intent_id.clone(),
            ipns_name: job.ipns_name.clone(),
            sequence: new_seq,
            cid,
        })
    }

    /// Run a relay call, retrying transient failures on the backoff schedule.
    async fn with_retries<T, F, Fut>(&self, what: &str, mut call: F) -> Result<T, VaultError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, VaultError>>,
    {
        let mut attempt = 0usize;
        loop {
            self.check_cancelled()?;
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.retry_schedule.len() => {
                    let delay = self.retry_schedule[attempt];
                    attempt += 1;
                    log::warn!(
                        "Relay {} failed ({}), retry {}/{} in {:?}",
                        what,
                        err,
                        attempt,
                        self.retry_schedule.len(),
                        delay
                    );
                    self.cancellable_sleep(delay).await?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn cancellable_sleep(&self, delay: Duration) -> Result<(), VaultError> {
        let mut cancel = self.cancel.clone();
        if *cancel.borrow() {
            return Err(VaultError::Cancelled);
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    Err(VaultError::Cancelled)
                } else {
                    Ok(())
                }
            }
        }
    }

    fn check_cancelled(&self) -> Result<(), VaultError> {
        if *self.cancel.borrow() {
            Err(VaultError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn name_lock(&self, ipns_name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.name_locks.lock().expect("name lock map");
        locks
            .entry(ipns_name.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn clear_name(&self, ipns_name: &str) -> usize {
        let mut queues = self.queues.lock().expect("queue lock");
        queues.remove(ipns_name).map(|q| q.len()).unwrap_or(0)
    }
}
