//! Background storage worker.
//!
//! Owns the repository and serves [`BridgeMessage`] requests one at a time
//! from a bounded queue. Callers hold a cloneable [`BridgeHandle`] and wait
//! for the reply, bounded by the configured request timeout.

use log::{error, info, warn};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use rule_engine::{GroupMap, ProfileMap, Rule};

use crate::config::BridgeConfig;
use crate::errors::PersistenceError;
use crate::repository::RuleRepository;
use crate::storage::KeyValueStore;
use crate::types::{BridgeMessage, BridgeReply, RuleSnapshot};

type ReplySender = oneshot::Sender<Result<BridgeReply, PersistenceError>>;

struct Envelope {
    message: BridgeMessage,
    reply: ReplySender,
}

/// Serves storage requests from a queue
pub struct StorageWorker<S: KeyValueStore> {
    repository: RuleRepository<S>,
}

impl<S: KeyValueStore> StorageWorker<S> {
    pub fn new(repository: RuleRepository<S>) -> Self {
        Self { repository }
    }

    /// Starts the worker on the current tokio runtime.
    ///
    /// The task ends once every handle has been dropped.
    pub fn spawn(self, config: &BridgeConfig) -> (BridgeHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let handle = BridgeHandle {
            tx,
            timeout: config.request_timeout(),
        };
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }

    async fn run(self, mut rx: mpsc::Receiver<Envelope>) {
        info!("Storage worker started");
        while let Some(envelope) = rx.recv().await {
            let kind = envelope.message.kind();
            let result = self.handle(envelope.message);
            if let Err(e) = &result {
                error!("{} failed: {}", kind, e);
            }
            if envelope.reply.send(result).is_err() {
                warn!("{} reply dropped: caller went away", kind);
            }
        }
        info!("Storage worker stopped");
    }

    /// Executes one request
    fn handle(&self, message: BridgeMessage) -> Result<BridgeReply, PersistenceError> {
        match message {
            BridgeMessage::SaveRules {
                payload,
                base_revision,
            } => {
                let revision = self.repository.save_all(&payload, base_revision)?;
                Ok(BridgeReply::Saved { revision })
            }
            BridgeMessage::GetRules => Ok(BridgeReply::Rules(self.repository.load_all()?)),
            BridgeMessage::GetTargets => Ok(BridgeReply::Targets {
                profiles: self.repository.load_profiles()?,
                groups: self.repository.load_groups()?,
            }),
        }
    }
}

/// Cloneable client side of the storage worker
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    tx: mpsc::Sender<Envelope>,
    timeout: Duration,
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope").field("message", &self.message.kind()).finish()
    }
}

impl BridgeHandle {
    /// Send a request and wait for its reply.
    ///
    /// The timeout bounds the wait only. A request already queued when it
    /// expires is still executed, so after `Timeout` on a save the stored
    /// collection may be ahead of the caller; the next save based on the
    /// old revision then fails as stale. See
    /// [`PersistenceError::needs_reload`].
    pub async fn request(&self, message: BridgeMessage) -> Result<BridgeReply, PersistenceError> {
        let (reply, rx) = oneshot::channel();
        let exchange = async {
            self.tx
                .send(Envelope { message, reply })
                .await
                .map_err(|_| PersistenceError::WorkerUnavailable)?;
            rx.await.map_err(|_| PersistenceError::WorkerUnavailable)?
        };

        match timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(PersistenceError::Timeout(self.timeout)),
        }
    }

    pub async fn get_rules(&self) -> Result<RuleSnapshot, PersistenceError> {
        match self.request(BridgeMessage::GetRules).await? {
            BridgeReply::Rules(snapshot) => Ok(snapshot),
            _ => Err(PersistenceError::UnexpectedReply("GET_RULES")),
        }
    }

    /// Overwrite the collection. Returns the new revision.
    pub async fn save_rules(
        &self,
        rules: Vec<Rule>,
        base_revision: Option<u64>,
    ) -> Result<u64, PersistenceError> {
        let message = BridgeMessage::SaveRules {
            payload: rules,
            base_revision,
        };
        match self.request(message).await? {
            BridgeReply::Saved { revision } => Ok(revision),
            _ => Err(PersistenceError::UnexpectedReply("SAVE_RULES")),
        }
    }

    pub async fn get_targets(&self) -> Result<(ProfileMap, GroupMap), PersistenceError> {
        match self.request(BridgeMessage::GetTargets).await? {
            BridgeReply::Targets { profiles, groups } => Ok((profiles, groups)),
            _ => Err(PersistenceError::UnexpectedReply("GET_TARGETS")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageKeys;
    use crate::storage::MemoryStore;
    use rule_engine::{RuleAction, RuleDraft, RuleId, TargetType, Trigger};

    fn spawn_worker(store: MemoryStore, config: &BridgeConfig) -> (BridgeHandle, JoinHandle<()>) {
        StorageWorker::new(RuleRepository::new(store, StorageKeys::default())).spawn(config)
    }

    fn rule(id: &str) -> Rule {
        Rule::with_id(
            RuleId::from(id),
            RuleDraft::new(
                id,
                TargetType::Extension,
                ["ext1"],
                RuleAction::Disable,
                Trigger::on_url("x.com"),
            ),
        )
    }

    #[tokio::test]
    async fn test_save_and_get_round_trip() {
        let (handle, _task) = spawn_worker(MemoryStore::new(1 << 20), &BridgeConfig::default());

        let revision = handle.save_rules(vec![rule("a")], Some(0)).await.unwrap();
        assert_eq!(revision, 1);

        let snapshot = handle.get_rules().await.unwrap();
        assert_eq!(snapshot.rules, vec![rule("a")]);
        assert_eq!(snapshot.revision, 1);

        let (profiles, groups) = handle.get_targets().await.unwrap();
        assert!(profiles.is_empty() && groups.is_empty());
    }

    #[tokio::test]
    async fn test_errors_are_returned_to_caller() {
        let (handle, _task) = spawn_worker(MemoryStore::new(1 << 20), &BridgeConfig::default());
        handle.save_rules(vec![rule("a")], Some(0)).await.unwrap();

        let err = handle.save_rules(vec![], Some(0)).await.unwrap_err();
        assert!(err.is_stale());
    }

    #[tokio::test]
    async fn test_worker_stops_when_handles_drop() {
        let (handle, task) = spawn_worker(MemoryStore::new(1 << 20), &BridgeConfig::default());
        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_request_times_out_without_worker() {
        // a handle whose queue is never drained
        let (tx, _rx) = mpsc::channel(1);
        let handle = BridgeHandle {
            tx,
            timeout: Duration::from_millis(20),
        };
        let err = handle.get_rules().await.unwrap_err();
        assert_eq!(err, PersistenceError::Timeout(Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_closed_worker_is_unavailable() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = BridgeHandle {
            tx,
            timeout: Duration::from_secs(1),
        };
        assert_eq!(handle.get_rules().await.unwrap_err(), PersistenceError::WorkerUnavailable);
    }
}
