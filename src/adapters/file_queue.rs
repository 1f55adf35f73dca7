//! Directory-backed action queue.
//!
//! Each queue is a directory under the queue root holding its attributes and
//! an append-only `journal.jsonl`. Sends, receives and acknowledgements are
//! journal entries; the current contents are derived by replay, the same way
//! the workflow journals are.
//!
//! ```text
//! <home>/queues/call_flow_T1/
//!     attributes.json
//!     journal.jsonl
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use super::journal::{is_safe_name, Journal};
use super::{ActionQueue, QueueAttributes, QueueError, ReceivedMessage};
use crate::domain::QueueRef;

const FILE_SCHEME: &str = "file://";
const ATTRIBUTES_FILE: &str = "attributes.json";
const JOURNAL_FILE: &str = "journal.jsonl";

/// How often a blocked receive re-reads the journal
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct StoredAttributes {
    receive_wait_ms: u64,
    visibility_timeout_ms: u64,
}

impl From<&QueueAttributes> for StoredAttributes {
    fn from(attributes: &QueueAttributes) -> Self {
        Self {
            receive_wait_ms: attributes.receive_wait.as_millis() as u64,
            visibility_timeout_ms: attributes.visibility_timeout.as_millis() as u64,
        }
    }
}

impl From<StoredAttributes> for QueueAttributes {
    fn from(stored: StoredAttributes) -> Self {
        Self {
            receive_wait: Duration::from_millis(stored.receive_wait_ms),
            visibility_timeout: Duration::from_millis(stored.visibility_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct QueueRecord {
    timestamp: DateTime<Utc>,

    #[serde(flatten)]
    entry: QueueEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum QueueEntry {
    Sent {
        message_id: String,
        body: String,
        /// Hex SHA-256 of `body`
        digest: String,
    },
    Received {
        message_id: String,
        receipt_handle: String,
        visible_until: DateTime<Utc>,
    },
    Deleted {
        receipt_handle: String,
    },
}

impl QueueRecord {
    fn now(entry: QueueEntry) -> Self {
        Self {
            timestamp: Utc::now(),
            entry,
        }
    }
}

#[derive(Debug, Clone)]
struct MessageState {
    id: String,
    body: String,
    digest: String,
    receipt: Option<(String, DateTime<Utc>)>,
    deleted: bool,
}

impl MessageState {
    fn is_visible(&self, now: DateTime<Utc>) -> bool {
        !self.deleted
            && self
                .receipt
                .as_ref()
                .map_or(true, |(_, visible_until)| *visible_until <= now)
    }

    fn is_in_flight(&self, now: DateTime<Utc>) -> bool {
        !self.deleted && !self.is_visible(now)
    }
}

/// Fold the journal into per-message state, in send order
fn replay_messages(records: &[QueueRecord]) -> Vec<MessageState> {
    let mut messages: Vec<MessageState> = Vec::new();

    for record in records {
        match &record.entry {
            QueueEntry::Sent {
                message_id,
                body,
                digest,
            } => messages.push(MessageState {
                id: message_id.clone(),
                body: body.clone(),
                digest: digest.clone(),
                receipt: None,
                deleted: false,
            }),
            QueueEntry::Received {
                message_id,
                receipt_handle,
                visible_until,
            } => {
                if let Some(message) = messages.iter_mut().find(|m| &m.id == message_id) {
                    message.receipt = Some((receipt_handle.clone(), *visible_until));
                }
            }
            QueueEntry::Deleted { receipt_handle } => {
                if let Some(message) = messages.iter_mut().find(|m| {
                    m.receipt
                        .as_ref()
                        .map_or(false, |(handle, _)| handle == receipt_handle)
                }) {
                    message.deleted = true;
                }
            }
        }
    }

    messages
}

fn body_digest(body: &str) -> String {
    hex::encode(Sha256::digest(body.as_bytes()))
}

/// Summary line for one queue
#[derive(Debug, Clone, Serialize)]
pub struct QueueSummary {
    pub name: String,
    pub queue_ref: QueueRef,
    pub pending: usize,
    pub in_flight: usize,
}

/// [`ActionQueue`] persisted under a local directory
pub struct FileActionQueue {
    root: PathBuf,
    poll_interval: Duration,
}

impl FileActionQueue {
    /// Queues live in subdirectories of `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The handle a queue named `name` gets
    pub fn queue_ref_for(&self, name: &str) -> QueueRef {
        QueueRef::new(format!("{}{}", FILE_SCHEME, self.root.join(name).display()))
    }

    /// List every queue under the root with its message counts
    pub async fn list_queues(&self) -> Result<Vec<QueueSummary>, QueueError> {
        let root = self.root.clone();
        let queue_refs: Vec<(String, QueueRef)> = {
            let mut found = Vec::new();
            if root.exists() {
                let mut entries = tokio::fs::read_dir(&root).await?;
                while let Some(entry) = entries.next_entry().await? {
                    if entry.path().join(JOURNAL_FILE).exists() {
                        let name = entry.file_name().to_string_lossy().to_string();
                        let queue_ref = self.queue_ref_for(&name);
                        found.push((name, queue_ref));
                    }
                }
            }
            found
        };

        let mut summaries = Vec::new();
        for (name, queue_ref) in queue_refs {
            let journal = Journal::new(self.queue_dir(&queue_ref)?.join(JOURNAL_FILE));
            let records: Vec<QueueRecord> = run_blocking(move || journal.replay()).await??;
            let now = Utc::now();
            let messages = replay_messages(&records);

            summaries.push(QueueSummary {
                name,
                queue_ref,
                pending: messages.iter().filter(|m| m.is_visible(now)).count(),
                in_flight: messages.iter().filter(|m| m.is_in_flight(now)).count(),
            });
        }

        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    /// Directory of a queue this instance could have created.
    ///
    /// Handles are only trusted when they name a direct child of the root;
    /// anything else is reported as a queue that does not exist.
    fn queue_dir(&self, queue: &QueueRef) -> Result<PathBuf, QueueError> {
        let not_found = || QueueError::QueueNotFound(queue.to_string());

        let path = Path::new(queue.as_str().strip_prefix(FILE_SCHEME).ok_or_else(not_found)?);
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| is_safe_name(n))
            .ok_or_else(not_found)?;
        if path.parent() != Some(self.root.as_path()) {
            return Err(not_found());
        }

        Ok(self.root.join(name))
    }

    fn journal(&self, queue: &QueueRef) -> Result<Journal, QueueError> {
        Ok(Journal::new(self.queue_dir(queue)?.join(JOURNAL_FILE)))
    }

    async fn attributes(&self, queue: &QueueRef) -> Result<QueueAttributes, QueueError> {
        let path = self.queue_dir(queue)?.join(ATTRIBUTES_FILE);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| not_found_as(queue, e.into()))?;
        let stored: StoredAttributes = serde_json::from_str(&content)?;
        Ok(stored.into())
    }

    /// Claim the oldest visible message, if any
    async fn try_receive(
        &self,
        queue: &QueueRef,
        visibility_timeout: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        let journal = self.journal(queue)?;
        let visibility = chrono::Duration::from_std(visibility_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(20));

        let claimed = run_blocking(move || {
            journal.update::<QueueRecord, _, QueueError, _>(|records| {
                let now = Utc::now();
                let messages = replay_messages(&records);

                let Some(message) = messages.into_iter().find(|m| m.is_visible(now)) else {
                    return Ok((Vec::new(), None));
                };

                let receipt_handle = Uuid::new_v4().to_string();
                let record = QueueRecord::now(QueueEntry::Received {
                    message_id: message.id.clone(),
                    receipt_handle: receipt_handle.clone(),
                    visible_until: now + visibility,
                });
                Ok((vec![record], Some((message, receipt_handle))))
            })
        })
        .await?
        .map_err(|e| not_found_as(queue, e))?;

        match claimed {
            Some((message, receipt_handle)) => {
                if body_digest(&message.body) != message.digest {
                    return Err(QueueError::DigestMismatch(message.id));
                }
                Ok(Some(ReceivedMessage {
                    message_id: message.id,
                    receipt_handle,
                    body: message.body,
                }))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ActionQueue for FileActionQueue {
    fn name(&self) -> &str {
        "file"
    }

    async fn create_queue(
        &self,
        name: &str,
        attributes: &QueueAttributes,
    ) -> Result<QueueRef, QueueError> {
        if !is_safe_name(name) {
            return Err(QueueError::InvalidQueueName(name.to_string()));
        }
        let queue_ref = self.queue_ref_for(name);
        let dir = self.queue_dir(&queue_ref)?;
        tokio::fs::create_dir_all(&dir).await?;

        // First creator wins; later calls keep the original attributes
        let stored = serde_json::to_vec_pretty(&StoredAttributes::from(attributes))?;
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dir.join(ATTRIBUTES_FILE))
            .await
        {
            Ok(mut file) => {
                use tokio::io::AsyncWriteExt;
                file.write_all(&stored).await?;
                file.flush().await?;
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(queue = %queue_ref, "Queue already exists");
            }
            Err(e) => return Err(e.into()),
        }

        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(JOURNAL_FILE))
            .await?;

        Ok(queue_ref)
    }

    async fn send_message(&self, queue: &QueueRef, body: &str) -> Result<String, QueueError> {
        let journal = self.journal(queue)?;
        let message_id = Uuid::new_v4().to_string();
        let record = QueueRecord::now(QueueEntry::Sent {
            message_id: message_id.clone(),
            body: body.to_string(),
            digest: body_digest(body),
        });

        run_blocking(move || {
            journal.update::<QueueRecord, _, QueueError, _>(|_| Ok((vec![record], ())))
        })
        .await?
        .map_err(|e| not_found_as(queue, e))?;

        Ok(message_id)
    }

    async fn receive_message(
        &self,
        queue: &QueueRef,
        visibility_timeout: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        let attributes = self.attributes(queue).await?;
        let deadline = tokio::time::Instant::now() + attributes.receive_wait;

        loop {
            if let Some(message) = self.try_receive(queue, visibility_timeout).await? {
                return Ok(Some(message));
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn delete_message(
        &self,
        queue: &QueueRef,
        receipt_handle: &str,
    ) -> Result<(), QueueError> {
        let journal = self.journal(queue)?;
        let handle = receipt_handle.to_string();
        let queue_name = queue.to_string();

        run_blocking(move || {
            journal.update::<QueueRecord, _, QueueError, _>(|records| {
                let messages = replay_messages(&records);
                let current = messages.iter().any(|m| {
                    !m.deleted
                        && m.receipt
                            .as_ref()
                            .map_or(false, |(h, _)| *h == handle)
                });
                if !current {
                    return Err(QueueError::InvalidReceipt {
                        queue: queue_name,
                        receipt_handle: handle,
                    });
                }
                Ok((
                    vec![QueueRecord::now(QueueEntry::Deleted {
                        receipt_handle: handle,
                    })],
                    (),
                ))
            })
        })
        .await?
        .map_err(|e| not_found_as(queue, e))
    }

    async fn delete_queue(&self, queue: &QueueRef) -> Result<(), QueueError> {
        let dir = self.queue_dir(queue)?;
        tokio::fs::remove_dir_all(&dir)
            .await
            .map_err(|e| not_found_as(queue, e.into()))
    }
}

/// Map a missing file onto the queue-level "does not exist" error
fn not_found_as(queue: &QueueRef, err: QueueError) -> QueueError {
    match err {
        QueueError::Io(ref io) if io.kind() == ErrorKind::NotFound => {
            QueueError::QueueNotFound(queue.to_string())
        }
        other => other,
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, QueueError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| QueueError::Io(std::io::Error::new(ErrorKind::Other, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn quick() -> QueueAttributes {
        QueueAttributes {
            receive_wait: Duration::from_millis(100),
            visibility_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_replay_tracks_receipts() {
        let records = vec![
            QueueRecord::now(QueueEntry::Sent {
                message_id: "m1".to_string(),
                body: "a".to_string(),
                digest: body_digest("a"),
            }),
            QueueRecord::now(QueueEntry::Sent {
                message_id: "m2".to_string(),
                body: "b".to_string(),
                digest: body_digest("b"),
            }),
            QueueRecord::now(QueueEntry::Received {
                message_id: "m1".to_string(),
                receipt_handle: "r1".to_string(),
                visible_until: Utc::now() + chrono::Duration::seconds(30),
            }),
            QueueRecord::now(QueueEntry::Deleted {
                receipt_handle: "r1".to_string(),
            }),
        ];

        let messages = replay_messages(&records);
        let now = Utc::now();

        assert!(messages[0].deleted);
        assert!(!messages[0].is_visible(now));
        assert!(messages[1].is_visible(now));
    }

    #[tokio::test]
    async fn test_queue_ref_round_trip() {
        let temp = TempDir::new().unwrap();
        let queue = FileActionQueue::new(temp.path());

        let q = queue.create_queue("call_flow_T1", &quick()).await.unwrap();

        assert!(q.as_str().starts_with("file://"));
        assert_eq!(queue.queue_dir(&q).unwrap(), temp.path().join("call_flow_T1"));
        assert_eq!(queue.attributes(&q).await.unwrap(), quick());
    }

    #[tokio::test]
    async fn test_foreign_queue_ref_is_not_touched() {
        let temp = TempDir::new().unwrap();
        let queue = FileActionQueue::new(temp.path().join("queues"));
        let outside = temp.path().join("victim");
        std::fs::create_dir_all(&outside).unwrap();
        std::fs::write(outside.join("keep.txt"), "data").unwrap();

        let foreign = [
            QueueRef::new(format!("file://{}", outside.display())),
            QueueRef::new(format!("file://{}/queues/../victim", temp.path().display())),
            QueueRef::new(format!("file://{}/queues/a/b", temp.path().display())),
        ];
        for q in &foreign {
            assert!(
                matches!(queue.delete_queue(q).await, Err(QueueError::QueueNotFound(_))),
                "{} should not resolve",
                q
            );
            assert!(matches!(
                queue.send_message(q, "{}").await,
                Err(QueueError::QueueNotFound(_))
            ));
        }

        assert!(outside.join("keep.txt").exists());
    }

    #[tokio::test]
    async fn test_traversal_names_are_rejected() {
        let temp = TempDir::new().unwrap();
        let queue = FileActionQueue::new(temp.path().join("queues"));

        for name in ["call_flow_../../escape", "call_flow_a/b", ".."] {
            assert!(matches!(
                queue.create_queue(name, &quick()).await,
                Err(QueueError::InvalidQueueName(_))
            ));
        }

        assert!(!temp.path().join("escape").exists());
        assert!(!temp.path().join("queues").exists());
    }

    #[tokio::test]
    async fn test_digest_mismatch_is_reported() {
        let temp = TempDir::new().unwrap();
        let queue = FileActionQueue::new(temp.path());
        let q = queue.create_queue("q", &quick()).await.unwrap();

        let tampered = QueueRecord::now(QueueEntry::Sent {
            message_id: "m1".to_string(),
            body: "{\"Actions\":[]}".to_string(),
            digest: body_digest("something else"),
        });
        let journal = queue.journal(&q).unwrap();
        journal
            .update::<QueueRecord, _, QueueError, _>(|_| Ok((vec![tampered], ())))
            .unwrap();

        let result = queue.receive_message(&q, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(QueueError::DigestMismatch(ref id)) if id == "m1"));
    }
}
