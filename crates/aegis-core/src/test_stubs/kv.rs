//! In-memory [`KvStore`] backed by a `Mutex<BTreeMap>`, with CAS and
//! watch semantics close enough to a real KV bucket to drive
//! `Registry`/`ElectionRepository`/`Discovery` logic in tests without a
//! live NATS connection.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{CoreError, Result};
use crate::ports::kv::{CasOptions, Entry, KvStore, Watch, WatchEvent, WatchOp};

#[derive(Default)]
pub struct MockKvStore {
    entries: Mutex<BTreeMap<String, Entry>>,
    watchers: Mutex<Vec<(String, mpsc::UnboundedSender<WatchEvent>)>>,
}

impl MockKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn notify(&self, key_or_prefix_match: &str, event: WatchEvent) {
        let mut watchers = self.watchers.lock().unwrap();
        watchers.retain(|(pattern, tx)| {
            if key_or_prefix_match.starts_with(pattern.as_str()) {
                tx.send(event.clone()).is_ok()
            } else {
                true
            }
        });
    }
}

#[async_trait]
impl KvStore for MockKvStore {
    async fn get(&self, key: &str) -> Result<Option<Entry>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>, opts: CasOptions) -> Result<u64> {
        let mut entries = self.entries.lock().unwrap();
        let current_revision = entries.get(key).map(|entry| entry.revision).unwrap_or(0);

        if let Some(expected) = opts.expected_revision {
            if expected != current_revision {
                return Err(CoreError::cas_conflict(format!(
                    "key {key} at revision {current_revision}, expected {expected}"
                )));
            }
        }

        let revision = current_revision + 1;
        let entry = Entry {
            key: key.to_string(),
            value,
            revision,
        };
        entries.insert(key.to_string(), entry.clone());
        drop(entries);

        self.notify(
            key,
            WatchEvent {
                op: WatchOp::Put,
                entry,
            },
        );
        Ok(revision)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        let Some(mut entry) = entries.remove(key) else {
            return Ok(());
        };
        entry.revision += 1;
        drop(entries);

        self.notify(
            key,
            WatchEvent {
                op: WatchOp::Delete,
                entry,
            },
        );
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<Entry>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .values()
            .filter(|entry| entry.key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn watch(&self, key_or_prefix: &str) -> Result<Box<dyn Watch>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.watchers.lock().unwrap().push((key_or_prefix.to_string(), tx));
        Ok(Box::new(MockWatch { rx }))
    }
}

struct MockWatch {
    rx: mpsc::UnboundedReceiver<WatchEvent>,
}

#[async_trait]
impl Watch for MockWatch {
    async fn next(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_if_absent_fails_on_existing_key() {
        let kv = MockKvStore::new();
        kv.put("a", vec![1], CasOptions::none()).await.unwrap();
        let err = kv.put("a", vec![2], CasOptions::create_if_absent()).await.unwrap_err();
        assert_eq!(err.code(), "CAS_CONFLICT");
    }

    #[tokio::test]
    async fn watch_sees_put_after_subscribe() {
        let kv = MockKvStore::new();
        let mut watch = kv.watch("svc/").await.unwrap();
        kv.put("svc/a", vec![1], CasOptions::none()).await.unwrap();
        let event = watch.next().await.unwrap();
        assert_eq!(event.op, WatchOp::Put);
        assert_eq!(event.entry.key, "svc/a");
    }
}
