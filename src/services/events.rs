use flume::{Receiver, Sender};
use serde::Serialize;
use std::sync::Mutex;
use tracing::debug;

/// Invalidation notice for views that cache derived state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// Counters or contents of these folders changed
    FoldersChanged { folder_ids: Vec<String> },
    /// Membership or state of these threads changed
    ThreadsChanged {
        account_id: String,
        thread_ids: Vec<String>,
    },
}

/// Fan-out of [`StoreEvent`]s to any number of subscribers.
///
/// Delivery never blocks; subscribers whose receiver was dropped are pruned on
/// the next publish.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<StoreEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        let (tx, rx) = flume::unbounded();
        self.lock().push(tx);
        rx
    }

    pub fn publish(&self, event: StoreEvent) {
        let empty = match &event {
            StoreEvent::FoldersChanged { folder_ids } => folder_ids.is_empty(),
            StoreEvent::ThreadsChanged { thread_ids, .. } => thread_ids.is_empty(),
        };
        if empty {
            return;
        }

        let mut subscribers = self.lock();
        let before = subscribers.len();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        if subscribers.len() < before {
            debug!("Dropped {} closed event subscribers", before - subscribers.len());
        }
    }

    pub fn folders_changed<I, S>(&self, folder_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut folder_ids: Vec<String> = folder_ids.into_iter().map(Into::into).collect();
        folder_ids.sort();
        folder_ids.dedup();
        self.publish(StoreEvent::FoldersChanged { folder_ids });
    }

    pub fn threads_changed(&self, account_id: &str, mut thread_ids: Vec<String>) {
        thread_ids.sort();
        thread_ids.dedup();
        self.publish(StoreEvent::ThreadsChanged {
            account_id: account_id.to_string(),
            thread_ids,
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Sender<StoreEvent>>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_and_prune() {
        let bus = EventBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();
        drop(second);

        bus.folders_changed(["b", "a", "b"]);
        assert_eq!(
            first.try_recv().unwrap(),
            StoreEvent::FoldersChanged { folder_ids: vec!["a".into(), "b".into()] }
        );
        assert_eq!(bus.lock().len(), 1);
    }

    #[test]
    fn test_empty_events_are_not_sent() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        bus.folders_changed(Vec::<String>::new());
        bus.threads_changed("acct", Vec::new());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_serializes_tagged() {
        let event = StoreEvent::ThreadsChanged {
            account_id: "a".into(),
            thread_ids: vec!["t".into()],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "threads_changed");
        assert_eq!(json["thread_ids"][0], "t");
    }
}
