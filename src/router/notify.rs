//! Coalesced `notifications/*/list_changed` fan-out (spec §4.2): many
//! upstream capability changes arriving in a burst collapse into one
//! outbound notification per `batchDelayMs` window instead of one per
//! upstream event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListChangedKind {
    Tools,
    Resources,
    Prompts,
}

pub struct ListChangedNotifier {
    tx: broadcast::Sender<ListChangedKind>,
    pending: Arc<[AtomicBool; 3]>,
    batch_delay: Duration,
}

fn index_of(kind: ListChangedKind) -> usize {
    match kind {
        ListChangedKind::Tools => 0,
        ListChangedKind::Resources => 1,
        ListChangedKind::Prompts => 2,
    }
}

impl ListChangedNotifier {
    pub fn new(batch_delay: Duration) -> Self {
        let (tx, _rx) = broadcast::channel(64);
        Self {
            tx,
            pending: Arc::new([AtomicBool::new(false), AtomicBool::new(false), AtomicBool::new(false)]),
            batch_delay,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ListChangedKind> {
        self.tx.subscribe()
    }

    /// Mark `kind` as changed; if no flush is already scheduled for it,
    /// schedule one after `batch_delay`.
    pub fn trigger(self: &Arc<Self>, kind: ListChangedKind) {
        let idx = index_of(kind);
        if self.pending[idx].swap(true, Ordering::AcqRel) {
            return; // a flush is already scheduled
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(this.batch_delay).await;
            this.pending[idx].store(false, Ordering::Release);
            let _ = this.tx.send(kind);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_emits_exactly_one_event_for_a_burst() {
        let notifier = Arc::new(ListChangedNotifier::new(Duration::from_millis(20)));
        let mut rx = notifier.subscribe();

        for _ in 0..5 {
            notifier.trigger(ListChangedKind::Tools);
        }

        let event = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await.unwrap().unwrap();
        assert_eq!(event, ListChangedKind::Tools);

        // no second event should follow from the burst
        let second = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn different_kinds_are_independent() {
        let notifier = Arc::new(ListChangedNotifier::new(Duration::from_millis(10)));
        let mut rx = notifier.subscribe();
        notifier.trigger(ListChangedKind::Tools);
        notifier.trigger(ListChangedKind::Resources);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..2 {
            let event = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await.unwrap().unwrap();
            seen.insert(event);
        }
        assert!(seen.contains(&ListChangedKind::Tools));
        assert!(seen.contains(&ListChangedKind::Resources));
    }
}
