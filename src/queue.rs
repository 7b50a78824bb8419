//! Pending-action queues.
//!
//! One FIFO queue per slice identifier, created lazily and never removed.
//! Actions requested before a slice's engine is ready are parked here and
//! replayed in enqueue order once it is. The registry is an explicit object:
//! every engine on the same slice must be handed the same registry so they
//! share the same queue.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

use crate::action::FormAction;
use crate::error::{SyncError, SyncResult};
use crate::store::SliceStore;

/// An action parked until its slice's engine is ready.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    pub slice: String,
    pub action: FormAction,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct QueueInner {
    items: VecDeque<PendingAction>,
    listeners: Vec<Sender<()>>,
}

/// FIFO queue of pending actions for one slice.
///
/// Draining and direct dispatch both hold `dispatch_lock`, so an action
/// routed through [`SliceQueue::dispatch_or_enqueue`] never overtakes one
/// that is still being drained.
#[derive(Debug)]
pub struct SliceQueue {
    slice: String,
    initialized: AtomicBool,
    inner: Mutex<QueueInner>,
    dispatch_lock: Mutex<()>,
}

impl SliceQueue {
    fn new(slice: impl Into<String>) -> Self {
        Self {
            slice: slice.into(),
            initialized: AtomicBool::new(false),
            inner: Mutex::new(QueueInner::default()),
            dispatch_lock: Mutex::new(()),
        }
    }

    fn lock(&self) -> SyncResult<MutexGuard<'_, QueueInner>> {
        self.inner
            .lock()
            .map_err(|_| SyncError::internal(format!("poisoned lock: queue {}", self.slice)))
    }

    fn lock_dispatch(&self) -> SyncResult<MutexGuard<'_, ()>> {
        self.dispatch_lock
            .lock()
            .map_err(|_| SyncError::internal(format!("poisoned lock: queue dispatch {}", self.slice)))
    }

    #[must_use]
    pub fn slice(&self) -> &str {
        &self.slice
    }

    /// Appends `action` and signals every listener.
    pub fn enqueue(&self, action: FormAction) -> SyncResult<()> {
        let mut inner = self.lock()?;
        inner.items.push_back(PendingAction {
            slice: self.slice.clone(),
            action,
            enqueued_at: Utc::now(),
        });
        debug!(slice = %self.slice, len = inner.items.len(), "action queued");
        inner.listeners.retain(|tx| tx.send(()).is_ok());
        Ok(())
    }

    /// Removes and returns everything queued, oldest first.
    pub fn dequeue_all(&self) -> SyncResult<Vec<PendingAction>> {
        Ok(self.lock()?.items.drain(..).collect())
    }

    pub fn len(&self) -> SyncResult<usize> {
        Ok(self.lock()?.items.len())
    }

    pub fn is_empty(&self) -> SyncResult<bool> {
        Ok(self.lock()?.items.is_empty())
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Marks the queue initialized. Only the first call has an effect;
    /// returns whether this call flipped the flag.
    pub fn mark_initialized(&self) -> bool {
        !self.initialized.swap(true, Ordering::AcqRel)
    }

    /// Receives one signal per enqueue.
    pub fn subscribe(&self) -> SyncResult<Receiver<()>> {
        let (tx, rx) = unbounded();
        self.lock()?.listeners.push(tx);
        Ok(rx)
    }

    /// Dispatches every queued action to `store` in FIFO order.
    ///
    /// Actions are popped one at a time, so anything enqueued mid-drain is
    /// dispatched by the same call. Returns how many actions were
    /// dispatched. On a store failure the failed action goes back to the
    /// front of the queue.
    pub fn drain_into(&self, store: &dyn SliceStore) -> SyncResult<usize> {
        let _dispatching = self.lock_dispatch()?;
        let mut count = 0;
        loop {
            let Some(next) = self.lock()?.items.pop_front() else {
                break;
            };
            if count == 0 {
                let waited_ms = (Utc::now() - next.enqueued_at).num_milliseconds();
                debug!(slice = %self.slice, waited_ms, "queue drain started");
            }
            if let Err(err) = store.dispatch(next.action.clone()) {
                self.lock()?.items.push_front(next);
                return Err(err.into());
            }
            count += 1;
        }
        if count > 0 {
            debug!(slice = %self.slice, count, "queue drained");
        }
        Ok(count)
    }

    /// Dispatches `action` directly when the queue is initialized and
    /// empty; parks it otherwise so ordering with queued actions is kept.
    pub fn dispatch_or_enqueue(&self, store: &dyn SliceStore, action: FormAction) -> SyncResult<()> {
        let _dispatching = self.lock_dispatch()?;
        if self.is_initialized() && self.is_empty()? {
            store.dispatch(action)?;
            return Ok(());
        }
        self.enqueue(action)
    }
}

/// Process-wide registry of per-slice queues.
#[derive(Debug, Default, Clone)]
pub struct ActionQueues {
    queues: Arc<Mutex<HashMap<String, Arc<SliceQueue>>>>,
}

impl ActionQueues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the queue for `slice`, creating it on first use.
    pub fn get_or_create(&self, slice: &str) -> SyncResult<Arc<SliceQueue>> {
        let mut queues = self
            .queues
            .lock()
            .map_err(|_| SyncError::internal("poisoned lock: action queues"))?;
        let queue = queues
            .entry(slice.to_string())
            .or_insert_with(|| Arc::new(SliceQueue::new(slice)));
        Ok(Arc::clone(queue))
    }

    /// Routes `action` through its slice's queue.
    pub fn dispatch_or_enqueue(&self, store: &dyn SliceStore, action: FormAction) -> SyncResult<()> {
        self.get_or_create(action.slice())?.dispatch_or_enqueue(store, action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemorySliceStore, SliceState, StoreError};
    use serde_json::json;
    use std::thread;
    use std::time::Duration;

    /// Store whose dispatch takes a while, to widen race windows.
    #[derive(Default)]
    struct SlowStore {
        log: Mutex<Vec<FormAction>>,
    }

    impl SliceStore for SlowStore {
        fn slice(&self, _key: &str) -> Result<Option<SliceState>, StoreError> {
            Ok(None)
        }

        fn select(&self, _key: &str) -> Result<Receiver<SliceState>, StoreError> {
            Ok(unbounded().1)
        }

        fn dispatch(&self, action: FormAction) -> Result<(), StoreError> {
            thread::sleep(Duration::from_millis(100));
            self.log.lock().unwrap().push(action);
            Ok(())
        }
    }

    fn update(slice: &str, n: i64) -> FormAction {
        FormAction::update_form_value(slice, json!({ "n": n }))
    }

    #[test]
    fn test_get_or_create_shares_queue() {
        let queues = ActionQueues::new();
        let a = queues.get_or_create("profile").unwrap();
        let b = queues.get_or_create("profile").unwrap();
        let c = queues.get_or_create("hero").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));

        a.enqueue(update("profile", 1)).unwrap();
        assert_eq!(b.len().unwrap(), 1);
    }

    #[test]
    fn test_dequeue_all_fifo() {
        let queue = SliceQueue::new("profile");
        for n in 0..3 {
            queue.enqueue(update("profile", n)).unwrap();
        }
        let drained: Vec<_> = queue
            .dequeue_all()
            .unwrap()
            .into_iter()
            .map(|p| p.action)
            .collect();
        assert_eq!(drained, vec![update("profile", 0), update("profile", 1), update("profile", 2)]);
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn test_enqueue_signals_listeners() {
        let queue = SliceQueue::new("profile");
        let rx = queue.subscribe().unwrap();
        queue.enqueue(update("profile", 1)).unwrap();
        queue.enqueue(update("profile", 2)).unwrap();
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn test_mark_initialized_once() {
        let queue = SliceQueue::new("profile");
        assert!(!queue.is_initialized());
        assert!(queue.mark_initialized());
        assert!(!queue.mark_initialized());
        assert!(queue.is_initialized());
    }

    #[test]
    fn test_drain_into_store() {
        let store = InMemorySliceStore::new();
        let queue = SliceQueue::new("profile");
        queue.enqueue(update("profile", 1)).unwrap();
        queue.enqueue(update("profile", 2)).unwrap();

        assert_eq!(queue.drain_into(&store).unwrap(), 2);
        assert_eq!(store.actions().unwrap(), vec![update("profile", 1), update("profile", 2)]);
        assert_eq!(queue.drain_into(&store).unwrap(), 0);
    }

    #[test]
    fn test_dispatch_or_enqueue() {
        let store = InMemorySliceStore::new();
        let queues = ActionQueues::new();

        queues.dispatch_or_enqueue(&store, update("profile", 1)).unwrap();
        assert!(store.actions().unwrap().is_empty());

        let queue = queues.get_or_create("profile").unwrap();
        queue.mark_initialized();

        // Still parked behind the first action.
        queues.dispatch_or_enqueue(&store, update("profile", 2)).unwrap();
        assert_eq!(queue.len().unwrap(), 2);

        queue.drain_into(&store).unwrap();
        queues.dispatch_or_enqueue(&store, update("profile", 3)).unwrap();
        assert_eq!(
            store.actions().unwrap(),
            vec![update("profile", 1), update("profile", 2), update("profile", 3)]
        );
    }

    #[test]
    fn test_direct_dispatch_waits_for_running_drain() {
        let store = Arc::new(SlowStore::default());
        let queues = ActionQueues::new();
        let queue = queues.get_or_create("profile").unwrap();
        queue.mark_initialized();
        queue.enqueue(update("profile", 1)).unwrap();
        queue.enqueue(update("profile", 2)).unwrap();

        let drainer = {
            let queue = Arc::clone(&queue);
            let store = Arc::clone(&store);
            thread::spawn(move || queue.drain_into(store.as_ref()).unwrap())
        };
        thread::sleep(Duration::from_millis(20));
        queues.dispatch_or_enqueue(store.as_ref(), update("profile", 3)).unwrap();

        drainer.join().unwrap();
        assert_eq!(
            *store.log.lock().unwrap(),
            vec![update("profile", 1), update("profile", 2), update("profile", 3)]
        );
        assert!(queue.is_empty().unwrap());
    }
}
