//! In-memory slice store.
//!
//! This module provides a thread-safe in-memory implementation of
//! [`SliceStore`]. It is intended for embedded usage, tests, and as a
//! reference reducer for the action vocabulary.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::trace;

use crate::action::FormAction;

use super::state::SliceState;
use super::traits::{SliceStore, StoreError};

fn lock_err(context: &'static str) -> StoreError {
    StoreError::BackendError(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default)]
struct StoreState {
    slices: HashMap<String, SliceState>,
    subscribers: Vec<(String, Sender<SliceState>)>,
    watchers: Vec<Sender<FormAction>>,
    log: Vec<FormAction>,
}

/// Thread-safe in-memory slice store.
///
/// Apply and notify happen under one lock, so every subscriber observes
/// slice changes in dispatch order.
#[derive(Debug, Default)]
pub struct InMemorySliceStore {
    state: Mutex<StoreState>,
}

impl InMemorySliceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state.lock().map_err(|_| lock_err("slice store"))
    }

    /// Every action dispatched so far, in order.
    pub fn actions(&self) -> Result<Vec<FormAction>, StoreError> {
        Ok(self.lock()?.log.clone())
    }

    /// Actions dispatched so far that target `slice`.
    pub fn actions_for(&self, slice: &str) -> Result<Vec<FormAction>, StoreError> {
        Ok(self
            .lock()?
            .log
            .iter()
            .filter(|a| a.slice() == slice)
            .cloned()
            .collect())
    }

    /// Stream of every action dispatched after this call.
    pub fn watch(&self) -> Result<Receiver<FormAction>, StoreError> {
        let (tx, rx) = unbounded();
        self.lock()?.watchers.push(tx);
        Ok(rx)
    }
}

impl SliceStore for InMemorySliceStore {
    fn slice(&self, key: &str) -> Result<Option<SliceState>, StoreError> {
        Ok(self.lock()?.slices.get(key).cloned())
    }

    fn select(&self, key: &str) -> Result<Receiver<SliceState>, StoreError> {
        let (tx, rx) = unbounded();
        let mut state = self.lock()?;
        if let Some(current) = state.slices.get(key) {
            let _ = tx.send(current.clone());
        }
        state.subscribers.push((key.to_string(), tx));
        Ok(rx)
    }

    fn dispatch(&self, action: FormAction) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let key = action.slice().to_string();
        trace!(slice = %key, kind = ?action.kind(), "store dispatch");

        state.log.push(action.clone());
        state.watchers.retain(|tx| tx.send(action.clone()).is_ok());

        let slice = state.slices.entry(key.clone()).or_default();
        slice.apply(action);
        let snapshot = slice.clone();

        state
            .subscribers
            .retain(|(k, tx)| k != &key || tx.send(snapshot.clone()).is_ok());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_select_emits_current_then_changes() {
        let store = InMemorySliceStore::new();
        store
            .dispatch(FormAction::init_form("profile", json!({"name": "Bob"})))
            .unwrap();

        let rx = store.select("profile").unwrap();
        let first = rx.try_recv().unwrap();
        assert_eq!(first.model, Some(json!({"name": "Bob"})));

        store
            .dispatch(FormAction::update_form("profile", json!({"name": "Ann"})))
            .unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(second.model, Some(json!({"name": "Ann"})));
    }

    #[test]
    fn test_select_filters_by_slice() {
        let store = InMemorySliceStore::new();
        let rx = store.select("profile").unwrap();
        store
            .dispatch(FormAction::init_form("hero", json!({"name": "Hulk"})))
            .unwrap();
        assert!(rx.try_recv().is_err());
        assert!(store.slice("profile").unwrap().is_none());
        assert!(store.slice("hero").unwrap().is_some());
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let store = InMemorySliceStore::new();
        let rx = store.select("profile").unwrap();
        drop(rx);
        store
            .dispatch(FormAction::init_form("profile", json!({})))
            .unwrap();
        assert!(store.lock().unwrap().subscribers.is_empty());
    }

    #[test]
    fn test_action_log_and_watch() {
        let store = InMemorySliceStore::new();
        let watch = store.watch().unwrap();
        store
            .dispatch(FormAction::init_form("a", json!({})))
            .unwrap();
        store
            .dispatch(FormAction::init_form("b", json!({})))
            .unwrap();

        assert_eq!(store.actions().unwrap().len(), 2);
        assert_eq!(store.actions_for("b").unwrap().len(), 1);
        assert_eq!(watch.try_recv().unwrap().slice(), "a");
        assert_eq!(watch.try_recv().unwrap().slice(), "b");
    }
}
