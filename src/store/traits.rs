//! Abstract slice store trait.
//!
//! The engine consumes a keyed, observable store through this contract:
//! - `slice` for take-one reads of the current state
//! - `select` for a stream of slice changes
//! - `dispatch` for writes

use crossbeam_channel::Receiver;
use thiserror::Error;

use crate::action::FormAction;

use super::state::SliceState;

/// Errors that can occur talking to a slice store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store is gone or no longer accepts actions.
    #[error("Store disconnected for slice: {0}")]
    Disconnected(String),

    /// Backend error.
    #[error("Store backend error: {0}")]
    BackendError(String),
}

/// Keyed observable state container.
///
/// # Ordering
/// Slice changes must be delivered to each `select` stream in the order the
/// corresponding actions were applied.
pub trait SliceStore: Send + Sync {
    /// Current state of `key`, if the slice exists.
    fn slice(&self, key: &str) -> Result<Option<SliceState>, StoreError>;

    /// Stream of states for `key`.
    ///
    /// Implementations emit the current state first when the slice already
    /// exists, then every subsequent change.
    fn select(&self, key: &str) -> Result<Receiver<SliceState>, StoreError>;

    /// Apply an action. Failures belong to the store owner.
    fn dispatch(&self, action: FormAction) -> Result<(), StoreError>;
}
