//! Slice store contract.
//!
//! The store itself is owned elsewhere; the engine only selects a slice and
//! dispatches actions. An in-memory backend is provided for embedded use and
//! tests.

/// In-memory reference backend.
pub mod memory;
mod state;
mod traits;

pub use memory::InMemorySliceStore;
pub use state::{FormStatus, SliceState, ValidationErrors};
pub use traits::{SliceStore, StoreError};
