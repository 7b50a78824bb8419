//! Form view contract.
//!
//! A form view is the live control tree supplied by the UI layer: a value
//! made of (path, value) leaves, a validity status, and raw interaction
//! events. The engine only reads and writes through [`FormView`].

/// In-memory form view for embedded use and tests.
pub mod memory;
mod traits;

pub use memory::{InMemoryFormView, Validator};
pub use traits::{FormEvent, FormView, ViewError};
