//! # formsync - Form State Synchronization
//!
//! formsync keeps a live form and a named slice of an application store in
//! agreement. Each mounted form gets a [`SyncEngine`] that patches the form
//! from store updates, writes user edits back on a sampling interval, tracks
//! dirty/submitted/status flags, applies resets, and replays actions that
//! were requested before the form was ready.
//!
//! ## Core Concepts
//!
//! - **Slice**: A named subtree of store state holding one form's model and flags
//! - **FormView**: The live form: a value tree plus dirty and validity tracking
//! - **SyncEngine**: The per-form reconciliation state machine
//! - **ActionQueues**: Per-slice FIFO queues of actions parked until ready
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use formsync::{mount, InMemoryFormView, InMemorySliceStore, RuntimeConfig, SyncConfig, SyncEngine};
//!
//! let store = Arc::new(InMemorySliceStore::new());
//! let view = Arc::new(InMemoryFormView::new(serde_json::json!({"name": "", "age": 0})));
//!
//! let engine = SyncEngine::builder()
//!     .config(SyncConfig::new("profile"))
//!     .store(store.clone())
//!     .view(view.clone())
//!     .build()?;
//! let mounted = mount(engine, &RuntimeConfig::default())?;
//!
//! view.input("name", serde_json::json!("Bob"))?;
//! // ... after one debounce interval the store holds {"name": "Bob", "age": 0}
//! mounted.unmount()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod action;
pub mod error;
pub mod path;
pub mod reset;

// Store and view seams
pub mod store;
pub mod view;

// Engine, queues, configuration
pub mod config;
pub mod engine;
pub mod queue;

pub use action::{ActionKind, FormAction, ResetMode};
pub use config::{FormOptions, FormOptionsSpec, RuntimeConfig, SyncConfig, SyncDefaults, UpdateOn};
pub use engine::{mount, EngineId, Lifecycle, Liveness, MountedForm, SyncEngine, SyncEngineBuilder};
pub use error::{ConfigurationError, SyncError, SyncResult};
pub use queue::{ActionQueues, PendingAction, SliceQueue};
pub use reset::ResetPolicy;
pub use store::{FormStatus, InMemorySliceStore, SliceState, SliceStore, StoreError, ValidationErrors};
pub use view::{FormEvent, FormView, InMemoryFormView, ViewError};
