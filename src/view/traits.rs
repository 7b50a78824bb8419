//! Abstract form view trait.
//!
//! A `FormView` is the live control tree the engine patches and samples,
//! plus the event stream it reacts to.

use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::store::{FormStatus, ValidationErrors};

/// Errors raised by a form view.
#[derive(Debug, Error)]
pub enum ViewError {
    /// Backend error.
    #[error("Form view error: {0}")]
    BackendError(String),
}

/// Raw events emitted by a form view.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FormEvent {
    /// The user changed the value of a control.
    ValueChanged { path: String },

    /// A control lost focus.
    Blurred { path: String },

    /// A submit control was activated.
    SubmitActivated,

    /// Validity was re-evaluated.
    StatusChanged {
        status: FormStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        errors: Option<ValidationErrors>,
    },

    /// The set of controls changed (added, removed or re-bound).
    ControlsChanged,
}

/// Live form control tree.
pub trait FormView: Send + Sync {
    /// Full current value, assembled from every control's path and value.
    fn value(&self) -> Result<Value, ViewError>;

    /// Writes the leaves of `partial` whose paths already exist. Unknown
    /// paths are ignored and populated subtrees are never replaced: the view
    /// is authoritative on shape.
    fn patch(&self, partial: &Value) -> Result<(), ViewError>;

    fn mark_pristine(&self) -> Result<(), ViewError>;

    fn is_dirty(&self) -> Result<bool, ViewError>;

    fn is_valid(&self) -> Result<bool, ViewError>;

    /// Forces validity re-evaluation; emits [`FormEvent::StatusChanged`].
    fn revalidate(&self) -> Result<(), ViewError>;

    /// Subscribes to interaction and status events.
    fn events(&self) -> Result<Receiver<FormEvent>, ViewError>;
}
