//! Action vocabulary exchanged with the slice store.
//!
//! Every action carries the slice it targets. The engine observes the last
//! applied action on a slice to tell its own writes apart from external ones.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigurationError;
use crate::store::{FormStatus, ValidationErrors};

/// Store actions understood by the sync engine.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FormAction {
    /// Externally supplied initial value.
    InitForm { slice: String, value: Value },

    /// Initial value synthesized by the engine when the store had none.
    AutoInit { slice: String, value: Value },

    /// Full form value written by either side.
    UpdateForm { slice: String, value: Value },

    /// Partial programmatic update, merged into the model by the store.
    UpdateFormValue { slice: String, value: Value },

    /// Reset request. The mode stays a raw string: unknown modes are ignored.
    ResetForm { slice: String, mode: String },

    UpdateDirty { slice: String, dirty: bool },

    UpdateSubmitted { slice: String, submitted: bool },

    /// Submit detected locally while the form was valid.
    AutoSubmit { slice: String },

    UpdateStatus { slice: String, status: FormStatus },

    UpdateErrors {
        slice: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        errors: Option<ValidationErrors>,
    },

    FormDestroyed { slice: String },
}

/// Tag-only view of a [`FormAction`], used for filtering.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    InitForm,
    AutoInit,
    UpdateForm,
    UpdateFormValue,
    ResetForm,
    UpdateDirty,
    UpdateSubmitted,
    AutoSubmit,
    UpdateStatus,
    UpdateErrors,
    FormDestroyed,
}

impl ActionKind {
    /// Actions that carry a full model the engine must patch into the view.
    #[must_use]
    pub const fn is_value_sync(self) -> bool {
        matches!(self, Self::InitForm | Self::UpdateForm | Self::AutoInit)
    }

    /// Actions that establish the initial value of a slice.
    #[must_use]
    pub const fn is_init(self) -> bool {
        matches!(self, Self::InitForm | Self::AutoInit)
    }
}

impl FormAction {
    #[must_use]
    pub fn init_form(slice: impl Into<String>, value: Value) -> Self {
        Self::InitForm {
            slice: slice.into(),
            value,
        }
    }

    #[must_use]
    pub fn update_form(slice: impl Into<String>, value: Value) -> Self {
        Self::UpdateForm {
            slice: slice.into(),
            value,
        }
    }

    #[must_use]
    pub fn update_form_value(slice: impl Into<String>, value: Value) -> Self {
        Self::UpdateFormValue {
            slice: slice.into(),
            value,
        }
    }

    #[must_use]
    pub fn reset_form(slice: impl Into<String>, mode: impl Into<String>) -> Self {
        Self::ResetForm {
            slice: slice.into(),
            mode: mode.into(),
        }
    }

    #[must_use]
    pub fn update_submitted(slice: impl Into<String>, submitted: bool) -> Self {
        Self::UpdateSubmitted {
            slice: slice.into(),
            submitted,
        }
    }

    /// The slice this action targets.
    #[must_use]
    pub fn slice(&self) -> &str {
        match self {
            Self::InitForm { slice, .. }
            | Self::AutoInit { slice, .. }
            | Self::UpdateForm { slice, .. }
            | Self::UpdateFormValue { slice, .. }
            | Self::ResetForm { slice, .. }
            | Self::UpdateDirty { slice, .. }
            | Self::UpdateSubmitted { slice, .. }
            | Self::AutoSubmit { slice }
            | Self::UpdateStatus { slice, .. }
            | Self::UpdateErrors { slice, .. }
            | Self::FormDestroyed { slice } => slice,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::InitForm { .. } => ActionKind::InitForm,
            Self::AutoInit { .. } => ActionKind::AutoInit,
            Self::UpdateForm { .. } => ActionKind::UpdateForm,
            Self::UpdateFormValue { .. } => ActionKind::UpdateFormValue,
            Self::ResetForm { .. } => ActionKind::ResetForm,
            Self::UpdateDirty { .. } => ActionKind::UpdateDirty,
            Self::UpdateSubmitted { .. } => ActionKind::UpdateSubmitted,
            Self::AutoSubmit { .. } => ActionKind::AutoSubmit,
            Self::UpdateStatus { .. } => ActionKind::UpdateStatus,
            Self::UpdateErrors { .. } => ActionKind::UpdateErrors,
            Self::FormDestroyed { .. } => ActionKind::FormDestroyed,
        }
    }

    /// The model value carried by value-bearing actions.
    #[must_use]
    pub const fn value(&self) -> Option<&Value> {
        match self {
            Self::InitForm { value, .. }
            | Self::AutoInit { value, .. }
            | Self::UpdateForm { value, .. }
            | Self::UpdateFormValue { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// Target of a reset request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetMode {
    /// Back to the value recorded when the engine became ready.
    Initial,
    /// Back to the value recorded at the last successful submit.
    Submitted,
    /// Every recognized scalar leaf set to its zero value.
    Blank,
}

impl ResetMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Submitted => "submitted",
            Self::Blank => "blank",
        }
    }
}

impl fmt::Display for ResetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResetMode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "initial" => Ok(Self::Initial),
            "submitted" => Ok(Self::Submitted),
            "blank" => Ok(Self::Blank),
            other => Err(ConfigurationError::InvalidResetMode {
                value: other.to_string(),
            }),
        }
    }
}
