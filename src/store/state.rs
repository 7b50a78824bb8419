//! Slice state and the reference reducer.
//!
//! `SliceState::apply` folds one `FormAction` into a slice.
//! `InMemorySliceStore` uses it as its reducer.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::FormAction;

/// Validation errors keyed by control path (or error key for form-level errors).
pub type ValidationErrors = BTreeMap<String, Value>;

/// Validity status of a form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FormStatus {
    #[default]
    Valid,
    Invalid,
    /// Asynchronous validation still running. Never forwarded to the store.
    Pending,
    Disabled,
}

impl FormStatus {
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }

    #[must_use]
    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl fmt::Display for FormStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Valid => "VALID",
            Self::Invalid => "INVALID",
            Self::Pending => "PENDING",
            Self::Disabled => "DISABLED",
        };
        f.write_str(s)
    }
}

/// Store-side state of one form slice.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SliceState {
    /// Canonical form data; `None` until a value has been recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<Value>,
    /// Last action applied to this slice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<FormAction>,
    #[serde(default)]
    pub submitted: bool,
    #[serde(default)]
    pub dirty: bool,
    #[serde(default)]
    pub status: FormStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<ValidationErrors>,
}

impl SliceState {
    /// Applies `action` and records it as the slice's last action.
    ///
    /// `UpdateFormValue` merges its partial value into the model and is
    /// recorded as the resulting full `UpdateForm`, so views see one kind of
    /// value update.
    pub fn apply(&mut self, action: FormAction) {
        let recorded = match action {
            FormAction::InitForm { ref value, .. }
            | FormAction::AutoInit { ref value, .. }
            | FormAction::UpdateForm { ref value, .. } => {
                self.model = Some(value.clone());
                action
            }
            FormAction::UpdateFormValue { slice, value } => {
                let mut merged = self
                    .model
                    .take()
                    .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
                crate::path::deep_merge(&mut merged, &value);
                self.model = Some(merged.clone());
                FormAction::UpdateForm {
                    slice,
                    value: merged,
                }
            }
            FormAction::UpdateDirty { dirty, .. } => {
                self.dirty = dirty;
                action
            }
            FormAction::UpdateSubmitted { submitted, .. } => {
                self.submitted = submitted;
                action
            }
            FormAction::AutoSubmit { .. } => {
                self.submitted = true;
                action
            }
            FormAction::UpdateStatus { status, .. } => {
                self.status = status;
                action
            }
            FormAction::UpdateErrors { ref errors, .. } => {
                self.errors = errors.clone();
                action
            }
            FormAction::ResetForm { .. } | FormAction::FormDestroyed { .. } => action,
        };
        self.action = Some(recorded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_apply_update_form_records_model() {
        let mut state = SliceState::default();
        state.apply(FormAction::init_form("p", json!({"name": "Bob"})));
        assert_eq!(state.model, Some(json!({"name": "Bob"})));
        assert_eq!(
            state.action.as_ref().map(FormAction::kind),
            Some(crate::action::ActionKind::InitForm)
        );
    }

    #[test]
    fn test_apply_update_form_value_merges() {
        let mut state = SliceState::default();
        state.apply(FormAction::init_form(
            "p",
            json!({"firstName": "Bob", "address": {"street": "Main", "city": "X"}}),
        ));
        state.apply(FormAction::update_form_value(
            "p",
            json!({"firstName": "Nancy", "address": {"street": "123 Drew Street"}}),
        ));

        let expected = json!({"firstName": "Nancy", "address": {"street": "123 Drew Street", "city": "X"}});
        assert_eq!(state.model, Some(expected.clone()));
        assert_eq!(state.action, Some(FormAction::update_form("p", expected)));
    }

    #[test]
    fn test_apply_bookkeeping() {
        let mut state = SliceState::default();
        state.apply(FormAction::UpdateDirty {
            slice: "p".to_string(),
            dirty: true,
        });
        state.apply(FormAction::AutoSubmit {
            slice: "p".to_string(),
        });
        state.apply(FormAction::UpdateStatus {
            slice: "p".to_string(),
            status: FormStatus::Invalid,
        });
        assert!(state.dirty);
        assert!(state.submitted);
        assert_eq!(state.status, FormStatus::Invalid);
        assert_eq!(state.model, None);
    }

    #[test]
    fn test_status_serde() {
        assert_eq!(serde_json::to_value(FormStatus::Invalid).unwrap(), json!("INVALID"));
        assert_eq!(FormStatus::Pending.to_string(), "PENDING");
    }
}
