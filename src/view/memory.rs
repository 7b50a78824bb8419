//! In-memory form view.
//!
//! Models a control tree as a JSON value plus dirty/status bookkeeping. The
//! `input`, `blur` and `click_submit` methods simulate user interaction.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde_json::Value;

use crate::path::{get_value, leaf_paths, set_value};
use crate::store::{FormStatus, ValidationErrors};

use super::traits::{FormEvent, FormView, ViewError};

/// Validation function: `None` means valid.
pub type Validator = Arc<dyn Fn(&Value) -> Option<ValidationErrors> + Send + Sync>;

fn is_branch(value: &Value) -> bool {
    match value {
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => false,
    }
}

fn lock_err() -> ViewError {
    ViewError::BackendError("poisoned lock: form view".to_string())
}

struct ViewState {
    value: Value,
    dirty: bool,
    disabled: bool,
    status: FormStatus,
    errors: Option<ValidationErrors>,
    validator: Option<Validator>,
    subscribers: Vec<Sender<FormEvent>>,
}

impl ViewState {
    fn emit(&mut self, event: &FormEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn validate(&mut self) {
        self.errors = self.validator.as_ref().and_then(|v| v(&self.value));
        self.status = if self.disabled {
            FormStatus::Disabled
        } else if self.errors.is_some() {
            FormStatus::Invalid
        } else {
            FormStatus::Valid
        };
        let event = FormEvent::StatusChanged {
            status: self.status,
            errors: self.errors.clone(),
        };
        self.emit(&event);
    }
}

/// Thread-safe in-memory form view.
pub struct InMemoryFormView {
    state: Mutex<ViewState>,
}

impl fmt::Debug for InMemoryFormView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryFormView").finish_non_exhaustive()
    }
}

impl InMemoryFormView {
    /// Creates a view whose control tree has the shape and values of `value`.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self {
            state: Mutex::new(ViewState {
                value,
                dirty: false,
                disabled: false,
                status: FormStatus::Valid,
                errors: None,
                validator: None,
                subscribers: Vec::new(),
            }),
        }
    }

    /// Attaches a validator, evaluated on every input and revalidation.
    ///
    /// Takes the view by value, so the state is reached without locking; a
    /// poisoned mutex is recovered rather than skipped.
    #[must_use]
    pub fn with_validator(
        mut self,
        validator: impl Fn(&Value) -> Option<ValidationErrors> + Send + Sync + 'static,
    ) -> Self {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.validator = Some(Arc::new(validator));
        state.errors = state.validator.as_ref().and_then(|v| v(&state.value));
        state.status = if state.errors.is_some() {
            FormStatus::Invalid
        } else {
            FormStatus::Valid
        };
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, ViewState>, ViewError> {
        self.state.lock().map_err(|_| lock_err())
    }

    /// Simulates user input on the control at `path`.
    pub fn input(&self, path: &str, value: Value) -> Result<(), ViewError> {
        let mut state = self.lock()?;
        set_value(&mut state.value, path, value);
        state.dirty = true;
        state.emit(&FormEvent::ValueChanged {
            path: path.to_string(),
        });
        state.validate();
        Ok(())
    }

    /// Simulates the control at `path` losing focus.
    pub fn blur(&self, path: &str) -> Result<(), ViewError> {
        self.lock()?.emit(&FormEvent::Blurred {
            path: path.to_string(),
        });
        Ok(())
    }

    /// Simulates a click on the submit control.
    pub fn click_submit(&self) -> Result<(), ViewError> {
        self.lock()?.emit(&FormEvent::SubmitActivated);
        Ok(())
    }

    /// Replaces the control tree, keeping values where paths survive.
    pub fn set_controls(&self, shape: Value) -> Result<(), ViewError> {
        let mut state = self.lock()?;
        let mut next = shape;
        for path in leaf_paths(&next) {
            if let Some(existing) = get_value(&state.value, &path) {
                set_value(&mut next, &path, existing.clone());
            }
        }
        state.value = next;
        state.emit(&FormEvent::ControlsChanged);
        Ok(())
    }

    /// Forces a status, as an asynchronous validator would.
    pub fn set_status(
        &self,
        status: FormStatus,
        errors: Option<ValidationErrors>,
    ) -> Result<(), ViewError> {
        let mut state = self.lock()?;
        state.status = status;
        state.errors = errors.clone();
        state.emit(&FormEvent::StatusChanged { status, errors });
        Ok(())
    }

    /// Enables or disables the whole form.
    pub fn set_disabled(&self, disabled: bool) -> Result<(), ViewError> {
        let mut state = self.lock()?;
        state.disabled = disabled;
        state.validate();
        Ok(())
    }

    pub fn status(&self) -> Result<FormStatus, ViewError> {
        Ok(self.lock()?.status)
    }

    pub fn errors(&self) -> Result<Option<ValidationErrors>, ViewError> {
        Ok(self.lock()?.errors.clone())
    }
}

impl FormView for InMemoryFormView {
    fn value(&self) -> Result<Value, ViewError> {
        Ok(self.lock()?.value.clone())
    }

    fn patch(&self, partial: &Value) -> Result<(), ViewError> {
        let mut state = self.lock()?;
        for path in leaf_paths(partial) {
            // Only existing leaves are written; a subtree is never replaced.
            match get_value(&state.value, &path) {
                None => continue,
                Some(existing) if is_branch(existing) => continue,
                Some(_) => {}
            }
            if let Some(v) = get_value(partial, &path) {
                set_value(&mut state.value, &path, v.clone());
            }
        }
        Ok(())
    }

    fn mark_pristine(&self) -> Result<(), ViewError> {
        self.lock()?.dirty = false;
        Ok(())
    }

    fn is_dirty(&self) -> Result<bool, ViewError> {
        Ok(self.lock()?.dirty)
    }

    fn is_valid(&self) -> Result<bool, ViewError> {
        Ok(self.lock()?.status.is_valid())
    }

    fn revalidate(&self) -> Result<(), ViewError> {
        self.lock()?.validate();
        Ok(())
    }

    fn events(&self) -> Result<Receiver<FormEvent>, ViewError> {
        let (tx, rx) = unbounded();
        self.lock()?.subscribers.push(tx);
        Ok(rx)
    }
}
