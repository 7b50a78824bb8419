//! Synchronization engine.
//!
//! `SyncEngine` is the deterministic core: it reacts to one event at a time
//! (slice change, form event, queue signal, sampling tick) and never blocks.
//! The threaded driver in [`runtime`] owns an engine and feeds it from a
//! single ordered inbox.
//!
//! Lifecycle: `Uninitialized -> Initializing -> Ready -> Destroyed`, linear.

/// Worker thread that drives a mounted engine.
pub mod runtime;

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::action::{ActionKind, FormAction, ResetMode};
use crate::config::{SyncConfig, UpdateOn};
use crate::error::{ConfigurationError, SyncResult};
use crate::path::{deep_equal, intersection};
use crate::queue::{ActionQueues, SliceQueue};
use crate::reset::ResetPolicy;
use crate::store::{FormStatus, SliceState, SliceStore, ValidationErrors};
use crate::view::{FormEvent, FormView};

pub use runtime::{mount, MountedForm};

/// Unique identifier for a mounted engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineId(Uuid);

impl EngineId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EngineId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Engine lifecycle state.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lifecycle {
    Uninitialized,
    Initializing,
    Ready,
    Destroyed,
}

/// Cancellation token shared between an engine and its owner.
///
/// Starts alive; [`Liveness::cancel`] flips it exactly once.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Returns true if this call performed the cancellation.
    pub fn cancel(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Signals {
    input: bool,
    blur: bool,
    submitted: bool,
    status_check: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct StatusObservation {
    status: FormStatus,
    errors: Option<ValidationErrors>,
}

/// Work that arrived before the engine was ready.
#[derive(Debug, Clone, PartialEq)]
enum Deferred {
    Submit { submitted: bool, auto: bool },
    Reset { mode: String },
}

fn empty_value() -> Value {
    Value::Object(Map::new())
}

/// Builder for [`SyncEngine`].
///
/// # Example
/// ```rust,ignore
/// let engine = SyncEngine::builder()
///     .config(SyncConfig::new("profile"))
///     .store(store.clone())
///     .view(view.clone())
///     .queues(queues.clone())
///     .build()?;
/// ```
#[derive(Default)]
pub struct SyncEngineBuilder {
    config: Option<SyncConfig>,
    store: Option<Arc<dyn SliceStore>>,
    view: Option<Arc<dyn FormView>>,
    queues: Option<ActionQueues>,
    liveness: Option<Liveness>,
}

impl SyncEngineBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolved configuration (required).
    #[must_use]
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Store the slice lives in (required).
    #[must_use]
    pub fn store(mut self, store: Arc<dyn SliceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Live form view (required).
    #[must_use]
    pub fn view(mut self, view: Arc<dyn FormView>) -> Self {
        self.view = Some(view);
        self
    }

    /// Shared queue registry. Defaults to a fresh, unshared registry.
    #[must_use]
    pub fn queues(mut self, queues: ActionQueues) -> Self {
        self.queues = Some(queues);
        self
    }

    /// External cancellation token. Defaults to a fresh live token.
    #[must_use]
    pub fn liveness(mut self, liveness: Liveness) -> Self {
        self.liveness = Some(liveness);
        self
    }

    /// Resolves everything and moves the engine to `Initializing`.
    pub fn build(self) -> SyncResult<SyncEngine> {
        let config = self.config.ok_or(ConfigurationError::MissingSlice)?;
        config.validate()?;
        let view = self.view.ok_or(ConfigurationError::MissingFormView)?;
        let store = self.store.ok_or(ConfigurationError::MissingStore)?;
        let queues = self.queues.unwrap_or_default();
        let queue = queues.get_or_create(&config.slice)?;

        let id = EngineId::new();
        debug!(engine = %id, slice = %config.slice, debounce_ms = config.debounce.as_millis() as u64, update_on = %config.update_on, "engine initializing");

        Ok(SyncEngine {
            id,
            config,
            store,
            view,
            queue,
            liveness: self.liveness.unwrap_or_default(),
            lifecycle: Lifecycle::Initializing,
            initial_state: None,
            submitted_state: None,
            signals: Signals::default(),
            last_submit: None,
            last_status: None,
            pending_status: None,
            deferred: VecDeque::new(),
            bindings: 0,
        })
    }
}

/// Per-form synchronization engine.
pub struct SyncEngine {
    id: EngineId,
    config: SyncConfig,
    store: Arc<dyn SliceStore>,
    view: Arc<dyn FormView>,
    queue: Arc<SliceQueue>,
    liveness: Liveness,
    lifecycle: Lifecycle,
    initial_state: Option<Value>,
    submitted_state: Option<Value>,
    signals: Signals,
    last_submit: Option<bool>,
    last_status: Option<StatusObservation>,
    pending_status: Option<StatusObservation>,
    deferred: VecDeque<Deferred>,
    bindings: u64,
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("id", &self.id)
            .field("slice", &self.config.slice)
            .field("lifecycle", &self.lifecycle)
            .field("signals", &self.signals)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    #[must_use]
    pub fn builder() -> SyncEngineBuilder {
        SyncEngineBuilder::new()
    }

    #[must_use]
    pub const fn id(&self) -> EngineId {
        self.id
    }

    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[must_use]
    pub fn slice(&self) -> &str {
        &self.config.slice
    }

    #[must_use]
    pub const fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.lifecycle == Lifecycle::Ready
    }

    /// Snapshot recorded when the engine became ready (or last re-init).
    #[must_use]
    pub const fn initial_state(&self) -> Option<&Value> {
        self.initial_state.as_ref()
    }

    /// Snapshot recorded at the last successful submit.
    #[must_use]
    pub const fn submitted_state(&self) -> Option<&Value> {
        self.submitted_state.as_ref()
    }

    #[must_use]
    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    #[must_use]
    pub fn queue(&self) -> Arc<SliceQueue> {
        Arc::clone(&self.queue)
    }

    pub(crate) fn store(&self) -> &dyn SliceStore {
        self.store.as_ref()
    }

    pub(crate) fn view(&self) -> &dyn FormView {
        self.view.as_ref()
    }

    /// False once unmounted or cancelled; no event is processed after that.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.lifecycle != Lifecycle::Destroyed && self.liveness.is_alive()
    }

    fn dispatch(&self, action: FormAction) -> SyncResult<()> {
        debug!(engine = %self.id, slice = %self.config.slice, kind = ?action.kind(), "dispatch");
        self.store.dispatch(action)?;
        Ok(())
    }

    /// Reacts to a slice change delivered by the store.
    pub fn handle_slice(&mut self, state: SliceState) -> SyncResult<()> {
        if !self.is_live() {
            trace!(engine = %self.id, "slice change after unmount ignored");
            return Ok(());
        }
        let Some(action) = state.action.as_ref() else {
            return Ok(());
        };
        if action.slice() != self.config.slice {
            return Ok(());
        }

        let kind = action.kind();
        if kind.is_value_sync() {
            return self.sync_from_store(&state, kind);
        }

        match action {
            FormAction::UpdateSubmitted { submitted, .. } => {
                let submitted = *submitted;
                self.on_submit(submitted, false)
            }
            FormAction::ResetForm { mode, .. } => {
                let mode = mode.clone();
                self.on_reset(mode)
            }
            _ => Ok(()),
        }
    }

    /// Reacts to an event from the form view.
    pub fn handle_form_event(&mut self, event: FormEvent) -> SyncResult<()> {
        if !self.is_live() {
            trace!(engine = %self.id, "form event after unmount ignored");
            return Ok(());
        }

        match event {
            FormEvent::ValueChanged { .. } => self.signals.input = true,
            FormEvent::Blurred { .. } => self.signals.blur = true,
            FormEvent::SubmitActivated => {
                if self.view.is_valid()? {
                    return self.on_submit(true, true);
                }
                trace!(engine = %self.id, "submit on invalid form ignored");
            }
            FormEvent::StatusChanged { status, errors } => return self.on_status(status, errors),
            FormEvent::ControlsChanged => return self.bind_controls(),
        }
        Ok(())
    }

    /// Reacts to an enqueue on this slice's pending-action queue.
    pub fn handle_queue_signal(&mut self) -> SyncResult<()> {
        if !self.is_live() || !self.is_initialized() || !self.queue.is_initialized() {
            return Ok(());
        }
        self.queue.drain_into(self.store.as_ref())?;
        Ok(())
    }

    /// Sampling tick: writes the form value to the store when the configured
    /// trigger fired since the last tick.
    pub fn tick(&mut self) -> SyncResult<()> {
        if !self.is_live() || !self.is_initialized() {
            return Ok(());
        }

        let Signals {
            input,
            blur,
            submitted,
            ..
        } = self.signals;
        if !(input || blur || submitted) {
            return Ok(());
        }

        let triggered = submitted
            || (self.config.update_on == UpdateOn::Change && input)
            || (self.config.update_on == UpdateOn::Blur && blur);
        if triggered {
            let value = self.view.value()?;
            self.dispatch(FormAction::update_form(self.config.slice.clone(), value))?;
        }

        self.signals.input = false;
        self.signals.blur = false;
        self.signals.submitted = false;
        Ok(())
    }

    /// Binds (or re-binds) the form's controls.
    ///
    /// The first binding synthesizes `AutoInit` when no initial value has been
    /// observed, preferring the store's model over the view snapshot. Later
    /// bindings push the reshaped form value to the store.
    pub fn bind_controls(&mut self) -> SyncResult<()> {
        if !self.is_live() {
            return Ok(());
        }
        self.bindings += 1;

        if self.bindings == 1 {
            if self.is_initialized() {
                return Ok(());
            }
            let model = self.store.slice(&self.config.slice)?.and_then(|s| s.model);
            let value = match model {
                Some(model) => model,
                None => self.view.value()?,
            };
            return self.dispatch(FormAction::AutoInit {
                slice: self.config.slice.clone(),
                value,
            });
        }

        if self.is_initialized() {
            let value = self.view.value()?;
            self.dispatch(FormAction::update_form(self.config.slice.clone(), value))?;
        }
        Ok(())
    }

    /// Final teardown: reset-on-destroy, residual drain, `FormDestroyed`.
    ///
    /// Cancels liveness first; idempotent. Every step runs even when an
    /// earlier one fails, the engine always ends `Destroyed`, and the first
    /// failure is returned.
    pub fn destroy(&mut self) -> SyncResult<()> {
        if self.lifecycle == Lifecycle::Destroyed {
            return Ok(());
        }
        self.liveness.cancel();

        let mut first_err = None;

        if let (Some(mode), true) = (self.config.reset_on_destroy, self.is_initialized()) {
            let reset = self
                .reset_target(mode)
                .and_then(|target| self.dispatch(FormAction::update_form(self.config.slice.clone(), target)));
            if let Err(e) = reset {
                warn!(engine = %self.id, slice = %self.config.slice, error = %e, "reset on destroy failed");
                first_err.get_or_insert(e);
            }
        }

        if self.queue.is_initialized() {
            if let Err(e) = self.queue.drain_into(self.store.as_ref()) {
                warn!(engine = %self.id, slice = %self.config.slice, error = %e, "residual drain failed");
                first_err.get_or_insert(e);
            }
        }

        if let Err(e) = self.dispatch(FormAction::FormDestroyed {
            slice: self.config.slice.clone(),
        }) {
            first_err.get_or_insert(e);
        }

        self.signals = Signals::default();
        self.deferred.clear();
        self.pending_status = None;
        self.lifecycle = Lifecycle::Destroyed;
        debug!(engine = %self.id, slice = %self.config.slice, "engine destroyed");
        first_err.map_or(Ok(()), Err)
    }

    fn sync_from_store(&mut self, state: &SliceState, kind: ActionKind) -> SyncResult<()> {
        let model = state.model.clone().unwrap_or_else(empty_value);
        let current = self.view.value()?;
        if let Some(patch) = intersection(&model, &current) {
            self.view.patch(&patch)?;
        }

        let form_value = self.view.value()?;
        let mut equal = true;

        if kind.is_init() || !self.is_initialized() {
            self.initial_state = Some(form_value);
            self.view.mark_pristine()?;
            if !self.is_initialized() {
                self.enter_ready()?;
            }
        } else {
            let baseline = self
                .submitted_state
                .as_ref()
                .or(self.initial_state.as_ref())
                .cloned()
                .unwrap_or_else(empty_value);
            equal = deep_equal(&form_value, &baseline);
            if equal {
                self.view.mark_pristine()?;
            }
        }

        let submitted = self.submitted_state.is_some() && equal;
        let dirty = !equal;

        let recorded = self
            .store
            .slice(&self.config.slice)?
            .unwrap_or_else(|| state.clone());
        if recorded.submitted != submitted {
            self.dispatch(FormAction::UpdateSubmitted {
                slice: self.config.slice.clone(),
                submitted,
            })?;
        }
        if recorded.dirty != dirty {
            self.dispatch(FormAction::UpdateDirty {
                slice: self.config.slice.clone(),
                dirty,
            })?;
        }

        self.view.revalidate()?;
        self.signals.status_check = true;
        self.flush_status()
    }

    fn enter_ready(&mut self) -> SyncResult<()> {
        self.lifecycle = Lifecycle::Ready;
        debug!(engine = %self.id, slice = %self.config.slice, "engine ready");

        self.queue.mark_initialized();
        self.queue.drain_into(self.store.as_ref())?;

        while let Some(deferred) = self.deferred.pop_front() {
            match deferred {
                Deferred::Submit { submitted, auto } => self.apply_submit(submitted, auto)?,
                Deferred::Reset { mode } => self.apply_reset(&mode)?,
            }
        }
        Ok(())
    }

    fn on_submit(&mut self, submitted: bool, auto: bool) -> SyncResult<()> {
        if !self.is_initialized() {
            self.deferred.push_back(Deferred::Submit { submitted, auto });
            return Ok(());
        }
        self.apply_submit(submitted, auto)
    }

    fn apply_submit(&mut self, submitted: bool, auto: bool) -> SyncResult<()> {
        if self.last_submit == Some(submitted) {
            trace!(engine = %self.id, submitted, "repeated submit signal ignored");
            return Ok(());
        }
        self.last_submit = Some(submitted);

        if auto {
            self.dispatch(FormAction::AutoSubmit {
                slice: self.config.slice.clone(),
            })?;
        }

        if submitted {
            self.submitted_state = Some(self.view.value()?);
            if self.view.is_dirty()? {
                self.view.mark_pristine()?;
                self.signals.submitted = true;
            }
        } else {
            self.signals.submitted = false;
        }
        Ok(())
    }

    fn on_reset(&mut self, mode: String) -> SyncResult<()> {
        if !self.is_initialized() {
            self.deferred.push_back(Deferred::Reset { mode });
            return Ok(());
        }
        self.apply_reset(&mode)
    }

    fn apply_reset(&mut self, mode: &str) -> SyncResult<()> {
        let Ok(mode) = mode.parse::<ResetMode>() else {
            warn!(engine = %self.id, slice = %self.config.slice, mode, "unrecognized reset mode ignored");
            return Ok(());
        };
        let target = self.reset_target(mode)?;
        self.dispatch(FormAction::update_form(self.config.slice.clone(), target))
    }

    fn reset_target(&self, mode: ResetMode) -> SyncResult<Value> {
        let current = self.view.value()?;
        Ok(ResetPolicy::target(
            mode,
            &current,
            self.initial_state.as_ref(),
            self.submitted_state.as_ref(),
        ))
    }

    fn on_status(&mut self, status: FormStatus, errors: Option<ValidationErrors>) -> SyncResult<()> {
        if status.is_pending() {
            return Ok(());
        }
        let observation = StatusObservation { status, errors };
        if self.last_status.as_ref() == Some(&observation) {
            trace!(engine = %self.id, %status, "unchanged status ignored");
            return Ok(());
        }
        self.last_status = Some(observation.clone());
        self.pending_status = Some(observation);
        self.flush_status()
    }

    /// Forwards the pending status observation once a status check is due.
    fn flush_status(&mut self) -> SyncResult<()> {
        if !self.is_initialized() || !self.signals.status_check {
            return Ok(());
        }
        let Some(observation) = self.pending_status.take() else {
            return Ok(());
        };
        self.signals.status_check = false;

        self.dispatch(FormAction::UpdateStatus {
            slice: self.config.slice.clone(),
            status: observation.status,
        })?;
        self.dispatch(FormAction::UpdateErrors {
            slice: self.config.slice.clone(),
            errors: observation.errors,
        })
    }
}
