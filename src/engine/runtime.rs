//! Threaded driver for a mounted engine.
//!
//! Each mounted form gets one worker thread that owns its `SyncEngine` and
//! selects over every event source: slice changes, form events, queue
//! signals, the sampling ticker and control messages. All reconciliation for
//! that form runs on this one thread, one event at a time.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, never, select, tick, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, warn};

use crate::config::RuntimeConfig;
use crate::error::{SyncError, SyncResult};
use crate::store::SliceState;
use crate::view::FormEvent;

use super::{EngineId, Lifecycle, Liveness, SyncEngine};

/// Floor for the sampling ticker; a zero interval would spin.
const MIN_TICK: Duration = Duration::from_millis(1);

enum ControlMsg {
    Shutdown { reply: Sender<SyncEngine> },
}

/// Handle to a mounted form.
///
/// Unmounting (explicitly or on drop) stops event processing immediately,
/// then runs the engine's final teardown on the caller's thread.
#[derive(Debug)]
pub struct MountedForm {
    id: EngineId,
    slice: String,
    liveness: Liveness,
    control_tx: Sender<ControlMsg>,
    failures: Receiver<SyncError>,
    dropped_failures: Arc<AtomicU64>,
    shutdown_timeout: Duration,
    join: Option<JoinHandle<()>>,
}

/// Mounts `engine` on its own worker thread.
///
/// Subscriptions are taken before the worker starts, so nothing emitted
/// between mount and the first select is lost.
pub fn mount(engine: SyncEngine, cfg: &RuntimeConfig) -> SyncResult<MountedForm> {
    if engine.lifecycle() == Lifecycle::Destroyed {
        return Err(SyncError::Lifecycle {
            expected: Lifecycle::Initializing,
            actual: Lifecycle::Destroyed,
        });
    }

    let slice_rx = engine.store().select(engine.slice())?;
    let form_rx = engine.view().events()?;
    let queue_rx = engine.queue().subscribe()?;

    let (control_tx, control_rx) = bounded::<ControlMsg>(cfg.control_queue_capacity.max(1));
    let (failure_tx, failures) = bounded::<SyncError>(cfg.failure_queue_capacity.max(1));
    let dropped_failures = Arc::new(AtomicU64::new(0));

    let id = engine.id();
    let slice = engine.slice().to_string();
    let liveness = engine.liveness();

    let inbox = Inbox {
        control_rx,
        slice_rx,
        form_rx,
        queue_rx,
        failure_tx,
        dropped_failures: Arc::clone(&dropped_failures),
    };
    let join = thread::Builder::new()
        .name(format!("formsync-{slice}"))
        .spawn(move || worker_loop(engine, inbox))
        .map_err(|e| SyncError::internal(format!("failed to spawn formsync worker: {e}")))?;

    debug!(engine = %id, slice = %slice, "form mounted");

    Ok(MountedForm {
        id,
        slice,
        liveness,
        control_tx,
        failures,
        dropped_failures,
        shutdown_timeout: cfg.shutdown_timeout,
        join: Some(join),
    })
}

impl MountedForm {
    #[must_use]
    pub const fn id(&self) -> EngineId {
        self.id
    }

    #[must_use]
    pub fn slice(&self) -> &str {
        &self.slice
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.liveness.is_alive()
    }

    /// Errors raised while processing events on the worker thread.
    #[must_use]
    pub fn failures(&self) -> &Receiver<SyncError> {
        &self.failures
    }

    /// Failures dropped because [`MountedForm::failures`] was full.
    #[must_use]
    pub fn dropped_failures(&self) -> u64 {
        self.dropped_failures.load(Ordering::Relaxed)
    }

    /// Unmounts the form and runs the engine's teardown.
    pub fn unmount(mut self) -> SyncResult<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> SyncResult<()> {
        let Some(join) = self.join.take() else {
            return Ok(());
        };

        // Stop reacting first: anything still queued in the inbox is dropped.
        self.liveness.cancel();

        let (reply_tx, reply_rx) = bounded::<SyncEngine>(1);
        let handed_back = match self.control_tx.send(ControlMsg::Shutdown { reply: reply_tx }) {
            Ok(()) => reply_rx.recv_timeout(self.shutdown_timeout),
            Err(_) => Err(RecvTimeoutError::Disconnected),
        };

        let mut engine = match handed_back {
            Ok(engine) => engine,
            Err(RecvTimeoutError::Timeout) => {
                // The worker is stuck; it is detached rather than joined.
                return Err(SyncError::Timeout {
                    duration_ms: self.shutdown_timeout.as_millis().min(u128::from(u64::MAX)) as u64,
                });
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(match join.join() {
                    Err(payload) => SyncError::internal(format!(
                        "formsync worker panicked: {}",
                        panic_message(payload.as_ref())
                    )),
                    Ok(()) => SyncError::disconnected("formsync_worker"),
                });
            }
        };

        if let Err(payload) = join.join() {
            warn!(
                engine = %self.id,
                slice = %self.slice,
                panic = panic_message(payload.as_ref()),
                "worker panicked after handing back the engine"
            );
        }
        engine.destroy()?;
        debug!(engine = %self.id, slice = %self.slice, "form unmounted");
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}

impl Drop for MountedForm {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(engine = %self.id, slice = %self.slice, error = %e, "unmount on drop failed");
        }
    }
}

struct Inbox {
    control_rx: Receiver<ControlMsg>,
    slice_rx: Receiver<SliceState>,
    form_rx: Receiver<FormEvent>,
    queue_rx: Receiver<()>,
    failure_tx: Sender<SyncError>,
    dropped_failures: Arc<AtomicU64>,
}

impl Inbox {
    /// Never blocks the worker: failures nobody drains are counted instead.
    fn report(&self, engine: &SyncEngine, result: SyncResult<()>) {
        if let Err(e) = result {
            warn!(engine = %engine.id(), slice = %engine.slice(), error = %e, "sync step failed");
            match self.failure_tx.try_send(e) {
                Ok(()) => {}
                Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                    self.dropped_failures.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

fn worker_loop(mut engine: SyncEngine, inbox: Inbox) {
    let ticker = tick(engine.config().debounce.max(MIN_TICK));
    let mut slice_open = true;
    let mut form_open = true;
    let mut queue_open = true;

    // Whatever the store already holds is applied before controls bind, so an
    // existing InitForm wins over a synthesized AutoInit.
    while let Ok(state) = inbox.slice_rx.try_recv() {
        let result = engine.handle_slice(state);
        inbox.report(&engine, result);
    }
    let result = engine.bind_controls();
    inbox.report(&engine, result);

    loop {
        let slice_rx = if slice_open { inbox.slice_rx.clone() } else { never() };
        let form_rx = if form_open { inbox.form_rx.clone() } else { never() };
        let queue_rx = if queue_open { inbox.queue_rx.clone() } else { never() };

        select! {
            recv(inbox.control_rx) -> msg => match msg {
                Ok(ControlMsg::Shutdown { reply }) => {
                    let _ = reply.send(engine);
                    return;
                }
                Err(_) => return,
            },
            recv(slice_rx) -> msg => match msg {
                Ok(state) if engine.is_live() => {
                    let result = engine.handle_slice(state);
                    inbox.report(&engine, result);
                }
                Ok(_) => {}
                Err(_) => slice_open = false,
            },
            recv(form_rx) -> msg => match msg {
                Ok(event) if engine.is_live() => {
                    let result = engine.handle_form_event(event);
                    inbox.report(&engine, result);
                }
                Ok(_) => {}
                Err(_) => form_open = false,
            },
            recv(queue_rx) -> msg => match msg {
                Ok(()) if engine.is_live() => {
                    let result = engine.handle_queue_signal();
                    inbox.report(&engine, result);
                }
                Ok(()) => {}
                Err(_) => queue_open = false,
            },
            recv(ticker) -> _ => {
                if engine.is_live() {
                    let result = engine.tick();
                    inbox.report(&engine, result);
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::store::InMemorySliceStore;
    use crate::view::InMemoryFormView;
    use serde_json::json;

    fn engine() -> SyncEngine {
        SyncEngine::builder()
            .config(SyncConfig::new("profile"))
            .store(Arc::new(InMemorySliceStore::new()))
            .view(Arc::new(InMemoryFormView::new(json!({"name": ""}))))
            .build()
            .unwrap()
    }

    #[test]
    fn test_report_counts_failures_past_capacity() {
        let engine = engine();
        let (failure_tx, failures) = bounded(1);
        let (_control_tx, control_rx) = bounded(1);
        let dropped = Arc::new(AtomicU64::new(0));
        let inbox = Inbox {
            control_rx,
            slice_rx: never(),
            form_rx: never(),
            queue_rx: never(),
            failure_tx,
            dropped_failures: Arc::clone(&dropped),
        };

        inbox.report(&engine, Ok(()));
        inbox.report(&engine, Err(SyncError::internal("first")));
        inbox.report(&engine, Err(SyncError::internal("second")));

        assert_eq!(dropped.load(Ordering::Relaxed), 1);
        assert!(matches!(failures.try_recv(), Ok(SyncError::Internal { message }) if message == "first"));
        assert!(failures.try_recv().is_err());
    }

    #[test]
    fn test_panic_message() {
        let text: Box<dyn Any + Send> = Box::new("boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("bang"));
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(text.as_ref()), "boom");
        assert_eq!(panic_message(owned.as_ref()), "bang");
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
