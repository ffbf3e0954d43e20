//! Event dispatch registry.
//!
//! Three event categories are raised by the localizer: FrameAvailable for
//! every localized frame, KeyFrameAvailable when a frame is promoted, and
//! LoopClosureDetected after the trajectory has been re-optimized. Handlers
//! register under a name per category; registering an existing name replaces
//! the handler in place, keeping its position.
//!
//! Dispatch runs every handler of the category in registration order on the
//! calling thread while holding the pipeline state lock. A handler that
//! returns an error or panics is reported as a [`HandlerFault`] and the
//! remaining handlers still run.
//!
//! Handlers must not call back into the dispatcher: the lock is not
//! reentrant.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use parking_lot::Mutex;
use tracing::warn;

use crate::error::{ReconError, Result};
use crate::fusion::throttle::GateSnapshot;
use crate::sensor::{Frame, KeyFrameRef};

use super::shared_state::PipelineState;

/// Event category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    FrameAvailable,
    KeyFrameAvailable,
    LoopClosureDetected,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::FrameAvailable => "FrameAvailable",
            EventKind::KeyFrameAvailable => "KeyFrameAvailable",
            EventKind::LoopClosureDetected => "LoopClosureDetected",
        };
        f.write_str(name)
    }
}

/// Reacts to every localized frame.
pub trait FrameHandler: Send {
    fn on_frame(&mut self, state: &mut PipelineState, gate: GateSnapshot, frame: &Frame) -> Result<()>;
}

/// Reacts to a frame being promoted to a KeyFrame.
pub trait KeyFrameHandler: Send {
    fn on_keyframe(
        &mut self,
        state: &mut PipelineState,
        gate: GateSnapshot,
        frame: &Frame,
        keyframe: &KeyFrameRef,
    ) -> Result<()>;
}

/// Reacts to the trajectory being re-optimized after a loop closure.
pub trait LoopClosureHandler: Send {
    fn on_loop_closure(&mut self, state: &mut PipelineState) -> Result<()>;
}

/// Insertion-ordered, name-keyed handler list.
pub struct HandlerRegistry<H: ?Sized> {
    entries: Vec<(String, Box<H>)>,
}

impl<H: ?Sized> Default for HandlerRegistry<H> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<H: ?Sized> HandlerRegistry<H> {
    /// Add `handler` under `name`. Returns true if it replaced an existing
    /// handler, which keeps the original position.
    pub fn register(&mut self, name: String, handler: Box<H>) -> bool {
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = handler;
            return true;
        }
        self.entries.push((name, handler));
        false
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut H)> {
        self.entries.iter_mut().map(|(n, h)| (n.as_str(), h.as_mut()))
    }
}

/// A handler invocation that failed or panicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFault {
    pub kind: EventKind,
    pub handler: String,
    pub message: String,
}

impl From<HandlerFault> for ReconError {
    fn from(fault: HandlerFault) -> Self {
        ReconError::HandlerFault {
            handler: format!("{}/{}", fault.kind, fault.handler),
            message: fault.message,
        }
    }
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub kind: EventKind,
    /// Number of handlers invoked, faulted or not.
    pub invoked: usize,
    pub faults: Vec<HandlerFault>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }

    /// First fault as an error, if any.
    pub fn into_result(self) -> Result<()> {
        match self.faults.into_iter().next() {
            Some(fault) => Err(fault.into()),
            None => Ok(()),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

/// Run one handler, converting errors and panics into a fault.
fn run_isolated<F>(kind: EventKind, name: &str, call: F) -> Option<HandlerFault>
where
    F: FnOnce() -> Result<()>,
{
    let message = match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => return None,
        Ok(Err(e)) => e.to_string(),
        Err(payload) => panic_message(payload.as_ref()),
    };
    warn!("{} handler '{}' failed: {}", kind, name, message);
    Some(HandlerFault {
        kind,
        handler: name.to_string(),
        message,
    })
}

struct DispatchInner {
    state: PipelineState,
    frame_handlers: HandlerRegistry<dyn FrameHandler>,
    keyframe_handlers: HandlerRegistry<dyn KeyFrameHandler>,
    loop_handlers: HandlerRegistry<dyn LoopClosureHandler>,
}

/// Owns the pipeline state and the three handler registries behind one lock.
pub struct EventDispatcher {
    inner: Mutex<DispatchInner>,
}

impl EventDispatcher {
    pub fn new(state: PipelineState) -> Self {
        Self {
            inner: Mutex::new(DispatchInner {
                state,
                frame_handlers: HandlerRegistry::default(),
                keyframe_handlers: HandlerRegistry::default(),
                loop_handlers: HandlerRegistry::default(),
            }),
        }
    }

    pub fn register_frame_handler(&self, name: impl Into<String>, handler: impl FrameHandler + 'static) {
        self.inner
            .lock()
            .frame_handlers
            .register(name.into(), Box::new(handler));
    }

    pub fn register_keyframe_handler(
        &self,
        name: impl Into<String>,
        handler: impl KeyFrameHandler + 'static,
    ) {
        self.inner
            .lock()
            .keyframe_handlers
            .register(name.into(), Box::new(handler));
    }

    pub fn register_loop_closure_handler(
        &self,
        name: impl Into<String>,
        handler: impl LoopClosureHandler + 'static,
    ) {
        self.inner
            .lock()
            .loop_handlers
            .register(name.into(), Box::new(handler));
    }

    /// Names registered for `kind`, in dispatch order.
    pub fn handler_names(&self, kind: EventKind) -> Vec<String> {
        let inner = self.inner.lock();
        let names = match kind {
            EventKind::FrameAvailable => inner.frame_handlers.names(),
            EventKind::KeyFrameAvailable => inner.keyframe_handlers.names(),
            EventKind::LoopClosureDetected => inner.loop_handlers.names(),
        };
        names.into_iter().map(str::to_string).collect()
    }

    /// Start a new acquisition tick.
    pub fn begin_tick(&self) -> GateSnapshot {
        self.inner.lock().state.begin_tick()
    }

    pub fn dispatch_frame(&self, frame: &Frame) -> DispatchReport {
        let mut guard = self.inner.lock();
        let DispatchInner {
            state,
            frame_handlers,
            ..
        } = &mut *guard;

        let gate = state.gate();
        let kind = EventKind::FrameAvailable;
        let mut faults = Vec::new();
        for (name, handler) in frame_handlers.iter_mut() {
            faults.extend(run_isolated(kind, name, || handler.on_frame(state, gate, frame)));
        }
        state.stats.handler_faults += faults.len() as u64;

        DispatchReport {
            kind,
            invoked: frame_handlers.len(),
            faults,
        }
    }

    pub fn dispatch_keyframe(&self, frame: &Frame, keyframe: &KeyFrameRef) -> DispatchReport {
        let mut guard = self.inner.lock();
        let DispatchInner {
            state,
            keyframe_handlers,
            ..
        } = &mut *guard;

        let gate = state.gate();
        let kind = EventKind::KeyFrameAvailable;
        state.stats.keyframes += 1;
        let mut faults = Vec::new();
        for (name, handler) in keyframe_handlers.iter_mut() {
            faults.extend(run_isolated(kind, name, || {
                handler.on_keyframe(state, gate, frame, keyframe)
            }));
        }
        state.stats.handler_faults += faults.len() as u64;

        DispatchReport {
            kind,
            invoked: keyframe_handlers.len(),
            faults,
        }
    }

    pub fn dispatch_loop_closure(&self) -> DispatchReport {
        let mut guard = self.inner.lock();
        let DispatchInner {
            state,
            loop_handlers,
            ..
        } = &mut *guard;

        let kind = EventKind::LoopClosureDetected;
        let mut faults = Vec::new();
        for (name, handler) in loop_handlers.iter_mut() {
            faults.extend(run_isolated(kind, name, || handler.on_loop_closure(state)));
        }
        state.stats.handler_faults += faults.len() as u64;

        DispatchReport {
            kind,
            invoked: loop_handlers.len(),
            faults,
        }
    }

    /// Run `f` with exclusive access to the pipeline state.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut PipelineState) -> R) -> R {
        f(&mut self.inner.lock().state)
    }
}
