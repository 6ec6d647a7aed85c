//! Debuggee programs and the hooks they execute through.

mod suspend_cycle;

use std::thread::{self, JoinHandle};

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::error::{TargetError, TargetResult};
use crate::local::LocalTarget;
use crate::request::RequestKind;
use crate::types::{Event, Location, ThreadRef};

pub use suspend_cycle::{
    SuspendCycle, COMMUNICATION_METHOD, DEBUGGEE_CLASS, INSTRUCTION_FIELD, LINE_FIELD,
    PASS_STATUS, TESTED_CLASS, TESTED_METHOD,
};

/// A program run on the target's `main` thread.
pub trait Debuggee: Send + 'static {
    /// Run to completion and return the process exit status.
    fn run(self, ctx: &ThreadCtx) -> TargetResult<i32>;
}

/// Class definition: static integer fields and method line tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDef {
    name: SmolStr,
    statics: IndexMap<SmolStr, i32>,
    methods: IndexMap<SmolStr, Vec<u32>>,
}

impl ClassDef {
    #[must_use]
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            statics: IndexMap::new(),
            methods: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn with_static_int(mut self, field: impl Into<SmolStr>, value: i32) -> Self {
        self.statics.insert(field.into(), value);
        self
    }

    /// Add a method with its line table (source line per executable index).
    #[must_use]
    pub fn with_method(mut self, method: impl Into<SmolStr>, lines: &[u32]) -> Self {
        self.methods.insert(method.into(), lines.to_vec());
        self
    }

    #[must_use]
    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    pub fn static_int(&self, field: &str) -> TargetResult<i32> {
        self.statics
            .get(field)
            .copied()
            .ok_or_else(|| self.missing_field(field))
    }

    pub fn set_static_int(&mut self, field: &str, value: i32) -> TargetResult<()> {
        let missing = self.missing_field(field);
        let slot = self.statics.get_mut(field).ok_or(missing)?;
        *slot = value;
        Ok(())
    }

    pub fn location(&self, method: &str, index: u32) -> TargetResult<Location> {
        let lines = self
            .methods
            .get(method)
            .ok_or_else(|| TargetError::MethodNotFound {
                class: self.name.clone(),
                method: SmolStr::new(method),
            })?;
        let line = lines
            .get(index as usize)
            .copied()
            .ok_or_else(|| TargetError::LineOutOfRange {
                method: SmolStr::new(method),
                index,
                len: lines.len(),
            })?;
        Ok(Location {
            class: self.name.clone(),
            method: SmolStr::new(method),
            line_index: index,
            line,
        })
    }

    fn missing_field(&self, field: &str) -> TargetError {
        TargetError::FieldNotFound {
            class: self.name.clone(),
            field: SmolStr::new(field),
        }
    }
}

/// Execution hooks for one target thread.
///
/// Every hook first waits until the thread's suspend count drops to zero,
/// then checks enabled requests; a matching request raises an event group
/// and the thread parks again according to the group's policy.
#[derive(Debug)]
pub struct ThreadCtx {
    target: LocalTarget,
    thread: ThreadRef,
}

impl ThreadCtx {
    pub(crate) fn new(target: LocalTarget, thread: ThreadRef) -> Self {
        Self { target, thread }
    }

    pub(crate) fn target(&self) -> &LocalTarget {
        &self.target
    }

    #[must_use]
    pub fn thread(&self) -> &ThreadRef {
        &self.thread
    }

    pub(crate) fn announce_start(&self) -> TargetResult<()> {
        self.target.announce_start(&self.thread)
    }

    /// Statement boundary: block while suspended.
    pub fn checkpoint(&self) -> TargetResult<()> {
        drop(self.target.park(self.target.lock(), self.thread.id)?);
        Ok(())
    }

    /// Load (prepare) a class, raising class-load events.
    pub fn load_class(&self, class: ClassDef) -> TargetResult<()> {
        let mut state = self.target.park(self.target.lock(), self.thread.id)?;
        let name = class.name().clone();
        state.define_class(class);
        let matched = state.matching(&self.thread, &name, |kind| {
            matches!(kind, RequestKind::ClassLoad)
        });
        let thread = self.thread.clone();
        let state = self.target.raise(state, &self.thread, matched, |request| {
            Event::ClassLoaded {
                thread: thread.clone(),
                request,
                class: name.clone(),
            }
        })?;
        drop(state);
        Ok(())
    }

    /// Enter a method, raising method-entry events.
    pub fn enter_method(&self, class: &str, method: &str) -> TargetResult<()> {
        let state = self.target.park(self.target.lock(), self.thread.id)?;
        let location = state.class(class)?.location(method, 0)?;
        let matched = state.matching(&self.thread, class, |kind| {
            matches!(kind, RequestKind::MethodEntry)
        });
        let thread = self.thread.clone();
        let state = self.target.raise(state, &self.thread, matched, |request| {
            Event::MethodEntered {
                thread: thread.clone(),
                request,
                location: location.clone(),
            }
        })?;
        drop(state);
        Ok(())
    }

    /// Execute the `index`-th line of a method, raising breakpoint events.
    pub fn line(&self, class: &str, method: &str, index: u32) -> TargetResult<()> {
        let state = self.target.park(self.target.lock(), self.thread.id)?;
        let location = state.class(class)?.location(method, index)?;
        let matched = state.matching(&self.thread, class, |kind| {
            matches!(kind, RequestKind::Breakpoint(at) if *at == location)
        });
        let thread = self.thread.clone();
        let state = self.target.raise(state, &self.thread, matched, |request| {
            Event::BreakpointHit {
                thread: thread.clone(),
                request,
                location: location.clone(),
            }
        })?;
        drop(state);
        Ok(())
    }

    pub fn static_int(&self, class: &str, field: &str) -> TargetResult<i32> {
        let state = self.target.park(self.target.lock(), self.thread.id)?;
        state.class(class).and_then(|def| def.static_int(field))
    }

    pub fn set_static_int(&self, class: &str, field: &str, value: i32) -> TargetResult<()> {
        let mut state = self.target.park(self.target.lock(), self.thread.id)?;
        state
            .class_mut(class)
            .and_then(|def| def.set_static_int(field, value))
    }

    /// Start a new target thread running `body`.
    pub fn spawn<F>(&self, name: &str, body: F) -> TargetResult<JoinHandle<TargetResult<()>>>
    where
        F: FnOnce(&ThreadCtx) -> TargetResult<()> + Send + 'static,
    {
        let thread = self.target.register_thread(name)?;
        let ctx = ThreadCtx::new(self.target.clone(), thread.clone());
        let spawned = thread::Builder::new()
            .name(format!("rdv-{name}"))
            .spawn(move || {
                let result = body(&ctx);
                ctx.target.deregister_thread(&ctx.thread);
                result
            });
        spawned.map_err(|err| {
            self.target.deregister_thread(&thread);
            TargetError::Spawn {
                name: SmolStr::new(name),
                reason: err.to_string(),
            }
        })
    }
}

/// Join a spawned target thread, surfacing panics as errors.
pub fn join_thread(name: &str, handle: JoinHandle<TargetResult<()>>) -> TargetResult<()> {
    handle
        .join()
        .map_err(|_| TargetError::ThreadPanicked(SmolStr::new(name)))?
}
