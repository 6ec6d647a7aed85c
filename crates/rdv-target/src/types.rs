//! Target data model: threads, locations, events and event groups.

use std::fmt;

use serde::Serialize;
use smol_str::SmolStr;

use crate::request::RequestRef;

/// Numeric thread identity assigned by the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ThreadId(pub u64);

/// Thread identity as seen by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ThreadRef {
    /// Target-assigned id.
    pub id: ThreadId,
    /// Thread name, unique while the thread is alive.
    pub name: SmolStr,
}

impl ThreadRef {
    #[must_use]
    pub fn new(id: u64, name: impl Into<SmolStr>) -> Self {
        Self {
            id: ThreadId(id),
            name: name.into(),
        }
    }
}

impl fmt::Display for ThreadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id.0)
    }
}

/// Executable location inside a loaded class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Location {
    /// Declaring class name.
    pub class: SmolStr,
    /// Method name.
    pub method: SmolStr,
    /// Index into the method's line table.
    pub line_index: u32,
    /// Source line number at that index.
    pub line: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.class, self.method, self.line)
    }
}

/// How many threads the target suspends when it raises an event group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuspendPolicy {
    /// No thread is suspended.
    None,
    /// Only the thread that raised the event is suspended.
    EventThread,
    /// Every thread is suspended.
    All,
}

impl SuspendPolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SuspendPolicy::None => "SUSPEND_NONE",
            SuspendPolicy::EventThread => "SUSPEND_EVENT_THREAD",
            SuspendPolicy::All => "SUSPEND_ALL",
        }
    }
}

impl fmt::Display for SuspendPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminant of [`Event`], used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    ProcessStarted,
    ClassLoaded,
    BreakpointHit,
    MethodEntered,
    ProcessTerminated,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::ProcessStarted => "ProcessStarted",
            EventKind::ClassLoaded => "ClassLoaded",
            EventKind::BreakpointHit => "BreakpointHit",
            EventKind::MethodEntered => "MethodEntered",
            EventKind::ProcessTerminated => "ProcessTerminated",
        };
        f.write_str(name)
    }
}

/// A single observed target event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The target process started; raised once before any code runs.
    ProcessStarted { thread: ThreadRef },
    /// A class matching a class-load request was loaded.
    ClassLoaded {
        thread: ThreadRef,
        request: RequestRef,
        class: SmolStr,
    },
    /// A thread reached a breakpoint location.
    BreakpointHit {
        thread: ThreadRef,
        request: RequestRef,
        location: Location,
    },
    /// A thread entered a method matching a method-entry request.
    MethodEntered {
        thread: ThreadRef,
        request: RequestRef,
        location: Location,
    },
    /// The target process finished.
    ProcessTerminated,
}

impl Event {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ProcessStarted { .. } => EventKind::ProcessStarted,
            Event::ClassLoaded { .. } => EventKind::ClassLoaded,
            Event::BreakpointHit { .. } => EventKind::BreakpointHit,
            Event::MethodEntered { .. } => EventKind::MethodEntered,
            Event::ProcessTerminated => EventKind::ProcessTerminated,
        }
    }

    /// Thread that raised the event, if any.
    #[must_use]
    pub fn thread(&self) -> Option<&ThreadRef> {
        match self {
            Event::ProcessStarted { thread }
            | Event::ClassLoaded { thread, .. }
            | Event::BreakpointHit { thread, .. }
            | Event::MethodEntered { thread, .. } => Some(thread),
            Event::ProcessTerminated => None,
        }
    }

    /// Request that produced the event; lifecycle events have none.
    #[must_use]
    pub fn request(&self) -> Option<&RequestRef> {
        match self {
            Event::ClassLoaded { request, .. }
            | Event::BreakpointHit { request, .. }
            | Event::MethodEntered { request, .. } => Some(request),
            Event::ProcessStarted { .. } | Event::ProcessTerminated => None,
        }
    }
}

/// Events raised atomically at one point, sharing a suspend policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventGroup {
    id: u64,
    policy: SuspendPolicy,
    events: Vec<Event>,
}

impl EventGroup {
    /// Build a group; returns `None` for an empty event list.
    #[must_use]
    pub fn new(id: u64, policy: SuspendPolicy, events: Vec<Event>) -> Option<Self> {
        if events.is_empty() {
            return None;
        }
        Some(Self { id, policy, events })
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn policy(&self) -> SuspendPolicy {
        self.policy
    }

    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// First event of the group (groups are never empty).
    #[must_use]
    pub fn first(&self) -> &Event {
        &self.events[0]
    }

    /// Thread that raised the group, taken from its first threaded event.
    #[must_use]
    pub fn thread(&self) -> Option<&ThreadRef> {
        self.events.iter().find_map(Event::thread)
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.iter().map(Event::kind).collect()
    }
}
