//! Monitoring requests and their filters.

use std::fmt;

use serde::Serialize;
use smol_str::SmolStr;

use crate::types::{Location, SuspendPolicy, ThreadRef};

/// Target-assigned request identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Request identity plus the correlation tag carried by its events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RequestRef {
    pub id: RequestId,
    pub tag: SmolStr,
}

impl RequestRef {
    #[must_use]
    pub fn new(id: RequestId, tag: impl Into<SmolStr>) -> Self {
        Self {
            id,
            tag: tag.into(),
        }
    }
}

/// Condition a request monitors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    /// Class loading, narrowed by the class filter.
    ClassLoad,
    /// Reaching an exact location.
    Breakpoint(Location),
    /// Entering any method of a class matching the class filter.
    MethodEntry,
}

/// Thread and class restrictions shared by all request kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFilter {
    /// Only events raised by this thread match.
    pub thread: Option<ThreadRef>,
    /// Class name pattern; a single leading or trailing `*` is a wildcard.
    pub class: Option<SmolStr>,
}

impl RequestFilter {
    #[must_use]
    pub fn thread(mut self, thread: ThreadRef) -> Self {
        self.thread = Some(thread);
        self
    }

    #[must_use]
    pub fn class(mut self, pattern: impl Into<SmolStr>) -> Self {
        self.class = Some(pattern.into());
        self
    }

    /// Check a raising thread and class against this filter.
    #[must_use]
    pub fn matches(&self, thread: &ThreadRef, class: &str) -> bool {
        if let Some(filter) = &self.thread {
            if filter.id != thread.id {
                return false;
            }
        }
        match &self.class {
            Some(pattern) => class_pattern_matches(pattern, class),
            None => true,
        }
    }
}

fn class_pattern_matches(pattern: &str, class: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix('*') {
        return class.ends_with(suffix);
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return class.starts_with(prefix);
    }
    pattern == class
}

/// A registered monitoring request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoringRequest {
    pub id: RequestId,
    pub kind: RequestKind,
    pub filter: RequestFilter,
    pub policy: SuspendPolicy,
    pub tag: SmolStr,
}

impl MonitoringRequest {
    #[must_use]
    pub fn to_ref(&self) -> RequestRef {
        RequestRef::new(self.id, self.tag.clone())
    }
}

/// Request lifecycle; requests are never reused after retirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Created,
    Enabled,
    Retired,
}
