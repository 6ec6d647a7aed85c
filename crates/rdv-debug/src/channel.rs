//! Bounded event-group intake.

use std::time::Duration;

use rdv_target::{EventGroup, EventKind, TargetControl};
use tracing::debug;

use crate::error::ProbeError;

/// What a group is used for, judged by its event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupShape {
    Started,
    ClassLoad,
    /// A lone breakpoint hit, the rendezvous signal.
    Handshake,
    /// A lone method entry, the event under test.
    MonitoredEntry,
    Terminated,
    /// Several events in one group.
    Mixed,
}

impl GroupShape {
    #[must_use]
    pub fn of(group: &EventGroup) -> Self {
        if group.events().len() > 1 {
            return GroupShape::Mixed;
        }
        match group.first().kind() {
            EventKind::ProcessStarted => GroupShape::Started,
            EventKind::ClassLoaded => GroupShape::ClassLoad,
            EventKind::BreakpointHit => GroupShape::Handshake,
            EventKind::MethodEntered => GroupShape::MonitoredEntry,
            EventKind::ProcessTerminated => GroupShape::Terminated,
        }
    }
}

/// Pulls groups off the target, each wait bounded by `timeout`.
pub struct EventChannel<'t> {
    target: &'t dyn TargetControl,
    timeout: Duration,
}

impl<'t> EventChannel<'t> {
    #[must_use]
    pub fn new(target: &'t dyn TargetControl, timeout: Duration) -> Self {
        Self { target, timeout }
    }

    /// Block for the next group and consume it.
    pub fn next_group(&self) -> Result<(EventGroup, GroupShape), ProbeError> {
        let group = self.target.next_group(self.timeout)?;
        let shape = GroupShape::of(&group);
        debug!(
            group = group.id(),
            policy = %group.policy(),
            ?shape,
            kinds = ?group.kinds(),
            "received event group"
        );
        Ok((group, shape))
    }
}
