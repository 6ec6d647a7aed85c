//! Breakpoint rendezvous with the target's main thread.
//!
//! The target parks its main thread on a breakpoint inside the
//! communication method and publishes the next step in a static integer
//! field. The controller arms that breakpoint once and, after every resume,
//! waits for the hit and decodes the field.

use rdv_target::{
    Event, Location, MonitoringRequest, RequestFilter, SuspendPolicy, TargetControl, ThreadRef,
};
use tracing::{debug, info};

use crate::channel::GroupShape;
use crate::context::ProbeContext;
use crate::error::ProbeError;

/// Tag carried by the communication breakpoint.
pub const COMMUNICATION_TAG: &str = "zero";

/// Decoded rendezvous instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Testing is over.
    Terminate,
    /// Run the case at this index.
    Case(usize),
}

/// Maps instruction values onto case indices: `0` terminates, `n` selects
/// case `n - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionMap {
    cases: usize,
}

impl InstructionMap {
    #[must_use]
    pub fn new(cases: usize) -> Self {
        Self { cases }
    }

    pub fn decode(&self, value: i32) -> Result<Signal, ProbeError> {
        if value == 0 {
            return Ok(Signal::Terminate);
        }
        usize::try_from(value)
            .ok()
            .map(|value| value - 1)
            .filter(|index| *index < self.cases)
            .map(Signal::Case)
            .ok_or_else(|| {
                ProbeError::violation(format!(
                    "instruction {value} selects no case (expected 0..={})",
                    self.cases
                ))
            })
    }
}

/// Find a live thread by name.
pub fn thread_by_name(target: &dyn TargetControl, name: &str) -> Result<ThreadRef, ProbeError> {
    target
        .all_threads()?
        .into_iter()
        .find(|thread| thread.name == name)
        .ok_or_else(|| ProbeError::ThreadNotFound(name.into()))
}

/// An armed communication breakpoint.
#[derive(Debug)]
pub struct Rendezvous {
    thread: ThreadRef,
    location: Location,
    request: MonitoringRequest,
    map: InstructionMap,
}

impl Rendezvous {
    /// Resolve the communication location and enable a breakpoint on it,
    /// scoped to the main thread.
    pub fn arm(ctx: &ProbeContext<'_>, map: InstructionMap) -> Result<Self, ProbeError> {
        let names = &ctx.config.debuggee;
        let thread = thread_by_name(ctx.target, &names.main_thread)?;
        let line_index = ctx.target.read_static_int(&names.class, &names.line_field)?;
        let line_index = u32::try_from(line_index).map_err(|_| {
            ProbeError::violation(format!(
                "{}.{} holds a negative line index ({line_index})",
                names.class, names.line_field
            ))
        })?;
        let location =
            ctx.target
                .line_location(&names.class, &names.communication_method, line_index)?;
        let request = ctx.target.create_breakpoint_request(
            location.clone(),
            RequestFilter::default().thread(thread.clone()),
            SuspendPolicy::EventThread,
            COMMUNICATION_TAG,
        )?;
        ctx.target.enable(request.id)?;
        info!(%location, thread = %thread, "communication breakpoint armed");
        Ok(Self {
            thread,
            location,
            request,
            map,
        })
    }

    #[must_use]
    pub fn thread(&self) -> &ThreadRef {
        &self.thread
    }

    /// Wait for the next breakpoint hit and decode the published instruction.
    ///
    /// The instruction field is read only after the group is confirmed to be
    /// the communication breakpoint.
    pub fn await_signal(&self, ctx: &ProbeContext<'_>) -> Result<Signal, ProbeError> {
        let (group, shape) = ctx.channel.next_group()?;
        if shape != GroupShape::Handshake {
            return Err(ProbeError::violation(format!(
                "expected the communication breakpoint, received {:?}",
                group.kinds()
            )));
        }
        match group.first() {
            Event::BreakpointHit {
                request, location, ..
            } if request.id == self.request.id && *location == self.location => {}
            Event::BreakpointHit { request, .. } if request.id != self.request.id => {
                return Err(ProbeError::violation(format!(
                    "breakpoint hit by request {} ('{}'), expected communication request {}",
                    request.id, request.tag, self.request.id
                )));
            }
            Event::BreakpointHit { location, .. } => {
                return Err(ProbeError::violation(format!(
                    "breakpoint hit at {location}, expected {}",
                    self.location
                )));
            }
            other => {
                return Err(ProbeError::violation(format!(
                    "expected the communication breakpoint, received {}",
                    other.kind()
                )));
            }
        }

        let names = &ctx.config.debuggee;
        let value = ctx
            .target
            .read_static_int(&names.class, &names.instruction_field)?;
        debug!(instruction = value, "rendezvous");
        self.map.decode(value)
    }
}
