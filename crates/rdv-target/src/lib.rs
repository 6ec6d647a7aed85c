//! Target side of the suspend-policy probe.
//!
//! - [`TargetControl`]: the facade a controller drives
//! - [`LocalTarget`]: an in-process target with per-thread suspend counts
//! - [`program`]: debuggee programs and their execution hooks

mod error;
mod facade;
mod local;
pub mod program;
mod request;
mod trace;
mod types;

pub use error::{TargetError, TargetResult};
pub use facade::TargetControl;
pub use local::LocalTarget;
pub use request::{
    MonitoringRequest, RequestFilter, RequestId, RequestKind, RequestRef, RequestState,
};
pub use types::{Event, EventGroup, EventKind, Location, SuspendPolicy, ThreadId, ThreadRef};
