//! Controller side of the suspend-policy probe.
//!
//! - [`channel`]: bounded event-group intake and group classification
//! - [`rendezvous`]: communication breakpoint and instruction decoding
//! - [`verify`]: release checks over suspend-count snapshots
//! - [`scenario`]: the `Setup -> Case0..2 -> Done` state machine
//! - [`session`]: launch, run and teardown

pub mod channel;
pub mod config;
mod context;
mod error;
pub mod rendezvous;
pub mod report;
pub mod scenario;
pub mod session;
pub mod snapshot;
pub mod verify;

pub use config::{ProbeConfig, ProbeConfigUpdate};
pub use context::ProbeContext;
pub use error::{ProbeError, Teardown};
pub use report::{CaseReport, RunReport, Verdict};
pub use session::{launch_local, run_probe};
pub use snapshot::{SuspendCountTable, ThreadSnapshot};
pub use verify::{verify_release, CheckOutcome, ReleaseCheck, Violation};
