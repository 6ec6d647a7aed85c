//! Target control facade for controllers.

use std::time::Duration;

use crate::error::TargetResult;
use crate::request::{MonitoringRequest, RequestFilter, RequestId};
use crate::types::{EventGroup, Location, SuspendPolicy, ThreadRef};

/// Narrow interface over a remotely controllable process.
///
/// Suspend operations are reference counted per thread: every
/// `suspend_all` must be matched by a `resume_all` (or per-thread resume)
/// before a thread runs again.
pub trait TargetControl: Send + Sync {
    /// Increment the suspend count of every live thread.
    fn suspend_all(&self) -> TargetResult<()>;
    /// Decrement the suspend count of every suspended thread.
    fn resume_all(&self) -> TargetResult<()>;
    /// Decrement the suspend count of a single thread.
    fn resume_thread(&self, thread: &ThreadRef) -> TargetResult<()>;
    /// Live threads in creation order.
    fn all_threads(&self) -> TargetResult<Vec<ThreadRef>>;
    fn suspend_count(&self, thread: &ThreadRef) -> TargetResult<u32>;

    fn create_class_load_request(
        &self,
        filter: RequestFilter,
        policy: SuspendPolicy,
        tag: &str,
    ) -> TargetResult<MonitoringRequest>;
    fn create_breakpoint_request(
        &self,
        location: Location,
        filter: RequestFilter,
        policy: SuspendPolicy,
        tag: &str,
    ) -> TargetResult<MonitoringRequest>;
    fn create_method_entry_request(
        &self,
        filter: RequestFilter,
        policy: SuspendPolicy,
        tag: &str,
    ) -> TargetResult<MonitoringRequest>;
    fn enable(&self, request: RequestId) -> TargetResult<()>;
    /// Disable a request for good; it cannot be enabled again.
    fn disable(&self, request: RequestId) -> TargetResult<()>;

    fn class_loaded(&self, class: &str) -> TargetResult<bool>;
    fn read_static_int(&self, class: &str, field: &str) -> TargetResult<i32>;
    /// Resolve the `index`-th entry of a method's line table.
    fn line_location(&self, class: &str, method: &str, index: u32) -> TargetResult<Location>;

    /// Block for the next event group, consuming it.
    fn next_group(&self, timeout: Duration) -> TargetResult<EventGroup>;
    /// Resume exactly the threads the group's policy suspended.
    fn release(&self, group: &EventGroup) -> TargetResult<()>;

    /// Force the target to exit with `status`.
    fn exit(&self, status: i32) -> TargetResult<()>;
    /// Tear the target down without an exit status.
    fn destroy(&self);
    /// Wait for the target to finish and return its exit status.
    fn wait_for(&self, timeout: Duration) -> TargetResult<i32>;
}
