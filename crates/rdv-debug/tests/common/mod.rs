#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use rdv_debug::ProbeConfig;
use rdv_target::program::{DEBUGGEE_CLASS, INSTRUCTION_FIELD, LINE_FIELD, TESTED_CLASS};
use rdv_target::{
    Event, EventGroup, Location, MonitoringRequest, RequestFilter, RequestId, RequestKind,
    SuspendPolicy, TargetControl, TargetError, TargetResult, ThreadRef,
};

/// One step of a scripted target.
#[derive(Debug, Clone)]
pub enum Step {
    /// The debuggee class loads on `main`.
    ClassLoaded(&'static str),
    /// `main` publishes `instruction` and hits the communication breakpoint.
    Rendezvous(i32),
    /// `main` enters the tested method, matched by the request with `tag`.
    MethodEntry(&'static str),
    /// Like `MethodEntry`, but the group carries `policy` instead of the
    /// request's own.
    MethodEntryAs(&'static str, SuspendPolicy),
    /// Deliver this group verbatim.
    Raw(EventGroup),
    Terminated,
    /// The connection drops.
    Disconnect,
}

#[derive(Debug, Default)]
struct State {
    threads: Vec<(ThreadRef, u32)>,
    script: VecDeque<Step>,
    requests: Vec<(MonitoringRequest, bool)>,
    instruction: i32,
    reads: Vec<String>,
    next_group: u64,
    exit_status: i32,
    exited: Option<i32>,
    destroyed: bool,
    disconnected: bool,
    /// Thread an ALL release forgets to resume.
    stuck_on_release: Option<&'static str>,
}

impl State {
    fn count_mut(&mut self, name: &str) -> TargetResult<&mut u32> {
        self.threads
            .iter_mut()
            .find(|(thread, _)| thread.name == name)
            .map(|(_, count)| count)
            .ok_or_else(|| TargetError::UnknownThread(name.into()))
    }

    fn main(&self) -> ThreadRef {
        self.threads[0].0.clone()
    }

    fn request_by_tag(&self, tag: &str) -> Option<MonitoringRequest> {
        self.requests
            .iter()
            .find(|(request, enabled)| *enabled && request.tag == tag)
            .map(|(request, _)| request.clone())
    }

    fn request_where(&self, pred: impl Fn(&MonitoringRequest) -> bool) -> Option<MonitoringRequest> {
        self.requests
            .iter()
            .find(|(request, enabled)| *enabled && pred(request))
            .map(|(request, _)| request.clone())
    }

    fn suspend(&mut self, policy: SuspendPolicy) {
        match policy {
            SuspendPolicy::None => {}
            SuspendPolicy::EventThread => self.threads[0].1 += 1,
            SuspendPolicy::All => self.threads.iter_mut().for_each(|(_, count)| *count += 1),
        }
    }

    fn group(&mut self, policy: SuspendPolicy, event: Event) -> EventGroup {
        self.next_group += 1;
        self.suspend(policy);
        EventGroup::new(self.next_group, policy, vec![event]).expect("non-empty group")
    }

    fn deliver(&mut self, step: Step) -> TargetResult<EventGroup> {
        let main = self.main();
        match step {
            Step::ClassLoaded(class) => {
                let request = self
                    .request_where(|request| request.kind == RequestKind::ClassLoad)
                    .expect("class-load request enabled");
                Ok(self.group(
                    request.policy,
                    Event::ClassLoaded {
                        thread: main,
                        request: request.to_ref(),
                        class: class.into(),
                    },
                ))
            }
            Step::Rendezvous(instruction) => {
                self.instruction = instruction;
                let request = self
                    .request_where(|request| matches!(request.kind, RequestKind::Breakpoint(_)))
                    .expect("communication breakpoint armed");
                let RequestKind::Breakpoint(location) = request.kind.clone() else {
                    unreachable!()
                };
                Ok(self.group(
                    request.policy,
                    Event::BreakpointHit {
                        thread: main,
                        request: request.to_ref(),
                        location,
                    },
                ))
            }
            Step::MethodEntry(tag) => {
                let policy = self
                    .request_by_tag(tag)
                    .unwrap_or_else(|| panic!("request '{tag}' not enabled"))
                    .policy;
                self.deliver(Step::MethodEntryAs(tag, policy))
            }
            Step::MethodEntryAs(tag, policy) => {
                let request = self
                    .request_by_tag(tag)
                    .unwrap_or_else(|| panic!("request '{tag}' not enabled"));
                Ok(self.group(
                    policy,
                    Event::MethodEntered {
                        thread: main,
                        request: request.to_ref(),
                        location: tested_location(),
                    },
                ))
            }
            Step::Raw(group) => {
                self.suspend(group.policy());
                Ok(group)
            }
            Step::Terminated => {
                self.next_group += 1;
                Ok(EventGroup::new(
                    self.next_group,
                    SuspendPolicy::None,
                    vec![Event::ProcessTerminated],
                )
                .expect("non-empty group"))
            }
            Step::Disconnect => {
                self.disconnected = true;
                Err(TargetError::Disconnected)
            }
        }
    }
}

pub fn tested_location() -> Location {
    Location {
        class: TESTED_CLASS.into(),
        method: "method".into(),
        line_index: 0,
        line: 20,
    }
}

/// Facade double replaying a fixed event script with real suspend counting.
#[derive(Debug)]
pub struct ScriptedTarget {
    state: Mutex<State>,
}

impl ScriptedTarget {
    /// `main`, `worker1` and `worker2`, all suspended once as after launch.
    pub fn new(script: impl IntoIterator<Item = Step>) -> Self {
        let threads = ["main", "worker1", "worker2"]
            .into_iter()
            .enumerate()
            .map(|(idx, name)| (ThreadRef::new(idx as u64 + 1, name), 1))
            .collect();
        Self {
            state: Mutex::new(State {
                threads,
                script: script.into_iter().collect(),
                exit_status: 95,
                ..State::default()
            }),
        }
    }

    /// Make ALL releases leave `thread` suspended.
    pub fn stuck_on_release(self, thread: &'static str) -> Self {
        self.lock().stuck_on_release = Some(thread);
        self
    }

    pub fn with_exit_status(self, status: i32) -> Self {
        self.lock().exit_status = status;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("scripted state poisoned")
    }

    /// Static fields read so far, as `class.field`.
    pub fn reads(&self) -> Vec<String> {
        self.lock().reads.clone()
    }

    pub fn forced_exit(&self) -> Option<i32> {
        self.lock().exited
    }

    pub fn destroyed(&self) -> bool {
        self.lock().destroyed
    }

    pub fn requests(&self) -> Vec<MonitoringRequest> {
        self.lock()
            .requests
            .iter()
            .map(|(request, _)| request.clone())
            .collect()
    }

    fn create(
        &self,
        kind: RequestKind,
        filter: RequestFilter,
        policy: SuspendPolicy,
        tag: &str,
    ) -> TargetResult<MonitoringRequest> {
        let mut state = self.lock();
        let request = MonitoringRequest {
            id: RequestId(state.requests.len() as u64 + 1),
            kind,
            filter,
            policy,
            tag: tag.into(),
        };
        state.requests.push((request.clone(), false));
        Ok(request)
    }

    fn set_enabled(&self, id: RequestId, enabled: bool) -> TargetResult<()> {
        let mut state = self.lock();
        let entry = state
            .requests
            .iter_mut()
            .find(|(request, _)| request.id == id)
            .ok_or(TargetError::UnknownRequest(id.0))?;
        entry.1 = enabled;
        Ok(())
    }
}

impl TargetControl for ScriptedTarget {
    fn suspend_all(&self) -> TargetResult<()> {
        self.lock().suspend(SuspendPolicy::All);
        Ok(())
    }

    fn resume_all(&self) -> TargetResult<()> {
        let mut state = self.lock();
        for (_, count) in &mut state.threads {
            *count = count.saturating_sub(1);
        }
        Ok(())
    }

    fn resume_thread(&self, thread: &ThreadRef) -> TargetResult<()> {
        let mut state = self.lock();
        let count = state.count_mut(&thread.name)?;
        *count = count.saturating_sub(1);
        Ok(())
    }

    fn all_threads(&self) -> TargetResult<Vec<ThreadRef>> {
        Ok(self
            .lock()
            .threads
            .iter()
            .map(|(thread, _)| thread.clone())
            .collect())
    }

    fn suspend_count(&self, thread: &ThreadRef) -> TargetResult<u32> {
        self.lock().count_mut(&thread.name).map(|count| *count)
    }

    fn create_class_load_request(
        &self,
        filter: RequestFilter,
        policy: SuspendPolicy,
        tag: &str,
    ) -> TargetResult<MonitoringRequest> {
        self.create(RequestKind::ClassLoad, filter, policy, tag)
    }

    fn create_breakpoint_request(
        &self,
        location: Location,
        filter: RequestFilter,
        policy: SuspendPolicy,
        tag: &str,
    ) -> TargetResult<MonitoringRequest> {
        self.create(RequestKind::Breakpoint(location), filter, policy, tag)
    }

    fn create_method_entry_request(
        &self,
        filter: RequestFilter,
        policy: SuspendPolicy,
        tag: &str,
    ) -> TargetResult<MonitoringRequest> {
        self.create(RequestKind::MethodEntry, filter, policy, tag)
    }

    fn enable(&self, request: RequestId) -> TargetResult<()> {
        self.set_enabled(request, true)
    }

    fn disable(&self, request: RequestId) -> TargetResult<()> {
        self.set_enabled(request, false)
    }

    fn class_loaded(&self, class: &str) -> TargetResult<bool> {
        Ok(class == DEBUGGEE_CLASS || class == TESTED_CLASS)
    }

    fn read_static_int(&self, class: &str, field: &str) -> TargetResult<i32> {
        let mut state = self.lock();
        state.reads.push(format!("{class}.{field}"));
        match (class, field) {
            (DEBUGGEE_CLASS, LINE_FIELD) => Ok(2),
            (DEBUGGEE_CLASS, INSTRUCTION_FIELD) => Ok(state.instruction),
            _ => Err(TargetError::FieldNotFound {
                class: class.into(),
                field: field.into(),
            }),
        }
    }

    fn line_location(&self, class: &str, method: &str, index: u32) -> TargetResult<Location> {
        Ok(Location {
            class: class.into(),
            method: method.into(),
            line_index: index,
            line: 48 + index,
        })
    }

    fn next_group(&self, _timeout: Duration) -> TargetResult<EventGroup> {
        let mut state = self.lock();
        if state.disconnected {
            return Err(TargetError::Disconnected);
        }
        let step = state.script.pop_front().ok_or(TargetError::Timeout)?;
        state.deliver(step)
    }

    fn release(&self, group: &EventGroup) -> TargetResult<()> {
        let mut state = self.lock();
        match group.policy() {
            SuspendPolicy::None => {}
            SuspendPolicy::EventThread => {
                let thread = group.thread().ok_or(TargetError::GroupReleased(group.id()))?;
                let count = state.count_mut(&thread.name)?;
                *count = count.saturating_sub(1);
            }
            SuspendPolicy::All => {
                let stuck = state.stuck_on_release;
                for (thread, count) in &mut state.threads {
                    if Some(thread.name.as_str()) != stuck {
                        *count = count.saturating_sub(1);
                    }
                }
            }
        }
        Ok(())
    }

    fn exit(&self, status: i32) -> TargetResult<()> {
        self.lock().exited = Some(status);
        Ok(())
    }

    fn destroy(&self) {
        self.lock().destroyed = true;
    }

    fn wait_for(&self, _timeout: Duration) -> TargetResult<i32> {
        let state = self.lock();
        if state.destroyed {
            return Err(TargetError::Disconnected);
        }
        Ok(state.exited.unwrap_or(state.exit_status))
    }
}

/// The full three-case script ending in termination.
pub fn full_script() -> Vec<Step> {
    vec![
        Step::ClassLoaded(DEBUGGEE_CLASS),
        Step::Rendezvous(1),
        Step::MethodEntry("MethodEntryRequest1"),
        Step::Rendezvous(2),
        Step::MethodEntry("MethodEntryRequest2"),
        Step::Rendezvous(3),
        Step::MethodEntry("MethodEntryRequest3"),
        Step::Rendezvous(0),
        Step::Terminated,
    ]
}

pub fn config() -> ProbeConfig {
    ProbeConfig {
        wait_time: Duration::from_secs(5),
        ..ProbeConfig::default()
    }
}
