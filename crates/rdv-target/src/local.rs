//! In-process controllable target.
//!
//! Target threads run on OS threads and call into [`ThreadCtx`] hooks at
//! statement boundaries. All suspend accounting, request matching and event
//! production happens under a single lock, so a thread whose suspend count
//! is non-zero never raises an event.

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::error::{TargetError, TargetResult};
use crate::facade::TargetControl;
use crate::program::{ClassDef, Debuggee, ThreadCtx};
use crate::request::{
    MonitoringRequest, RequestFilter, RequestId, RequestKind, RequestRef, RequestState,
};
use crate::trace::trace_target;
use crate::types::{Event, EventGroup, Location, SuspendPolicy, ThreadId, ThreadRef};

const MAIN_THREAD: &str = "main";
/// Exit status reported when the debuggee program fails.
const FAILURE_STATUS: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Running,
    Exited(i32),
    Killed(Option<i32>),
}

#[derive(Debug)]
struct ThreadEntry {
    thread: ThreadRef,
    suspend_count: u32,
}

#[derive(Debug)]
struct RequestEntry {
    request: MonitoringRequest,
    state: RequestState,
}

#[derive(Debug)]
pub(crate) struct TargetState {
    threads: IndexMap<ThreadId, ThreadEntry>,
    requests: IndexMap<RequestId, RequestEntry>,
    classes: IndexMap<SmolStr, ClassDef>,
    next_thread: u64,
    next_request: u64,
    next_group: u64,
    /// Groups not yet released. A group whose threads were resumed by
    /// `resume_all` stays here until released once or the process ends.
    unreleased: HashSet<u64>,
    events_tx: Option<Sender<EventGroup>>,
    lifecycle: Lifecycle,
}

impl TargetState {
    fn suspend_count(&self, id: ThreadId) -> u32 {
        self.threads
            .get(&id)
            .map_or(0, |entry| entry.suspend_count)
    }

    fn entry_mut(&mut self, thread: &ThreadRef) -> TargetResult<&mut ThreadEntry> {
        self.threads
            .get_mut(&thread.id)
            .ok_or_else(|| TargetError::UnknownThread(thread.name.clone()))
    }

    fn resume_one(entry: &mut ThreadEntry) {
        entry.suspend_count = entry.suspend_count.saturating_sub(1);
    }

    fn suspend_for(&mut self, policy: SuspendPolicy, origin: ThreadId) {
        match policy {
            SuspendPolicy::None => {}
            SuspendPolicy::EventThread => {
                if let Some(entry) = self.threads.get_mut(&origin) {
                    entry.suspend_count += 1;
                }
            }
            SuspendPolicy::All => self.suspend_every(),
        }
    }

    fn suspend_every(&mut self) {
        for entry in self.threads.values_mut() {
            entry.suspend_count += 1;
        }
    }

    fn resume_every(&mut self) {
        for entry in self.threads.values_mut() {
            Self::resume_one(entry);
        }
    }

    /// Enabled requests of one kind that match the raising thread and class.
    pub(crate) fn matching(
        &self,
        thread: &ThreadRef,
        class: &str,
        kind: impl Fn(&RequestKind) -> bool,
    ) -> Vec<(RequestRef, SuspendPolicy)> {
        self.requests
            .values()
            .filter(|entry| entry.state == RequestState::Enabled)
            .filter(|entry| kind(&entry.request.kind))
            .filter(|entry| entry.request.filter.matches(thread, class))
            .map(|entry| (entry.request.to_ref(), entry.request.policy))
            .collect()
    }

    fn emit(&mut self, policy: SuspendPolicy, events: Vec<Event>) {
        let id = self.next_group;
        let Some(group) = EventGroup::new(id, policy, events) else {
            return;
        };
        self.next_group += 1;
        self.unreleased.insert(id);
        trace_target(&format!(
            "emit group={id} policy={policy} kinds={:?}",
            group.kinds()
        ));
        if let Some(tx) = &self.events_tx {
            let _ = tx.send(group);
        }
    }

    pub(crate) fn class(&self, class: &str) -> TargetResult<&ClassDef> {
        self.classes
            .get(class)
            .ok_or_else(|| TargetError::ClassNotLoaded(SmolStr::new(class)))
    }

    pub(crate) fn class_mut(&mut self, class: &str) -> TargetResult<&mut ClassDef> {
        self.classes
            .get_mut(class)
            .ok_or_else(|| TargetError::ClassNotLoaded(SmolStr::new(class)))
    }

    pub(crate) fn define_class(&mut self, class: ClassDef) {
        self.classes.insert(class.name().clone(), class);
    }

    fn request_mut(&mut self, id: RequestId) -> TargetResult<&mut RequestEntry> {
        self.requests
            .get_mut(&id)
            .ok_or(TargetError::UnknownRequest(id.0))
    }

    fn live_threads(&self) -> Vec<ThreadRef> {
        self.threads
            .values()
            .map(|entry| entry.thread.clone())
            .collect()
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<TargetState>,
    cvar: Condvar,
    events_rx: Receiver<EventGroup>,
    main: Mutex<Option<JoinHandle<()>>>,
}

/// Controllable target running a [`Debuggee`] inside this process.
#[derive(Debug, Clone)]
pub struct LocalTarget {
    shared: Arc<Shared>,
}

impl LocalTarget {
    /// Start `program` on a new `main` thread.
    ///
    /// The target raises a `ProcessStarted` group with policy `ALL` before
    /// running any program code, so it stays suspended until the controller
    /// resumes it.
    pub fn launch<P: Debuggee>(program: P) -> TargetResult<Self> {
        let (events_tx, events_rx) = unbounded();
        let target = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(TargetState {
                    threads: IndexMap::new(),
                    requests: IndexMap::new(),
                    classes: IndexMap::new(),
                    next_thread: 1,
                    next_request: 1,
                    next_group: 1,
                    unreleased: HashSet::new(),
                    events_tx: Some(events_tx),
                    lifecycle: Lifecycle::Running,
                }),
                cvar: Condvar::new(),
                events_rx,
                main: Mutex::new(None),
            }),
        };
        let main = target.register_thread(MAIN_THREAD)?;
        let ctx = ThreadCtx::new(target.clone(), main);
        let handle = thread::Builder::new()
            .name(format!("rdv-{MAIN_THREAD}"))
            .spawn(move || {
                let status = ctx.announce_start().and_then(|()| program.run(&ctx));
                ctx.target().finish_process(ctx.thread(), status);
            })
            .map_err(|err| TargetError::Spawn {
                name: SmolStr::new(MAIN_THREAD),
                reason: err.to_string(),
            })?;
        *target.shared.main.lock().expect("target main handle poisoned") = Some(handle);
        Ok(target)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, TargetState> {
        self.shared.state.lock().expect("target state poisoned")
    }

    fn live(&self) -> TargetResult<MutexGuard<'_, TargetState>> {
        let state = self.lock();
        if state.lifecycle != Lifecycle::Running {
            return Err(TargetError::Disconnected);
        }
        Ok(state)
    }

    /// Block the calling target thread while its suspend count is non-zero.
    pub(crate) fn park<'a>(
        &'a self,
        mut state: MutexGuard<'a, TargetState>,
        id: ThreadId,
    ) -> TargetResult<MutexGuard<'a, TargetState>> {
        loop {
            if state.lifecycle != Lifecycle::Running {
                return Err(TargetError::Disconnected);
            }
            if state.suspend_count(id) == 0 {
                return Ok(state);
            }
            state = self.shared.cvar.wait(state).expect("target state poisoned");
        }
    }

    /// Raise one group for every matched request, then park the raising thread.
    pub(crate) fn raise<'a>(
        &'a self,
        mut state: MutexGuard<'a, TargetState>,
        thread: &ThreadRef,
        matched: Vec<(RequestRef, SuspendPolicy)>,
        make_event: impl Fn(RequestRef) -> Event,
    ) -> TargetResult<MutexGuard<'a, TargetState>> {
        let Some(policy) = matched.iter().map(|(_, policy)| *policy).max() else {
            return Ok(state);
        };
        let events = matched
            .into_iter()
            .map(|(request, _)| make_event(request))
            .collect();
        state.suspend_for(policy, thread.id);
        state.emit(policy, events);
        self.shared.cvar.notify_all();
        self.park(state, thread.id)
    }

    pub(crate) fn register_thread(&self, name: &str) -> TargetResult<ThreadRef> {
        let mut state = self.live()?;
        if state.threads.values().any(|entry| entry.thread.name == name) {
            return Err(TargetError::Spawn {
                name: SmolStr::new(name),
                reason: "thread name already in use".to_string(),
            });
        }
        let thread = ThreadRef::new(state.next_thread, name);
        state.next_thread += 1;
        state.threads.insert(
            thread.id,
            ThreadEntry {
                thread: thread.clone(),
                suspend_count: 0,
            },
        );
        trace_target(&format!("thread start {thread}"));
        Ok(thread)
    }

    pub(crate) fn deregister_thread(&self, thread: &ThreadRef) {
        let mut state = self.lock();
        state.threads.shift_remove(&thread.id);
        trace_target(&format!("thread exit {thread}"));
        self.shared.cvar.notify_all();
    }

    pub(crate) fn announce_start(&self, thread: &ThreadRef) -> TargetResult<()> {
        let mut state = self.live()?;
        state.suspend_for(SuspendPolicy::All, thread.id);
        state.emit(
            SuspendPolicy::All,
            vec![Event::ProcessStarted {
                thread: thread.clone(),
            }],
        );
        drop(self.park(state, thread.id)?);
        Ok(())
    }

    fn finish_process(&self, main: &ThreadRef, status: TargetResult<i32>) {
        let mut state = self.lock();
        state.threads.shift_remove(&main.id);
        if state.lifecycle == Lifecycle::Running {
            let status = match status {
                Ok(status) => status,
                Err(err) => {
                    tracing::warn!("debuggee failed: {err}");
                    FAILURE_STATUS
                }
            };
            state.lifecycle = Lifecycle::Exited(status);
            state.emit(SuspendPolicy::None, vec![Event::ProcessTerminated]);
            trace_target(&format!("process exited status={status}"));
        }
        state.unreleased.clear();
        state.events_tx = None;
        self.shared.cvar.notify_all();
    }

    fn kill(&self, status: Option<i32>) -> bool {
        let mut state = self.lock();
        if state.lifecycle != Lifecycle::Running {
            return false;
        }
        state.lifecycle = Lifecycle::Killed(status);
        state.unreleased.clear();
        state.events_tx = None;
        trace_target(&format!("process killed status={status:?}"));
        self.shared.cvar.notify_all();
        true
    }

    fn create_request(
        &self,
        kind: RequestKind,
        filter: RequestFilter,
        policy: SuspendPolicy,
        tag: &str,
    ) -> TargetResult<MonitoringRequest> {
        let mut state = self.live()?;
        let id = RequestId(state.next_request);
        state.next_request += 1;
        let request = MonitoringRequest {
            id,
            kind,
            filter,
            policy,
            tag: SmolStr::new(tag),
        };
        state.requests.insert(
            id,
            RequestEntry {
                request: request.clone(),
                state: RequestState::Created,
            },
        );
        Ok(request)
    }
}

impl TargetControl for LocalTarget {
    fn suspend_all(&self) -> TargetResult<()> {
        let mut state = self.live()?;
        state.suspend_every();
        trace_target("suspend_all");
        Ok(())
    }

    fn resume_all(&self) -> TargetResult<()> {
        let mut state = self.live()?;
        state.resume_every();
        trace_target("resume_all");
        self.shared.cvar.notify_all();
        Ok(())
    }

    fn resume_thread(&self, thread: &ThreadRef) -> TargetResult<()> {
        let mut state = self.live()?;
        TargetState::resume_one(state.entry_mut(thread)?);
        trace_target(&format!("resume_thread {thread}"));
        self.shared.cvar.notify_all();
        Ok(())
    }

    fn all_threads(&self) -> TargetResult<Vec<ThreadRef>> {
        Ok(self.live()?.live_threads())
    }

    fn suspend_count(&self, thread: &ThreadRef) -> TargetResult<u32> {
        let mut state = self.live()?;
        state.entry_mut(thread).map(|entry| entry.suspend_count)
    }

    fn create_class_load_request(
        &self,
        filter: RequestFilter,
        policy: SuspendPolicy,
        tag: &str,
    ) -> TargetResult<MonitoringRequest> {
        self.create_request(RequestKind::ClassLoad, filter, policy, tag)
    }

    fn create_breakpoint_request(
        &self,
        location: Location,
        filter: RequestFilter,
        policy: SuspendPolicy,
        tag: &str,
    ) -> TargetResult<MonitoringRequest> {
        self.create_request(RequestKind::Breakpoint(location), filter, policy, tag)
    }

    fn create_method_entry_request(
        &self,
        filter: RequestFilter,
        policy: SuspendPolicy,
        tag: &str,
    ) -> TargetResult<MonitoringRequest> {
        self.create_request(RequestKind::MethodEntry, filter, policy, tag)
    }

    fn enable(&self, request: RequestId) -> TargetResult<()> {
        let mut state = self.live()?;
        let entry = state.request_mut(request)?;
        match entry.state {
            RequestState::Created | RequestState::Enabled => {
                entry.state = RequestState::Enabled;
                Ok(())
            }
            RequestState::Retired => Err(TargetError::RequestRetired {
                id: request.0,
                tag: entry.request.tag.clone(),
            }),
        }
    }

    fn disable(&self, request: RequestId) -> TargetResult<()> {
        let mut state = self.live()?;
        state.request_mut(request)?.state = RequestState::Retired;
        Ok(())
    }

    fn class_loaded(&self, class: &str) -> TargetResult<bool> {
        Ok(self.live()?.classes.contains_key(class))
    }

    fn read_static_int(&self, class: &str, field: &str) -> TargetResult<i32> {
        self.live()?.class(class)?.static_int(field)
    }

    fn line_location(&self, class: &str, method: &str, index: u32) -> TargetResult<Location> {
        self.live()?.class(class)?.location(method, index)
    }

    fn next_group(&self, timeout: Duration) -> TargetResult<EventGroup> {
        match self.shared.events_rx.recv_timeout(timeout) {
            Ok(group) => Ok(group),
            Err(RecvTimeoutError::Timeout) => Err(TargetError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(TargetError::Disconnected),
        }
    }

    fn release(&self, group: &EventGroup) -> TargetResult<()> {
        let mut state = self.live()?;
        if !state.unreleased.remove(&group.id()) {
            return Err(TargetError::GroupReleased(group.id()));
        }
        match group.policy() {
            SuspendPolicy::None => {}
            SuspendPolicy::EventThread => {
                if let Some(thread) = group.thread() {
                    if let Some(entry) = state.threads.get_mut(&thread.id) {
                        TargetState::resume_one(entry);
                    }
                }
            }
            SuspendPolicy::All => state.resume_every(),
        }
        trace_target(&format!(
            "release group={} policy={}",
            group.id(),
            group.policy()
        ));
        self.shared.cvar.notify_all();
        Ok(())
    }

    fn exit(&self, status: i32) -> TargetResult<()> {
        if self.kill(Some(status)) {
            Ok(())
        } else {
            Err(TargetError::Disconnected)
        }
    }

    fn destroy(&self) {
        let _ = self.kill(None);
    }

    fn wait_for(&self, timeout: Duration) -> TargetResult<i32> {
        let lifecycle = {
            let state = self.lock();
            let (state, _) = self
                .shared
                .cvar
                .wait_timeout_while(state, timeout, |state| {
                    state.lifecycle == Lifecycle::Running
                })
                .expect("target state poisoned");
            state.lifecycle
        };
        let status = match lifecycle {
            Lifecycle::Running => return Err(TargetError::Timeout),
            Lifecycle::Exited(status) | Lifecycle::Killed(Some(status)) => Ok(status),
            Lifecycle::Killed(None) => Err(TargetError::Disconnected),
        };
        let handle = self
            .shared
            .main
            .lock()
            .expect("target main handle poisoned")
            .take();
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| TargetError::ThreadPanicked(SmolStr::new(MAIN_THREAD)))?;
        }
        status
    }
}
