//! Scenario state machine: `Setup -> Case0 -> Case1 -> Case2 -> Done`.
//!
//! Setup waits for the debuggee class to load and arms the rendezvous.
//! Each case installs one method-entry request with the next suspend
//! policy, lets the main thread run into it, and verifies the release of
//! the resulting group. The instruction read at each rendezvous picks the
//! next state.

use rdv_target::{Event, EventKind, RequestFilter, SuspendPolicy};
use tracing::{error, info, warn};

use crate::channel::GroupShape;
use crate::context::ProbeContext;
use crate::error::ProbeError;
use crate::rendezvous::{InstructionMap, Rendezvous, Signal};
use crate::report::{CaseReport, RunReport};
use crate::snapshot::SuspendCountTable;
use crate::verify::{verify_release, CheckOutcome, ReleaseCheck};

/// Request installed by one case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CasePlan {
    pub policy: SuspendPolicy,
    pub tag: &'static str,
}

/// Cases in execution order.
pub const CASE_PLANS: [CasePlan; 3] = [
    CasePlan {
        policy: SuspendPolicy::None,
        tag: "MethodEntryRequest1",
    },
    CasePlan {
        policy: SuspendPolicy::EventThread,
        tag: "MethodEntryRequest2",
    },
    CasePlan {
        policy: SuspendPolicy::All,
        tag: "MethodEntryRequest3",
    },
];

const CLASS_LOAD_TAG: &str = "ClassLoadRequest";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioState {
    Setup,
    Case(usize),
    Done,
}

impl ScenarioState {
    /// Next state for a rendezvous signal. Cases only move forward one at a
    /// time.
    pub fn advance(self, signal: Signal) -> Result<Self, ProbeError> {
        let expected = match self {
            ScenarioState::Setup => 0,
            ScenarioState::Case(index) => index + 1,
            ScenarioState::Done => {
                return Err(ProbeError::violation("rendezvous after the scenario ended"));
            }
        };
        match signal {
            Signal::Terminate => Ok(ScenarioState::Done),
            Signal::Case(index) if index == expected => Ok(ScenarioState::Case(index)),
            Signal::Case(index) => Err(ProbeError::violation(format!(
                "instruction selects case {index} while case {expected} is due"
            ))),
        }
    }
}

/// Drive the full scenario, recording every executed case in `report`.
pub fn run_scenario(ctx: &ProbeContext<'_>, report: &mut RunReport) -> Result<(), ProbeError> {
    let rendezvous = setup(ctx)?;

    info!("testing begins");
    let mut state = ScenarioState::Setup;
    loop {
        state = state.advance(rendezvous.await_signal(ctx)?)?;
        let ScenarioState::Case(index) = state else {
            break;
        };
        report
            .cases
            .push(run_case(ctx, &rendezvous, index, &CASE_PLANS[index])?);
    }
    info!("testing ends");

    await_termination(ctx)
}

fn setup(ctx: &ProbeContext<'_>) -> Result<Rendezvous, ProbeError> {
    let class = &ctx.config.debuggee.class;
    let request = ctx.target.create_class_load_request(
        RequestFilter::default().class(class.clone()),
        SuspendPolicy::EventThread,
        CLASS_LOAD_TAG,
    )?;
    ctx.target.enable(request.id)?;
    ctx.target.resume_all()?;

    let (group, _) = ctx.channel.next_group()?;
    match group.first() {
        Event::ClassLoaded { class: loaded, .. } if loaded == class => {}
        Event::ClassLoaded { class: loaded, .. } => {
            return Err(ProbeError::violation(format!(
                "class-load event for '{loaded}', expected '{class}'"
            )));
        }
        other => {
            return Err(ProbeError::violation(format!(
                "expected a class-load event, received {}",
                other.kind()
            )));
        }
    }
    ctx.target.disable(request.id)?;
    info!(class = %class, "debuggee class loaded");

    let rendezvous = Rendezvous::arm(ctx, InstructionMap::new(CASE_PLANS.len()))?;
    ctx.target.resume_all()?;
    Ok(rendezvous)
}

fn run_case(
    ctx: &ProbeContext<'_>,
    rendezvous: &Rendezvous,
    index: usize,
    plan: &CasePlan,
) -> Result<CaseReport, ProbeError> {
    info!(case = index, policy = %plan.policy, tag = plan.tag, "case begins");
    let tested_class = &ctx.config.debuggee.tested_class;
    if !ctx.target.class_loaded(tested_class)? {
        return Err(ProbeError::violation(format!(
            "tested class '{tested_class}' is not loaded"
        )));
    }

    let request = ctx.target.create_method_entry_request(
        RequestFilter::default()
            .thread(rendezvous.thread().clone())
            .class(tested_class.clone()),
        plan.policy,
        plan.tag,
    )?;
    ctx.target.enable(request.id)?;
    ctx.target.resume_thread(rendezvous.thread())?;

    let (group, shape) = ctx.channel.next_group()?;
    let (event_thread, event_request) = match group.first() {
        Event::MethodEntered {
            thread, request, ..
        } => (thread.clone(), request.clone()),
        other => {
            return Err(ProbeError::UnexpectedEventKind {
                expected: EventKind::MethodEntered,
                got: other.kind(),
            });
        }
    };
    if shape == GroupShape::Mixed {
        warn!(kinds = ?group.kinds(), "method entry arrived with other events");
    }
    if group.policy() != plan.policy {
        warn!(
            expected = %plan.policy,
            got = %group.policy(),
            "group policy differs from the installed request"
        );
    }

    ctx.target.suspend_all()?;
    let before = SuspendCountTable::capture(ctx.target)?;
    ctx.target.release(&group)?;
    let after = SuspendCountTable::capture(ctx.target)?;
    info!(%before, %after, tag = %event_request.tag, "group released");

    let outcome = verify_release(
        &before,
        &after,
        &ReleaseCheck {
            policy: group.policy(),
            event_thread: &event_thread.name,
            request_under_test: event_request.id == request.id,
        },
    );
    match &outcome {
        CheckOutcome::Passed => info!(case = index, "release check passed"),
        CheckOutcome::Skipped { reason } => warn!(case = index, %reason, "release check skipped"),
        CheckOutcome::Violated { violations } => {
            for violation in violations {
                error!(case = index, "{violation}");
            }
        }
    }

    ctx.target.disable(request.id)?;
    ctx.target.resume_all()?;

    Ok(CaseReport {
        index,
        tag: plan.tag.into(),
        policy: plan.policy,
        group_policy: group.policy(),
        event_thread: event_thread.name,
        before,
        after,
        outcome,
    })
}

fn await_termination(ctx: &ProbeContext<'_>) -> Result<(), ProbeError> {
    ctx.target.resume_all()?;
    let (group, shape) = ctx.channel.next_group()?;
    if shape != GroupShape::Terminated {
        return Err(ProbeError::violation(format!(
            "expected process termination, received {:?}",
            group.kinds()
        )));
    }
    info!("target terminated");
    Ok(())
}
