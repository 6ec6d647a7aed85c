//! Debuggee side of the suspend-policy rendezvous.
//!
//! The main thread publishes the next step in the static `instruction`
//! field, passes through the communication method (where the controller's
//! breakpoint sits), then enters the tested method once. After the last
//! step it publishes `0` and passes the breakpoint one final time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::TargetResult;

use super::{join_thread, ClassDef, Debuggee, ThreadCtx};

pub const DEBUGGEE_CLASS: &str = "rdv.probe.SuspendCycle";
pub const TESTED_CLASS: &str = "rdv.probe.SuspendCycleTestClass";
pub const TESTED_METHOD: &str = "method";
pub const COMMUNICATION_METHOD: &str = "methodForCommunication";
pub const INSTRUCTION_FIELD: &str = "instruction";
pub const LINE_FIELD: &str = "lineForComm";
/// Exit status of a debuggee that ran to completion.
pub const PASS_STATUS: i32 = 95;

const COMMUNICATION_LINES: &[u32] = &[48, 49, 50];
const COMMUNICATION_LINE_INDEX: i32 = 2;
const WORKER_IDLE: Duration = Duration::from_millis(1);

/// Debuggee running `cases` rendezvous steps alongside idle worker threads.
#[derive(Debug, Clone, Copy)]
pub struct SuspendCycle {
    workers: usize,
    cases: i32,
}

impl SuspendCycle {
    #[must_use]
    pub fn new(workers: usize, cases: i32) -> Self {
        Self { workers, cases }
    }

    fn debuggee_class() -> ClassDef {
        ClassDef::new(DEBUGGEE_CLASS)
            .with_static_int(INSTRUCTION_FIELD, 1)
            .with_static_int(LINE_FIELD, COMMUNICATION_LINE_INDEX)
            .with_method(COMMUNICATION_METHOD, COMMUNICATION_LINES)
            .with_method("main", &[60, 61, 62, 63])
    }

    fn tested_class() -> ClassDef {
        ClassDef::new(TESTED_CLASS).with_method(TESTED_METHOD, &[20, 21])
    }
}

impl Debuggee for SuspendCycle {
    fn run(self, ctx: &ThreadCtx) -> TargetResult<i32> {
        ctx.load_class(Self::debuggee_class())?;
        ctx.load_class(Self::tested_class())?;

        let stop = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(self.workers);
        for idx in 1..=self.workers {
            let name = format!("worker{idx}");
            let stop = Arc::clone(&stop);
            let handle = ctx.spawn(&name, move |worker| idle(worker, &stop))?;
            workers.push((name, handle));
        }

        let mut step = 0;
        loop {
            if step >= self.cases {
                ctx.set_static_int(DEBUGGEE_CLASS, INSTRUCTION_FIELD, 0)?;
                communicate(ctx)?;
                break;
            }
            ctx.set_static_int(DEBUGGEE_CLASS, INSTRUCTION_FIELD, step + 1)?;
            communicate(ctx)?;
            ctx.enter_method(TESTED_CLASS, TESTED_METHOD)?;
            ctx.line(TESTED_CLASS, TESTED_METHOD, 0)?;
            step += 1;
        }

        stop.store(true, Ordering::SeqCst);
        for (name, handle) in workers {
            join_thread(&name, handle)?;
        }
        Ok(PASS_STATUS)
    }
}

fn communicate(ctx: &ThreadCtx) -> TargetResult<()> {
    ctx.enter_method(DEBUGGEE_CLASS, COMMUNICATION_METHOD)?;
    for index in 0..COMMUNICATION_LINES.len() as u32 {
        ctx.line(DEBUGGEE_CLASS, COMMUNICATION_METHOD, index)?;
    }
    Ok(())
}

fn idle(ctx: &ThreadCtx, stop: &AtomicBool) -> TargetResult<()> {
    loop {
        ctx.checkpoint()?;
        if stop.load(Ordering::SeqCst) {
            return Ok(());
        }
        thread::sleep(WORKER_IDLE);
    }
}
