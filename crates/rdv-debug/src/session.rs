//! One probe run against a launched target, including teardown.

use rdv_target::program::SuspendCycle;
use rdv_target::{LocalTarget, TargetControl};
use tracing::{error, info, warn};

use crate::channel::{EventChannel, GroupShape};
use crate::config::ProbeConfig;
use crate::context::ProbeContext;
use crate::error::{ProbeError, Teardown};
use crate::report::RunReport;
use crate::scenario::run_scenario;

/// Start the in-process target and wait until it reports its start.
///
/// The target is left fully suspended.
pub fn launch_local(config: &ProbeConfig) -> Result<LocalTarget, ProbeError> {
    info!(
        workers = config.target.workers,
        cases = config.target.cases,
        "launching debuggee"
    );
    let target = LocalTarget::launch(SuspendCycle::new(
        config.target.workers,
        config.target.cases,
    ))?;
    let started = EventChannel::new(&target, config.wait_time)
        .next_group()
        .and_then(|(group, shape)| match shape {
            GroupShape::Started => Ok(()),
            _ => Err(ProbeError::violation(format!(
                "expected the process start, received {:?}",
                group.kinds()
            ))),
        });
    if let Err(err) = started {
        target.destroy();
        return Err(err);
    }
    Ok(target)
}

/// Run the scenario and settle the target's fate.
///
/// A completed scenario waits for the debuggee and checks its exit status.
/// A fatal error forces the target down: disconnects are destroyed, every
/// other failure exits the target with the expected status so it does not
/// linger.
pub fn run_probe(target: &dyn TargetControl, config: &ProbeConfig) -> RunReport {
    let ctx = ProbeContext::new(target, config);
    let mut report = RunReport::new(config.expected_exit_status);

    match run_scenario(&ctx, &mut report) {
        Ok(()) => {
            info!("waiting for the debuggee to finish");
            match target.wait_for(config.wait_time) {
                Ok(status) => {
                    if status != config.expected_exit_status {
                        error!(
                            status,
                            expected = config.expected_exit_status,
                            "unexpected debuggee exit status"
                        );
                    }
                    report.exit_status = Some(status);
                }
                Err(err) => {
                    let err = ProbeError::from(err);
                    error!("{err}");
                    report.fatal = Some(err.to_string());
                    teardown(target, config, &err);
                }
            }
        }
        Err(err) => {
            error!("{err}");
            report.fatal = Some(err.to_string());
            teardown(target, config, &err);
        }
    }

    info!(verdict = %report.verdict(), "probe finished");
    report
}

fn teardown(target: &dyn TargetControl, config: &ProbeConfig, err: &ProbeError) {
    match err.teardown() {
        Teardown::Exit => {
            info!(status = config.expected_exit_status, "forcing target exit");
            if let Err(exit_err) = target.exit(config.expected_exit_status) {
                warn!("target exit failed: {exit_err}");
                target.destroy();
            }
        }
        Teardown::Destroy => {
            info!("destroying target");
            target.destroy();
        }
    }
}
