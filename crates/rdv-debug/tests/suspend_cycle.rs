use std::time::Duration;

use rdv_debug::config::TargetSettings;
use rdv_debug::{launch_local, run_probe, CheckOutcome, ProbeConfig, Verdict};
use rdv_target::{SuspendPolicy, TargetControl};

fn config(workers: usize, cases: i32) -> ProbeConfig {
    ProbeConfig {
        wait_time: Duration::from_secs(10),
        target: TargetSettings { workers, cases },
        ..ProbeConfig::default()
    }
}

fn counts(table: &rdv_debug::SuspendCountTable) -> Vec<(String, u32)> {
    table
        .iter()
        .map(|snapshot| (snapshot.name.to_string(), snapshot.suspend_count))
        .collect()
}

#[test]
fn local_target_honors_every_policy() {
    let config = config(2, 3);
    let target = launch_local(&config).unwrap();
    let report = run_probe(&target, &config);

    assert_eq!(report.verdict(), Verdict::Passed, "{report}");
    assert_eq!(report.exit_status, Some(95));
    let policies: Vec<_> = report.cases.iter().map(|case| case.group_policy).collect();
    assert_eq!(
        policies,
        vec![
            SuspendPolicy::None,
            SuspendPolicy::EventThread,
            SuspendPolicy::All
        ]
    );
    assert!(report
        .cases
        .iter()
        .all(|case| case.outcome == CheckOutcome::Passed && case.event_thread == "main"));

    let event_thread = &report.cases[1];
    assert_eq!(
        counts(&event_thread.before),
        vec![
            ("main".to_string(), 2),
            ("worker1".to_string(), 1),
            ("worker2".to_string(), 1),
        ]
    );
    assert!(event_thread
        .after
        .iter()
        .all(|snapshot| snapshot.suspend_count == 1));

    let all = &report.cases[2];
    assert!(all.before.iter().all(|snapshot| snapshot.suspend_count == 2));
    assert!(all.after.iter().all(|snapshot| snapshot.suspend_count == 1));
}

#[test]
fn debuggee_without_cases_terminates_cleanly() {
    let config = config(0, 0);
    let target = launch_local(&config).unwrap();
    let report = run_probe(&target, &config);

    assert_eq!(report.verdict(), Verdict::Passed, "{report}");
    assert!(report.cases.is_empty());
}

#[test]
fn extra_debuggee_step_forces_exit() {
    let config = config(1, 4);
    let target = launch_local(&config).unwrap();
    let report = run_probe(&target, &config);

    assert_eq!(report.verdict(), Verdict::Failed);
    assert_eq!(report.cases.len(), 3);
    let fatal = report.fatal.as_deref().unwrap();
    assert!(fatal.contains("instruction 4"), "{fatal}");
    assert_eq!(target.wait_for(config.wait_time), Ok(95));
}
