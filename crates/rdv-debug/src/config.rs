//! Probe configuration loading.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use smol_str::SmolStr;
use tracing::Level;

use rdv_target::program::{
    COMMUNICATION_METHOD, DEBUGGEE_CLASS, INSTRUCTION_FIELD, LINE_FIELD, PASS_STATUS,
    TESTED_CLASS,
};

use crate::error::ProbeError;

const DEFAULT_WAIT_MINUTES: u64 = 1;
const DEFAULT_WORKERS: usize = 2;
const DEFAULT_CASES: i32 = 3;

/// Names the controller expects to find in the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebuggeeNames {
    pub class: SmolStr,
    pub tested_class: SmolStr,
    pub main_thread: SmolStr,
    pub communication_method: SmolStr,
    pub line_field: SmolStr,
    pub instruction_field: SmolStr,
}

/// Shape of the in-process target launched by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSettings {
    pub workers: usize,
    pub cases: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Bound for every blocking wait on the target.
    pub wait_time: Duration,
    pub expected_exit_status: i32,
    pub debuggee: DebuggeeNames,
    pub target: TargetSettings,
    pub log_level: Level,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            wait_time: minutes(DEFAULT_WAIT_MINUTES),
            expected_exit_status: PASS_STATUS,
            debuggee: DebuggeeNames {
                class: SmolStr::new(DEBUGGEE_CLASS),
                tested_class: SmolStr::new(TESTED_CLASS),
                main_thread: SmolStr::new("main"),
                communication_method: SmolStr::new(COMMUNICATION_METHOD),
                line_field: SmolStr::new(LINE_FIELD),
                instruction_field: SmolStr::new(INSTRUCTION_FIELD),
            },
            target: TargetSettings {
                workers: DEFAULT_WORKERS,
                cases: DEFAULT_CASES,
            },
            log_level: Level::INFO,
        }
    }
}

/// Command-line overrides applied on top of the file configuration.
#[derive(Debug, Clone, Default)]
pub struct ProbeConfigUpdate {
    pub wait_time_minutes: Option<u64>,
    pub workers: Option<usize>,
    pub cases: Option<i32>,
    pub verbose: bool,
}

impl ProbeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProbeError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            ProbeError::InvalidConfig(format!("{}: {err}", path.display()).into())
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ProbeError> {
        let raw: ProbeToml = toml::from_str(text)
            .map_err(|err| ProbeError::InvalidConfig(format!("probe.toml: {err}").into()))?;
        raw.into_config()
    }

    pub fn apply_update(&mut self, update: ProbeConfigUpdate) -> Result<(), ProbeError> {
        if let Some(wait) = update.wait_time_minutes {
            self.wait_time = wait_time(wait)?;
        }
        if let Some(workers) = update.workers {
            self.target.workers = workers;
        }
        if let Some(cases) = update.cases {
            self.target.cases = cases_count(cases)?;
        }
        if update.verbose {
            self.log_level = Level::DEBUG;
        }
        Ok(())
    }
}

fn minutes(value: u64) -> Duration {
    Duration::from_secs(value.saturating_mul(60))
}

fn wait_time(value: u64) -> Result<Duration, ProbeError> {
    if value == 0 {
        return Err(ProbeError::InvalidConfig(
            "probe.wait_time_minutes must be positive".into(),
        ));
    }
    Ok(minutes(value))
}

fn cases_count(value: i32) -> Result<i32, ProbeError> {
    if value < 0 {
        return Err(ProbeError::InvalidConfig(
            format!("target.cases must not be negative (got {value})").into(),
        ));
    }
    Ok(value)
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProbeToml {
    probe: Option<ProbeSection>,
    debuggee: Option<DebuggeeSection>,
    target: Option<TargetSection>,
    log: Option<LogSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProbeSection {
    wait_time_minutes: Option<u64>,
    expected_exit_status: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DebuggeeSection {
    class: Option<String>,
    tested_class: Option<String>,
    main_thread: Option<String>,
    communication_method: Option<String>,
    line_field: Option<String>,
    instruction_field: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TargetSection {
    workers: Option<usize>,
    cases: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LogSection {
    level: Option<String>,
}

impl ProbeToml {
    fn into_config(self) -> Result<ProbeConfig, ProbeError> {
        let mut config = ProbeConfig::default();
        if let Some(probe) = self.probe {
            if let Some(wait) = probe.wait_time_minutes {
                config.wait_time = wait_time(wait)?;
            }
            if let Some(status) = probe.expected_exit_status {
                config.expected_exit_status = status;
            }
        }
        if let Some(debuggee) = self.debuggee {
            let names = &mut config.debuggee;
            override_name(&mut names.class, debuggee.class, "debuggee.class")?;
            override_name(
                &mut names.tested_class,
                debuggee.tested_class,
                "debuggee.tested_class",
            )?;
            override_name(
                &mut names.main_thread,
                debuggee.main_thread,
                "debuggee.main_thread",
            )?;
            override_name(
                &mut names.communication_method,
                debuggee.communication_method,
                "debuggee.communication_method",
            )?;
            override_name(
                &mut names.line_field,
                debuggee.line_field,
                "debuggee.line_field",
            )?;
            override_name(
                &mut names.instruction_field,
                debuggee.instruction_field,
                "debuggee.instruction_field",
            )?;
        }
        if let Some(target) = self.target {
            if let Some(workers) = target.workers {
                config.target.workers = workers;
            }
            if let Some(cases) = target.cases {
                config.target.cases = cases_count(cases)?;
            }
        }
        if let Some(level) = self.log.and_then(|log| log.level) {
            config.log_level = level.trim().parse::<Level>().map_err(|_| {
                ProbeError::InvalidConfig(format!("invalid log.level '{level}'").into())
            })?;
        }
        Ok(config)
    }
}

fn override_name(slot: &mut SmolStr, value: Option<String>, key: &str) -> Result<(), ProbeError> {
    let Some(value) = value else {
        return Ok(());
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ProbeError::InvalidConfig(
            format!("{key} must not be empty").into(),
        ));
    }
    *slot = SmolStr::new(trimmed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = ProbeConfig::from_toml_str("").unwrap();
        assert_eq!(config, ProbeConfig::default());
        assert_eq!(config.wait_time, Duration::from_secs(60));
        assert_eq!(config.expected_exit_status, 95);
    }

    #[test]
    fn sections_override_defaults() {
        let config = ProbeConfig::from_toml_str(
            r#"
[probe]
wait_time_minutes = 2
expected_exit_status = 0

[debuggee]
main_thread = "  primary "

[target]
workers = 0
cases = 1

[log]
level = "debug"
"#,
        )
        .unwrap();
        assert_eq!(config.wait_time, Duration::from_secs(120));
        assert_eq!(config.expected_exit_status, 0);
        assert_eq!(config.debuggee.main_thread.as_str(), "primary");
        assert_eq!(config.debuggee.class.as_str(), DEBUGGEE_CLASS);
        assert_eq!(config.target, TargetSettings { workers: 0, cases: 1 });
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for text in [
            "[probe]\nwait_time_minutes = 0\n",
            "[target]\ncases = -1\n",
            "[debuggee]\nclass = \"  \"\n",
            "[log]\nlevel = \"loud\"\n",
            "[probe]\nunknown = 1\n",
        ] {
            let err = ProbeConfig::from_toml_str(text).unwrap_err();
            assert!(
                matches!(err, ProbeError::InvalidConfig(_)),
                "unexpected error for {text:?}: {err}"
            );
        }
    }

    #[test]
    fn cli_update_overrides_file_values() {
        let mut config = ProbeConfig::default();
        config
            .apply_update(ProbeConfigUpdate {
                wait_time_minutes: Some(3),
                workers: Some(4),
                cases: None,
                verbose: true,
            })
            .unwrap();
        assert_eq!(config.wait_time, Duration::from_secs(180));
        assert_eq!(config.target.workers, 4);
        assert_eq!(config.target.cases, DEFAULT_CASES);
        assert_eq!(config.log_level, Level::DEBUG);
    }
}
