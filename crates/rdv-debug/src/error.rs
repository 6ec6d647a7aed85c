//! Probe errors.

use rdv_target::{EventKind, TargetError};
use smol_str::SmolStr;
use thiserror::Error;

/// Errors that abort a probe run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// No event group arrived within the configured wait time.
    #[error("no event group arrived within the wait time")]
    Timeout,

    /// The target went away.
    #[error("target disconnected")]
    Disconnected,

    /// The target deviated from the rendezvous protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A group led with a different event kind than the run expected.
    #[error("expected a {expected} event, received {got}")]
    UnexpectedEventKind { expected: EventKind, got: EventKind },

    /// A thread the run depends on does not exist.
    #[error("thread '{0}' not found in the target")]
    ThreadNotFound(SmolStr),

    /// Any other facade failure.
    #[error(transparent)]
    Target(TargetError),

    /// Configuration file or override rejected during validation.
    #[error("invalid config: {0}")]
    InvalidConfig(SmolStr),
}

impl From<TargetError> for ProbeError {
    fn from(err: TargetError) -> Self {
        match err {
            TargetError::Timeout => ProbeError::Timeout,
            TargetError::Disconnected => ProbeError::Disconnected,
            other => ProbeError::Target(other),
        }
    }
}

/// How a failed run tears its target down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// Force the target to exit with the expected status.
    Exit,
    /// The target is gone; destroy whatever is left of it.
    Destroy,
}

impl ProbeError {
    #[must_use]
    pub fn teardown(&self) -> Teardown {
        match self {
            ProbeError::Disconnected => Teardown::Destroy,
            _ => Teardown::Exit,
        }
    }

    pub(crate) fn violation(message: impl Into<String>) -> Self {
        ProbeError::ProtocolViolation(message.into())
    }
}
