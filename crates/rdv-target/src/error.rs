//! Target facade errors.

use smol_str::SmolStr;
use thiserror::Error;

/// Errors reported by a controllable target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    /// No event group arrived within the bound.
    #[error("timed out waiting for the next event group")]
    Timeout,

    /// The control connection to the target is gone.
    #[error("target disconnected")]
    Disconnected,

    /// Thread id is not (or no longer) known to the target.
    #[error("unknown thread '{0}'")]
    UnknownThread(SmolStr),

    /// Request id was never created by this target.
    #[error("unknown request #{0}")]
    UnknownRequest(u64),

    /// Request was disabled after use and cannot be enabled again.
    #[error("request #{id} ('{tag}') is retired")]
    RequestRetired { id: u64, tag: SmolStr },

    /// Event group was already released.
    #[error("event group #{0} already released")]
    GroupReleased(u64),

    /// Class has not been loaded by the target.
    #[error("class '{0}' is not loaded")]
    ClassNotLoaded(SmolStr),

    /// Static field does not exist on a loaded class.
    #[error("no static field '{field}' in class '{class}'")]
    FieldNotFound { class: SmolStr, field: SmolStr },

    /// Method does not exist on a loaded class.
    #[error("no method '{method}' in class '{class}'")]
    MethodNotFound { class: SmolStr, method: SmolStr },

    /// Line-table index past the end of a method's line table.
    #[error("line index {index} out of range for '{method}' ({len} lines)")]
    LineOutOfRange {
        method: SmolStr,
        index: u32,
        len: usize,
    },

    /// Target thread could not be started.
    #[error("failed to start target thread '{name}': {reason}")]
    Spawn { name: SmolStr, reason: String },

    /// Target thread panicked.
    #[error("target thread '{0}' panicked")]
    ThreadPanicked(SmolStr),
}

/// Result alias for facade calls.
pub type TargetResult<T> = Result<T, TargetError>;
