//! Error types for the latency tracker control plane
//!
//! Only setup and teardown paths return errors. The steady-state
//! signal path never fails, and an interrupted wait is reported as a wait
//! outcome rather than an error.

use thiserror::Error;

/// Result type for control-plane operations
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Why a namespace node could not be created or resolved
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// An entry with this name already exists in the parent directory
    #[error("entry already exists")]
    Exists,

    /// Empty, `.`/`..`, or contains a path separator
    #[error("invalid entry name")]
    InvalidName,

    /// The parent directory does not exist
    #[error("parent directory missing")]
    ParentMissing,

    /// A path component resolved to something other than a directory
    #[error("not a directory")]
    NotADirectory,

    /// Plain removal of a directory that still has entries
    #[error("directory not empty")]
    NotEmpty,

    /// The namespace node budget is used up
    #[error("namespace node limit reached")]
    Exhausted,
}

/// Errors surfaced to callers of registry and tracker operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    /// The control root could not be created; the subsystem must not load
    #[error("failed to create control root `{name}`: {source}")]
    RootCreation { name: String, source: NodeError },

    /// The tracker directory could not be created
    #[error("failed to create directory for tracker `{name}`: {source}")]
    DirectoryCreation { name: String, source: NodeError },

    /// A parameter entry under the tracker directory could not be created
    #[error("failed to expose `{entry}` for tracker `{tracker}`: {source}")]
    ParameterExposure {
        tracker: String,
        entry: &'static str,
        source: NodeError,
    },

    /// The wakeup pipe node could not be created
    #[error("failed to create wakeup pipe for tracker `{tracker}`: {source}")]
    PipeCreation { tracker: String, source: NodeError },

    /// A sub-directory under a tracker could not be created
    #[error("failed to create `{name}` under tracker `{tracker}`: {source}")]
    SubfolderCreation {
        tracker: String,
        name: String,
        source: NodeError,
    },

    /// The tracker has already been removed from the registry
    #[error("tracker `{0}` is not registered")]
    NotRegistered(String),

    /// The registry has been cleaned up
    #[error("registry is shut down")]
    ShutDown,

    /// No namespace entry at this path
    #[error("no such entry: {0}")]
    NotFound(String),

    /// The entry exists but is not a wakeup pipe
    #[error("not a wakeup pipe: {0}")]
    NotAPipe(String),

    /// The entry exists but is not a u64 value
    #[error("not a value entry: {0}")]
    NotAValue(String),

    /// A blocking read was interrupted before an alert arrived
    #[error("interrupted")]
    Interrupted,

    /// A blocking read found the pipe torn down
    #[error("wakeup pipe {0} is closed")]
    PipeClosed(String),

    /// The deferred-work thread could not be started
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(String),

    /// Signal mask or signal wait failed
    #[error("signal setup failed: {0}")]
    Signal(String),

    /// Configuration rejected by validation
    #[error("invalid config: {0}")]
    Config(&'static str),
}
