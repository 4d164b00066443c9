use serde::{Deserialize, Serialize};

/// Runtime status of a task or workflow execution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusType {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
    Waiting,
    Paused,
    Canceled,
    TimedOut,
}

impl StatusType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusType::Pending => "PENDING",
            StatusType::Running => "RUNNING",
            StatusType::Success => "SUCCESS",
            StatusType::Failed => "FAILED",
            StatusType::Waiting => "WAITING",
            StatusType::Paused => "PAUSED",
            StatusType::Canceled => "CANCELED",
            StatusType::TimedOut => "TIMED_OUT",
        }
    }
}

impl std::fmt::Display for StatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configured kind of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    Basic,
    Parallel,
    Collection,
    Composite,
    Router,
    Wait,
    Signal,
    Aggregate,
}

impl TaskType {
    /// Task kinds whose configuration nests sub-task configurations.
    pub fn nests_tasks(&self) -> bool {
        matches!(
            self,
            TaskType::Parallel | TaskType::Collection | TaskType::Composite
        )
    }
}

/// How a task instance was executed at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionType {
    #[default]
    Basic,
    Router,
    Parallel,
    Collection,
    Composite,
    Wait,
    Signal,
}

/// Error category enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    InputError,
    ResolutionError,
    ConversionError,
    SerializationError,
    ConfigurationError,
    IoError,
    InternalError,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Error severity enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Error,
    Warning,
    Info,
    Debug,
}
