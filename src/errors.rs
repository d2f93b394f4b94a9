//! Task outcome types.

use thiserror::Error;

/// Boxed error returned by a unit of work.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Outcome of a single task, as delivered on its result channel.
pub type TaskResult = Result<(), TaskError>;

/// The ways a task can finish without plain success.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The unit of work returned an error. Forwarded unchanged; the pool
    /// never inspects or logs it.
    #[error("{0}")]
    Task(#[from] BoxError),

    /// The task's deadline elapsed before the unit of work returned. The
    /// work itself keeps running in the background; its eventual outcome
    /// is discarded.
    #[error("task timed out")]
    Timeout,

    /// The pool shut down before the task was started.
    #[error("task abandoned before execution")]
    Abandoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_error_display_is_forwarded() {
        let err = TaskError::from(BoxError::from("disk on fire"));
        assert_eq!(err.to_string(), "disk on fire");
    }

    #[test]
    fn timeout_display() {
        assert_eq!(TaskError::Timeout.to_string(), "task timed out");
    }
}
