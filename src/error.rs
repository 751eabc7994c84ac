
use thiserror::Error;

/// Generic error type for the fabric worker library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    /// The worker was constructed with an empty name.
    #[error("worker name must be a non-empty string")]
    EmptyWorkerName,

    /// A handler was declared under an empty message name.
    #[error("message name must be a non-empty string")]
    EmptyMessageName,

    /// The same message name was declared twice in one handler set.
    #[error("duplicate message name: {0}")]
    DuplicateMessage(String),

    /// The fabric refused or failed the initial connection.
    #[error("fabric connection failed: {0}")]
    Connect(String),

    /// A fabric operation (activate/deactivate delivery) failed.
    #[error("fabric operation failed: {0}")]
    Fabric(String),

    /// The worker has been stopped and its connection released.
    #[error("worker has been stopped")]
    Stopped,

    /// A dispatch call was issued before the worker reached readiness.
    #[error("worker is not ready; await a successful start before dispatching")]
    NotReady,

    /// No handler is registered for the requested command.
    #[error("no handler registered for '{0}'")]
    NoHandler(String),

    /// A handler reported a failure through its reply token.
    #[error("handler failed: {0}")]
    Handler(String),

    /// A handler completed without resolving or rejecting its reply.
    #[error("handler dropped its reply without answering")]
    ReplyDropped,
}

/// Coarse classification of a `WorkerError`, mirroring how the error reaches
/// the caller: validation errors are returned synchronously from construction,
/// connection errors travel through lifecycle notifications, and dispatch
/// errors only ever surface through the specific `request`/`publish` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Connection,
    Dispatch,
}

impl WorkerError {
    /// Returns which category of the error taxonomy this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkerError::EmptyWorkerName
            | WorkerError::EmptyMessageName
            | WorkerError::DuplicateMessage(_) => ErrorKind::Validation,
            WorkerError::Connect(_) | WorkerError::Fabric(_) | WorkerError::Stopped => {
                ErrorKind::Connection
            }
            WorkerError::NotReady
            | WorkerError::NoHandler(_)
            | WorkerError::Handler(_)
            | WorkerError::ReplyDropped => ErrorKind::Dispatch,
        }
    }
}

// Allow converting from a string-like type into a handler failure, so
// handlers can reject with a plain message.
impl From<&str> for WorkerError {
    fn from(s: &str) -> Self {
        WorkerError::Handler(s.to_string())
    }
}

impl From<String> for WorkerError {
    fn from(s: String) -> Self {
        WorkerError::Handler(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors_by_kind() {
        assert_eq!(WorkerError::EmptyWorkerName.kind(), ErrorKind::Validation);
        assert_eq!(
            WorkerError::DuplicateMessage("msg".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            WorkerError::Connect("refused".into()).kind(),
            ErrorKind::Connection
        );
        assert_eq!(WorkerError::Stopped.kind(), ErrorKind::Connection);
        assert_eq!(WorkerError::NotReady.kind(), ErrorKind::Dispatch);
        assert_eq!(
            WorkerError::NoHandler("msg".into()).kind(),
            ErrorKind::Dispatch
        );
    }

    #[test]
    fn converts_strings_into_handler_failures() {
        assert_eq!(
            WorkerError::from("boom"),
            WorkerError::Handler("boom".into())
        );
        assert_eq!(
            WorkerError::from(String::from("boom")),
            WorkerError::Handler("boom".into())
        );
    }
}
