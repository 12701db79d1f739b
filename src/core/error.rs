use thiserror::Error;

/// Typed failures raised by the core PTY machinery.
///
/// None of these ever cross the wire: per the protocol's error handling design,
/// every variant is caught at the dispatcher or supervisor boundary, logged,
/// and the server continues running. The enum exists so the logging is
/// precise, not so callers can recover programmatically from a specific case.
#[derive(Debug, Error)]
pub enum PtyError {
    #[error("failed to spawn child process: {0}")]
    Spawn(String),

    #[error("session {0} not found")]
    SessionNotFound(u32),

    #[error("write to session {0} failed: {1}")]
    Write(u32, String),

    #[error("resize failed: {0}")]
    Resize(String),

    #[error("failed to terminate child: {0}")]
    Terminate(String),

    #[error("session id counter overflowed u32::MAX")]
    IdOverflow,
}
