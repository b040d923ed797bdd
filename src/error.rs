// Error types for the engine client and the stats coordinator

use thiserror::Error;

/// Failure reported by an engine client.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The engine could not be reached (transport, I/O, timeout, no client).
    #[error("engine unreachable: {0}")]
    Connection(String),

    /// The engine answered with an error response (e.g. 404 for a vanished container).
    #[error("engine responded {status}: {message}")]
    Api { status: u16, message: String },

    /// A statistics sample or event could not be decoded.
    #[error("malformed engine data: {0}")]
    Malformed(String),
}

impl EngineError {
    /// Connection-class errors abort a poll cycle and trigger a reconnect;
    /// everything else is isolated to the container it happened on.
    pub fn is_connection(&self) -> bool {
        matches!(self, EngineError::Connection(_))
    }
}

/// Errors surfaced by the coordinator to its callers.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("connection to container engine failed: {0}")]
    Connection(#[source] EngineError),

    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("engine request failed: {0}")]
    Engine(#[source] EngineError),
}

impl From<EngineError> for MonitorError {
    fn from(e: EngineError) -> Self {
        if e.is_connection() {
            MonitorError::Connection(e)
        } else {
            MonitorError::Engine(e)
        }
    }
}
