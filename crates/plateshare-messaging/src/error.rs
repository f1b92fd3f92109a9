use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Caller has no registered identity. The UI boundary turns this
    /// into a redirect to login; it is never retried.
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Caller is not a participant of the target conversation. Kept
    /// message-free so nothing leaks about which conversations exist.
    #[error("Forbidden")]
    Forbidden,

    /// Network or backend unavailability. Retryable by the caller.
    #[error("Transient backend error: {0}")]
    Transient(String),

    /// The realtime feed dropped. Recoverable: resubscribe and
    /// reconcile against the authoritative message log.
    #[error("Realtime channel disconnected")]
    RealtimeDisconnected,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
