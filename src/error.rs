use thiserror::Error;

/// Errors that can occur while ingesting a capture event.
///
/// Each variant corresponds to one failure class with its own handling
/// policy in the worker: malformed messages are abandoned, download and
/// scoring failures degrade to a zero score, duplicates are acknowledged,
/// and persistence/transport failures leave the message for redelivery.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("download failed for {key}: {reason}")]
    Download { key: String, reason: String },

    #[error("scoring failed for {path}: {reason}")]
    Scoring { path: String, reason: String },

    #[error("waypoint {id} already recorded")]
    DuplicateWaypoint { id: String },

    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("queue transport error: {0}")]
    QueueTransport(String),
}
