use thiserror::Error;

pub type Result<T> = std::result::Result<T, EventBusError>;

/// Errors that abort an operation outright.
///
/// Delivery failures are not represented here: `EventBus::send` reports them
/// through `SendOutcome` so a bad intake response never unwinds the caller.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// No `[services.<name>]` entry exists for the requested service.
    #[error("unknown event service: {0}")]
    UnknownService(String),

    /// The service exists but has no URL to deliver to.
    #[error("no url configured for event service: {0}")]
    MissingUrl(String),

    /// Caller handed the queue something that is not a list of event objects.
    #[error("invalid event data: {0}")]
    InvalidEvents(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("signature error: {0}")]
    Signature(String),
}
