//! Error types for one request task.

use crate::transport::TransportError;

/// Why a single attempt did not produce a classified response.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    /// Response status outside all three configured sets.
    #[error("unclassified HTTP status {0}")]
    Unclassified(u16),
}

/// Why a request task resolved as `fail`.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The server answered with a status in `fail_codes`. Never resent.
    #[error("server rejected request with HTTP {status}")]
    Rejected { status: u16 },
    /// Every allowed resend was used up.
    #[error("gave up after {resends} resends: {last}")]
    RetriesExhausted {
        resends: u32,
        #[source]
        last: AttemptError,
    },
    /// The chunk's bytes could not be read from the source. Never resent.
    #[error("read chunk payload: {0}")]
    Payload(#[source] std::io::Error),
    #[error("session has no chunk {0}")]
    MissingChunk(usize),
}
