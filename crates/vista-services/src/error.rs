//! Transfer failure taxonomy.

use std::time::Duration;

use vista_core::TransferId;

use crate::collector::MalformedReason;

/// Why a picture transfer ended without a Ready picture.
///
/// Everything but `UnknownTransfer` ends at the cache entry's Error status.
/// Nothing here is retried.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("malformed chunk stream: {0}")]
    MalformedStream(#[from] MalformedReason),

    #[error("peer cannot supply the picture")]
    ExplicitPeerError,

    #[error("picture bytes did not decode: {0:#}")]
    DecodeFailure(anyhow::Error),

    #[error("no chunk received for {}s", .0.as_secs())]
    Stalled(Duration),

    #[error("connection closed before the request was sent")]
    Disconnected,

    #[error("no outstanding transfer {0}")]
    UnknownTransfer(TransferId),
}
