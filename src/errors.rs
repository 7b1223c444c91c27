use crate::api::ApiError;
use crate::session::Operation;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt storage file {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("storage lock poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// The identity service rejected a register or login call.
    #[error("{0}")]
    Rejected(#[from] ApiError),
    /// Another operation was still in flight; nothing was changed.
    #[error("{0} already in progress")]
    Busy(Operation),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("session accessed outside of an initialized session context")]
    NotProvided,
}
