//! Client-side authentication session manager.
//!
//! An [`AuthSession`] restores a session from a persisted bearer token, drives
//! register/login/logout against a remote identity API, and publishes the
//! resulting [`SessionState`] to any number of observers. The token is the only
//! thing that outlives the process; session state is rebuilt on every start.
//!
//! ## Flow Overview
//!
//! 1. **Restore:** the stored token (if any) is validated with `GET /api/user`.
//!    A rejected token is cleared locally before the session reports
//!    unauthenticated.
//! 2. **Register / Login:** a successful response carries `{user, token}`; the
//!    token is persisted and the user becomes the current identity.
//! 3. **Logout:** the remote call is best-effort, local cleanup always happens.

pub mod api;
#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}
pub mod cli;
pub mod config;
pub mod errors;
pub mod session;

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub use api::{ApiError, HttpIdentityApi, IdentityApi, User};
pub use config::AppConfig;
pub use errors::{SessionError, StorageError};
pub use session::{
    AuthSession, FileStorage, KeyValueStorage, MemoryStorage, Operation, Phase, SessionContext,
    SessionObserver, SessionState, SessionStore,
};
