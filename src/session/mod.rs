//! Session core: token store, observable state, and the controller that ties
//! them to the identity API.

mod context;
mod controller;
mod state;
pub mod store;

pub use context::{SessionContext, SessionObserver};
pub use controller::{
    AuthSession, LOGIN_FAILED_MESSAGE, REGISTER_FAILED_MESSAGE, RESTORE_FAILED_MESSAGE,
};
pub use state::{Operation, Phase, SessionState};
pub use store::{FileStorage, KeyValueStorage, MemoryStorage, SessionStore};
