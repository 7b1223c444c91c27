//! Read side of a session and the typed accessor dependents use to reach it.

use super::{controller::AuthSession, state::SessionState, store::KeyValueStorage};
use crate::{api::IdentityApi, errors::SessionError};
use std::sync::Arc;
use tokio::sync::watch;

/// Read-only subscription to a session's state.
#[derive(Clone, Debug)]
pub struct SessionObserver {
    receiver: watch::Receiver<SessionState>,
}

impl SessionObserver {
    pub(crate) fn new(receiver: watch::Receiver<SessionState>) -> Self {
        Self { receiver }
    }

    /// Latest published state.
    #[must_use]
    pub fn current(&self) -> SessionState {
        self.receiver.borrow().clone()
    }

    /// Waits for the next published state. Returns `None` once the session is gone.
    pub async fn changed(&mut self) -> Option<SessionState> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Resolves with the first state that is not loading, which may be the current one.
    /// Returns `None` if the session is dropped first.
    pub async fn wait_ready(&mut self) -> Option<SessionState> {
        self.receiver
            .wait_for(|state| !state.loading())
            .await
            .ok()
            .map(|state| state.clone())
    }
}

/// Explicitly passed handle to the one shared session.
///
/// Dependents receive a context instead of looking the session up globally; an
/// empty context fails loudly with [`SessionError::NotProvided`].
pub struct SessionContext<A, S> {
    session: Option<Arc<AuthSession<A, S>>>,
}

impl<A: IdentityApi, S: KeyValueStorage> SessionContext<A, S> {
    #[must_use]
    pub fn empty() -> Self {
        Self { session: None }
    }

    #[must_use]
    pub fn provide(session: Arc<AuthSession<A, S>>) -> Self {
        Self {
            session: Some(session),
        }
    }

    /// # Errors
    /// Returns [`SessionError::NotProvided`] when no session was provided.
    pub fn session(&self) -> Result<&Arc<AuthSession<A, S>>, SessionError> {
        self.session.as_ref().ok_or(SessionError::NotProvided)
    }

    /// # Errors
    /// Returns [`SessionError::NotProvided`] when no session was provided.
    pub fn observe(&self) -> Result<SessionObserver, SessionError> {
        Ok(self.session()?.subscribe())
    }
}

impl<A, S> Clone for SessionContext<A, S> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
        }
    }
}
