//! The authentication state machine.
//!
//! [`AuthSession`] is the only writer of [`SessionState`]. Every operation
//! takes the single-flight guard (which also owns the [`SessionStore`]) with
//! `try_lock`, so a second operation started while one is in flight is rejected
//! with [`SessionError::Busy`] instead of racing on state or storage.
//! Dropping an operation future part way (a caller's timeout, for instance)
//! settles the state when the guard is released.

use super::{
    context::SessionObserver,
    state::{Operation, SessionState},
    store::{KeyValueStorage, SessionStore},
};
use crate::{
    api::{ApiError, IdentityApi, LoginRequest, RegisterRequest, User},
    errors::SessionError,
};
use secrecy::SecretString;
use std::ops::{Deref, DerefMut};
use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

pub const RESTORE_FAILED_MESSAGE: &str = "Authentication failed. Please log in again.";
pub const REGISTER_FAILED_MESSAGE: &str = "An error occurred during registration.";
pub const LOGIN_FAILED_MESSAGE: &str =
    "Login failed. Please check your email address and password.";

/// Result of validating the stored token during restore.
#[derive(Debug)]
enum RestoreOutcome {
    NoToken,
    Validated(User),
    /// The token was rejected; local cleanup must finish before publishing.
    Rejected(ApiError),
}

/// Exclusive hold on the store for one operation.
///
/// Dropping it while the state still reports loading means the operation
/// future was cancelled before it settled; the state then settles keeping the
/// previous identity, so `loading` never outlives the operation.
struct Flight<'a, S> {
    store: MutexGuard<'a, SessionStore<S>>,
    state: &'a watch::Sender<SessionState>,
}

impl<S> Deref for Flight<'_, S> {
    type Target = SessionStore<S>;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

impl<S> DerefMut for Flight<'_, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.store
    }
}

impl<S> Drop for Flight<'_, S> {
    fn drop(&mut self) {
        self.state.send_if_modified(|state| {
            if !state.loading() {
                return false;
            }
            warn!(phase = ?state.phase, "operation cancelled before it settled");
            state.settle_unchanged();
            true
        });
    }
}

pub struct AuthSession<A, S> {
    api: A,
    store: Mutex<SessionStore<S>>,
    state: watch::Sender<SessionState>,
}

impl<A: IdentityApi, S: KeyValueStorage> AuthSession<A, S> {
    /// Creates a session in the `Restoring` phase. Call [`AuthSession::restore`] next.
    pub fn new(api: A, storage: S) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            api,
            store: Mutex::new(SessionStore::new(storage)),
            state,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> SessionObserver {
        SessionObserver::new(self.state.subscribe())
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Validates the persisted token, if any.
    ///
    /// Remote failures are not returned: a rejected token is cleared (remote
    /// logout best-effort, then local) and the session ends `Unauthenticated`
    /// with `error` set.
    ///
    /// # Errors
    /// Returns [`SessionError::Busy`] if another operation is in flight, or
    /// [`SessionError::Storage`] if the token cannot be read or cleared.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<(), SessionError> {
        let mut store = self.begin(Operation::Restore)?;

        let found = match store.init() {
            Ok(found) => found,
            Err(err) => {
                self.publish(|state| state.settle(None));
                return Err(err.into());
            }
        };

        let outcome = match store.get().filter(|_| found) {
            None => RestoreOutcome::NoToken,
            Some(token) => match self.api.current_user(token).await {
                Ok(user) => RestoreOutcome::Validated(user),
                Err(err) => RestoreOutcome::Rejected(err),
            },
        };

        match outcome {
            RestoreOutcome::NoToken => {
                debug!("no stored token");
                self.publish(|state| state.settle(None));
                Ok(())
            }
            RestoreOutcome::Validated(user) => {
                info!(user_id = user.id, "session restored");
                self.publish(|state| state.settle(Some(user)));
                Ok(())
            }
            RestoreOutcome::Rejected(err) => {
                warn!(error = %err, "stored token rejected");
                let cleanup = self.sign_out(&mut store).await;
                let message = err.message().unwrap_or(RESTORE_FAILED_MESSAGE).to_string();
                self.publish(|state| {
                    state.settle(None);
                    state.error = Some(message);
                });
                cleanup
            }
        }
    }

    /// Creates an account and signs in as it.
    ///
    /// # Errors
    /// Returns [`SessionError::Rejected`] when the service refuses, after `error`
    /// has been set; [`SessionError::Busy`] or [`SessionError::Storage`] otherwise.
    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: SecretString,
    ) -> Result<User, SessionError> {
        let mut store = self.begin(Operation::Register)?;
        let request = RegisterRequest {
            name: name.to_string(),
            email: email.to_string(),
            password,
        };

        match self.api.register(&request, store.get()).await {
            Ok(payload) => self.sign_in(&mut store, payload.user, payload.token),
            Err(err) => {
                let message = err
                    .validation_summary()
                    .or_else(|| err.message().map(ToString::to_string))
                    .unwrap_or_else(|| REGISTER_FAILED_MESSAGE.to_string());
                Err(self.fail(err, message))
            }
        }
    }

    /// # Errors
    /// Returns [`SessionError::Rejected`] when the service refuses, after `error`
    /// has been set; [`SessionError::Busy`] or [`SessionError::Storage`] otherwise.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: SecretString) -> Result<User, SessionError> {
        let mut store = self.begin(Operation::Login)?;
        let request = LoginRequest {
            email: email.to_string(),
            password,
        };

        match self.api.login(&request, store.get()).await {
            Ok(payload) => self.sign_in(&mut store, payload.user, payload.token),
            Err(err) => {
                let message = err.message().unwrap_or(LOGIN_FAILED_MESSAGE).to_string();
                Err(self.fail(err, message))
            }
        }
    }

    /// Signs out. The remote call is best-effort; local state is always cleared.
    ///
    /// # Errors
    /// Returns [`SessionError::Busy`] if another operation is in flight, or
    /// [`SessionError::Storage`] if the token cannot be removed. The session is
    /// `Unauthenticated` in the latter case as well.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), SessionError> {
        let mut store = self.begin(Operation::Logout)?;
        let cleanup = self.sign_out(&mut store).await;
        self.publish(|state| state.settle(None));
        info!("signed out");
        cleanup
    }

    /// Clears `error` and nothing else.
    pub fn clear_error(&self) {
        self.state.send_if_modified(|state| state.error.take().is_some());
    }

    fn begin(&self, operation: Operation) -> Result<Flight<'_, S>, SessionError> {
        let Ok(store) = self.store.try_lock() else {
            debug!(%operation, "rejected: another operation is in flight");
            return Err(SessionError::Busy(operation));
        };
        let flight = Flight {
            store,
            state: &self.state,
        };
        self.publish(|state| state.begin(operation));
        Ok(flight)
    }

    fn publish(&self, update: impl FnOnce(&mut SessionState)) {
        self.state.send_modify(update);
    }

    fn sign_in(
        &self,
        store: &mut SessionStore<S>,
        user: User,
        token: SecretString,
    ) -> Result<User, SessionError> {
        if let Err(err) = store.set(token) {
            self.publish(SessionState::settle_unchanged);
            return Err(err.into());
        }
        info!(user_id = user.id, "signed in");
        self.publish(|state| state.settle(Some(user.clone())));
        Ok(user)
    }

    /// Records `message` as the session error and keeps the previous identity.
    fn fail(&self, err: ApiError, message: String) -> SessionError {
        warn!(error = %err, "identity service rejected the request");
        self.publish(|state| {
            state.settle_unchanged();
            state.error = Some(message);
        });
        SessionError::Rejected(err)
    }

    /// Remote logout (skipped without a token, failures only logged), then local clear.
    async fn sign_out(&self, store: &mut SessionStore<S>) -> Result<(), SessionError> {
        match store.get() {
            Some(token) => {
                if let Err(err) = self.api.logout(token).await {
                    warn!(error = %err, "remote logout failed");
                }
            }
            None => debug!("no token to revoke"),
        }
        store.clear().map_err(SessionError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::AuthPayload,
        session::{store::TOKEN_KEY, MemoryStorage, Phase, SessionContext},
    };
    use anyhow::{anyhow, Result};
    use secrecy::ExposeSecret;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct Script {
        register: VecDeque<Result<AuthPayload, ApiError>>,
        login: VecDeque<Result<AuthPayload, ApiError>>,
        logout: VecDeque<Result<(), ApiError>>,
        current_user: VecDeque<Result<User, ApiError>>,
        logout_calls: usize,
        tokens_seen: Vec<Option<String>>,
    }

    /// Scripted identity service; `gate` holds `login` and `user_gate` holds
    /// `current_user` until notified.
    #[derive(Clone, Default)]
    struct FakeApi {
        script: Arc<StdMutex<Script>>,
        gate: Option<Arc<Notify>>,
        user_gate: Option<Arc<Notify>>,
    }

    impl FakeApi {
        fn with(configure: impl FnOnce(&mut Script)) -> Self {
            let api = Self::default();
            configure(&mut api.script.lock().unwrap());
            api
        }

        fn logout_calls(&self) -> usize {
            self.script.lock().unwrap().logout_calls
        }

        fn tokens_seen(&self) -> Vec<Option<String>> {
            self.script.lock().unwrap().tokens_seen.clone()
        }

        fn record(&self, token: Option<&SecretString>) {
            self.script
                .lock()
                .unwrap()
                .tokens_seen
                .push(token.map(|t| t.expose_secret().to_string()));
        }
    }

    fn unscripted() -> ApiError {
        ApiError::Unknown("unscripted call".to_string())
    }

    impl IdentityApi for FakeApi {
        async fn register(
            &self,
            _request: &RegisterRequest,
            token: Option<&SecretString>,
        ) -> Result<AuthPayload, ApiError> {
            self.record(token);
            let next = self.script.lock().unwrap().register.pop_front();
            next.unwrap_or_else(|| Err(unscripted()))
        }

        async fn login(
            &self,
            _request: &LoginRequest,
            token: Option<&SecretString>,
        ) -> Result<AuthPayload, ApiError> {
            self.record(token);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let next = self.script.lock().unwrap().login.pop_front();
            next.unwrap_or_else(|| Err(unscripted()))
        }

        async fn logout(&self, token: &SecretString) -> Result<(), ApiError> {
            self.record(Some(token));
            let mut script = self.script.lock().unwrap();
            script.logout_calls += 1;
            script.logout.pop_front().unwrap_or(Ok(()))
        }

        async fn current_user(&self, token: &SecretString) -> Result<User, ApiError> {
            self.record(Some(token));
            if let Some(gate) = &self.user_gate {
                gate.notified().await;
            }
            let next = self.script.lock().unwrap().current_user.pop_front();
            next.unwrap_or_else(|| Err(unscripted()))
        }
    }

    fn user(id: u64) -> User {
        User {
            id,
            name: "A".to_string(),
            email: "a@x.com".to_string(),
            email_verified_at: None,
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    fn payload(id: u64, token: &str) -> AuthPayload {
        AuthPayload {
            user: user(id),
            token: SecretString::from(token.to_string()),
        }
    }

    fn password() -> SecretString {
        SecretString::from("pw".to_string())
    }

    fn stored(storage: &MemoryStorage) -> Option<String> {
        storage.get(TOKEN_KEY).ok().flatten()
    }

    fn assert_consistent(state: &SessionState) {
        assert_eq!(state.is_authenticated(), state.user.is_some());
    }

    async fn signed_in(
        api: FakeApi,
        storage: MemoryStorage,
    ) -> Result<AuthSession<FakeApi, MemoryStorage>> {
        let session = AuthSession::new(api, storage);
        session.restore().await?;
        session.login("a@x.com", password()).await?;
        Ok(session)
    }

    #[tokio::test]
    async fn restore_without_token_is_unauthenticated() -> Result<()> {
        let api = FakeApi::default();
        let session = AuthSession::new(api.clone(), MemoryStorage::new());
        assert!(session.state().loading());

        session.restore().await?;

        let state = session.state();
        assert_eq!(state.phase, Phase::Unauthenticated);
        assert_eq!(state.user, None);
        assert!(!state.loading());
        assert_eq!(state.error, None);
        assert!(api.tokens_seen().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn restore_with_valid_token_authenticates() -> Result<()> {
        let api = FakeApi::with(|s| s.current_user.push_back(Ok(user(5))));
        let session = AuthSession::new(api.clone(), MemoryStorage::with_token("tok"));

        session.restore().await?;

        let state = session.state();
        assert_eq!(state.phase, Phase::Authenticated);
        assert_eq!(state.user.as_ref().map(|u| u.id), Some(5));
        assert_eq!(api.tokens_seen(), vec![Some("tok".to_string())]);
        Ok(())
    }

    #[tokio::test]
    async fn restore_with_rejected_token_cleans_up() -> Result<()> {
        let api = FakeApi::with(|s| {
            s.current_user
                .push_back(Err(ApiError::Message("Unauthenticated.".to_string())));
        });
        let storage = MemoryStorage::with_token("stale");
        let session = AuthSession::new(api.clone(), storage.clone());

        session.restore().await?;

        let state = session.state();
        assert_eq!(state.phase, Phase::Unauthenticated);
        assert_eq!(state.user, None);
        assert!(!state.loading());
        assert_eq!(state.error.as_deref(), Some("Unauthenticated."));
        assert_eq!(stored(&storage), None);
        assert_eq!(api.logout_calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn restore_failure_without_message_uses_generic_text() -> Result<()> {
        let api = FakeApi::with(|s| {
            s.current_user.push_back(Err(unscripted()));
            s.logout.push_back(Err(unscripted()));
        });
        let storage = MemoryStorage::with_token("stale");
        let session = AuthSession::new(api, storage.clone());

        session.restore().await?;

        let state = session.state();
        assert_eq!(state.error.as_deref(), Some(RESTORE_FAILED_MESSAGE));
        assert_eq!(stored(&storage), None);
        Ok(())
    }

    #[tokio::test]
    async fn observers_never_see_unauthenticated_with_token_still_stored() -> Result<()> {
        let api = FakeApi::with(|s| s.current_user.push_back(Err(unscripted())));
        let storage = MemoryStorage::with_token("stale");
        let session = Arc::new(AuthSession::new(api, storage.clone()));
        let mut observer = session.subscribe();

        let watcher = tokio::spawn(async move {
            let mut violations = 0;
            while let Some(state) = observer.changed().await {
                if state.phase == Phase::Unauthenticated && stored(&storage).is_some() {
                    violations += 1;
                }
                if !state.loading() {
                    break;
                }
            }
            violations
        });

        session.restore().await?;
        assert_eq!(watcher.await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn register_success_persists_token() -> Result<()> {
        let api = FakeApi::with(|s| s.register.push_back(Ok(payload(1, "new-token"))));
        let storage = MemoryStorage::new();
        let session = AuthSession::new(api, storage.clone());
        session.restore().await?;

        let user = session.register("A", "a@x.com", password()).await?;

        let state = session.state();
        assert_eq!(user.id, 1);
        assert_eq!(state.phase, Phase::Authenticated);
        assert_eq!(state.user.as_ref().map(|u| u.id), Some(1));
        assert!(!state.loading());
        assert_eq!(state.error, None);
        assert_eq!(stored(&storage).as_deref(), Some("new-token"));
        Ok(())
    }

    #[tokio::test]
    async fn register_validation_failure_flattens_messages_and_reraises() -> Result<()> {
        let api = FakeApi::with(|s| {
            s.register.push_back(Err(ApiError::Validation {
                message: Some("The given data was invalid.".to_string()),
                fields: vec![
                    ("email".to_string(), vec!["taken".to_string()]),
                    ("password".to_string(), vec!["too short".to_string()]),
                ],
            }));
        });
        let session = AuthSession::new(api, MemoryStorage::new());
        session.restore().await?;

        let err = session
            .register("A", "a@x.com", password())
            .await
            .err()
            .ok_or_else(|| anyhow!("expected error"))?;

        assert!(matches!(err, SessionError::Rejected(ApiError::Validation { .. })));
        let state = session.state();
        assert_eq!(state.error.as_deref(), Some("taken\ntoo short"));
        assert_eq!(state.phase, Phase::Unauthenticated);
        assert!(!state.is_authenticated());
        assert!(!state.loading());
        Ok(())
    }

    #[tokio::test]
    async fn register_failure_prefers_message_then_generic() -> Result<()> {
        let api = FakeApi::with(|s| {
            s.register
                .push_back(Err(ApiError::Message("Registration closed.".to_string())));
            s.register.push_back(Err(unscripted()));
        });
        let session = AuthSession::new(api, MemoryStorage::new());
        session.restore().await?;

        assert!(session.register("A", "a@x.com", password()).await.is_err());
        assert_eq!(session.state().error.as_deref(), Some("Registration closed."));

        assert!(session.register("A", "a@x.com", password()).await.is_err());
        assert_eq!(
            session.state().error.as_deref(),
            Some(REGISTER_FAILED_MESSAGE)
        );
        Ok(())
    }

    #[tokio::test]
    async fn login_failure_without_message_uses_generic_text() -> Result<()> {
        let api = FakeApi::with(|s| s.login.push_back(Err(unscripted())));
        let session = AuthSession::new(api, MemoryStorage::new());
        session.restore().await?;

        let result = session.login("a@x.com", password()).await;

        assert!(matches!(result, Err(SessionError::Rejected(_))));
        assert_eq!(session.state().error.as_deref(), Some(LOGIN_FAILED_MESSAGE));
        assert!(!session.state().loading());
        Ok(())
    }

    #[tokio::test]
    async fn login_failure_uses_top_level_message_even_with_field_errors() -> Result<()> {
        let api = FakeApi::with(|s| {
            s.login.push_back(Err(ApiError::Validation {
                message: Some("These credentials do not match our records.".to_string()),
                fields: vec![("email".to_string(), vec!["nope".to_string()])],
            }));
        });
        let session = AuthSession::new(api, MemoryStorage::new());
        session.restore().await?;

        assert!(session.login("a@x.com", password()).await.is_err());
        assert_eq!(
            session.state().error.as_deref(),
            Some("These credentials do not match our records.")
        );
        Ok(())
    }

    #[tokio::test]
    async fn failed_login_keeps_previous_identity() -> Result<()> {
        let api = FakeApi::with(|s| {
            s.login.push_back(Ok(payload(1, "first")));
            s.login.push_back(Err(unscripted()));
        });
        let storage = MemoryStorage::new();
        let session = signed_in(api.clone(), storage.clone()).await?;

        assert!(session.login("b@x.com", password()).await.is_err());

        let state = session.state();
        assert_eq!(state.phase, Phase::Authenticated);
        assert_eq!(state.user.as_ref().map(|u| u.id), Some(1));
        assert_eq!(stored(&storage).as_deref(), Some("first"));
        assert_eq!(api.tokens_seen().last().cloned().flatten().as_deref(), Some("first"));
        Ok(())
    }

    #[tokio::test]
    async fn logout_clears_state_even_when_remote_fails() -> Result<()> {
        let api = FakeApi::with(|s| {
            s.login.push_back(Ok(payload(1, "tok")));
            s.logout.push_back(Err(ApiError::Message("server down".to_string())));
        });
        let storage = MemoryStorage::new();
        let session = signed_in(api.clone(), storage.clone()).await?;

        session.logout().await?;

        let state = session.state();
        assert_eq!(state.phase, Phase::Unauthenticated);
        assert_eq!(state.user, None);
        assert!(!state.loading());
        assert_eq!(stored(&storage), None);
        assert_eq!(api.logout_calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn logout_twice_matches_logout_once() -> Result<()> {
        let api = FakeApi::with(|s| s.login.push_back(Ok(payload(1, "tok"))));
        let storage = MemoryStorage::new();
        let session = signed_in(api.clone(), storage.clone()).await?;

        session.logout().await?;
        let once = session.state();
        session.logout().await?;

        assert_eq!(session.state(), once);
        assert_eq!(stored(&storage), None);
        assert_eq!(api.logout_calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn clear_error_only_touches_error() -> Result<()> {
        let api = FakeApi::with(|s| s.login.push_back(Err(unscripted())));
        let session = AuthSession::new(api, MemoryStorage::new());
        session.restore().await?;
        assert!(session.login("a@x.com", password()).await.is_err());

        let before = session.state();
        session.clear_error();
        let after = session.state();

        assert_eq!(after.error, None);
        assert_eq!(after.user, before.user);
        assert_eq!(after.phase, before.phase);
        assert_eq!(after.loading(), before.loading());
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_operation_is_rejected_without_state_change() -> Result<()> {
        let gate = Arc::new(Notify::new());
        let api = FakeApi {
            gate: Some(gate.clone()),
            ..FakeApi::with(|s| s.login.push_back(Ok(payload(2, "tok"))))
        };
        let session = Arc::new(AuthSession::new(api, MemoryStorage::new()));
        session.restore().await?;

        let mut observer = session.subscribe();
        let in_flight = {
            let session = session.clone();
            tokio::spawn(async move { session.login("a@x.com", password()).await })
        };
        observer
            .changed()
            .await
            .ok_or_else(|| anyhow!("session dropped"))?;

        let during = session.state();
        assert_eq!(during.phase, Phase::Busy(Operation::Login));

        let rejected = session.logout().await;
        assert!(matches!(rejected, Err(SessionError::Busy(Operation::Logout))));
        let rejected = session.register("B", "b@x.com", password()).await;
        assert!(matches!(rejected, Err(SessionError::Busy(Operation::Register))));
        assert_eq!(session.state(), during);

        gate.notify_one();
        let user = in_flight.await??;
        assert_eq!(user.id, 2);
        assert_eq!(session.state().phase, Phase::Authenticated);
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_login_settles_and_releases_the_session() -> Result<()> {
        let api = FakeApi {
            gate: Some(Arc::new(Notify::new())),
            ..FakeApi::default()
        };
        let storage = MemoryStorage::new();
        let session = AuthSession::new(api, storage.clone());
        session.restore().await?;

        let outcome =
            tokio::time::timeout(Duration::from_millis(20), session.login("a@x.com", password()))
                .await;
        assert!(outcome.is_err(), "login should still be waiting on the gate");

        let state = session.state();
        assert_eq!(state.phase, Phase::Unauthenticated);
        assert!(!state.loading());
        assert!(!state.is_authenticated());
        assert_eq!(stored(&storage), None);

        session.logout().await?;
        assert_eq!(session.state().phase, Phase::Unauthenticated);
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_login_keeps_previous_identity() -> Result<()> {
        let gate = Arc::new(Notify::new());
        let api = FakeApi {
            gate: Some(gate.clone()),
            ..FakeApi::with(|s| s.login.push_back(Ok(payload(1, "first"))))
        };
        let storage = MemoryStorage::new();
        let session = AuthSession::new(api, storage.clone());
        session.restore().await?;
        gate.notify_one();
        session.login("a@x.com", password()).await?;

        let outcome =
            tokio::time::timeout(Duration::from_millis(20), session.login("b@x.com", password()))
                .await;
        assert!(outcome.is_err());

        let state = session.state();
        assert_eq!(state.phase, Phase::Authenticated);
        assert_eq!(state.user.as_ref().map(|u| u.id), Some(1));
        assert!(!state.loading());
        assert_eq!(stored(&storage).as_deref(), Some("first"));
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_restore_does_not_leave_observers_waiting() -> Result<()> {
        let api = FakeApi {
            user_gate: Some(Arc::new(Notify::new())),
            ..FakeApi::default()
        };
        let storage = MemoryStorage::with_token("tok");
        let session = AuthSession::new(api, storage.clone());
        let mut observer = session.subscribe();
        assert_eq!(observer.current().phase, Phase::Restoring);

        let outcome = tokio::time::timeout(Duration::from_millis(20), session.restore()).await;
        assert!(outcome.is_err(), "restore should still be waiting on the gate");

        let ready = tokio::time::timeout(Duration::from_secs(1), observer.wait_ready())
            .await?
            .ok_or_else(|| anyhow!("session dropped"))?;
        assert_eq!(ready.phase, Phase::Unauthenticated);
        assert!(!ready.loading());
        // The token was never judged, so a later restore can validate it.
        assert_eq!(stored(&storage).as_deref(), Some("tok"));
        Ok(())
    }

    #[tokio::test]
    async fn invariant_holds_across_a_mixed_sequence() -> Result<()> {
        let api = FakeApi::with(|s| {
            s.register.push_back(Err(unscripted()));
            s.register.push_back(Ok(payload(1, "a")));
            s.login.push_back(Err(unscripted()));
            s.login.push_back(Ok(payload(2, "b")));
            s.current_user.push_back(Ok(user(2)));
            s.current_user.push_back(Err(unscripted()));
        });
        let session = AuthSession::new(api, MemoryStorage::new());

        session.restore().await?;
        assert_consistent(&session.state());
        let _ = session.register("A", "a@x.com", password()).await;
        assert_consistent(&session.state());
        session.register("A", "a@x.com", password()).await?;
        assert_consistent(&session.state());
        let _ = session.login("b@x.com", password()).await;
        assert_consistent(&session.state());
        session.login("b@x.com", password()).await?;
        assert_consistent(&session.state());
        session.restore().await?;
        assert_consistent(&session.state());
        assert!(session.state().is_authenticated());
        session.restore().await?;
        assert_consistent(&session.state());
        assert!(!session.state().is_authenticated());
        session.logout().await?;
        assert_consistent(&session.state());
        Ok(())
    }

    #[tokio::test]
    async fn wait_ready_resolves_after_restore() -> Result<()> {
        let session = Arc::new(AuthSession::new(FakeApi::default(), MemoryStorage::new()));
        let mut observer = session.subscribe();

        let waiter = tokio::spawn(async move { observer.wait_ready().await });
        session.restore().await?;

        let state = waiter.await?.ok_or_else(|| anyhow!("session dropped"))?;
        assert!(!state.loading());
        assert_eq!(state.phase, Phase::Unauthenticated);
        Ok(())
    }

    #[tokio::test]
    async fn context_fails_loudly_when_empty() -> Result<()> {
        let empty: SessionContext<FakeApi, MemoryStorage> = SessionContext::empty();
        assert!(matches!(empty.session(), Err(SessionError::NotProvided)));
        assert!(matches!(empty.observe(), Err(SessionError::NotProvided)));

        let session = Arc::new(AuthSession::new(FakeApi::default(), MemoryStorage::new()));
        let context = SessionContext::provide(session.clone());
        context.session()?.restore().await?;
        assert_eq!(context.observe()?.current(), session.state());
        Ok(())
    }
}
