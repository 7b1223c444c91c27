//! Observable session state.
//!
//! `is_authenticated` is derived from `user` rather than stored, and `loading`
//! follows the phase, so neither can drift from the value it mirrors.

use crate::api::User;
use serde::{Serialize, Serializer};
use std::fmt;

/// Operation currently holding the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Restore,
    Register,
    Login,
    Logout,
}

impl fmt::Display for Operation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Restore => "restore",
            Self::Register => "register",
            Self::Login => "login",
            Self::Logout => "logout",
        };
        formatter.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "phase", content = "operation")]
pub enum Phase {
    /// Initial phase until the first restore completes.
    Restoring,
    Unauthenticated,
    Authenticated,
    Busy(Operation),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<User>,
    pub error: Option<String>,
    pub phase: Phase,
}

impl SessionState {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    #[must_use]
    pub fn loading(&self) -> bool {
        matches!(self.phase, Phase::Restoring | Phase::Busy(_))
    }

    /// Enters `operation`: clears the previous error and marks the session busy.
    pub(crate) fn begin(&mut self, operation: Operation) {
        self.error = None;
        // The first restore stays in `Restoring`.
        if !(operation == Operation::Restore && self.phase == Phase::Restoring) {
            self.phase = Phase::Busy(operation);
        }
    }

    /// Leaves the busy phase with `user` as the current identity.
    pub(crate) fn settle(&mut self, user: Option<User>) {
        self.phase = if user.is_some() {
            Phase::Authenticated
        } else {
            Phase::Unauthenticated
        };
        self.user = user;
    }

    /// Leaves the busy phase keeping whoever was signed in before.
    pub(crate) fn settle_unchanged(&mut self) {
        let user = self.user.take();
        self.settle(user);
    }
}

/// Wire shape of [`SessionState`], with the derived flags spelled out.
#[derive(Serialize)]
struct StateView<'a> {
    user: Option<&'a User>,
    is_authenticated: bool,
    loading: bool,
    error: Option<&'a str>,
    #[serde(flatten)]
    phase: Phase,
}

impl Serialize for SessionState {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        StateView {
            user: self.user.as_ref(),
            is_authenticated: self.is_authenticated(),
            loading: self.loading(),
            error: self.error.as_deref(),
            phase: self.phase,
        }
        .serialize(serializer)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            user: None,
            error: None,
            phase: Phase::Restoring,
        }
    }
}
