//! Request and response types for the identity API. Request payloads carry
//! passwords, so they must never be logged.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identity record returned by the remote service.
/// The client treats it as read-only; timestamps stay in the server's format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub email_verified_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

fn expose<S: Serializer>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

fn conceal<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretString, D::Error> {
    String::deserialize(deserializer).map(SecretString::from)
}

#[derive(Debug, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    #[serde(serialize_with = "expose")]
    pub password: SecretString,
}

#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub email: String,
    #[serde(serialize_with = "expose")]
    pub password: SecretString,
}

/// Successful register/login response: the identity plus a freshly issued token.
#[derive(Debug, Deserialize)]
pub struct AuthPayload {
    pub user: User,
    #[serde(alias = "access_token", deserialize_with = "conceal")]
    pub token: SecretString,
}

/// `GET /user` answers either with the bare user or wrapped as `{"user": ...}`.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum CurrentUserBody {
    Wrapped { user: User },
    Bare(User),
}

impl From<CurrentUserBody> for User {
    fn from(body: CurrentUserBody) -> Self {
        match body {
            CurrentUserBody::Wrapped { user } | CurrentUserBody::Bare(user) => user,
        }
    }
}
