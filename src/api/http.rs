//! reqwest implementation of [`IdentityApi`] for a Sanctum-style JSON API.
//! Tokens travel only in the `Authorization` header and are never logged.

use super::{
    error::ApiError,
    types::{AuthPayload, CurrentUserBody, LoginRequest, RegisterRequest, User},
    IdentityApi,
};
use crate::config::AppConfig;
use anyhow::Result;
use reqwest::{header, Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, info_span, Instrument};

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Debug)]
pub struct HttpIdentityApi {
    client: Client,
    config: AppConfig,
}

impl HttpIdentityApi {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: AppConfig) -> Result<Self> {
        let mut builder = Client::builder().user_agent(APP_USER_AGENT);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        token: Option<&SecretString>,
    ) -> (String, RequestBuilder) {
        let url = self.config.endpoint(path);
        let mut builder = self
            .client
            .request(method, &url)
            .header(header::ACCEPT, "application/json");

        if let Some(token) = token {
            builder = builder.bearer_auth(token.expose_secret());
        }

        (url, builder)
    }

    async fn send(
        &self,
        url: &str,
        method: &str,
        builder: RequestBuilder,
    ) -> Result<Response, ApiError> {
        let span = info_span!("identity.request", http.method = method, url = %url);
        let response = builder.send().instrument(span).await?;

        let status = response.status();
        debug!(status = status.as_u16(), "identity response");

        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_response_body(status.as_u16(), &body))
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        url: &str,
        method: &str,
        builder: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = self.send(url, method, builder).await?;
        Ok(response.json::<T>().await?)
    }
}

impl IdentityApi for HttpIdentityApi {
    async fn register(
        &self,
        request: &RegisterRequest,
        token: Option<&SecretString>,
    ) -> Result<AuthPayload, ApiError> {
        let (url, builder) = self.request(reqwest::Method::POST, "/register", token);
        self.send_json(&url, "POST", builder.json(request)).await
    }

    async fn login(
        &self,
        request: &LoginRequest,
        token: Option<&SecretString>,
    ) -> Result<AuthPayload, ApiError> {
        let (url, builder) = self.request(reqwest::Method::POST, "/login", token);
        self.send_json(&url, "POST", builder.json(request)).await
    }

    async fn logout(&self, token: &SecretString) -> Result<(), ApiError> {
        let (url, builder) = self.request(reqwest::Method::POST, "/logout", Some(token));
        self.send(&url, "POST", builder).await.map(|_| ())
    }

    async fn current_user(&self, token: &SecretString) -> Result<User, ApiError> {
        let (url, builder) = self.request(reqwest::Method::GET, "/user", Some(token));
        let body: CurrentUserBody = self.send_json(&url, "GET", builder).await?;
        Ok(body.into())
    }
}
