//! Login, registration, and logout.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::client::StaxTradeClient;
use crate::error::ApiError;
use crate::http::PendingRequest;
use crate::session::TokenPair;

const LOGIN_PATH: &str = "login/";
const REGISTER_PATH: &str = "register/";

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access: String,
    refresh: String,
}

impl StaxTradeClient {
    /// Exchange credentials for a token pair and store it.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unauthorized` for bad credentials,
    /// `ApiError::NetworkUnreachable` if the server cannot be reached, or
    /// `ApiError::Storage` if the tokens could not be persisted.
    #[instrument(skip(self, password), fields(username = %username))]
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<(), ApiError> {
        let request = PendingRequest::post(LOGIN_PATH)
            .json(&Credentials {
                username,
                password: password.expose_secret(),
            })?
            .anonymous();

        let tokens: TokenResponse = self.inner.http.send_json(&request).await?;
        self.inner
            .session
            .set(&TokenPair::new(tokens.access, tokens.refresh))?;
        self.invalidate_cache().await;

        info!("Logged in");
        Ok(())
    }

    /// Create an account. Does not sign in.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Validation` if the username is taken or a field is
    /// missing.
    #[instrument(skip(self, password), fields(username = %username))]
    pub async fn register(&self, username: &str, password: &SecretString) -> Result<(), ApiError> {
        let request = PendingRequest::post(REGISTER_PATH)
            .json(&Credentials {
                username,
                password: password.expose_secret(),
            })?
            .anonymous();

        self.inner.http.send(&request).await?;
        info!("Account registered");
        Ok(())
    }

    /// Forget both tokens. The cart and portal mode are kept.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Storage` if the tokens could not be removed.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.inner.session.clear()?;
        self.invalidate_cache().await;
        info!("Logged out");
        Ok(())
    }
}
