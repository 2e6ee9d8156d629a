//! Login, logout, and token refresh.
//!
//! These calls drive the `SessionStore` transitions. Login stores the user
//! and token only after the server accepts the credentials; logout always
//! clears local state, whatever happens to the server call.

use serde_json::json;

use crate::client::{ApiClient, RequestOptions};
use crate::error::NormalizedError;
use crate::session::SessionStore;
use crate::types::{Credentials, LoginResponse, RefreshResponse, User};

pub const LOGIN_PATH: &str = "/auth/login";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const ME_PATH: &str = "/auth/me";

/// Clears the session when dropped, so cleanup runs even if the logout call
/// unwinds.
struct ClearOnDrop<'a>(&'a SessionStore);

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        self.0.clear();
    }
}

impl ApiClient {
    pub fn login(&self, credentials: &Credentials) -> Result<LoginResponse, NormalizedError> {
        let session = self.session();
        session.begin_login();
        match self.post_as::<LoginResponse, _>(LOGIN_PATH, credentials, &RequestOptions::default()) {
            Ok(response) => {
                tracing::debug!(user = %response.user.username, "login succeeded");
                session.establish(response.user.clone(), response.token.clone());
                Ok(response)
            }
            Err(error) => {
                session.abort_login();
                Err(error)
            }
        }
    }

    /// Ask the server to invalidate the session, then drop it locally.
    pub fn logout(&self) {
        let _cleanup = ClearOnDrop(self.session());
        if let Err(error) = self.post(LOGOUT_PATH, &json!({}), &RequestOptions::default()) {
            tracing::warn!(kind = %error.kind, message = %error.message, "server-side logout failed");
        }
    }

    /// Exchange the current token for a fresh one. Session state is left
    /// untouched on failure, apart from what the response stages do.
    pub fn refresh(&self) -> Result<String, NormalizedError> {
        let response: RefreshResponse =
            self.post_as(REFRESH_PATH, &json!({}), &RequestOptions::default())?;
        self.session().replace_token(response.token.clone());
        Ok(response.token)
    }

    /// The user the server associates with the current token.
    pub fn me(&self) -> Result<User, NormalizedError> {
        self.get_as(ME_PATH, &RequestOptions::default())
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_authenticated()
    }
}
