//! Service account authentication for the Google APIs.
//!
//! The key file is read once at startup. `yup-oauth2` caches the access token in memory and
//! silently mints a new one shortly before expiry, so callers just ask for a token on every
//! request.

use crate::api::OAUTH_SCOPES;
use crate::error::Res;
use anyhow::Context;
use std::path::Path;
use tracing::debug;
use yup_oauth2::authenticator::DefaultAuthenticator;

/// Hands out access tokens for the configured service account.
pub(crate) struct TokenProvider {
    auth: DefaultAuthenticator,
}

impl TokenProvider {
    /// Loads the service account key at `key_path` and builds the authenticator.
    pub(crate) async fn load(key_path: &Path) -> Res<Self> {
        debug!("Loading service account key from {}", key_path.display());
        let key = yup_oauth2::read_service_account_key(key_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to read service account key from {}",
                    key_path.display()
                )
            })?;

        let auth = yup_oauth2::ServiceAccountAuthenticator::builder(key)
            .build()
            .await
            .context("Failed to create service account authenticator")?;

        Ok(Self { auth })
    }

    /// Returns a valid access token, refreshing it first if it is about to expire.
    pub(crate) async fn token(&self) -> Res<String> {
        let token = self
            .auth
            .token(OAUTH_SCOPES)
            .await
            .context("Failed to obtain an access token")?;
        token
            .token()
            .map(str::to_string)
            .context("The token response did not contain an access token")
    }
}
