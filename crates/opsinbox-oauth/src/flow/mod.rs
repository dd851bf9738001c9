//! `OAuth2` authorization flow.

mod code;
mod pkce;

pub use code::AuthorizationCodeFlow;
pub use pkce::PkceChallenge;

use std::collections::HashMap;

use reqwest::Client;
use tracing::debug;

use crate::error::Result;
use crate::provider::Provider;
use crate::token::{ErrorResponse, Token, TokenResponse};

/// Common `OAuth2` client configuration.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    /// Client ID from the provider console.
    pub client_id: String,
    /// Client secret (optional for public clients).
    pub client_secret: Option<String>,
    /// Redirect URI for the authorization code flow.
    pub redirect_uri: Option<String>,
    /// Provider configuration.
    pub provider: Provider,
    /// HTTP client.
    http_client: Client,
}

impl OAuthClient {
    /// Creates a new OAuth client.
    #[must_use]
    pub fn new(client_id: impl Into<String>, provider: Provider) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: None,
            provider,
            http_client: Client::new(),
        }
    }

    /// Sets the client secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Sets the redirect URI.
    #[must_use]
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    /// Refreshes an access token using its refresh token.
    ///
    /// The refresh token is preserved on the returned token when the server
    /// does not rotate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the token has no refresh token or the request
    /// fails.
    pub async fn refresh_token(&self, token: &Token) -> Result<Token> {
        let refresh_token = token.refresh_token()?;

        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);
        params.insert("client_id", &self.client_id);
        if let Some(secret) = &self.client_secret {
            params.insert("client_secret", secret);
        }

        debug!(provider = %self.provider.name, "Refreshing access token");
        let response = self.post_token_request(&params).await?;

        let mut refreshed = Token::from_response(response);
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token.clone_from(&token.refresh_token);
        }
        Ok(refreshed)
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails.
    pub(crate) async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Token> {
        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("client_id", &self.client_id);
        if let Some(uri) = self.redirect_uri.as_deref() {
            params.insert("redirect_uri", uri);
        }
        if let Some(secret) = &self.client_secret {
            params.insert("client_secret", secret);
        }
        if let Some(verifier) = code_verifier {
            params.insert("code_verifier", verifier);
        }

        debug!(provider = %self.provider.name, "Exchanging authorization code");
        let response = self.post_token_request(&params).await?;
        Ok(Token::from_response(response))
    }

    async fn post_token_request(&self, params: &HashMap<&str, &str>) -> Result<TokenResponse> {
        let response = self
            .http_client
            .post(self.provider.token_url.clone())
            .form(params)
            .send()
            .await?;

        if !response.status().is_success() {
            let error: ErrorResponse = response.json().await?;
            return Err(error.into_error());
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_oauth_client_builders() {
        let provider = Provider::google().unwrap();
        let client = OAuthClient::new("client-id", provider)
            .with_client_secret("secret")
            .with_redirect_uri("http://localhost:8085");

        assert_eq!(client.client_id, "client-id");
        assert_eq!(client.client_secret.as_deref(), Some("secret"));
        assert_eq!(client.redirect_uri.as_deref(), Some("http://localhost:8085"));
    }
}
