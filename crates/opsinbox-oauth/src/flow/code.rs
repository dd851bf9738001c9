//! Authorization Code Flow.

use url::Url;

use super::{OAuthClient, PkceChallenge};
use crate::error::Result;
use crate::token::Token;

/// Authorization Code Flow for `OAuth2`.
///
/// Suitable for applications that can open a browser and receive the
/// authorization code from the redirect.
#[derive(Debug)]
pub struct AuthorizationCodeFlow {
    client: OAuthClient,
    pkce: Option<PkceChallenge>,
}

impl AuthorizationCodeFlow {
    /// Creates a new authorization code flow.
    #[must_use]
    pub const fn new(client: OAuthClient) -> Self {
        Self { client, pkce: None }
    }

    /// Enables PKCE (recommended for public clients).
    #[must_use]
    pub fn with_pkce(mut self) -> Self {
        self.pkce = Some(PkceChallenge::generate());
        self
    }

    /// Builds the authorization URL for user consent.
    ///
    /// Uses the provider's default scopes. For Google, `access_type=offline`
    /// and `prompt=consent` are added so a refresh token is issued.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be constructed.
    pub fn authorization_url(&self, state: Option<&str>) -> Result<Url> {
        let mut url = self.client.provider.auth_url.clone();

        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("client_id", &self.client.client_id)
                .append_pair("response_type", "code");

            if let Some(redirect_uri) = &self.client.redirect_uri {
                pairs.append_pair("redirect_uri", redirect_uri);
            }

            let scope = self.client.provider.default_scopes.join(" ");
            if !scope.is_empty() {
                pairs.append_pair("scope", &scope);
            }

            if let Some(state_val) = state {
                pairs.append_pair("state", state_val);
            }

            if let Some(pkce) = &self.pkce {
                pairs
                    .append_pair("code_challenge", pkce.challenge())
                    .append_pair("code_challenge_method", pkce.method());
            }

            if self.client.provider.is_google() {
                pairs
                    .append_pair("access_type", "offline")
                    .append_pair("prompt", "consent");
            }
        }

        Ok(url)
    }

    /// Exchanges the authorization code for an access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token exchange fails.
    pub async fn exchange_code(&self, code: &str) -> Result<Token> {
        let verifier = self.pkce.as_ref().map(PkceChallenge::verifier);
        self.client.exchange_code(code, verifier).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::provider::Provider;

    fn flow() -> AuthorizationCodeFlow {
        let provider = Provider::google().unwrap();
        let client = OAuthClient::new("test_client", provider)
            .with_redirect_uri("http://localhost:8085");
        AuthorizationCodeFlow::new(client)
    }

    #[test]
    fn test_authorization_url_basics() {
        let url = flow().authorization_url(Some("random_state")).unwrap();

        assert!(url.as_str().contains("client_id=test_client"));
        assert!(url.as_str().contains("response_type=code"));
        assert!(url.as_str().contains("state=random_state"));
        // URL-encoded redirect_uri
        assert!(
            url.as_str()
                .contains("redirect_uri=http%3A%2F%2Flocalhost%3A8085")
        );
    }

    #[test]
    fn test_google_offline_params_are_present() {
        let url = flow().authorization_url(None).unwrap();

        assert!(url.as_str().contains("access_type=offline"));
        assert!(url.as_str().contains("prompt=consent"));
        assert!(url.as_str().contains("gmail.readonly"));
    }

    #[test]
    fn test_pkce_parameters_on_url() {
        let url = flow().with_pkce().authorization_url(None).unwrap();

        assert!(url.as_str().contains("code_challenge="));
        assert!(url.as_str().contains("code_challenge_method=S256"));
    }

    #[test]
    fn test_non_google_provider_omits_offline_params() {
        let provider = Provider::new(
            "Custom",
            "https://auth.example.com/authorize",
            "https://auth.example.com/token",
        )
        .unwrap();
        let client = OAuthClient::new("test_client", provider);
        let url = AuthorizationCodeFlow::new(client)
            .authorization_url(None)
            .unwrap();

        assert!(!url.as_str().contains("access_type=offline"));
    }
}
