//! `OAuth2` provider configuration.

use url::Url;

use crate::error::{Error, Result};

/// Read-only Gmail access, all the triage backend ever asks for.
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

/// `OAuth2` provider endpoints and default scopes.
#[derive(Debug, Clone)]
pub struct Provider {
    /// Provider name (e.g., "Google").
    pub name: String,
    /// Authorization endpoint URL.
    pub auth_url: Url,
    /// Token endpoint URL.
    pub token_url: Url,
    /// Scopes requested when the caller does not override them.
    pub default_scopes: Vec<String>,
}

impl Provider {
    /// Creates a custom provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if either URL is invalid.
    pub fn new(
        name: impl Into<String>,
        auth_url: impl AsRef<str>,
        token_url: impl AsRef<str>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            auth_url: Url::parse(auth_url.as_ref())?,
            token_url: Url::parse(token_url.as_ref())?,
            default_scopes: Vec::new(),
        })
    }

    /// Sets the default scopes.
    #[must_use]
    pub fn with_default_scopes(mut self, scopes: Vec<String>) -> Self {
        self.default_scopes = scopes;
        self
    }

    /// Google `OAuth2` provider configuration with the read-only Gmail
    /// scope.
    ///
    /// # Errors
    ///
    /// Returns an error if URL parsing fails.
    pub fn google() -> Result<Self> {
        Ok(Self::new(
            "Google",
            "https://accounts.google.com/o/oauth2/v2/auth",
            "https://oauth2.googleapis.com/token",
        )?
        .with_default_scopes(vec![GMAIL_READONLY_SCOPE.to_string()]))
    }

    /// Whether this provider wants Google's offline-access parameters on the
    /// authorization URL.
    #[must_use]
    pub fn is_google(&self) -> bool {
        self.name == "Google"
    }

    /// Validates that required URLs are set.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.auth_url.as_str().is_empty() {
            return Err(Error::InvalidConfig("auth_url is empty".into()));
        }
        if self.token_url.as_str().is_empty() {
            return Err(Error::InvalidConfig("token_url is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_google_provider() {
        let provider = Provider::google().unwrap();
        assert_eq!(provider.name, "Google");
        assert!(provider.is_google());
        assert_eq!(
            provider.default_scopes,
            vec![GMAIL_READONLY_SCOPE.to_string()]
        );
        provider.validate().unwrap();
    }

    #[test]
    fn test_custom_provider() {
        let provider = Provider::new(
            "Custom",
            "https://auth.example.com/authorize",
            "https://auth.example.com/token",
        )
        .unwrap()
        .with_default_scopes(vec!["email".to_string()]);

        assert!(!provider.is_google());
        assert_eq!(provider.default_scopes.len(), 1);
        provider.validate().unwrap();
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        assert!(Provider::new("Broken", "not a url", "https://ok.example.com").is_err());
    }
}
