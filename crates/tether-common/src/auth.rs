//! Client-side credential configuration.
//!
//! Credentials are optional. When configured, the socket transport resolves
//! them once per connection attempt and attaches them to its handshake
//! frame; the HTTP transport attaches a static key as the `X-API-Key`
//! header.
//!
//! # Example
//!
//! ```
//! use tether_common::auth::AuthConfig;
//!
//! let auth = AuthConfig::with_api_key("my-secret-key");
//! assert!(auth.requires_auth());
//!
//! let no_auth = AuthConfig::disabled();
//! assert!(!no_auth.requires_auth());
//! ```

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::protocol::{Result, TetherError};

/// Asynchronous source of connection credentials.
///
/// Implementations may fetch or refresh a token; returning `None` means no
/// credentials could be obtained, which aborts the connection attempt.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn credentials(&self) -> Option<Value>;
}

#[derive(Clone, Default)]
enum AuthSource {
    #[default]
    Disabled,
    ApiKey(String),
    Provider(Arc<dyn AuthProvider>),
}

/// Credential configuration for a transport.
///
/// Three modes: disabled (default), a static API key, or an async provider
/// consulted once per connection attempt.
#[derive(Clone, Default)]
pub struct AuthConfig {
    source: AuthSource,
}

impl AuthConfig {
    /// Creates a configuration with no credentials.
    pub fn disabled() -> Self {
        Self {
            source: AuthSource::Disabled,
        }
    }

    /// Creates a configuration carrying a static API key.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            source: AuthSource::ApiKey(api_key.into()),
        }
    }

    /// Creates a configuration backed by an async credential provider.
    pub fn with_provider(provider: impl AuthProvider + 'static) -> Self {
        Self {
            source: AuthSource::Provider(Arc::new(provider)),
        }
    }

    /// Returns whether credentials are configured.
    pub fn requires_auth(&self) -> bool {
        !matches!(self.source, AuthSource::Disabled)
    }

    /// The static API key, if this configuration carries one.
    pub fn api_key(&self) -> Option<&str> {
        match &self.source {
            AuthSource::ApiKey(key) => Some(key),
            _ => None,
        }
    }

    /// Resolves credentials for one connection attempt.
    ///
    /// Returns `Ok(None)` when auth is disabled. A provider that yields no
    /// credentials is an error: the attempt must be aborted rather than sent
    /// unauthenticated.
    pub async fn resolve(&self) -> Result<Option<Value>> {
        match &self.source {
            AuthSource::Disabled => Ok(None),
            AuthSource::ApiKey(key) => Ok(Some(Value::String(key.clone()))),
            AuthSource::Provider(provider) => match provider.credentials().await {
                Some(token) => Ok(Some(token)),
                None => Err(TetherError::Auth(
                    "credential provider returned no credentials".to_string(),
                )),
            },
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            AuthSource::Disabled => write!(f, "AuthConfig(Disabled)"),
            AuthSource::ApiKey(_) => write!(f, "AuthConfig(ApiKey(*****))"),
            AuthSource::Provider(_) => write!(f, "AuthConfig(Provider)"),
        }
    }
}

impl fmt::Display for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            AuthSource::Disabled => write!(f, "Disabled"),
            AuthSource::ApiKey(_) => write!(f, "ApiKey(*****)"),
            AuthSource::Provider(_) => write!(f, "Provider"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct StaticProvider(Option<Value>);

    #[async_trait]
    impl AuthProvider for StaticProvider {
        async fn credentials(&self) -> Option<Value> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn test_disabled_resolves_to_none() {
        let auth = AuthConfig::disabled();
        assert!(!auth.requires_auth());
        assert_eq!(auth.resolve().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_api_key_resolves_to_string_token() {
        let auth = AuthConfig::with_api_key("secret");
        assert!(auth.requires_auth());
        assert_eq!(auth.api_key(), Some("secret"));
        assert_eq!(auth.resolve().await.unwrap(), Some(json!("secret")));
    }

    #[tokio::test]
    async fn test_provider_token_is_passed_through() {
        let auth = AuthConfig::with_provider(StaticProvider(Some(json!({"jwt": "abc"}))));
        assert_eq!(auth.resolve().await.unwrap(), Some(json!({"jwt": "abc"})));
    }

    #[tokio::test]
    async fn test_provider_without_credentials_is_an_error() {
        let auth = AuthConfig::with_provider(StaticProvider(None));
        assert!(matches!(
            auth.resolve().await.unwrap_err(),
            TetherError::Auth(_)
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        let auth = AuthConfig::with_api_key("secret");
        assert_eq!(format!("{:?}", auth), "AuthConfig(ApiKey(*****))");
        assert_eq!(format!("{}", auth), "ApiKey(*****)");
    }

    #[test]
    fn test_default_is_disabled() {
        assert!(!AuthConfig::default().requires_auth());
    }
}
