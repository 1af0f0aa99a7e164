//! OAuth client-credentials grant against the identity provider

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error};
use url::Url;

use crate::authn::token::{AccessToken, TokenResponse};
use crate::errors::CredentialError;

const TOKEN_API_VERSION: &str = "1.0";

/// Authority and token endpoint for one tenant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthConfig {
    pub authority: Url,
    pub token_endpoint: Url,
}

impl OAuthConfig {
    /// Build the configuration for `tenant_id` under the active directory endpoint
    pub fn new(active_directory_endpoint: &str, tenant_id: &str) -> Result<Self, CredentialError> {
        let tenant_id = tenant_id.trim();
        if tenant_id.is_empty() {
            return Err(CredentialError::OAuthConfig("tenant id is required".to_string()));
        }
        if !tenant_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
        {
            return Err(CredentialError::OAuthConfig(format!(
                "invalid tenant id '{}'",
                tenant_id
            )));
        }

        let mut endpoint = active_directory_endpoint.trim().to_string();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }
        let base = Url::parse(&endpoint)
            .map_err(|e| CredentialError::OAuthConfig(format!("{}: {}", endpoint, e)))?;
        if base.cannot_be_a_base() {
            return Err(CredentialError::OAuthConfig(format!(
                "{} cannot be used as an authority",
                endpoint
            )));
        }

        let authority = base
            .join(&format!("{}/", tenant_id))
            .map_err(|e| CredentialError::OAuthConfig(e.to_string()))?;
        let mut token_endpoint = authority
            .join("oauth2/token")
            .map_err(|e| CredentialError::OAuthConfig(e.to_string()))?;
        token_endpoint
            .query_pairs_mut()
            .append_pair("api-version", TOKEN_API_VERSION);

        Ok(Self {
            authority,
            token_endpoint,
        })
    }
}

/// Client-credentials token grant, a trait for testability
#[async_trait]
pub trait TokenGrant: Send + Sync {
    async fn client_credentials(
        &self,
        config: &OAuthConfig,
        client_id: &str,
        client_secret: &SecretString,
        resource: &str,
    ) -> Result<AccessToken, CredentialError>;
}

/// Token grant performed over HTTP
pub struct HttpTokenGrant {
    client: Client,
}

impl HttpTokenGrant {
    pub fn new(timeout: Duration) -> Result<Self, CredentialError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CredentialError::TokenAcquisition(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TokenGrant for HttpTokenGrant {
    async fn client_credentials(
        &self,
        config: &OAuthConfig,
        client_id: &str,
        client_secret: &SecretString,
        resource: &str,
    ) -> Result<AccessToken, CredentialError> {
        debug!("POST {} (client credentials)", config.token_endpoint);

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret.expose_secret()),
            ("resource", resource),
        ];
        let response = self
            .client
            .post(config.token_endpoint.clone())
            .form(&form)
            .send()
            .await
            .map_err(|e| CredentialError::TokenAcquisition(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Token request failed: {} - {}", status, body);
            return Err(CredentialError::TokenAcquisition(format!(
                "{}: {}",
                status, body
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::TokenAcquisition(e.to_string()))?;
        Ok(AccessToken::from_response(body, resource))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oauth_config_endpoints() {
        let config = OAuthConfig::new("https://login.microsoftonline.com/", "my-tenant").unwrap();

        assert_eq!(
            config.authority.as_str(),
            "https://login.microsoftonline.com/my-tenant/"
        );
        assert_eq!(
            config.token_endpoint.as_str(),
            "https://login.microsoftonline.com/my-tenant/oauth2/token?api-version=1.0"
        );
    }

    #[test]
    fn test_oauth_config_without_trailing_slash() {
        let config = OAuthConfig::new("https://login.microsoftonline.us", "t1").unwrap();
        assert_eq!(config.authority.as_str(), "https://login.microsoftonline.us/t1/");
    }

    #[test]
    fn test_oauth_config_rejects_bad_input() {
        assert!(matches!(
            OAuthConfig::new("https://login.microsoftonline.com/", "  "),
            Err(CredentialError::OAuthConfig(_))
        ));
        assert!(matches!(
            OAuthConfig::new("https://login.microsoftonline.com/", "a/../b"),
            Err(CredentialError::OAuthConfig(_))
        ));
        assert!(matches!(
            OAuthConfig::new("not a url", "tenant"),
            Err(CredentialError::OAuthConfig(_))
        ));
    }
}
