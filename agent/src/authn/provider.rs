//! Bearer token providers

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::RwLock;
use tracing::info;

use crate::authn::oauth::{OAuthConfig, TokenGrant};
use crate::authn::token::AccessToken;
use crate::errors::CredentialError;

/// Refresh a client-credentials token this many seconds before it expires
pub const REFRESH_WINDOW_SECS: i64 = 300;

/// Grant flow a provider was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantFlow {
    ClientCredentials,
    PreIssued,
}

/// Produces `Authorization` header values for outbound requests
#[async_trait]
pub trait BearerTokenProvider: Send + Sync {
    fn grant_flow(&self) -> GrantFlow;

    /// `Bearer <token>`
    async fn authorization(&self) -> Result<String, CredentialError>;
}

/// Wraps a caller-supplied token; never re-authenticates
#[derive(Debug)]
pub struct PreIssuedTokenProvider {
    token: AccessToken,
}

impl PreIssuedTokenProvider {
    pub fn new(token: AccessToken) -> Self {
        Self { token }
    }
}

#[async_trait]
impl BearerTokenProvider for PreIssuedTokenProvider {
    fn grant_flow(&self) -> GrantFlow {
        GrantFlow::PreIssued
    }

    async fn authorization(&self) -> Result<String, CredentialError> {
        Ok(self.token.authorization_header())
    }
}

/// Client-credentials provider that refreshes its token before expiry
pub struct ClientCredentialsProvider {
    grant: Arc<dyn TokenGrant>,
    oauth: OAuthConfig,
    client_id: String,
    client_secret: SecretString,
    resource: String,
    cached_token: RwLock<Option<AccessToken>>,
}

impl ClientCredentialsProvider {
    /// Create the provider and acquire the first token
    pub async fn new(
        grant: Arc<dyn TokenGrant>,
        oauth: OAuthConfig,
        client_id: String,
        client_secret: SecretString,
        resource: String,
    ) -> Result<Self, CredentialError> {
        let provider = Self {
            grant,
            oauth,
            client_id,
            client_secret,
            resource,
            cached_token: RwLock::new(None),
        };

        provider.refresh_token().await?;

        Ok(provider)
    }

    async fn refresh_token(&self) -> Result<String, CredentialError> {
        let mut cached = self.cached_token.write().await;

        // Another caller may have refreshed while we waited for the lock
        if let Some(token) = cached.as_ref() {
            if !token.expires_within(REFRESH_WINDOW_SECS) {
                return Ok(token.authorization_header());
            }
        }

        let token = self
            .grant
            .client_credentials(&self.oauth, &self.client_id, &self.client_secret, &self.resource)
            .await?;
        info!("Token acquired, expires at: {}", token.expires_at());

        let header = token.authorization_header();
        *cached = Some(token);
        Ok(header)
    }
}

#[async_trait]
impl BearerTokenProvider for ClientCredentialsProvider {
    fn grant_flow(&self) -> GrantFlow {
        GrantFlow::ClientCredentials
    }

    async fn authorization(&self) -> Result<String, CredentialError> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                if !token.expires_within(REFRESH_WINDOW_SECS) {
                    return Ok(token.authorization_header());
                }
            }
        }

        self.refresh_token().await
    }
}
