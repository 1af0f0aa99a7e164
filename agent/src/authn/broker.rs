//! Credential broker: picks the grant flow and builds a bearer token provider

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::app::config::CloudEnvironment;
use crate::authn::oauth::{OAuthConfig, TokenGrant};
use crate::authn::provider::{
    BearerTokenProvider, ClientCredentialsProvider, GrantFlow, PreIssuedTokenProvider,
};
use crate::authn::token::AccessToken;
use crate::authn::verifier::TokenVerifier;
use crate::errors::CredentialError;

/// Inputs for acquiring a credential
#[derive(Debug, Clone, Copy)]
pub struct CredentialRequest<'a> {
    pub tenant_id: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a SecretString,
    pub environment: &'a CloudEnvironment,
    pub pre_issued_token: Option<&'a SecretString>,
}

impl CredentialRequest<'_> {
    /// The pre-issued token, if one was supplied and is not blank
    fn pre_issued(&self) -> Option<&str> {
        self.pre_issued_token
            .map(|token| token.expose_secret().trim())
            .filter(|token| !token.is_empty())
    }
}

/// Resolved credential for one run; dropped once the provider exists
#[derive(Debug)]
pub struct Credential {
    pub grant_flow: GrantFlow,
    pub tenant_id: String,
    pub client_id: String,
    pub resource: String,
    pub secret_or_token: SecretString,
    /// `(not_before, expires_on)`, pre-issued tokens only
    pub validity_window: Option<(i64, i64)>,
}

/// Credential broker trait for testability
#[async_trait]
pub trait CredentialBroker: Send + Sync {
    async fn acquire(
        &self,
        request: CredentialRequest<'_>,
    ) -> Result<Arc<dyn BearerTokenProvider>, CredentialError>;
}

/// Broker for Microsoft Entra ID
pub struct AzureCredentialBroker {
    verifier: Arc<dyn TokenVerifier>,
    grant: Arc<dyn TokenGrant>,
}

impl AzureCredentialBroker {
    pub fn new(verifier: Arc<dyn TokenVerifier>, grant: Arc<dyn TokenGrant>) -> Self {
        Self { verifier, grant }
    }

    async fn pre_issued(
        &self,
        request: &CredentialRequest<'_>,
        token: &str,
    ) -> Result<Arc<dyn BearerTokenProvider>, CredentialError> {
        let claims = self.verifier.verify(token).await?;

        let credential = Credential {
            grant_flow: GrantFlow::PreIssued,
            tenant_id: claims.tenant_id.clone(),
            client_id: claims.app_id.clone(),
            resource: claims.first_audience().unwrap_or_default().to_string(),
            secret_or_token: SecretString::from(token.to_string()),
            validity_window: Some((claims.nbf, claims.exp)),
        };
        // Validates the authority for the token's tenant even though no
        // request is sent to it
        OAuthConfig::new(&request.environment.active_directory_endpoint, &credential.tenant_id)?;

        info!(
            tenant_id = %credential.tenant_id,
            client_id = %credential.client_id,
            "Using pre-issued access token"
        );
        let token = AccessToken::from_claims(credential.secret_or_token, &claims);
        Ok(Arc::new(PreIssuedTokenProvider::new(token)))
    }

    async fn client_credentials(
        &self,
        request: &CredentialRequest<'_>,
    ) -> Result<Arc<dyn BearerTokenProvider>, CredentialError> {
        let credential = Credential {
            grant_flow: GrantFlow::ClientCredentials,
            tenant_id: request.tenant_id.to_string(),
            client_id: request.client_id.to_string(),
            resource: request.environment.resource_manager_endpoint.clone(),
            secret_or_token: SecretString::from(request.client_secret.expose_secret().to_string()),
            validity_window: None,
        };
        let oauth = OAuthConfig::new(
            &request.environment.active_directory_endpoint,
            &credential.tenant_id,
        )?;

        info!(
            tenant_id = %credential.tenant_id,
            client_id = %credential.client_id,
            "Requesting token with client credentials"
        );
        let provider = ClientCredentialsProvider::new(
            self.grant.clone(),
            oauth,
            credential.client_id,
            credential.secret_or_token,
            credential.resource,
        )
        .await?;
        Ok(Arc::new(provider))
    }
}

#[async_trait]
impl CredentialBroker for AzureCredentialBroker {
    async fn acquire(
        &self,
        request: CredentialRequest<'_>,
    ) -> Result<Arc<dyn BearerTokenProvider>, CredentialError> {
        match request.pre_issued() {
            Some(token) => self.pre_issued(&request, token).await,
            None => self.client_credentials(&request).await,
        }
    }
}
