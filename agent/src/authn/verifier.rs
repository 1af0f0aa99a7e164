//! Verification of pre-issued access tokens against the identity provider's
//! public key set.
//!
//! The key set is fetched on every verification and never cached.

use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::CredentialError;

pub const MICROSOFT_ENTRA_ID_COMMON_KEYS_ENDPOINT: &str =
    "https://login.microsoftonline.com/common/discovery/v2.0/keys";

/// The `aud` claim, which may be a single value or a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

/// Claims extracted from a verified access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Client (application) identity
    #[serde(rename = "appid", default)]
    pub app_id: String,

    /// Tenant identity
    #[serde(rename = "tid", default)]
    pub tenant_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    /// Not-before timestamp
    pub nbf: i64,

    /// Expiration timestamp
    pub exp: i64,
}

impl AccessTokenClaims {
    pub fn first_audience(&self) -> Option<&str> {
        match self.aud.as_ref()? {
            Audience::Single(aud) => Some(aud.as_str()),
            Audience::Multiple(auds) => auds.first().map(String::as_str),
        }
    }
}

/// Token verifier trait for testability
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<AccessTokenClaims, CredentialError>;
}

/// Where the public key set comes from
#[async_trait]
pub trait KeySetSource: Send + Sync {
    async fn fetch(&self) -> Result<JwkSet, CredentialError>;
}

/// Fetches the key set from a discovery endpoint over HTTP
pub struct HttpKeySetSource {
    client: reqwest::Client,
    url: String,
}

impl HttpKeySetSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, CredentialError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CredentialError::KeySetUnavailable(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl KeySetSource for HttpKeySetSource {
    async fn fetch(&self) -> Result<JwkSet, CredentialError> {
        debug!("GET {} (public keys)", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| CredentialError::KeySetUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(CredentialError::KeySetUnavailable(format!(
                "{} returned {}",
                self.url, status
            )));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| CredentialError::KeySetUnavailable(e.to_string()))
    }
}

/// A key set supplied up front
#[derive(Debug, Clone)]
pub struct StaticKeySet {
    keys: JwkSet,
}

impl StaticKeySet {
    pub fn new(keys: JwkSet) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl KeySetSource for StaticKeySet {
    async fn fetch(&self) -> Result<JwkSet, CredentialError> {
        Ok(self.keys.clone())
    }
}

/// Verifies RS256 tokens against a JSON Web Key Set
pub struct JwksTokenVerifier<S> {
    source: S,
}

impl<S: KeySetSource> JwksTokenVerifier<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

#[async_trait]
impl<S: KeySetSource> TokenVerifier for JwksTokenVerifier<S> {
    async fn verify(&self, token: &str) -> Result<AccessTokenClaims, CredentialError> {
        let header =
            decode_header(token).map_err(|e| CredentialError::InvalidToken(e.to_string()))?;

        if header.alg != Algorithm::RS256 {
            return Err(CredentialError::UnsupportedAlgorithm(format!(
                "{:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| CredentialError::KeyNotFound("<missing kid header>".to_string()))?;

        let key_set = self.source.fetch().await?;
        let jwk = key_set
            .find(&kid)
            .ok_or_else(|| CredentialError::KeyNotFound(kid.clone()))?;
        let key = DecodingKey::from_jwk(jwk).map_err(|e| {
            CredentialError::InvalidToken(format!("unable to parse the public key: {}", e))
        })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_nbf = true;
        validation.leeway = 0;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "nbf"]);

        let claims = decode::<AccessTokenClaims>(token, &key, &validation)
            .map_err(map_jwt_error)?
            .claims;

        validate_claim(&claims.app_id, "appid")?;
        validate_claim(&claims.tenant_id, "tid")?;

        debug!(kid = %kid, tenant_id = %claims.tenant_id, "Access token verified");
        Ok(claims)
    }
}

fn validate_claim(claim: &str, name: &str) -> Result<(), CredentialError> {
    if claim.trim().is_empty() {
        return Err(CredentialError::MissingClaim(name.to_string()));
    }
    Ok(())
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> CredentialError {
    match err.kind() {
        ErrorKind::InvalidSignature => CredentialError::InvalidSignature,
        ErrorKind::ExpiredSignature => CredentialError::Expired,
        ErrorKind::ImmatureSignature => CredentialError::NotYetValid,
        ErrorKind::InvalidAlgorithm => CredentialError::UnsupportedAlgorithm(err.to_string()),
        ErrorKind::MissingRequiredClaim(claim) => CredentialError::MissingClaim(claim.clone()),
        _ => CredentialError::InvalidToken(err.to_string()),
    }
}
