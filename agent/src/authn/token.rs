//! Access token management

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::authn::verifier::AccessTokenClaims;

pub const TOKEN_TYPE: &str = "Bearer";

/// An access token together with its validity window
#[derive(Debug)]
pub struct AccessToken {
    raw: SecretString,

    /// Token type, always `Bearer`
    pub token_type: String,

    /// Resource the token was issued for
    pub resource: String,

    /// Not-before timestamp (seconds since epoch)
    pub not_before: i64,

    /// Expiration timestamp (seconds since epoch)
    pub expires_on: i64,

    /// Token lifetime in seconds
    pub expires_in: i64,
}

impl AccessToken {
    pub fn new(
        raw: SecretString,
        resource: impl Into<String>,
        not_before: i64,
        expires_on: i64,
    ) -> Self {
        Self {
            raw,
            token_type: TOKEN_TYPE.to_string(),
            resource: resource.into(),
            not_before,
            expires_on,
            expires_in: expires_on - not_before,
        }
    }

    /// Wrap an already-issued token whose claims have been verified.
    ///
    /// The lifetime is synthesized from the token's own validity window.
    pub fn from_claims(raw: SecretString, claims: &AccessTokenClaims) -> Self {
        let resource = claims.first_audience().unwrap_or_default().to_string();
        Self::new(raw, resource, claims.nbf, claims.exp)
    }

    /// Build a token from an OAuth token endpoint response
    pub fn from_response(response: TokenResponse, default_resource: &str) -> Self {
        let now = Utc::now().timestamp();
        let expires_in = response.expires_in.as_ref().and_then(NumberOrString::as_i64);
        let expires_on = response
            .expires_on
            .as_ref()
            .and_then(NumberOrString::as_i64)
            .or_else(|| expires_in.map(|secs| now + secs))
            .unwrap_or(now);
        let not_before = response
            .not_before
            .as_ref()
            .and_then(NumberOrString::as_i64)
            .unwrap_or(now);
        let resource = response
            .resource
            .unwrap_or_else(|| default_resource.to_string());

        let mut token = Self::new(
            SecretString::from(response.access_token),
            resource,
            not_before,
            expires_on,
        );
        if let Some(secs) = expires_in {
            token.expires_in = secs;
        }
        token
    }

    /// Raw token value
    pub fn secret(&self) -> &str {
        self.raw.expose_secret()
    }

    /// Value for the `Authorization` header
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.secret())
    }

    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        let now = Utc::now().timestamp();
        self.expires_on < now
    }

    /// Check if the token expires within the given duration
    pub fn expires_within(&self, seconds: i64) -> bool {
        let now = Utc::now().timestamp();
        self.expires_on < now + seconds
    }

    /// Get expiration time
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.expires_on, 0).unwrap_or_else(Utc::now)
    }
}

/// Token endpoint response. The v1 endpoint sends numbers as strings.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    #[serde(default)]
    pub expires_in: Option<NumberOrString>,

    #[serde(default)]
    pub expires_on: Option<NumberOrString>,

    #[serde(default)]
    pub not_before: Option<NumberOrString>,

    #[serde(default)]
    pub resource: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(i64),
    String(String),
}

impl NumberOrString {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            NumberOrString::Number(n) => Some(*n),
            NumberOrString::String(s) => s.trim().parse().ok(),
        }
    }
}
