//! Error types for the ARM deployment agent

use std::time::Duration;

use thiserror::Error;

/// Main error type for a deployment run
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("State machine error: {0}")]
    StateMachine(String),
}

/// Failure to read the install payload
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("could not parse the install payload: {0}")]
    Malformed(String),

    #[error("expected a single step, but got {0}")]
    MultipleSteps(usize),
}

/// A required deployment field is absent or has the wrong type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("location is required in parameters")]
    MissingLocation,

    #[error("{0} must be a string")]
    WrongType(&'static str),
}

impl ValidationError {
    /// Name of the offending field
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::Missing(field) | ValidationError::WrongType(field) => field,
            ValidationError::MissingLocation => "location",
        }
    }
}

/// Credential acquisition and token verification failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("unexpected signing method: {0}")]
    UnsupportedAlgorithm(String),

    #[error("the key '{0}' not found")]
    KeyNotFound(String),

    #[error("the access token signature is invalid")]
    InvalidSignature,

    #[error("the access token has expired")]
    Expired,

    #[error("the access token is not valid yet")]
    NotYetValid,

    #[error("the claim '{0}' is not found in the access token")]
    MissingClaim(String),

    #[error("the access token provided is invalid: {0}")]
    InvalidToken(String),

    #[error("unable to fetch the public key set: {0}")]
    KeySetUnavailable(String),

    #[error("error building oauth config: {0}")]
    OAuthConfig(String),

    #[error("error getting service principal token: {0}")]
    TokenAcquisition(String),
}

/// Template lookup failures
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("couldn't find template {name}: {reason}")]
    NotFound { name: String, reason: String },

    #[error("invalid template name: {0}")]
    InvalidName(String),
}

/// Remote deployment failures
#[derive(Error, Debug)]
pub enum ProvisioningError {
    #[error("deployment request failed: {0}")]
    Request(String),

    #[error("authorization failed: {0}")]
    Authorization(#[from] CredentialError),

    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    #[error("deployment finished with state {state}: {message}")]
    Failed { state: String, message: String },

    #[error("deployment did not complete within {0:?}")]
    Timeout(Duration),
}

/// A declared output is absent from the provisioning result
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("output '{key}' not found in deployment outputs")]
pub struct ReconciliationGap {
    pub key: String,
}

/// Status store failures, never fatal to a run
#[derive(Error, Debug)]
pub enum StatusStoreError {
    #[error("connection string is required")]
    NotConfigured,

    #[error("unsupported status store connection string")]
    UnsupportedBackend,

    #[error("invalid identifier '{0}'")]
    InvalidName(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StatusStoreError {
    fn from(err: sqlx::Error) -> Self {
        StatusStoreError::Backend(err.to_string())
    }
}
