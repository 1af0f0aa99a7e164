//! Azure configuration read from the environment

use secrecy::SecretString;

use crate::errors::AgentError;

pub const ENV_PREFIX: &str = "AZURE";
pub const DEFAULT_ENVIRONMENT: &str = "AzurePublicCloud";

/// Endpoints of one Azure cloud
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudEnvironment {
    pub name: String,
    pub active_directory_endpoint: String,
    pub resource_manager_endpoint: String,
}

impl CloudEnvironment {
    fn new(name: &str, active_directory_endpoint: &str, resource_manager_endpoint: &str) -> Self {
        Self {
            name: name.to_string(),
            active_directory_endpoint: active_directory_endpoint.to_string(),
            resource_manager_endpoint: resource_manager_endpoint.to_string(),
        }
    }

    pub fn public_cloud() -> Self {
        Self::new(
            "AzurePublicCloud",
            "https://login.microsoftonline.com/",
            "https://management.azure.com/",
        )
    }

    /// Look up a cloud by name, ignoring case
    pub fn from_name(name: &str) -> Result<Self, AgentError> {
        match name.trim().to_uppercase().as_str() {
            "AZUREPUBLICCLOUD" => Ok(Self::public_cloud()),
            "AZURECHINACLOUD" => Ok(Self::new(
                "AzureChinaCloud",
                "https://login.chinacloudapi.cn/",
                "https://management.chinacloudapi.cn/",
            )),
            "AZUREUSGOVERNMENTCLOUD" => Ok(Self::new(
                "AzureUSGovernmentCloud",
                "https://login.microsoftonline.us/",
                "https://management.usgovcloudapi.net/",
            )),
            "AZUREGERMANCLOUD" => Ok(Self::new(
                "AzureGermanCloud",
                "https://login.microsoftonline.de/",
                "https://management.microsoftazure.de/",
            )),
            _ => Err(AgentError::ConfigError(format!(
                "autorest/azure: There is no cloud environment matching the name \"{}\"",
                name
            ))),
        }
    }
}

/// Configuration for one run. Built once and never mutated.
#[derive(Debug)]
pub struct Config {
    pub environment: CloudEnvironment,
    pub subscription_id: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: SecretString,
    /// Pre-issued access token supplied by the caller
    pub access_token: Option<SecretString>,
    /// Empty when status recording is disabled
    pub status_db_connection_string: String,
}

impl Config {
    /// Read the configuration from process environment variables
    pub fn from_env() -> Result<Self, AgentError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, keyed by full variable name
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AgentError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}_{}", ENV_PREFIX, name));

        let subscription_id = var("SUBSCRIPTION_ID")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                AgentError::ConfigError(format!(
                    "required key {}_SUBSCRIPTION_ID missing value",
                    ENV_PREFIX
                ))
            })?;
        let environment_name = var("ENVIRONMENT")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());

        Ok(Self {
            environment: CloudEnvironment::from_name(&environment_name)?,
            subscription_id,
            tenant_id: var("TENANT_ID").unwrap_or_default(),
            client_id: var("CLIENT_ID").unwrap_or_default(),
            client_secret: SecretString::from(var("CLIENT_SECRET").unwrap_or_default()),
            access_token: var("ACCESS_TOKEN")
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from),
            status_db_connection_string: var("STATUSDB_CONNECTION_STRING").unwrap_or_default(),
        })
    }
}
