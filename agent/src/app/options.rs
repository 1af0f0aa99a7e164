//! Agent options

use std::path::PathBuf;
use std::time::Duration;

use crate::authn::verifier::MICROSOFT_ENTRA_ID_COMMON_KEYS_ENDPOINT;

/// Fixed paths and tunables of the agent
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Name recorded in status records
    pub agent_name: String,

    /// Root that template names are resolved against
    pub template_root: PathBuf,

    /// Directory receiving `output.json`
    pub outputs_dir: PathBuf,

    /// Public key set used to verify pre-issued tokens
    pub key_set_url: String,

    /// Timeout for individual HTTP requests
    pub http_timeout: Duration,

    /// Interval between deployment status polls
    pub poll_interval: Duration,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            agent_name: "arm".to_string(),
            template_root: PathBuf::from("/cnab/app"),
            outputs_dir: PathBuf::from("/cnab/app/porter/outputs"),
            key_set_url: MICROSOFT_ENTRA_ID_COMMON_KEYS_ENDPOINT.to_string(),
            http_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(10),
        }
    }
}
