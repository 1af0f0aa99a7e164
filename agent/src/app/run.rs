//! Production wiring of a deployment run

use std::sync::Arc;

use tracing::info;

use crate::app::config::Config;
use crate::app::options::AgentOptions;
use crate::authn::broker::AzureCredentialBroker;
use crate::authn::oauth::HttpTokenGrant;
use crate::authn::verifier::{HttpKeySetSource, JwksTokenVerifier};
use crate::deploy::arm::ArmDeployer;
use crate::deploy::orchestrator::{Collaborators, Orchestrator, RunReport};
use crate::deploy::progress::WriterSink;
use crate::deploy::template::FileTemplateSource;
use crate::errors::AgentError;
use crate::http::client::HttpClient;
use crate::storage::postgres::PostgresConnector;

/// Build the collaborators talking to Azure and the status database
pub fn collaborators(config: &Config, options: &AgentOptions) -> Result<Collaborators, AgentError> {
    let key_set = HttpKeySetSource::new(options.key_set_url.as_str(), options.http_timeout)?;
    let verifier = Arc::new(JwksTokenVerifier::new(key_set));
    let grant = Arc::new(HttpTokenGrant::new(options.http_timeout)?);

    let client = HttpClient::new(
        &config.environment.resource_manager_endpoint,
        options.http_timeout,
    )?;

    Ok(Collaborators {
        broker: Arc::new(AzureCredentialBroker::new(verifier, grant)),
        templates: Arc::new(FileTemplateSource::new(options.template_root.clone())),
        provisioner: Arc::new(ArmDeployer::new(
            client,
            config.subscription_id.as_str(),
            options.poll_interval,
        )),
        stores: Arc::new(PostgresConnector::new(options.http_timeout)),
        sink: Arc::new(WriterSink::stdout()),
    })
}

/// Run the install action for `payload`
pub async fn install(
    payload: &[u8],
    config: Config,
    options: AgentOptions,
) -> Result<RunReport, AgentError> {
    info!(
        environment = %config.environment.name,
        subscription_id = %config.subscription_id,
        "Running install"
    );

    let collaborators = collaborators(&config, &options)?;
    Orchestrator::new(config, options, collaborators)
        .run(payload)
        .await
}
