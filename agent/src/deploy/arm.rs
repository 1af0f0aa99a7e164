//! Provisioning through the Azure Resource Manager deployments API

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::authn::provider::BearerTokenProvider;
use crate::errors::ProvisioningError;
use crate::http::client::{HttpClient, ResourceClient};
use crate::models::deployment::ValueMap;

pub const DEPLOYMENTS_API_VERSION: &str = "2017-05-10";

/// What to deploy and where
#[derive(Debug, Clone, Copy)]
pub struct DeploymentTarget<'a> {
    pub name: &'a str,
    pub resource_group: &'a str,
    pub location: &'a str,
    pub template: &'a [u8],
    pub parameters: &'a ValueMap,
    /// Give up waiting for completion after this long
    pub polling_duration: Duration,
}

/// The provisioning API, a trait for testability
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Deploy and wait for completion, returning the named outputs
    async fn deploy(
        &self,
        authorizer: &dyn BearerTokenProvider,
        target: DeploymentTarget<'_>,
    ) -> Result<ValueMap, ProvisioningError>;
}

#[derive(Debug, Deserialize)]
struct DeploymentResource {
    #[serde(default)]
    properties: DeploymentProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentProperties {
    #[serde(default)]
    provisioning_state: Option<String>,

    #[serde(default)]
    outputs: Option<ValueMap>,

    #[serde(default)]
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: String,

    #[serde(default)]
    message: String,
}

/// Resource group scoped template deployments
pub struct ArmDeployer<C = HttpClient> {
    client: C,
    subscription_id: String,
    poll_interval: Duration,
}

impl<C: ResourceClient> ArmDeployer<C> {
    pub fn new(client: C, subscription_id: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            client,
            subscription_id: subscription_id.into(),
            poll_interval,
        }
    }

    fn deployment_path(&self, resource_group: &str, name: &str) -> String {
        format!(
            "/subscriptions/{}/resourcegroups/{}/providers/Microsoft.Resources/deployments/{}?api-version={}",
            self.subscription_id, resource_group, name, DEPLOYMENTS_API_VERSION
        )
    }
}

#[async_trait]
impl<C: ResourceClient> Provisioner for ArmDeployer<C> {
    async fn deploy(
        &self,
        authorizer: &dyn BearerTokenProvider,
        target: DeploymentTarget<'_>,
    ) -> Result<ValueMap, ProvisioningError> {
        let body = deployment_body(target.template, target.parameters)?;
        let path = self.deployment_path(target.resource_group, target.name);
        let deadline = Instant::now().checked_add(target.polling_duration);

        info!(
            deployment = %target.name,
            resource_group = %target.resource_group,
            location = %target.location,
            "Submitting deployment"
        );
        let mut deployment = parse_deployment(
            self.client
                .put_resource(&path, &authorizer.authorization().await?, &body)
                .await?,
        )?;

        loop {
            let state = deployment
                .properties
                .provisioning_state
                .clone()
                .unwrap_or_default();
            debug!(deployment = %target.name, state = %state, "Deployment state");

            match state.as_str() {
                "Succeeded" => {
                    return Ok(extract_outputs(deployment.properties.outputs.unwrap_or_default()))
                }
                "Failed" | "Canceled" => {
                    let message = deployment
                        .properties
                        .error
                        .map(|e| format!("{}: {}", e.code, e.message))
                        .unwrap_or_else(|| "no error details returned".to_string());
                    return Err(ProvisioningError::Failed { state, message });
                }
                _ => {}
            }

            let mut wait = self.poll_interval;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Err(ProvisioningError::Timeout(target.polling_duration));
                }
                wait = wait.min(deadline - now);
            }
            tokio::time::sleep(wait).await;

            deployment = parse_deployment(
                self.client
                    .get_resource(&path, &authorizer.authorization().await?)
                    .await?,
            )?;
        }
    }
}

fn parse_deployment(response: Value) -> Result<DeploymentResource, ProvisioningError> {
    serde_json::from_value(response)
        .map_err(|e| ProvisioningError::Request(format!("unexpected deployment response: {}", e)))
}

/// Build the deployment request body. When the template declares its
/// parameters, only those are sent.
fn deployment_body(template: &[u8], parameters: &ValueMap) -> Result<Value, ProvisioningError> {
    let template: Value = serde_json::from_slice(template)
        .map_err(|e| ProvisioningError::InvalidTemplate(e.to_string()))?;
    let declared = template.get("parameters").and_then(Value::as_object);

    let wrapped: ValueMap = parameters
        .iter()
        .filter(|(name, _)| declared.map_or(true, |d| d.contains_key(name.as_str())))
        .map(|(name, value)| (name.clone(), json!({ "value": value })))
        .collect();

    Ok(json!({
        "properties": {
            "template": template,
            "parameters": wrapped,
            "mode": "Incremental",
        }
    }))
}

/// Unwrap `{ "type": ..., "value": ... }` output entries
fn extract_outputs(outputs: ValueMap) -> ValueMap {
    outputs
        .into_iter()
        .map(|(name, output)| {
            let value = match output {
                Value::Object(mut entry) if entry.contains_key("value") => {
                    entry.remove("value").unwrap_or(Value::Null)
                }
                other => other,
            };
            (name, value)
        })
        .collect()
}
