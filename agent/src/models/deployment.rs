//! Deployment request models

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::errors::{ParseError, ValidationError};

/// Loosely typed key/value bag used for parameters, settings and outputs
pub type ValueMap = serde_json::Map<String, Value>;

pub const DEFAULT_POLLING_DURATION_MINUTES: u64 = 30;
pub const DEFAULT_DATABASE_NAME: &str = "porter";
pub const DEFAULT_COLLECTION_NAME: &str = "status";

const LOCATION_PARAMETER: &str = "location";
const CORRELATION_ID_PARAMETER: &str = "correlationId";

/// The install action document: `install: [ { arm: {...} } ]`
#[derive(Debug, Deserialize)]
struct InstallAction {
    #[serde(default)]
    install: Vec<InstallStep>,
}

#[derive(Debug, Deserialize)]
struct InstallStep {
    arm: DeploymentRequest,
}

/// A declared output: provisioning output `key` surfaced as `name`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputMapping {
    pub key: String,
    pub name: String,
}

/// One deployment step as written by the caller, before validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRequest {
    #[serde(default)]
    pub description: Option<String>,

    /// Template name, resolved by the template source
    #[serde(default, rename = "template")]
    pub template_ref: String,

    /// ARM deployment name
    #[serde(default, rename = "name")]
    pub deployment_name: String,

    #[serde(default)]
    pub resource_group: String,

    #[serde(default)]
    pub parameters: Option<ValueMap>,

    #[serde(default)]
    pub settings: Option<ValueMap>,

    #[serde(default)]
    pub outputs: Vec<OutputMapping>,
}

impl DeploymentRequest {
    /// Parse the install payload. Exactly one step is accepted.
    pub fn parse(payload: &[u8]) -> Result<Self, ParseError> {
        let action: InstallAction = serde_yaml::from_slice(payload)
            .map_err(|e| ParseError::Malformed(e.to_string()))?;

        let mut steps = action.install;
        if steps.len() != 1 {
            return Err(ParseError::MultipleSteps(steps.len()));
        }
        Ok(steps.remove(0).arm)
    }

    /// Check the required fields, stopping at the first violation
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.template_ref.is_empty() {
            return Err(ValidationError::Missing("template"));
        }
        if self.deployment_name.is_empty() {
            return Err(ValidationError::Missing("name"));
        }
        if self.resource_group.is_empty() {
            return Err(ValidationError::Missing("resourceGroup"));
        }
        let parameters = self
            .parameters
            .as_ref()
            .ok_or(ValidationError::Missing("parameters"))?;
        match parameters.get(LOCATION_PARAMETER) {
            None | Some(Value::Null) => Err(ValidationError::MissingLocation),
            Some(Value::String(_)) => Ok(()),
            Some(_) => Err(ValidationError::WrongType(LOCATION_PARAMETER)),
        }
    }

    /// Validate and turn the request into a plan the orchestrator can run.
    ///
    /// The correlation id is removed from the parameters here so it never
    /// reaches the provisioning API.
    pub fn into_plan(self) -> Result<DeploymentPlan, ValidationError> {
        self.validate()?;

        let settings = DeploymentSettings::from_map(self.settings.as_ref());
        let mut parameters = self.parameters.unwrap_or_default();
        let location = str_value(&parameters, LOCATION_PARAMETER)
            .ok_or(ValidationError::MissingLocation)?
            .to_string();
        let correlation_id = take_correlation_id(&mut parameters);

        Ok(DeploymentPlan {
            description: self.description,
            template_ref: self.template_ref,
            deployment_name: self.deployment_name,
            resource_group: self.resource_group,
            location,
            correlation_id,
            parameters,
            settings,
            outputs: self.outputs,
        })
    }
}

/// A validated deployment, ready to run
#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    pub description: Option<String>,
    pub template_ref: String,
    pub deployment_name: String,
    pub resource_group: String,
    pub location: String,
    /// Empty when the caller did not supply one
    pub correlation_id: String,
    /// Parameters passed to the provisioning API, without `correlationId`
    pub parameters: ValueMap,
    pub settings: DeploymentSettings,
    pub outputs: Vec<OutputMapping>,
}

/// Recognized settings with their defaults applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentSettings {
    /// Long-poll timeout for the deployment, in minutes
    pub polling_duration_minutes: u64,

    pub database_name: String,

    pub collection_name: String,
}

impl Default for DeploymentSettings {
    fn default() -> Self {
        Self {
            polling_duration_minutes: DEFAULT_POLLING_DURATION_MINUTES,
            database_name: DEFAULT_DATABASE_NAME.to_string(),
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
        }
    }
}

impl DeploymentSettings {
    /// Extract settings; absent or wrongly typed keys fall back to defaults
    pub fn from_map(settings: Option<&ValueMap>) -> Self {
        let mut result = Self::default();
        let Some(settings) = settings else {
            return result;
        };

        if let Some(minutes) = positive_int_value(settings, "pollingDuration") {
            result.polling_duration_minutes = minutes;
        }
        if let Some(name) = str_value(settings, "databaseName") {
            result.database_name = name.to_string();
        }
        if let Some(name) = str_value(settings, "collectionName") {
            result.collection_name = name.to_string();
        }
        result
    }

    pub fn polling_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.polling_duration_minutes.saturating_mul(60))
    }
}

/// String value of `key`, if present and a string
pub fn str_value<'a>(map: &'a ValueMap, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

/// Strictly positive integer value of `key`
pub fn positive_int_value(map: &ValueMap, key: &str) -> Option<u64> {
    map.get(key).and_then(Value::as_u64).filter(|v| *v > 0)
}

fn take_correlation_id(parameters: &mut ValueMap) -> String {
    match parameters.remove(CORRELATION_ID_PARAMETER) {
        Some(Value::String(id)) => id,
        Some(other) => {
            warn!("correlationId is not a string ({}), ignoring it", other);
            String::new()
        }
        None => {
            warn!("correlationId is missing in parameters");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SINGLE_STEP: &str = r#"
install:
  - arm:
      description: "Create Azure MySQL"
      template: "arm/mysql.json"
      name: "mysql-azure-porter-demo"
      resourceGroup: "porter-test"
      parameters:
        location: "eastus"
        serverName: "myserver"
        correlationId: "c-42"
      settings:
        pollingDuration: 45
      outputs:
        - key: "MYSQL_HOST"
          name: "MYSQL_HOST"
"#;

    fn request_with(parameters: Value) -> DeploymentRequest {
        DeploymentRequest {
            template_ref: "t.json".to_string(),
            deployment_name: "d1".to_string(),
            resource_group: "rg1".to_string(),
            parameters: parameters.as_object().cloned(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_single_step() {
        let request = DeploymentRequest::parse(SINGLE_STEP.as_bytes()).unwrap();

        assert_eq!(request.description.as_deref(), Some("Create Azure MySQL"));
        assert_eq!(request.template_ref, "arm/mysql.json");
        assert_eq!(request.deployment_name, "mysql-azure-porter-demo");
        assert_eq!(request.resource_group, "porter-test");
        assert_eq!(
            request.outputs,
            vec![OutputMapping {
                key: "MYSQL_HOST".to_string(),
                name: "MYSQL_HOST".to_string()
            }]
        );
        let parameters = request.parameters.unwrap();
        assert_eq!(parameters.get("serverName"), Some(&json!("myserver")));
    }

    #[test]
    fn test_parse_rejects_zero_and_many_steps() {
        let none = DeploymentRequest::parse(b"install: []");
        assert!(matches!(none, Err(ParseError::MultipleSteps(0))));

        let missing = DeploymentRequest::parse(b"upgrade: []");
        assert!(matches!(missing, Err(ParseError::MultipleSteps(0))));

        let two = r#"
install:
  - arm: { template: a.json }
  - arm: { template: b.json }
"#;
        let many = DeploymentRequest::parse(two.as_bytes());
        assert!(matches!(many, Err(ParseError::MultipleSteps(2))));
    }

    #[test]
    fn test_parse_rejects_malformed_yaml() {
        let result = DeploymentRequest::parse(b"install: [ { arm: ");
        assert!(matches!(result, Err(ParseError::Malformed(_))));
    }

    #[test]
    fn test_validate_names_first_missing_field() {
        let mut request = request_with(json!({"location": "eastus"}));
        assert!(request.validate().is_ok());

        request.resource_group.clear();
        assert_eq!(request.validate().unwrap_err().field(), "resourceGroup");

        request.deployment_name.clear();
        assert_eq!(request.validate().unwrap_err().field(), "name");

        request.template_ref.clear();
        assert_eq!(request.validate().unwrap_err().field(), "template");
    }

    #[test]
    fn test_validate_location() {
        let mut request = request_with(json!({"location": "eastus"}));
        request.parameters = None;
        assert_eq!(
            request.validate(),
            Err(ValidationError::Missing("parameters"))
        );

        let request = request_with(json!({"serverName": "x"}));
        assert_eq!(request.validate(), Err(ValidationError::MissingLocation));

        let request = request_with(json!({"location": 42}));
        assert_eq!(
            request.validate(),
            Err(ValidationError::WrongType("location"))
        );
    }

    #[test]
    fn test_into_plan_extracts_correlation_id() {
        let request = DeploymentRequest::parse(SINGLE_STEP.as_bytes()).unwrap();
        let plan = request.into_plan().unwrap();

        assert_eq!(plan.correlation_id, "c-42");
        assert_eq!(plan.location, "eastus");
        assert!(!plan.parameters.contains_key("correlationId"));
        assert!(plan.parameters.contains_key("location"));
        assert_eq!(plan.settings.polling_duration_minutes, 45);
    }

    #[test]
    fn test_into_plan_without_correlation_id() {
        let plan = request_with(json!({"location": "westus"}))
            .into_plan()
            .unwrap();
        assert_eq!(plan.correlation_id, "");
    }

    #[test]
    fn test_settings_defaults() {
        assert_eq!(DeploymentSettings::from_map(None), DeploymentSettings::default());

        let settings = json!({
            "pollingDuration": "ten",
            "databaseName": 7,
            "collectionName": "history"
        });
        let extracted = DeploymentSettings::from_map(settings.as_object());
        assert_eq!(extracted.polling_duration_minutes, 30);
        assert_eq!(extracted.database_name, "porter");
        assert_eq!(extracted.collection_name, "history");

        let zero = json!({"pollingDuration": 0});
        let extracted = DeploymentSettings::from_map(zero.as_object());
        assert_eq!(extracted.polling_duration_minutes, 30);
    }

    #[test]
    fn test_huge_polling_duration_saturates() {
        let payload = r#"
install:
  - arm:
      template: t.json
      name: d1
      resourceGroup: rg1
      parameters:
        location: eastus
      settings:
        pollingDuration: 18446744073709551615
"#;
        let plan = DeploymentRequest::parse(payload.as_bytes())
            .unwrap()
            .into_plan()
            .unwrap();

        assert_eq!(plan.settings.polling_duration_minutes, u64::MAX);
        assert_eq!(
            plan.settings.polling_duration(),
            std::time::Duration::from_secs(u64::MAX)
        );
    }
}
