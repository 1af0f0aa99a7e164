//! Status record models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a deployment run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Succeeded,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Succeeded => "Succeeded",
            ExecutionStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Succeeded" => Ok(ExecutionStatus::Succeeded),
            "Failed" => Ok(ExecutionStatus::Failed),
            _ => Err(format!("Invalid execution status: {}", s)),
        }
    }
}

/// Identity of a status record; at most one active record exists per key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusKey {
    pub subscription_id: String,
    pub resource_group_name: String,
    pub correlation_id: String,
    pub agent_name: String,
}

/// The latest outcome reported for a deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    #[serde(flatten)]
    pub key: StatusKey,

    pub item_name: String,

    pub item_type: String,

    /// Template reference the deployment was installed from
    pub installation_name: String,

    pub execution_status: ExecutionStatus,

    /// JSON-encoded outputs on success, error text on failure
    pub output: String,

    pub reported_on: DateTime<Utc>,

    pub is_active: bool,
}

impl StatusRecord {
    /// A fresh active record reported now
    pub fn active(
        key: StatusKey,
        installation_name: impl Into<String>,
        execution_status: ExecutionStatus,
        output: impl Into<String>,
    ) -> Self {
        Self {
            key,
            item_name: "arm template".to_string(),
            item_type: "arm".to_string(),
            installation_name: installation_name.into(),
            execution_status,
            output: output.into(),
            reported_on: Utc::now(),
            is_active: true,
        }
    }
}
