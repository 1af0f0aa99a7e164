//! Finite State Machine for a deployment run

use serde::{Deserialize, Serialize};

/// Run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Reading the install payload
    Parsing,

    /// Checking required fields
    Validating,

    /// Opening the status store and acquiring a credential
    AcquiringCredential,

    /// Provisioning call in progress
    Deploying,

    /// Mapping provisioning outputs to declared names
    ReconcilingOutputs,

    /// Writing the status record
    RecordingStatus,

    /// Run succeeded
    Done,

    /// Run failed
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

/// Run event
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// Payload parsed
    Parsed,

    /// Request validated
    Validated,

    /// Bearer token provider available
    CredentialAcquired,

    /// Provisioning call succeeded
    Deployed,

    /// Provisioning call failed; the failure is still recorded
    DeployFailed(String),

    /// Outputs reconciled (possibly to an empty set)
    OutputsReconciled,

    /// Status written, or skipped without a store
    StatusRecorded,

    /// Abort the run
    Fail(String),
}

/// Run FSM
#[derive(Debug, Clone)]
pub struct RunFsm {
    state: RunState,
    error: Option<String>,
    history: Vec<RunState>,
}

impl RunFsm {
    /// Create a new FSM in the parsing state
    pub fn new() -> Self {
        Self {
            state: RunState::Parsing,
            error: None,
            history: vec![RunState::Parsing],
        }
    }

    /// Get current state
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Every state visited, in order
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: RunEvent) -> Result<RunState, String> {
        let new_state = match (self.state, &event) {
            (RunState::Parsing, RunEvent::Parsed) => RunState::Validating,

            (RunState::Validating, RunEvent::Validated) => RunState::AcquiringCredential,

            (RunState::AcquiringCredential, RunEvent::CredentialAcquired) => RunState::Deploying,

            (RunState::Deploying, RunEvent::Deployed) => RunState::ReconcilingOutputs,
            (RunState::Deploying, RunEvent::DeployFailed(err)) => {
                self.error = Some(err.clone());
                RunState::RecordingStatus
            }

            (RunState::ReconcilingOutputs, RunEvent::OutputsReconciled) => {
                RunState::RecordingStatus
            }

            (RunState::RecordingStatus, RunEvent::StatusRecorded) => {
                if self.error.is_some() {
                    RunState::Failed
                } else {
                    RunState::Done
                }
            }

            (state, RunEvent::Fail(err)) if !state.is_terminal() => {
                self.error = Some(err.clone());
                RunState::Failed
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        self.history.push(new_state);
        Ok(new_state)
    }
}

impl Default for RunFsm {
    fn default() -> Self {
        Self::new()
    }
}
