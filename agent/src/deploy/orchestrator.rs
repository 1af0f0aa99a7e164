//! Drives one deployment run from raw payload to status record

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::app::config::Config;
use crate::app::options::AgentOptions;
use crate::authn::broker::{CredentialBroker, CredentialRequest};
use crate::authn::provider::BearerTokenProvider;
use crate::deploy::arm::{DeploymentTarget, Provisioner};
use crate::deploy::fsm::{RunEvent, RunFsm, RunState};
use crate::deploy::outputs::{reconcile, write_output_file};
use crate::deploy::progress::{Progress, ProgressSink};
use crate::deploy::template::TemplateSource;
use crate::errors::AgentError;
use crate::models::deployment::{DeploymentPlan, DeploymentRequest, ValueMap};
use crate::models::status::{ExecutionStatus, StatusKey, StatusRecord};
use crate::storage::status::{StatusStore, StatusStoreConnector};

/// External collaborators of a run
#[derive(Clone)]
pub struct Collaborators {
    pub broker: Arc<dyn CredentialBroker>,
    pub templates: Arc<dyn TemplateSource>,
    pub provisioner: Arc<dyn Provisioner>,
    pub stores: Arc<dyn StatusStoreConnector>,
    pub sink: Arc<dyn ProgressSink>,
}

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub state: RunState,
    pub correlation_id: String,
    pub execution_status: ExecutionStatus,
    /// `None` when a declared output was missing
    pub outputs: Option<ValueMap>,
    pub history: Vec<RunState>,
}

pub struct Orchestrator {
    config: Config,
    options: AgentOptions,
    collaborators: Collaborators,
}

impl Orchestrator {
    pub fn new(config: Config, options: AgentOptions, collaborators: Collaborators) -> Self {
        Self {
            config,
            options,
            collaborators,
        }
    }

    /// Run one deployment. Errors are the run's terminal failure.
    pub async fn run(&self, payload: &[u8]) -> Result<RunReport, AgentError> {
        let mut fsm = RunFsm::new();

        let request = match DeploymentRequest::parse(payload) {
            Ok(request) => request,
            Err(err) => return Err(fail(&mut fsm, err.into())),
        };
        advance(&mut fsm, RunEvent::Parsed)?;

        let plan = match request.into_plan() {
            Ok(plan) => plan,
            Err(err) => return Err(fail(&mut fsm, err.into())),
        };
        advance(&mut fsm, RunEvent::Validated)?;

        let progress = Progress::new(self.collaborators.sink.as_ref(), &plan.correlation_id);
        if let Some(description) = &plan.description {
            progress.say(description);
        }

        let store = self.open_store(&plan, &progress).await;
        let result = self
            .execute(&mut fsm, &plan, &progress, store.as_deref())
            .await;
        if let Some(store) = store {
            store.close().await;
        }

        match &result {
            Ok(report) => info!(
                correlation_id = %plan.correlation_id,
                state = ?report.state,
                "Deployment run finished"
            ),
            Err(err) => error!(
                correlation_id = %plan.correlation_id,
                error = %err,
                "Deployment run failed"
            ),
        }
        result
    }

    async fn execute(
        &self,
        fsm: &mut RunFsm,
        plan: &DeploymentPlan,
        progress: &Progress<'_>,
        store: Option<&dyn StatusStore>,
    ) -> Result<RunReport, AgentError> {
        let request = CredentialRequest {
            tenant_id: &self.config.tenant_id,
            client_id: &self.config.client_id,
            client_secret: &self.config.client_secret,
            environment: &self.config.environment,
            pre_issued_token: self.config.access_token.as_ref(),
        };
        let authorizer = match self.collaborators.broker.acquire(request).await {
            Ok(authorizer) => authorizer,
            Err(err) => {
                progress.say(format!("Unable to acquire a credential: {}", err));
                return Err(fail(fsm, err.into()));
            }
        };
        debug!(flow = ?authorizer.grant_flow(), "Credential acquired");
        advance(fsm, RunEvent::CredentialAcquired)?;

        progress.say("Starting deployment operations...");
        let raw = match self.deploy(plan, authorizer.as_ref()).await {
            Ok(raw) => raw,
            Err(err) => {
                let message = err.to_string();
                progress.say(format!("Deployment failed: {}", message));
                advance(fsm, RunEvent::DeployFailed(message.clone()))?;

                self.record_status(store, plan, ExecutionStatus::Failed, message, progress)
                    .await;
                advance(fsm, RunEvent::StatusRecorded)?;
                return Err(err);
            }
        };
        progress.say("Finished deployment operations...");
        advance(fsm, RunEvent::Deployed)?;

        let (outputs, output) = match reconcile(&raw, &plan.outputs) {
            Ok(outputs) => {
                let json = serde_json::to_string(&outputs)?;
                if let Err(err) = write_output_file(&self.options.outputs_dir, &json).await {
                    warn!(
                        correlation_id = %plan.correlation_id,
                        error = %err,
                        "Unable to write the output file"
                    );
                }
                (Some(outputs), json)
            }
            Err(gap) => {
                warn!(correlation_id = %plan.correlation_id, key = %gap.key, "{}", gap);
                progress.say(format!("Outputs are empty: {}", gap));
                (None, String::new())
            }
        };
        advance(fsm, RunEvent::OutputsReconciled)?;

        self.record_status(store, plan, ExecutionStatus::Succeeded, output, progress)
            .await;
        advance(fsm, RunEvent::StatusRecorded)?;

        Ok(RunReport {
            state: fsm.state(),
            correlation_id: plan.correlation_id.clone(),
            execution_status: ExecutionStatus::Succeeded,
            outputs,
            history: fsm.history().to_vec(),
        })
    }

    async fn deploy(
        &self,
        plan: &DeploymentPlan,
        authorizer: &dyn BearerTokenProvider,
    ) -> Result<ValueMap, AgentError> {
        let template = self
            .collaborators
            .templates
            .find_template(&plan.template_ref)
            .await?;

        let target = DeploymentTarget {
            name: &plan.deployment_name,
            resource_group: &plan.resource_group,
            location: &plan.location,
            template: &template,
            parameters: &plan.parameters,
            polling_duration: plan.settings.polling_duration(),
        };
        Ok(self.collaborators.provisioner.deploy(authorizer, target).await?)
    }

    /// Best effort: a missing or unreachable store only disables recording
    async fn open_store(
        &self,
        plan: &DeploymentPlan,
        progress: &Progress<'_>,
    ) -> Option<Box<dyn StatusStore>> {
        let connection_string = self.config.status_db_connection_string.trim();
        if connection_string.is_empty() {
            warn!(correlation_id = %plan.correlation_id, "Status store is not configured");
            progress.say("Status store is not configured, status will not be recorded");
            return None;
        }

        match self
            .collaborators
            .stores
            .connect(
                connection_string,
                &plan.settings.database_name,
                &plan.settings.collection_name,
            )
            .await
        {
            Ok(store) => Some(store),
            Err(err) => {
                warn!(
                    correlation_id = %plan.correlation_id,
                    error = %err,
                    "Status store unavailable"
                );
                progress.say(format!("Status will not be recorded: {}", err));
                None
            }
        }
    }

    async fn record_status(
        &self,
        store: Option<&dyn StatusStore>,
        plan: &DeploymentPlan,
        execution_status: ExecutionStatus,
        output: String,
        progress: &Progress<'_>,
    ) {
        let Some(store) = store else {
            debug!(correlation_id = %plan.correlation_id, "No status store, skipping status");
            return;
        };

        let record = StatusRecord::active(
            self.status_key(plan),
            plan.template_ref.as_str(),
            execution_status,
            output,
        );
        match store.record_status(&record).await {
            Ok(()) => info!(
                correlation_id = %plan.correlation_id,
                status = %execution_status,
                "Status recorded"
            ),
            Err(err) => {
                warn!(
                    correlation_id = %plan.correlation_id,
                    error = %err,
                    "Unable to record status"
                );
                progress.say(format!("Unable to record status: {}", err));
            }
        }
    }

    fn status_key(&self, plan: &DeploymentPlan) -> StatusKey {
        StatusKey {
            subscription_id: self.config.subscription_id.clone(),
            resource_group_name: plan.resource_group.clone(),
            correlation_id: plan.correlation_id.clone(),
            agent_name: self.options.agent_name.clone(),
        }
    }
}

fn advance(fsm: &mut RunFsm, event: RunEvent) -> Result<RunState, AgentError> {
    fsm.process(event).map_err(AgentError::StateMachine)
}

/// Move the run to `Failed` and hand back the error that caused it
fn fail(fsm: &mut RunFsm, err: AgentError) -> AgentError {
    match fsm.process(RunEvent::Fail(err.to_string())) {
        Ok(_) => err,
        Err(transition) => AgentError::StateMachine(transition),
    }
}
