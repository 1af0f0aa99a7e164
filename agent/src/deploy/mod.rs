//! Deployment module

pub mod arm;
pub mod fsm;
pub mod orchestrator;
pub mod outputs;
pub mod progress;
pub mod template;
