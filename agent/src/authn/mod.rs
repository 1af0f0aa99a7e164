//! Authentication against the cloud control plane

pub mod broker;
pub mod oauth;
pub mod provider;
pub mod token;
pub mod verifier;
