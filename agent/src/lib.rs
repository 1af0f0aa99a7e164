//! ARM deployment agent library
//!
//! Deploys an Azure Resource Manager template described by an install
//! payload and records the outcome in an optional status store.

pub mod app;
pub mod authn;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod storage;
pub mod utils;
