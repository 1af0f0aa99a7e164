//! Application wiring

pub mod config;
pub mod options;
pub mod run;
