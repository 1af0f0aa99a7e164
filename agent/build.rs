//! Stamps the agent binary with its source revision and build time.
//!
//! Bundle images are usually built from a source archive without `.git`, so
//! `ARMAGENT_GIT_HASH` can supply the revision. When neither is available the
//! variable is left unset and `version_info` reports "unknown".

use std::env;
use std::process::Command;

use chrono::{SecondsFormat, Utc};

const REVISION_OVERRIDE: &str = "ARMAGENT_GIT_HASH";

fn main() {
    println!("cargo:rerun-if-env-changed={}", REVISION_OVERRIDE);
    println!("cargo:rerun-if-changed=../.git/HEAD");

    if let Some(revision) = revision() {
        println!("cargo:rustc-env=GIT_HASH={}", revision);
    }

    let built = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    println!("cargo:rustc-env=BUILD_TIME={}", built);
}

fn revision() -> Option<String> {
    if let Ok(revision) = env::var(REVISION_OVERRIDE) {
        let revision = revision.trim();
        if !revision.is_empty() {
            return Some(revision.to_string());
        }
    }

    let output = Command::new("git")
        .args(["rev-parse", "--short=12", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())?;

    let revision = String::from_utf8(output.stdout).ok()?;
    let revision = revision.trim();
    (!revision.is_empty()).then(|| revision.to_string())
}
