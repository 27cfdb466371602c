//! Integration tests for execbox
//!
//! These tests require a reachable Docker daemon that can pull the language
//! images. Run with: cargo test -p execbox --features integration-tests
//!
//! Tests that talk to Docker are marked `#[ignore]`. To include them:
//!    cargo test -p execbox --features integration-tests -- --include-ignored

#![cfg(feature = "integration-tests")]

use std::fs;

use execbox::config::Config;
use execbox::runner::Runner;

mod config_loading;
mod execution;
mod languages;
mod sandbox_lifecycle;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Helper to get fixture file content
pub(crate) fn fixture_source(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/sources/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

/// Connect a runner with the default config
pub(crate) async fn test_runner() -> Runner {
    Runner::connect(Config::default())
        .await
        .expect("Failed to connect to Docker")
}
