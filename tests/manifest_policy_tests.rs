#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Manifest policy tests.
//!
//! Library code must stay panic-free and the default build must ship a usable
//! transport. If one of these fails, Cargo.toml has drifted from that policy.

use std::path::PathBuf;

fn manifest() -> toml::Table {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml");
    let text = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("failed to read '{}': {e}", path.display()));
    toml::from_str(&text).expect("Cargo.toml must be valid TOML")
}

const REQUIRED_DENY_LINTS: &[&str] = &[
    "unwrap_used",
    "expect_used",
    "panic",
    "todo",
    "unimplemented",
    "indexing_slicing",
];

#[test]
fn panic_prone_lints_are_denied() {
    let manifest = manifest();
    let clippy = manifest
        .get("lints")
        .and_then(|l| l.get("clippy"))
        .and_then(|c| c.as_table())
        .expect("Cargo.toml is missing [lints.clippy]");

    for lint in REQUIRED_DENY_LINTS {
        assert_eq!(
            clippy.get(*lint).and_then(|v| v.as_str()),
            Some("deny"),
            "`{lint}` must be set to \"deny\" in [lints.clippy]"
        );
    }
}

#[test]
fn websocket_transport_is_a_default_feature() {
    let manifest = manifest();
    let default = manifest["features"]["default"]
        .as_array()
        .expect("features.default must be an array");
    assert!(
        default
            .iter()
            .any(|f| f.as_str() == Some("transport-websocket")),
        "the default build must include the WebSocket transport"
    );
}

#[test]
fn rust_version_is_declared() {
    let manifest = manifest();
    assert!(
        manifest["package"].get("rust-version").is_some(),
        "Cargo.toml must declare a rust-version"
    );
}
