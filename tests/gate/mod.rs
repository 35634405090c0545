//! Integration tests for lightning-gate.
//!
//! The real provider adapters run against a stub HTTP server standing in for
//! the phoenixd and ZBD APIs, with stores in a temporary directory.

mod harness;
mod integration_tests;
mod stub;

pub use harness::TestHarness;
pub use stub::StubServer;
