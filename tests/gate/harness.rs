//! Test harness wiring a gate to a stub provider API.
//!
//! The `TestHarness` owns the stub server, the temporary data directory and
//! the gate built from a configuration pointing at both.

use super::stub::StubServer;
use lightning_gate::{AccessGate, GateConfig, ProviderKind};
use std::path::PathBuf;
use tempfile::TempDir;
use tracing::info;

/// Lightning address configured for ZBD harnesses.
pub const LIGHTNING_ADDRESS: &str = "relay@zbd.gg";

/// Error type for test harness operations.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Stub server failed to bind.
    #[error("Stub server error: {0}")]
    Stub(#[from] std::io::Error),

    /// Gate construction failed.
    #[error("Gate error: {0}")]
    Gate(#[from] lightning_gate::Error),
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Gate, stub provider API and data directory for one test.
pub struct TestHarness {
    /// Stub standing in for the provider API.
    pub stub: StubServer,
    /// Configuration the gate was built from.
    pub config: GateConfig,
    /// The gate under test.
    pub gate: AccessGate,
    _data_dir: TempDir,
}

impl TestHarness {
    /// Harness using the phoenixd adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if the stub cannot bind or the gate cannot be built.
    pub async fn phoenixd() -> Result<Self> {
        Self::setup(ProviderKind::Phoenixd).await
    }

    /// Harness using the ZBD adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if the stub cannot bind or the gate cannot be built.
    pub async fn zbd() -> Result<Self> {
        Self::setup(ProviderKind::Zbd).await
    }

    async fn setup(provider: ProviderKind) -> Result<Self> {
        let stub = StubServer::start().await?;
        let data_dir = tempfile::tempdir()?;

        let mut config = GateConfig {
            provider,
            paid_access_file: data_dir.path().join("paid_access.json"),
            charge_mapping_file: data_dir.path().join("charge_mappings.json"),
            request_timeout_secs: 5,
            ..GateConfig::default()
        };
        config.phoenixd.url = stub.url().to_string();
        config.phoenixd.password = "test-password".to_string();
        config.zbd.base_url = stub.url().to_string();
        config.zbd.api_key = "test-api-key".to_string();
        config.zbd.lightning_address = LIGHTNING_ADDRESS.to_string();

        info!("Setting up {provider} harness against {}", stub.url());
        let gate = AccessGate::from_config(&config)?;

        Ok(Self {
            stub,
            config,
            gate,
            _data_dir: data_dir,
        })
    }

    /// Access record store file.
    pub fn paid_access_file(&self) -> PathBuf {
        self.config.paid_access_file.clone()
    }

    /// Rebuild the gate from the same configuration, as after a restart.
    ///
    /// # Errors
    ///
    /// Returns an error if the stores cannot be reopened.
    pub fn restart(&mut self) -> Result<()> {
        self.gate = AccessGate::from_config(&self.config)?;
        Ok(())
    }
}
