//! Command-line interface definition.

use clap::{Parser, Subcommand, ValueEnum};
use lightning_gate::{AccessDuration, GateConfig, ProviderKind};
use std::path::PathBuf;

/// Lightning payment gate for relay access.
#[derive(Parser, Debug)]
#[command(name = "lightning-gate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file.
    #[arg(long, short, env = "LIGHTNING_GATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Payment provider.
    #[arg(long, value_enum, env = "LIGHTNING_GATE_PROVIDER")]
    pub provider: Option<CliProvider>,

    /// Price of access in millisatoshis.
    #[arg(long, env = "LIGHTNING_GATE_AMOUNT_MSAT")]
    pub amount_msat: Option<u64>,

    /// Grant length: 1week, 1month, 1year, forever or <n><s|m|h|d>.
    #[arg(long, env = "LIGHTNING_GATE_ACCESS_DURATION")]
    pub access_duration: Option<String>,

    /// Access record store file.
    #[arg(long, env = "LIGHTNING_GATE_PAID_ACCESS_FILE")]
    pub paid_access_file: Option<PathBuf>,

    /// Charge mapping store file.
    #[arg(long, env = "LIGHTNING_GATE_CHARGE_MAPPING_FILE")]
    pub charge_mapping_file: Option<PathBuf>,

    /// ZBD API key.
    #[arg(long, env = "ZBD_API_KEY", hide_env_values = true)]
    pub zbd_api_key: Option<String>,

    /// ZBD lightning address.
    #[arg(long, env = "ZBD_LIGHTNING_ADDRESS")]
    pub zbd_lightning_address: Option<String>,

    /// phoenixd base URL.
    #[arg(long, env = "PHOENIXD_URL")]
    pub phoenixd_url: Option<String>,

    /// phoenixd HTTP password.
    #[arg(long, env = "PHOENIXD_PASSWORD", hide_env_values = true)]
    pub phoenixd_password: Option<String>,

    /// Log level.
    #[arg(long, env = "RUST_LOG")]
    pub log_level: Option<String>,

    /// Action to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Gate actions.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run background maintenance until Ctrl-C.
    Serve,
    /// Run a gate check for a public key and print the decision.
    Check {
        /// Actor public key.
        pubkey: String,
    },
    /// Issue an invoice for a public key.
    Invoice {
        /// Actor public key.
        pubkey: String,
    },
    /// Verify a payment and grant access.
    Verify {
        /// Payment hash returned with the invoice.
        payment_hash: String,
        /// Actor public key.
        pubkey: String,
    },
    /// Print gate statistics as JSON.
    Stats,
}

/// Payment provider CLI enum.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliProvider {
    /// ZBD charges API.
    Zbd,
    /// Self-hosted phoenixd.
    Phoenixd,
}

impl Cli {
    /// Convert CLI arguments into a `GateConfig`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be loaded or an override
    /// does not parse.
    pub fn to_config(&self) -> color_eyre::Result<GateConfig> {
        // Start with default config or load from file
        let mut config = if let Some(ref path) = self.config {
            GateConfig::from_file(path)?
        } else {
            GateConfig::default()
        };

        if let Some(provider) = self.provider {
            config.provider = provider.into();
        }
        if let Some(amount) = self.amount_msat {
            config.payment_amount_msat = amount;
        }
        if let Some(ref duration) = self.access_duration {
            config.access_duration = duration.parse::<AccessDuration>()?;
        }
        if let Some(ref path) = self.paid_access_file {
            config.paid_access_file.clone_from(path);
        }
        if let Some(ref path) = self.charge_mapping_file {
            config.charge_mapping_file.clone_from(path);
        }
        if let Some(ref key) = self.zbd_api_key {
            config.zbd.api_key.clone_from(key);
        }
        if let Some(ref address) = self.zbd_lightning_address {
            config.zbd.lightning_address.clone_from(address);
        }
        if let Some(ref url) = self.phoenixd_url {
            config.phoenixd.url.clone_from(url);
        }
        if let Some(ref password) = self.phoenixd_password {
            config.phoenixd.password.clone_from(password);
        }
        if let Some(ref level) = self.log_level {
            config.log_level.clone_from(level);
        }

        config.validate()?;
        Ok(config)
    }
}

impl From<CliProvider> for ProviderKind {
    fn from(p: CliProvider) -> Self {
        match p {
            CliProvider::Zbd => Self::Zbd,
            CliProvider::Phoenixd => Self::Phoenixd,
        }
    }
}
