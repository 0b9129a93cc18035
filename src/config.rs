//! Configuration module for the mint engine
//!
//! This module handles configuration loading from TOML files and
//! environment variables, and provides structured configuration types.
//! Cluster, payment token decimals and retry constants are threaded into
//! the engine from here rather than read from ambient state.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey, signature::Signature};
use std::str::FromStr;
use std::time::Duration;

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// RPC endpoint configuration
    pub rpc: RpcConfig,

    /// Sale being minted from
    pub sale: SaleSettings,

    /// Mint orchestration tuning
    #[serde(default)]
    pub mint: MintSettings,

    /// Monitoring and logging
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// RPC endpoint URL
    pub url: String,

    /// Commitment used for reads and confirmations
    #[serde(default = "default_commitment")]
    pub commitment: String,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,

    /// Max retries for sale account reads
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cluster {
    MainnetBeta,
    Devnet,
    Testnet,
    Localnet,
}

impl FromStr for Cluster {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet-beta" | "mainnet" => Ok(Cluster::MainnetBeta),
            "devnet" => Ok(Cluster::Devnet),
            "testnet" => Ok(Cluster::Testnet),
            "localnet" => Ok(Cluster::Localnet),
            other => bail!("Unknown cluster '{}'", other),
        }
    }
}

impl Cluster {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cluster::MainnetBeta => "mainnet-beta",
            Cluster::Devnet => "devnet",
            Cluster::Testnet => "testnet",
            Cluster::Localnet => "localnet",
        }
    }

    /// Solscan link for a transaction on this cluster
    pub fn explorer_url(&self, signature: &Signature) -> String {
        match self {
            Cluster::MainnetBeta => format!("https://solscan.io/tx/{}", signature),
            Cluster::Devnet | Cluster::Testnet => {
                format!("https://solscan.io/tx/{}?cluster={}", signature, self.as_str())
            }
            Cluster::Localnet => format!(
                "https://solscan.io/tx/{}?cluster=custom&customUrl=http%3A%2F%2Flocalhost%3A8899",
                signature
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleSettings {
    /// Candy machine account address (base58)
    pub candy_machine_id: String,

    #[serde(default = "default_cluster")]
    pub cluster: Cluster,

    /// Decimals of the SPL payment token, when the sale is priced in one
    #[serde(default = "default_token_decimals")]
    pub payment_token_decimals: u8,

    /// Label shown next to SPL token prices
    #[serde(default = "default_token_name")]
    pub payment_token_name: String,
}

impl SaleSettings {
    pub fn candy_machine_pubkey(&self) -> anyhow::Result<Pubkey> {
        Pubkey::from_str(&self.candy_machine_id)
            .with_context(|| format!("Invalid candy machine id: {}", self.candy_machine_id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintSettings {
    /// Per-transaction confirmation budget in milliseconds
    #[serde(default = "default_tx_timeout")]
    pub tx_timeout_ms: u64,

    /// Delay between signature status polls
    #[serde(default = "default_confirm_poll")]
    pub confirmation_poll_ms: u64,

    /// Delay between balance reconciliation polls
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_ms: u64,

    /// Balance reads before reconciliation gives up
    #[serde(default = "default_reconcile_attempts")]
    pub reconcile_max_attempts: u32,

    /// Estimated lamports spent on account creation per mint
    #[serde(default = "default_fee_estimate")]
    pub fee_estimate_lamports: u64,

    /// Largest quantity accepted by a single mint action
    #[serde(default = "default_max_batch")]
    pub max_batch_size: u32,
}

impl MintSettings {
    pub fn tx_timeout(&self) -> Duration {
        Duration::from_millis(self.tx_timeout_ms)
    }

    pub fn confirmation_poll(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_ms)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }
}

impl Default for MintSettings {
    fn default() -> Self {
        Self {
            tx_timeout_ms: default_tx_timeout(),
            confirmation_poll_ms: default_confirm_poll(),
            reconcile_interval_ms: default_reconcile_interval(),
            reconcile_max_attempts: default_reconcile_attempts(),
            fee_estimate_lamports: default_fee_estimate(),
            max_batch_size: default_max_batch(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Emit JSON log lines
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: default_true(),
            json_logs: false,
        }
    }
}

// Default value functions
fn default_commitment() -> String { "confirmed".to_string() }
fn default_rpc_timeout() -> u64 { 30 }
fn default_max_retries() -> usize { 3 }
fn default_cluster() -> Cluster { Cluster::Devnet }
fn default_token_decimals() -> u8 { 9 }
fn default_token_name() -> String { "TOKEN".to_string() }
fn default_tx_timeout() -> u64 { 30_000 }
fn default_confirm_poll() -> u64 { 500 }
fn default_reconcile_interval() -> u64 { 2_000 }
fn default_reconcile_attempts() -> u32 { 20 }
fn default_fee_estimate() -> u64 { 12_000_000 }
fn default_max_batch() -> u32 { 10 }
fn default_true() -> bool { true }

impl EngineConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path))?;
        let config: EngineConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with `.env` and environment variable overrides
    pub fn from_file_with_env(path: &str) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path))?;
        let mut config: EngineConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path))?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `CANDY_*` variables supplied by `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CANDY_RPC_URL") {
            self.rpc.url = url;
        }
        if let Some(id) = lookup("CANDY_MACHINE_ID") {
            self.sale.candy_machine_id = id;
        }
        if let Some(cluster) = lookup("CANDY_CLUSTER") {
            self.sale.cluster = cluster.parse()?;
        }
        if let Some(decimals) = lookup("CANDY_TOKEN_DECIMALS") {
            self.sale.payment_token_decimals = decimals
                .parse()
                .with_context(|| format!("Invalid CANDY_TOKEN_DECIMALS: {}", decimals))?;
        }
        if let Some(name) = lookup("CANDY_TOKEN_NAME") {
            self.sale.payment_token_name = name;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rpc.url.is_empty() {
            bail!("rpc.url must not be empty");
        }
        self.sale.candy_machine_pubkey()?;
        self.commitment()?;
        if self.sale.payment_token_decimals > 19 {
            bail!(
                "sale.payment_token_decimals too large: {}",
                self.sale.payment_token_decimals
            );
        }
        if self.mint.reconcile_max_attempts == 0 {
            bail!("mint.reconcile_max_attempts must be at least 1");
        }
        if self.mint.max_batch_size == 0 {
            bail!("mint.max_batch_size must be at least 1");
        }
        if self.mint.tx_timeout_ms == 0 {
            bail!("mint.tx_timeout_ms must be positive");
        }
        Ok(())
    }

    pub fn commitment(&self) -> anyhow::Result<CommitmentConfig> {
        CommitmentConfig::from_str(&self.rpc.commitment)
            .map_err(|_| anyhow::anyhow!("Invalid commitment '{}'", self.rpc.commitment))
    }

    /// Configuration for a sale on devnet with default tuning
    pub fn for_sale(rpc_url: &str, candy_machine_id: &Pubkey) -> Self {
        Self {
            rpc: RpcConfig {
                url: rpc_url.to_string(),
                commitment: default_commitment(),
                timeout_secs: default_rpc_timeout(),
                max_retries: default_max_retries(),
            },
            sale: SaleSettings {
                candy_machine_id: candy_machine_id.to_string(),
                cluster: default_cluster(),
                payment_token_decimals: default_token_decimals(),
                payment_token_name: default_token_name(),
            },
            mint: MintSettings::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}
