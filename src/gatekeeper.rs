//! Human verification gate

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

/// Proof-of-personhood check required by gated sales
#[async_trait]
pub trait HumanGate: Send + Sync {
    /// True when `wallet` holds a valid pass for `network`
    async fn verify(&self, network: &Pubkey, wallet: &Pubkey) -> bool;
}
