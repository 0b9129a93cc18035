//! Mint transaction construction seam
//!
//! Building the candy machine instruction set (mint account, metadata,
//! master edition, program accounts) is owned by the caller.

use async_trait::async_trait;
use solana_sdk::{pubkey::Pubkey, transaction::VersionedTransaction};

use crate::errors::MintError;
use crate::types::SaleConfig;

/// Builds one unsigned mint transaction for `payer`
///
/// Builders may pre-sign with keys they own (e.g. the new mint account);
/// the payer's slot is left for the wallet.
#[async_trait]
pub trait MintTxBuilder: Send + Sync {
    async fn build_mint_transaction(
        &self,
        sale: &SaleConfig,
        payer: &Pubkey,
    ) -> Result<VersionedTransaction, MintError>;
}
