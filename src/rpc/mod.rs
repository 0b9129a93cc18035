//! RPC seam
//!
//! The engine talks to the ledger only through [`LedgerRpc`], so the
//! orchestration logic can be driven by a real `RpcClient` or a scripted
//! ledger in tests.

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use tracing::debug;

use crate::errors::{custom_program_code, MintError};
use crate::types::TxFailure;

/// Confirmation state of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    Pending,
    Confirmed,
    Failed(TxFailure),
}

/// Network handle used by every component of the engine
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Native balance in lamports
    async fn get_balance(&self, address: &Pubkey) -> Result<u64, MintError>;

    /// Raw account data, `None` if the account does not exist
    async fn get_account(&self, id: &Pubkey) -> Result<Option<Vec<u8>>, MintError>;

    /// Raw amount held by an SPL token account
    async fn get_token_balance(&self, token_account: &Pubkey) -> Result<u64, MintError>;

    async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature, MintError>;

    async fn get_signature_status(&self, signature: &Signature)
        -> Result<SignatureStatus, MintError>;
}

#[async_trait]
impl LedgerRpc for RpcClient {
    async fn get_balance(&self, address: &Pubkey) -> Result<u64, MintError> {
        RpcClient::get_balance(self, address)
            .await
            .map_err(|e| MintError::from_client_error(e, &self.url()))
    }

    async fn get_account(&self, id: &Pubkey) -> Result<Option<Vec<u8>>, MintError> {
        let response = self
            .get_account_with_commitment(id, self.commitment())
            .await
            .map_err(|e| MintError::from_client_error(e, &self.url()))?;
        Ok(response.value.map(|account| account.data))
    }

    async fn get_token_balance(&self, token_account: &Pubkey) -> Result<u64, MintError> {
        let response = self
            .get_token_account_balance_with_commitment(token_account, self.commitment())
            .await
            .map_err(|e| MintError::from_client_error(e, &self.url()))?;
        response.value.amount.parse::<u64>().map_err(|e| MintError::Transport {
            endpoint: self.url(),
            message: format!("malformed token amount '{}': {}", response.value.amount, e),
        })
    }

    async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature, MintError> {
        RpcClient::send_transaction(self, tx)
            .await
            .map_err(|e| MintError::from_client_error(e, &self.url()))
    }

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<SignatureStatus, MintError> {
        let status = self
            .get_signature_status_with_commitment(signature, self.commitment())
            .await
            .map_err(|e| MintError::from_client_error(e, &self.url()))?;

        Ok(match status {
            None => SignatureStatus::Pending,
            Some(Ok(())) => SignatureStatus::Confirmed,
            Some(Err(err)) => {
                debug!(signature = %signature, error = %err, "Transaction landed with error");
                SignatureStatus::Failed(TxFailure {
                    code: custom_program_code(&err),
                    message: err.to_string(),
                })
            }
        })
    }
}
