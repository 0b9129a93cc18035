//! Wallet signing capability

use anyhow::{Context, Result};
use async_trait::async_trait;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::VersionedTransaction,
};
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::errors::MintError;

/// Signing capability of a connected wallet
#[async_trait]
pub trait WalletSigner: Send + Sync {
    fn pubkey(&self) -> Pubkey;

    /// Add this wallet's signature to `tx`. Declining to sign is `MintError::Signing`.
    async fn sign_transaction(&self, tx: VersionedTransaction)
        -> Result<VersionedTransaction, MintError>;
}

/// Wallet backed by a local keypair
pub struct KeypairWallet {
    keypair: Arc<Keypair>,
}

impl KeypairWallet {
    /// Load a Solana CLI keypair file (JSON array or raw 64 bytes)
    pub fn from_file(path: &str) -> Result<Self> {
        let keypair_bytes = Zeroizing::new(
            std::fs::read(path)
                .with_context(|| format!("Failed to read keypair file: {}", path))?,
        );

        let secret: Zeroizing<Vec<u8>> = if keypair_bytes.len() == 64 {
            Zeroizing::new(keypair_bytes.to_vec())
        } else {
            Zeroizing::new(
                serde_json::from_slice(&keypair_bytes).context("Failed to parse keypair JSON")?,
            )
        };

        if secret.len() != 64 {
            anyhow::bail!("Invalid keypair length: expected 64 bytes, got {}", secret.len());
        }
        if secret.iter().all(|&b| b == 0) {
            anyhow::bail!("Invalid keypair: all-zero key rejected");
        }
        let keypair = Keypair::try_from(secret.as_slice()).context("Invalid keypair bytes")?;

        Ok(Self::from_keypair(keypair))
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }
}

impl Clone for KeypairWallet {
    fn clone(&self) -> Self {
        Self {
            keypair: Arc::clone(&self.keypair),
        }
    }
}

#[async_trait]
impl WalletSigner for KeypairWallet {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_transaction(
        &self,
        mut tx: VersionedTransaction,
    ) -> Result<VersionedTransaction, MintError> {
        let signer = self.keypair.pubkey();
        let required = tx.message.header().num_required_signatures as usize;
        let position = tx
            .message
            .static_account_keys()
            .iter()
            .take(required)
            .position(|key| *key == signer)
            .ok_or_else(|| {
                MintError::Signing(format!("{} is not a required signer", signer))
            })?;

        // Keep signatures already placed by the builder (e.g. the new mint account)
        if tx.signatures.len() < required {
            tx.signatures.resize(required, Signature::default());
        }
        tx.signatures[position] = self.keypair.sign_message(&tx.message.serialize());
        Ok(tx)
    }
}
