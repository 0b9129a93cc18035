//! Error taxonomy for sale reads and mint actions

use solana_client::client_error::ClientError;
use solana_sdk::{
    instruction::InstructionError, pubkey::Pubkey, transaction::TransactionError,
};
use thiserror::Error;

use crate::mint::classifier::{INSUFFICIENT_FUNDS_CODE, NOT_STARTED_CODE, SOLD_OUT_CODE};
use crate::types::SalePhase;

/// Errors produced by the engine and its collaborators
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MintError {
    /// Sale account missing, unreadable or undecodable
    #[error("Sale configuration unavailable: {0}")]
    ConfigUnavailable(String),

    #[error("Wallet is not eligible to mint (phase: {phase})")]
    NotEligible { phase: SalePhase },

    #[error("Invalid mint quantity {quantity} (allowed: 1..={max})")]
    InvalidQuantity { quantity: u32, max: u32 },

    /// Transaction could not be built or submitted
    #[error("Dispatch failed: {0}")]
    DispatchFailed(String),

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Sale is sold out")]
    SoldOut,

    #[error("Sale has not started")]
    NotStarted,

    #[error("Insufficient funds to mint")]
    InsufficientFunds,

    #[error("Partial batch failure ({succeeded} succeeded, {failed} failed)")]
    PartialBatchFailure { succeeded: u32, failed: u32 },

    /// The wallet declined to sign before anything reached the network
    #[error("Mint cancelled")]
    Cancelled,

    #[error("A mint is already in progress")]
    AlreadyMinting,

    #[error("Human verification required (gatekeeper network: {network})")]
    HumanGateRequired { network: Pubkey },

    #[error("Signing failed: {0}")]
    Signing(String),

    /// Custom error returned by the sale program
    #[error("Program error {code:#x}: {message}")]
    Program { code: u32, message: String },

    /// Network-level failure talking to the RPC node
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },
}

impl MintError {
    /// Check if retrying the same read might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, MintError::Transport { .. } | MintError::Timeout { .. })
    }

    /// Create from ClientError with context
    pub fn from_client_error(err: ClientError, endpoint: &str) -> Self {
        if let Some(tx_err) = err.get_transaction_error() {
            if let Some(code) = custom_program_code(&tx_err) {
                return MintError::from_program_code(code, tx_err.to_string());
            }
        }

        let message = err.to_string();
        if let Some(code) = parse_custom_program_code(&message) {
            return MintError::from_program_code(code, message);
        }

        let lower = message.to_lowercase();
        if lower.contains("insufficient funds") || lower.contains("insufficient lamports") {
            MintError::InsufficientFunds
        } else if lower.contains("timeout") || lower.contains("timed out") {
            MintError::Timeout { timeout_ms: 0 }
        } else {
            MintError::Transport {
                endpoint: endpoint.to_string(),
                message,
            }
        }
    }

    /// Map a sale program error code, keeping unknown codes verbatim
    pub fn from_program_code(code: u32, message: String) -> Self {
        match code {
            SOLD_OUT_CODE => MintError::SoldOut,
            NOT_STARTED_CODE => MintError::NotStarted,
            INSUFFICIENT_FUNDS_CODE => MintError::InsufficientFunds,
            _ => MintError::Program { code, message },
        }
    }

    /// Program error code carried by this error, if any
    pub fn program_code(&self) -> Option<u32> {
        match self {
            MintError::Program { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Extract `Custom(code)` from an instruction failure
pub fn custom_program_code(err: &TransactionError) -> Option<u32> {
    match err {
        TransactionError::InstructionError(_, InstructionError::Custom(code)) => Some(*code),
        _ => None,
    }
}

/// Parse "custom program error: 0x137" out of an RPC error message
pub fn parse_custom_program_code(message: &str) -> Option<u32> {
    let lower = message.to_lowercase();
    let (_, rest) = lower.split_once("custom program error: 0x")?;
    let hex: String = rest.chars().take_while(|c| c.is_ascii_hexdigit()).collect();
    u32::from_str_radix(&hex, 16).ok()
}
