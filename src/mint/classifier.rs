//! Outcome classifier
//!
//! Collapses everything that happened during one mint action into a single
//! [`MintOutcome`] and the alert shown for it.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::error;

use crate::errors::MintError;
use crate::mint::reconciler::Reconciliation;
use crate::types::{AlertState, TxOutcome};

/// Sale program error: all items redeemed
pub const SOLD_OUT_CODE: u32 = 0x137;
/// Sale program error: go-live date not reached
pub const NOT_STARTED_CODE: u32 = 0x138;
/// Sale program error: payer cannot cover the price
pub const INSUFFICIENT_FUNDS_CODE: u32 = 0x135;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MintOutcome {
    FullSuccess { quantity: u32 },
    PartialSuccess { succeeded: u32, failed: u32 },
    AllFailed { requested: u32, failed: u32 },
    CancelledByUser,
    SoldOut,
    NotStarted,
    InsufficientFunds,
    Timeout,
    /// The action was refused before anything was signed
    Rejected { reason: String },
    /// Unrecognised failure, with the program code when there was one
    Failed { code: Option<u32> },
}

impl MintOutcome {
    /// Every requested mint landed
    pub fn is_success(&self) -> bool {
        matches!(self, MintOutcome::FullSuccess { .. })
    }

    /// Mints that landed and should be reflected in local state
    pub fn minted(&self) -> u32 {
        match self {
            MintOutcome::FullSuccess { quantity } => *quantity,
            MintOutcome::PartialSuccess { succeeded, .. } => *succeeded,
            _ => 0,
        }
    }

    /// Error form of a failed outcome, for logs and callers that propagate
    pub fn error(&self) -> Option<MintError> {
        match self {
            MintOutcome::FullSuccess { .. } => None,
            MintOutcome::PartialSuccess { succeeded, failed } => {
                Some(MintError::PartialBatchFailure {
                    succeeded: *succeeded,
                    failed: *failed,
                })
            }
            MintOutcome::AllFailed { failed, .. } => Some(MintError::PartialBatchFailure {
                succeeded: 0,
                failed: *failed,
            }),
            MintOutcome::CancelledByUser => Some(MintError::Cancelled),
            MintOutcome::SoldOut => Some(MintError::SoldOut),
            MintOutcome::NotStarted => Some(MintError::NotStarted),
            MintOutcome::InsufficientFunds => Some(MintError::InsufficientFunds),
            MintOutcome::Timeout => Some(MintError::Timeout { timeout_ms: 0 }),
            MintOutcome::Rejected { reason } => Some(MintError::DispatchFailed(reason.clone())),
            MintOutcome::Failed { code: Some(code) } => Some(MintError::Program {
                code: *code,
                message: format!("custom program error: {:#x}", code),
            }),
            MintOutcome::Failed { code: None } => {
                Some(MintError::DispatchFailed("mint failed".to_string()))
            }
        }
    }

    pub fn alert(&self) -> AlertState {
        match self {
            MintOutcome::FullSuccess { quantity: 1 } => {
                AlertState::success("Congratulations! Mint succeeded!")
            }
            MintOutcome::FullSuccess { quantity } => {
                AlertState::success(format!("Congratulations! Your {} mints succeeded!", quantity))
            }
            MintOutcome::AllFailed { requested: 1, .. } => {
                AlertState::error("Mint failed! Please try again!")
            }
            MintOutcome::PartialSuccess { failed, .. } | MintOutcome::AllFailed { failed, .. } => {
                AlertState::error(format!(
                    "Some mints failed! (possibly {}) Wait a few minutes and check your wallet.",
                    failed
                ))
            }
            MintOutcome::CancelledByUser => AlertState::error("Mints manually cancelled."),
            MintOutcome::SoldOut => AlertState::error("SOLD OUT!"),
            MintOutcome::NotStarted => AlertState::error("Minting period hasn't started yet."),
            MintOutcome::InsufficientFunds => {
                AlertState::error("Insufficient funds to mint. Please fund your wallet.")
            }
            MintOutcome::Timeout => AlertState::error("Transaction Timeout! Please try again."),
            MintOutcome::Rejected { reason } => AlertState::error(reason.clone()),
            MintOutcome::Failed { code: Some(code) } => AlertState::error(format!(
                "Minting failed! Please try again! (error {:#x})",
                code
            )),
            MintOutcome::Failed { code: None } => {
                AlertState::error("Minting failed! Please try again!")
            }
        }
    }
}

impl fmt::Display for MintOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.alert().message)
    }
}

/// Everything observed for one dispatched batch
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub requested: u32,
    /// One entry per submitted transaction
    pub outcomes: Vec<TxOutcome>,
    /// Units that never reached the network
    pub rejected: u32,
    /// `None` when nothing was submitted
    pub reconciliation: Option<Reconciliation>,
}

/// Classify a batch that was dispatched
pub fn classify(report: &BatchReport) -> MintOutcome {
    let succeeded = report.outcomes.iter().filter(|o| o.is_confirmed()).count() as u32;
    let failed = (report.outcomes.len() as u32 - succeeded) + report.rejected;

    if succeeded == 0 && failed == 0 {
        return MintOutcome::CancelledByUser;
    }

    let reconciled = report.reconciliation.map(|r| r.converged).unwrap_or(false);
    if succeeded == 0 || !reconciled {
        return MintOutcome::AllFailed {
            requested: report.requested,
            failed,
        };
    }

    if failed > 0 {
        MintOutcome::PartialSuccess { succeeded, failed }
    } else {
        MintOutcome::FullSuccess {
            quantity: succeeded,
        }
    }
}

/// Classify a mint action that ended in an error instead of a batch
pub fn classify_error(err: &MintError) -> MintOutcome {
    match err {
        MintError::SoldOut => MintOutcome::SoldOut,
        MintError::NotStarted => MintOutcome::NotStarted,
        MintError::InsufficientFunds => MintOutcome::InsufficientFunds,
        MintError::Program { code, message } => match *code {
            SOLD_OUT_CODE => MintOutcome::SoldOut,
            NOT_STARTED_CODE => MintOutcome::NotStarted,
            INSUFFICIENT_FUNDS_CODE => MintOutcome::InsufficientFunds,
            other => {
                error!(code = other, message = %message, "Unrecognised sale program error");
                MintOutcome::Failed { code: Some(other) }
            }
        },
        MintError::Timeout { .. } | MintError::Transport { .. } => MintOutcome::Timeout,
        MintError::Cancelled => MintOutcome::CancelledByUser,
        MintError::AlreadyMinting => MintOutcome::Rejected {
            reason: "A mint is already in progress.".to_string(),
        },
        MintError::HumanGateRequired { .. } => MintOutcome::Rejected {
            reason: "Please complete human verification before minting.".to_string(),
        },
        MintError::NotEligible { .. } => MintOutcome::Rejected {
            reason: "Your wallet is not eligible to mint right now.".to_string(),
        },
        MintError::InvalidQuantity { max, .. } => MintOutcome::Rejected {
            reason: format!("Please choose between 1 and {} mints.", max),
        },
        other => {
            error!(error = %other, "Mint failed");
            MintOutcome::Failed { code: None }
        }
    }
}
