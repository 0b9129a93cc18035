//! Candy Mint - sale-state and mint-orchestration engine for Candy Machine v2
//!
//! Reads the on-chain sale descriptor, derives the sale phase and the
//! connected wallet's eligibility, and drives single and batch mints through
//! submission, confirmation and balance reconciliation to one user-facing
//! outcome.

pub mod config;
pub mod engine;
pub mod errors;
pub mod gatekeeper;
pub mod logging;
pub mod metrics;
pub mod mint;
pub mod observability;
pub mod rpc;
pub mod sale;
pub mod tx_builder;
pub mod types;
pub mod wallet;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use config::{Cluster, EngineConfig};
pub use engine::MintEngine;
pub use errors::MintError;
pub use mint::{MintObserver, MintOutcome};
pub use types::{AlertState, Eligibility, SalePhase, SaleView};

// Re-export commonly used types
pub use solana_sdk::{pubkey::Pubkey, signature::Signature};
