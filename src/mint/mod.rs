//! Mint pipeline: dispatch, confirmation, reconciliation, classification

pub mod classifier;
pub mod dispatcher;
pub mod reconciler;
pub mod tracker;

pub use classifier::{classify, classify_error, BatchReport, MintOutcome};
pub use dispatcher::{Dispatched, MintDispatcher, TxHandle};
pub use reconciler::{BalanceReconciler, ReconcilePolicy, Reconciliation};
pub use tracker::ConfirmationTracker;

/// Cosmetic hook fired after a fully successful mint
pub trait MintObserver: Send + Sync {
    fn on_celebrate(&self, outcome: &MintOutcome);
}
