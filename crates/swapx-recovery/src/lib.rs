//! swapx-recovery — the slow reconciliation loop.
//!
//! Every few minutes the recovery manager compares queue state against chain
//! state and nudges whatever is stuck: missing ERC-20 approvals are
//! re-enqueued, transactions lingering unsubmitted get their retry budget
//! advanced, submissions the chain dropped are reset, and structurally
//! malformed items are failed out. Every action leaves one audit row.
//! Recovery never advances a deal's stage; that is the engine's job alone.

pub mod manager;
pub mod repair;

pub use manager::RecoveryManager;
