use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};

use swapx_core::{DealId, SwapxError, Timestamp};

use crate::db::BrokerDb;

/// A named exclusion token with TTL. Serializes concurrent workers on one
/// deal (`deal:<id>`) or one subsystem (`engine:tick`, `recovery:tick`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Lease {
    pub name: String,
    pub expires_at: Timestamp,
}

/// Lease name for serializing engine work on one deal.
pub fn deal_lease_name(id: &DealId) -> String {
    format!("deal:{id}")
}

/// Global engine-tick lease name.
pub const ENGINE_TICK_LEASE: &str = "engine:tick";

/// Global recovery-tick lease name.
pub const RECOVERY_TICK_LEASE: &str = "recovery:tick";

impl BrokerDb {
    /// Try to acquire `name` until `now + ttl_secs`. Succeeds iff no
    /// unexpired lease row exists; an expired row is considered abandoned
    /// and taken over. Returns false when somebody else holds the lease.
    pub fn acquire_lease(&self, name: &str, now: Timestamp, ttl_secs: i64) -> Result<bool, SwapxError> {
        let lease = Lease { name: name.to_string(), expires_at: now + ttl_secs };
        let bytes = bincode::serialize(&lease)
            .map_err(|e| SwapxError::Serialization(e.to_string()))?;

        let acquired = self
            .leases
            .transaction(|tx| {
                if let Some(existing) = tx.get(name.as_bytes())? {
                    let existing: Lease = bincode::deserialize(&existing).map_err(|e| {
                        ConflictableTransactionError::Abort(SwapxError::Serialization(
                            e.to_string(),
                        ))
                    })?;
                    if existing.expires_at > now {
                        return Ok(false);
                    }
                }
                tx.insert(name.as_bytes(), bytes.clone())?;
                Ok(true)
            })
            .map_err(|e: TransactionError<SwapxError>| match e {
                TransactionError::Abort(err) => err,
                TransactionError::Storage(err) => SwapxError::Storage(err.to_string()),
            })?;
        Ok(acquired)
    }

    /// Release a held lease. Releasing an absent lease is a no-op.
    pub fn release_lease(&self, name: &str) -> Result<(), SwapxError> {
        self.leases
            .remove(name.as_bytes())
            .map_err(|e| SwapxError::Storage(e.to_string()))?;
        Ok(())
    }
}
