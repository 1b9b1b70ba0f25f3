//! ─── SwapX broker defaults ──────────────────────────────────────────────────
//!
//! Process-wide defaults. Everything here can be overridden from the config
//! file; these are the values a bare config falls back to.

/// Engine tick interval (seconds).
pub const ENGINE_TICK_SECS: u64 = 30;

/// Recovery tick interval (seconds).
pub const RECOVERY_TICK_SECS: u64 = 300;

/// TTL for the engine/recovery global leases and the per-deal leases.
/// A lease not renewed within this window is considered abandoned.
pub const LEASE_TTL_SECS: i64 = 90;

/// A `Pending` item with no submitted tx older than this is considered stuck.
pub const STUCK_PENDING_SECS: i64 = 300;

/// A `Submitted` item older than this without confirmations is probed.
pub const STUCK_SUBMITTED_SECS: i64 = 600;

/// Default ceiling on per-item recovery attempts before `Failed`.
pub const MAX_RECOVERY_ATTEMPTS: u32 = 3;

/// Hard bounds on the configurable attempt ceiling.
pub const MIN_RECOVERY_ATTEMPTS_BOUND: u32 = 1;
pub const MAX_RECOVERY_ATTEMPTS_BOUND: u32 = 10;

/// Commission on known-asset sides, in basis points of the principal.
pub const COMMISSION_BPS: u32 = 30;

/// Commission on unknown-token sides: fixed USD equivalent, in cents,
/// collected in the chain's native coin.
pub const UNKNOWN_TOKEN_COMMISSION_USD_CENTS: u64 = 1_000;

/// Escrow native balance must cover estimated gas times this headroom
/// (numerator/denominator) before settlement submits; otherwise the planner
/// enqueues gas funding from the tank.
pub const GAS_HEADROOM_NUM: u64 = 12;
pub const GAS_HEADROOM_DEN: u64 = 10;

/// Bounded per-tick deal parallelism.
pub const ENGINE_WORKERS: usize = 8;

/// Per-call deadline for chain RPC requests (seconds).
pub const RPC_TIMEOUT_SECS: u64 = 15;

/// UTXO outputs below this many base units are dust and never created.
pub const UTXO_DUST_LIMIT: u64 = 546;
