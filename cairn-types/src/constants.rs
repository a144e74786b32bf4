use crate::primitives::Amount;

// ─── Coin Parameters ─────────────────────────────────────────────────────────

/// Number of decimal places for amounts.
pub const COIN_DECIMALS: u32 = 8;

/// One full coin in base units (10^8).
pub const COIN: Amount = 100_000_000;

// ─── Anchor Scheduling ───────────────────────────────────────────────────────

/// Only local heights that are multiples of this value are anchor candidates,
/// and auths are only produced when the tip height is a multiple of it.
pub const ANCHOR_FREQUENCY: u64 = 15;

/// Minimum wall-clock age of a candidate block relative to the tip (seconds).
pub const MIN_ANCHOR_AGE_SECS: u64 = 3 * 60 * 60; // 3 hours

// ─── Teams and Quorum ────────────────────────────────────────────────────────

/// Number of validators allowed to sign auths at a given height.
pub const AUTH_TEAM_SIZE: usize = 3;

/// Number of validators allowed to vote reward confirmations at a given height.
pub const CONFIRM_TEAM_SIZE: usize = 3;

/// Distinct signers required for an anchor payload and for a reward confirm.
pub const ANCHOR_QUORUM: usize = 2;

/// Teams are derived from the validator snapshot at `h - h % TEAM_ROTATION_INTERVAL`.
pub const TEAM_ROTATION_INTERVAL: u64 = 15;

// ─── External Confirmation Depths ────────────────────────────────────────────

/// Confirmations required to move a pending anchor into the registry.
pub const PROMOTE_DEPTH: u64 = 1;

/// Confirmations required before an anchor may become the active anchor.
pub const ACTIVATE_DEPTH: u64 = 6;

// ─── Rewards and Fees ────────────────────────────────────────────────────────

/// Community pool accrual per connected local block (0.1 coin).
pub const ANCHOR_REWARD_PER_BLOCK: Amount = COIN / 10;

/// Default fee rate for anchor transactions, in external base units per 1000 bytes.
pub const DEFAULT_FEE_PER_KB: u64 = 1_000;

// ─── Payload Limits ──────────────────────────────────────────────────────────

/// Maximum number of auth signatures carried by one anchor payload.
pub const MAX_ANCHOR_AUTHS: usize = 64;

/// Maximum raw size of an anchor transaction in bytes.
pub const MAX_ANCHOR_TX_SIZE: usize = 16_384;
