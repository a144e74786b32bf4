//! Anchor consensus and reward engine for the Cairn chain.
//!
//! Validators attest to local blocks (auths), submitters commit those
//! attestations into an external reference chain, and once the external
//! transaction is buried deep enough a confirm team votes to pay the
//! community anchor reward. Local and external reorganizations unwind
//! through the same connect/disconnect path used for forward progress.

pub mod auth;
pub mod chain;
pub mod confirmation;
pub mod engine;
pub mod error;
pub mod params;
pub mod payload;
pub mod payout;
pub mod pending;
pub mod registry;
pub mod rollback;
pub mod team;
pub mod validators;
pub mod voter;

#[cfg(test)]
pub(crate) mod test_support;
