use std::collections::BTreeMap;

use cairn_crypto::keys::{verify, Keypair};
use cairn_types::anchor::{AnchorTeam, Auth, AuthGroup, SignerSignature};
use cairn_types::primitives::*;

use crate::chain::LocalChain;
use crate::error::AnchorError;
use crate::params::AnchorParams;

const AUTH_TAG: &[u8] = b"cairn:auth:";

/// Bytes signed by an auth, and by each auth signature inside an anchor payload.
pub fn auth_signing_data(block_height: u64, block_hash: &Hash, creation_height: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(AUTH_TAG.len() + 8 + 32 + 8);
    data.extend_from_slice(AUTH_TAG);
    data.extend_from_slice(&block_height.to_le_bytes());
    data.extend_from_slice(block_hash);
    data.extend_from_slice(&creation_height.to_le_bytes());
    data
}

/// Create a signed auth.
pub fn sign_auth(
    keypair: &Keypair,
    block_height: u64,
    block_hash: Hash,
    creation_height: u64,
) -> Auth {
    let signature = keypair.sign(&auth_signing_data(block_height, &block_hash, creation_height));
    Auth {
        block_height,
        block_hash,
        creation_height,
        signer: keypair.public_key(),
        signature,
    }
}

/// Check that `height` may be anchored when judged from `creation_height`.
///
/// The candidate must be a positive multiple of the anchor frequency and its
/// block timestamp at least `min_anchor_age_secs` older than the block at
/// `creation_height`.
pub fn check_eligible(
    height: u64,
    creation_height: u64,
    chain: &LocalChain,
    params: &AnchorParams,
) -> Result<(), AnchorError> {
    if height == 0 || height % params.anchor_frequency != 0 {
        return Err(AnchorError::HeightNotEligible {
            height,
            reason: format!("not a multiple of {}", params.anchor_frequency),
        });
    }
    let (Some(block_time), Some(tip_time)) =
        (chain.timestamp_at(height), chain.timestamp_at(creation_height))
    else {
        return Err(AnchorError::UnknownBlock {
            height: creation_height.max(height),
        });
    };
    let age = tip_time.saturating_sub(block_time);
    if creation_height < height || age < params.min_anchor_age_secs {
        return Err(AnchorError::HeightNotEligible {
            height,
            reason: format!("block age {}s below {}s", age, params.min_anchor_age_secs),
        });
    }
    Ok(())
}

/// Locally observed auths, unique per (block height, signer). An auth for a
/// block that was since replaced on the local chain gives way to a new one.
#[derive(Debug, Clone, Default)]
pub struct AuthLedger {
    auths: BTreeMap<(u64, PublicKey), Auth>,
}

impl AuthLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_auths(auths: Vec<Auth>) -> Self {
        Self {
            auths: auths
                .into_iter()
                .map(|a| ((a.block_height, a.signer), a))
                .collect(),
        }
    }

    pub fn auths(&self) -> Vec<Auth> {
        self.auths.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.auths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.auths.is_empty()
    }

    /// Whether `signer` already authorized `block_hash` at `block_height`.
    pub fn contains(&self, block_height: u64, block_hash: &Hash, signer: &PublicKey) -> bool {
        self.auths
            .get(&(block_height, *signer))
            .is_some_and(|a| a.block_hash == *block_hash)
    }

    /// Validate an auth against the current chain. Checks, in order: the
    /// signature, duplicates, staleness, the referenced block, eligibility,
    /// and auth-team membership at the creation height.
    pub fn validate(
        &self,
        auth: &Auth,
        chain: &LocalChain,
        team_at_creation: &AnchorTeam,
        active_height: u64,
        params: &AnchorParams,
    ) -> Result<(), AnchorError> {
        let data = auth_signing_data(auth.block_height, &auth.block_hash, auth.creation_height);
        verify(&data, &auth.signature, &auth.signer).map_err(|e| {
            AnchorError::InvalidSignature {
                reason: e.to_string(),
            }
        })?;

        if self.contains(auth.block_height, &auth.block_hash, &auth.signer) {
            return Err(AnchorError::DuplicateAuth {
                block_height: auth.block_height,
                signer: auth.signer,
            });
        }

        if auth.block_height < active_height {
            return Err(AnchorError::StaleAuth {
                block_height: auth.block_height,
                active_height,
            });
        }

        if !chain.is_canonical(auth.block_height, &auth.block_hash) {
            return Err(AnchorError::UnknownBlock {
                height: auth.block_height,
            });
        }
        if auth.creation_height > chain.tip_height() {
            return Err(AnchorError::UnknownBlock {
                height: auth.creation_height,
            });
        }

        check_eligible(auth.block_height, auth.creation_height, chain, params)?;

        if !team_at_creation.is_auth_member(&auth.signer) {
            return Err(AnchorError::UnauthorizedSigner {
                signer: auth.signer,
            });
        }
        Ok(())
    }

    /// Insert an already validated auth.
    pub fn insert(&mut self, auth: Auth) {
        self.auths.insert((auth.block_height, auth.signer), auth);
    }

    /// Auths grouped by (block height, block hash, creation height), ordered by
    /// block height then creation height.
    pub fn list_groups(&self) -> Vec<AuthGroup> {
        let mut groups: BTreeMap<(u64, u64, Hash), usize> = BTreeMap::new();
        for auth in self.auths.values() {
            *groups
                .entry((auth.block_height, auth.creation_height, auth.block_hash))
                .or_default() += 1;
        }
        groups
            .into_iter()
            .map(|((block_height, creation_height, block_hash), signers)| AuthGroup {
                block_height,
                block_hash,
                creation_height,
                signers,
            })
            .collect()
    }

    /// The best group reaching `quorum` whose block is still canonical:
    /// highest block height, then most signers, then latest creation height.
    /// Returns the largest group seen as the error when none qualifies.
    pub fn best_group(&self, chain: &LocalChain, quorum: usize) -> Result<AuthGroup, usize> {
        let groups: Vec<AuthGroup> = self
            .list_groups()
            .into_iter()
            .filter(|g| chain.is_canonical(g.block_height, &g.block_hash))
            .collect();
        let largest = groups.iter().map(|g| g.signers).max().unwrap_or(0);
        groups
            .into_iter()
            .filter(|g| g.signers >= quorum)
            .max_by_key(|g| (g.block_height, g.signers, g.creation_height))
            .ok_or(largest)
    }

    /// Signatures of one group, sorted by signer.
    pub fn signatures_for(&self, group: &AuthGroup) -> Vec<SignerSignature> {
        self.auths
            .range((group.block_height, [0u8; 32])..=(group.block_height, [0xFF; 32]))
            .map(|(_, a)| a)
            .filter(|a| a.block_hash == group.block_hash && a.creation_height == group.creation_height)
            .map(|a| SignerSignature {
                signer: a.signer,
                signature: a.signature,
            })
            .collect()
    }

    /// Drop auths whose block is no longer on the local chain at its height.
    /// Auths above the tip are kept. Returns how many were removed.
    pub fn drop_orphaned(&mut self, chain: &LocalChain) -> usize {
        let before = self.auths.len();
        self.auths.retain(|(height, _), auth| {
            chain.hash_at(*height).map_or(true, |hash| hash == auth.block_hash)
        });
        before - self.auths.len()
    }

    /// Drop auths for heights below `height`. Returns how many were removed.
    pub fn prune_below(&mut self, height: u64) -> usize {
        let before = self.auths.len();
        self.auths = self.auths.split_off(&(height, [0u8; 32]));
        before - self.auths.len()
    }
}
