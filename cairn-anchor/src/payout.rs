use std::collections::{BTreeMap, BTreeSet};

use cairn_crypto::hash::blake3_hash_domain;
use cairn_crypto::keys::verify;
use cairn_types::anchor::{Anchor, AnchorTeam, RewardRecord, RewardTransaction};
use cairn_types::primitives::*;

use crate::error::AnchorError;
use crate::voter::vote_signing_data;

const REWARD_TX_DOMAIN: &str = "cairn anchor reward v1";

/// Hash of a reward transaction, recorded as its `RewardTxHash`.
pub fn reward_transaction_hash(reward: &RewardTransaction) -> Result<Hash, AnchorError> {
    let bytes = borsh::to_vec(reward).map_err(|e| AnchorError::InvalidReward {
        reason: format!("reward does not encode: {}", e),
    })?;
    Ok(blake3_hash_domain(REWARD_TX_DOMAIN, &bytes))
}

/// The community anchor reward pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommunityRewardPool {
    balance: Amount,
    per_block: Amount,
}

impl CommunityRewardPool {
    pub fn new(balance: Amount, per_block: Amount) -> Self {
        Self { balance, per_block }
    }

    pub fn balance(&self) -> Amount {
        self.balance
    }

    /// Accrue one block's worth of reward.
    pub fn accrue(&mut self) -> Result<(), AnchorError> {
        self.balance = self
            .balance
            .checked_add(self.per_block)
            .ok_or_else(|| AnchorError::InvalidBlock {
                reason: "anchor reward pool overflow".to_string(),
            })?;
        Ok(())
    }

    /// Pay out the whole balance; the paying block's own accrual remains.
    pub fn pay_out(&mut self) -> Amount {
        let paid = self.balance;
        self.balance = self.per_block;
        paid
    }

    pub fn restore(&mut self, balance: Amount) {
        self.balance = balance;
    }
}

/// Check a reward transaction carried by the block at `height` against the
/// head of the unrewarded list, the pool balance and the confirm team.
pub fn validate_reward(
    reward: &RewardTransaction,
    head: Option<&Anchor>,
    previous_height: u64,
    pool: Amount,
    confirm_team: &AnchorTeam,
    quorum: usize,
) -> Result<(), AnchorError> {
    let invalid = |reason: String| Err(AnchorError::InvalidReward { reason });

    let Some(anchor) = head else {
        return invalid("no unrewarded anchor".to_string());
    };
    if anchor.external_tx_hash != reward.anchor_tx_hash {
        return invalid(format!(
            "reward for {} but head of unrewarded list is {}",
            hex::encode(reward.anchor_tx_hash),
            hex::encode(anchor.external_tx_hash)
        ));
    }
    if anchor.reward_address != reward.reward_address {
        return invalid("reward address mismatch".to_string());
    }
    if reward.amount != pool {
        return invalid(format!("amount {} differs from pool {}", reward.amount, pool));
    }

    let data = vote_signing_data(
        &anchor.external_tx_hash,
        anchor.local_block_height,
        previous_height,
        &anchor.reward_address,
    );
    let mut signers = BTreeSet::new();
    for sig in &reward.confirm_signatures {
        if !confirm_team.is_confirm_member(&sig.signer) {
            return Err(AnchorError::UnauthorizedSigner { signer: sig.signer });
        }
        if !signers.insert(sig.signer) {
            return invalid("duplicate confirm signer".to_string());
        }
        verify(&data, &sig.signature, &sig.signer).map_err(|e| AnchorError::InvalidSignature {
            reason: e.to_string(),
        })?;
    }
    if signers.len() < quorum {
        return Err(AnchorError::QuorumNotMet {
            have: signers.len(),
            need: quorum,
        });
    }
    Ok(())
}

/// Permanent anchor to reward transaction mapping.
#[derive(Debug, Clone, Default)]
pub struct RewardLedger {
    records: BTreeMap<Hash, RewardRecord>,
}

impl RewardLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<RewardRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|r| (r.anchor_tx_hash, r))
                .collect(),
        }
    }

    pub fn contains(&self, anchor_tx_hash: &Hash) -> bool {
        self.records.contains_key(anchor_tx_hash)
    }

    pub fn get(&self, anchor_tx_hash: &Hash) -> Option<&RewardRecord> {
        self.records.get(anchor_tx_hash)
    }

    pub fn insert(&mut self, record: RewardRecord) {
        self.records.insert(record.anchor_tx_hash, record);
    }

    pub fn remove(&mut self, anchor_tx_hash: &Hash) -> Option<RewardRecord> {
        self.records.remove(anchor_tx_hash)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records ordered by the local height that paid them.
    pub fn list(&self) -> Vec<RewardRecord> {
        let mut records: Vec<RewardRecord> = self.records.values().cloned().collect();
        records.sort_by_key(|r| (r.local_height, r.anchor_tx_hash));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::make_keys;
    use crate::voter::sign_vote;
    use cairn_types::anchor::SignerSignature;
    use cairn_types::constants::COIN;

    fn make_anchor() -> Anchor {
        Anchor {
            external_block_height: 1,
            external_tx_hash: [1u8; 32],
            previous_anchor_tx_hash: ZERO_HASH,
            local_block_height: 15,
            local_block_hash: [2u8; 32],
            reward_address: [3u8; 20],
            confirmations: 6,
            signature_count: 2,
            creation_height: 45,
            active: true,
        }
    }

    fn make_team(keys: &[cairn_crypto::keys::Keypair]) -> AnchorTeam {
        let mut confirm: Vec<PublicKey> = keys.iter().map(|k| k.public_key()).collect();
        confirm.sort();
        AnchorTeam {
            auth: vec![],
            confirm,
        }
    }

    fn make_reward(keys: &[cairn_crypto::keys::Keypair], amount: Amount) -> RewardTransaction {
        let anchor = make_anchor();
        RewardTransaction {
            anchor_tx_hash: anchor.external_tx_hash,
            reward_address: anchor.reward_address,
            amount,
            confirm_signatures: keys
                .iter()
                .map(|k| {
                    let vote = sign_vote(k, &anchor, 0);
                    SignerSignature {
                        signer: vote.signer,
                        signature: vote.signature,
                    }
                })
                .collect(),
        }
    }

    #[test]
    fn test_pool_accrual_and_payout() {
        let per_block = COIN / 10;
        let mut pool = CommunityRewardPool::new(0, per_block);
        for _ in 0..46 {
            pool.accrue().unwrap();
        }
        assert_eq!(pool.balance(), 46 * per_block);
        assert_eq!(pool.pay_out(), 460_000_000);
        assert_eq!(pool.balance(), per_block);
        pool.restore(46 * per_block);
        assert_eq!(pool.balance(), 460_000_000);
    }

    #[test]
    fn test_valid_reward_accepted() {
        let keys = make_keys(3);
        let team = make_team(&keys);
        let reward = make_reward(&keys[..2], 460_000_000);
        let head = make_anchor();
        validate_reward(&reward, Some(&head), 0, 460_000_000, &team, 2).unwrap();
    }

    #[test]
    fn test_reward_rejections() {
        let keys = make_keys(3);
        let team = make_team(&keys);
        let head = make_anchor();

        let short = make_reward(&keys[..1], 460_000_000);
        assert!(matches!(
            validate_reward(&short, Some(&head), 0, 460_000_000, &team, 2),
            Err(AnchorError::QuorumNotMet { have: 1, need: 2 })
        ));

        let wrong_amount = make_reward(&keys[..2], 500_000_000);
        assert!(matches!(
            validate_reward(&wrong_amount, Some(&head), 0, 460_000_000, &team, 2),
            Err(AnchorError::InvalidReward { .. })
        ));

        let reward = make_reward(&keys[..2], 460_000_000);
        assert!(validate_reward(&reward, None, 0, 460_000_000, &team, 2).is_err());

        let outsiders = make_team(&make_keys(5)[3..]);
        assert!(matches!(
            validate_reward(&reward, Some(&head), 0, 460_000_000, &outsiders, 2),
            Err(AnchorError::UnauthorizedSigner { .. })
        ));
    }

    #[test]
    fn test_reward_hash_covers_whole_transaction() {
        let keys = make_keys(3);
        let reward = make_reward(&keys[..2], 460_000_000);
        let hash = reward_transaction_hash(&reward).unwrap();
        assert_eq!(hash, reward_transaction_hash(&reward.clone()).unwrap());
        assert_ne!(hash, blake3_hash_domain(REWARD_TX_DOMAIN, &[]));

        let fewer = make_reward(&keys[..1], 460_000_000);
        assert_ne!(hash, reward_transaction_hash(&fewer).unwrap());
        let other_amount = make_reward(&keys[..2], 10_000_000);
        assert_ne!(hash, reward_transaction_hash(&other_amount).unwrap());
    }

    #[test]
    fn test_ledger_orders_by_paying_height() {
        let mut ledger = RewardLedger::new();
        for (anchor, height) in [(2u8, 123u64), (1u8, 47u64)] {
            ledger.insert(RewardRecord {
                anchor_tx_hash: [anchor; 32],
                reward_tx_hash: [anchor + 10; 32],
                local_height: height,
                local_hash: [0u8; 32],
            });
        }
        let heights: Vec<u64> = ledger.list().iter().map(|r| r.local_height).collect();
        assert_eq!(heights, vec![47, 123]);
        assert!(ledger.remove(&[1u8; 32]).is_some());
        assert_eq!(ledger.len(), 1);
    }
}
