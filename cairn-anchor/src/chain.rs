use cairn_crypto::hash::blake3_hash_domain;
use cairn_types::anchor::RewardTransaction;
use cairn_types::chain::{BlockRecord, LocalBlock, ValidatorUpdate};
use cairn_types::primitives::*;

use crate::error::AnchorError;

const BLOCK_HASH_DOMAIN: &str = "cairn local block v1";

/// Compute the hash of a local block from every field except `hash`.
pub fn compute_block_hash(block: &LocalBlock) -> Result<Hash, AnchorError> {
    let encode_err = |e: std::io::Error| AnchorError::InvalidBlock {
        reason: format!("block {} does not encode: {}", block.height, e),
    };
    let mut data = Vec::new();
    data.extend_from_slice(&block.height.to_le_bytes());
    data.extend_from_slice(&block.prev_hash);
    data.extend_from_slice(&block.timestamp.to_le_bytes());
    data.extend_from_slice(&borsh::to_vec(&block.validator_updates).map_err(encode_err)?);
    data.extend_from_slice(&borsh::to_vec(&block.anchor_reward).map_err(encode_err)?);
    Ok(blake3_hash_domain(BLOCK_HASH_DOMAIN, &data))
}

/// Build a sealed block on top of `parent`.
pub fn build_block(
    parent: &LocalBlock,
    timestamp: Timestamp,
    validator_updates: Vec<ValidatorUpdate>,
    anchor_reward: Option<RewardTransaction>,
) -> Result<LocalBlock, AnchorError> {
    let mut block = LocalBlock {
        height: parent.height + 1,
        hash: ZERO_HASH,
        prev_hash: parent.hash,
        timestamp,
        validator_updates,
        anchor_reward,
    };
    block.hash = compute_block_hash(&block)?;
    Ok(block)
}

/// Build the genesis block registering the initial validator set.
pub fn genesis_block(timestamp: Timestamp, validators: &[PublicKey]) -> Result<LocalBlock, AnchorError> {
    let mut block = LocalBlock {
        height: 0,
        hash: ZERO_HASH,
        prev_hash: ZERO_HASH,
        timestamp,
        validator_updates: validators
            .iter()
            .map(|pubkey| ValidatorUpdate::Register { pubkey: *pubkey })
            .collect(),
        anchor_reward: None,
    };
    block.hash = compute_block_hash(&block)?;
    Ok(block)
}

/// The canonical local chain, indexed by height.
#[derive(Debug, Clone, Default)]
pub struct LocalChain {
    blocks: Vec<BlockRecord>,
}

impl LocalChain {
    pub fn from_records(blocks: Vec<BlockRecord>) -> Result<Self, AnchorError> {
        for (i, record) in blocks.iter().enumerate() {
            if record.height() != i as u64 {
                return Err(AnchorError::InvalidBlock {
                    reason: format!("stored block at index {} has height {}", i, record.height()),
                });
            }
            if i > 0 && record.block.prev_hash != blocks[i - 1].hash() {
                return Err(AnchorError::InvalidBlock {
                    reason: format!("stored block {} does not link to its parent", i),
                });
            }
        }
        Ok(Self { blocks })
    }

    pub fn records(&self) -> &[BlockRecord] {
        &self.blocks
    }

    pub fn tip(&self) -> Option<&BlockRecord> {
        self.blocks.last()
    }

    pub fn tip_height(&self) -> u64 {
        self.tip().map(|r| r.height()).unwrap_or(0)
    }

    pub fn get(&self, height: u64) -> Option<&BlockRecord> {
        usize::try_from(height).ok().and_then(|h| self.blocks.get(h))
    }

    pub fn hash_at(&self, height: u64) -> Option<Hash> {
        self.get(height).map(|r| r.hash())
    }

    pub fn timestamp_at(&self, height: u64) -> Option<Timestamp> {
        self.get(height).map(|r| r.timestamp())
    }

    /// Whether (height, hash) is part of the canonical chain.
    pub fn is_canonical(&self, height: u64, hash: &Hash) -> bool {
        self.hash_at(height).as_ref() == Some(hash)
    }

    pub(crate) fn push(&mut self, record: BlockRecord) {
        self.blocks.push(record);
    }

    pub(crate) fn pop(&mut self) -> Option<BlockRecord> {
        self.blocks.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_chain(len: u64) -> LocalChain {
        let genesis = genesis_block(1_000, &[[1u8; 32]]).unwrap();
        let mut records = vec![BlockRecord {
            block: genesis,
            pool_after: 0,
        }];
        for i in 1..len {
            let block = build_block(&records[records.len() - 1].block, 1_000 + i * 60, vec![], None).unwrap();
            records.push(BlockRecord {
                block,
                pool_after: 0,
            });
        }
        LocalChain::from_records(records).unwrap()
    }

    #[test]
    fn test_block_hash_covers_contents() {
        let genesis = genesis_block(1_000, &[]).unwrap();
        let a = build_block(&genesis, 2_000, vec![], None).unwrap();
        let b = build_block(&genesis, 2_001, vec![], None).unwrap();
        let c = build_block(&genesis, 2_000, vec![ValidatorUpdate::Register { pubkey: [1u8; 32] }], None).unwrap();
        assert_ne!(a.hash, b.hash);
        assert_ne!(a.hash, c.hash);
        assert_eq!(compute_block_hash(&a).unwrap(), a.hash);
    }

    #[test]
    fn test_chain_lookup() {
        let chain = make_chain(5);
        assert_eq!(chain.tip_height(), 4);
        let hash = chain.hash_at(3).unwrap();
        assert!(chain.is_canonical(3, &hash));
        assert!(!chain.is_canonical(3, &[0u8; 32]));
        assert!(chain.get(5).is_none());
        assert_eq!(chain.timestamp_at(2), Some(1_120));
    }

    #[test]
    fn test_from_records_rejects_broken_links() {
        let chain = make_chain(3);
        let mut records = chain.records().to_vec();
        records[2].block.prev_hash = [9u8; 32];
        assert!(LocalChain::from_records(records).is_err());
    }

    #[test]
    fn test_push_pop() {
        let mut chain = make_chain(2);
        let record = chain.pop().unwrap();
        assert_eq!(chain.tip_height(), 0);
        chain.push(record);
        assert_eq!(chain.tip_height(), 1);
    }
}
