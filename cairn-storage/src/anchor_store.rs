use borsh::{BorshDeserialize, BorshSerialize};

use cairn_types::anchor::{Anchor, Auth, PendingAnchor, RewardRecord, RewardVote};
use cairn_types::chain::{BlockRecord, Validator};
use cairn_types::primitives::Amount;
use cairn_types::snapshot::AnchorSnapshot;

use crate::error::StorageError;
use crate::traits::{BatchOp, KvStore};

/// Bumped whenever the on-disk layout changes.
pub const SCHEMA_VERSION: u32 = 2;

const SCHEMA_KEY: &[u8] = b"anchor:schema";
const META_KEY: &[u8] = b"anchor:meta";
const BLOCK_PREFIX: &[u8] = b"anchor:block:";
const VALIDATORS_KEY: &[u8] = b"anchor:validators";
const AUTHS_KEY: &[u8] = b"anchor:auths";
const PENDING_KEY: &[u8] = b"anchor:pending";
const ANCHORS_KEY: &[u8] = b"anchor:anchors";
const VOTES_KEY: &[u8] = b"anchor:votes";
const REWARDS_KEY: &[u8] = b"anchor:rewards";

#[derive(BorshSerialize, BorshDeserialize)]
struct Meta {
    pool: Amount,
    external_height: u64,
}

fn block_key(height: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(BLOCK_PREFIX.len() + 8);
    key.extend_from_slice(BLOCK_PREFIX);
    key.extend_from_slice(&height.to_be_bytes());
    key
}

fn encode<T: BorshSerialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    borsh::to_vec(value).map_err(|e| StorageError::SerializationError {
        reason: e.to_string(),
    })
}

fn decode<T: BorshDeserialize>(bytes: &[u8]) -> Result<T, StorageError> {
    T::try_from_slice(bytes).map_err(|e| StorageError::DeserializationError {
        reason: e.to_string(),
    })
}

/// A change to one stored block.
#[derive(Debug, Clone, Copy)]
pub enum BlockChange<'a> {
    /// The block now at this height.
    Connect(&'a BlockRecord),
    /// No block at this height any more.
    Disconnect(u64),
}

/// One collection of engine state, stored whole under its own key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateRecord {
    Validators(Vec<Validator>),
    Auths(Vec<Auth>),
    Pending(Vec<PendingAnchor>),
    Anchors(Vec<Anchor>),
    Votes(Vec<RewardVote>),
    Rewards(Vec<RewardRecord>),
    Meta { pool: Amount, external_height: u64 },
}

impl StateRecord {
    fn to_op(&self) -> Result<BatchOp, StorageError> {
        let (key, value) = match self {
            StateRecord::Validators(v) => (VALIDATORS_KEY, encode(v)?),
            StateRecord::Auths(v) => (AUTHS_KEY, encode(v)?),
            StateRecord::Pending(v) => (PENDING_KEY, encode(v)?),
            StateRecord::Anchors(v) => (ANCHORS_KEY, encode(v)?),
            StateRecord::Votes(v) => (VOTES_KEY, encode(v)?),
            StateRecord::Rewards(v) => (REWARDS_KEY, encode(v)?),
            StateRecord::Meta {
                pool,
                external_height,
            } => (
                META_KEY,
                encode(&Meta {
                    pool: *pool,
                    external_height: *external_height,
                })?,
            ),
        };
        Ok(BatchOp::Put {
            key: key.to_vec(),
            value,
        })
    }
}

/// Persists the anchor engine state.
///
/// Blocks live one per key, indexed by big-endian height. Every other
/// collection is a single record, so a change writes the blocks it touched
/// plus the collections that changed, never the whole chain.
pub struct AnchorStore<S: KvStore> {
    store: S,
}

impl<S: KvStore> AnchorStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Access the underlying key-value store.
    pub fn inner(&self) -> &S {
        &self.store
    }

    /// Write a complete snapshot into an empty store.
    pub fn save_snapshot(&self, snapshot: &AnchorSnapshot) -> Result<(), StorageError> {
        let blocks: Vec<BlockChange<'_>> = snapshot.blocks.iter().map(BlockChange::Connect).collect();
        let records = [
            StateRecord::Validators(snapshot.validators.clone()),
            StateRecord::Auths(snapshot.auths.clone()),
            StateRecord::Pending(snapshot.pending.clone()),
            StateRecord::Anchors(snapshot.anchors.clone()),
            StateRecord::Votes(snapshot.votes.clone()),
            StateRecord::Rewards(snapshot.rewards.clone()),
            StateRecord::Meta {
                pool: snapshot.pool,
                external_height: snapshot.external_height,
            },
        ];
        self.save_changes(&blocks, &records)?;
        Ok(())
    }

    /// Apply block changes and replace the given state records in one batch.
    /// Returns the number of ops written.
    pub fn save_changes(
        &self,
        blocks: &[BlockChange<'_>],
        records: &[StateRecord],
    ) -> Result<usize, StorageError> {
        let mut ops = Vec::with_capacity(blocks.len() + records.len() + 1);
        ops.push(BatchOp::Put {
            key: SCHEMA_KEY.to_vec(),
            value: SCHEMA_VERSION.to_be_bytes().to_vec(),
        });
        for change in blocks {
            ops.push(match change {
                BlockChange::Connect(record) => BatchOp::Put {
                    key: block_key(record.height()),
                    value: encode(*record)?,
                },
                BlockChange::Disconnect(height) => BatchOp::Delete {
                    key: block_key(*height),
                },
            });
        }
        for record in records {
            ops.push(record.to_op()?);
        }
        let count = ops.len();
        self.store.write_batch(ops)?;
        tracing::trace!(
            blocks = blocks.len(),
            records = records.len(),
            "anchor state saved"
        );
        Ok(count)
    }

    /// Load a single stored block.
    pub fn load_block(&self, height: u64) -> Result<Option<BlockRecord>, StorageError> {
        self.store
            .get(&block_key(height))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Load the persisted snapshot, or `None` for an empty store.
    pub fn load_snapshot(&self) -> Result<Option<AnchorSnapshot>, StorageError> {
        let Some(version) = self.store.get(SCHEMA_KEY)? else {
            return Ok(None);
        };
        let found = <[u8; 4]>::try_from(version.as_slice())
            .map(u32::from_be_bytes)
            .map_err(|_| StorageError::DeserializationError {
                reason: "schema version is not 4 bytes".to_string(),
            })?;
        if found != SCHEMA_VERSION {
            return Err(StorageError::SchemaMismatch {
                found,
                expected: SCHEMA_VERSION,
            });
        }

        let meta: Meta = match self.store.get(META_KEY)? {
            Some(bytes) => decode(&bytes)?,
            None => {
                return Err(StorageError::ReadError {
                    reason: "missing anchor metadata".to_string(),
                })
            }
        };

        let blocks = self
            .store
            .prefix_scan(BLOCK_PREFIX)?
            .iter()
            .map(|(_, v)| decode(v))
            .collect::<Result<Vec<BlockRecord>, _>>()?;

        Ok(Some(AnchorSnapshot {
            blocks,
            validators: self.load_record(VALIDATORS_KEY)?,
            auths: self.load_record(AUTHS_KEY)?,
            pending: self.load_record(PENDING_KEY)?,
            anchors: self.load_record(ANCHORS_KEY)?,
            votes: self.load_record(VOTES_KEY)?,
            rewards: self.load_record(REWARDS_KEY)?,
            pool: meta.pool,
            external_height: meta.external_height,
        }))
    }

    fn load_record<T: BorshDeserialize>(&self, key: &[u8]) -> Result<Vec<T>, StorageError> {
        match self.store.get(key)? {
            Some(bytes) => decode(&bytes),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::sqlite::SqliteStore;
    use cairn_types::chain::LocalBlock;
    use std::sync::Arc;

    fn make_block(height: u64) -> BlockRecord {
        BlockRecord {
            block: LocalBlock {
                height,
                hash: [height as u8; 32],
                prev_hash: [height.saturating_sub(1) as u8; 32],
                timestamp: 1_000 + height,
                validator_updates: vec![],
                anchor_reward: None,
            },
            pool_after: height as u128 * 10_000_000,
        }
    }

    fn make_snapshot(blocks: u64) -> AnchorSnapshot {
        AnchorSnapshot {
            blocks: (0..blocks).map(make_block).collect(),
            validators: vec![Validator {
                pubkey: [1u8; 32],
                address: [2u8; 20],
                registered_at: 0,
                resigned_at: None,
            }],
            pending: vec![PendingAnchor {
                external_tx_hash: [9u8; 32],
                external_block_height: 3,
                local_block_height: 15,
                local_block_hash: [15u8; 32],
                reward_address: [4u8; 20],
                signature_count: 2,
                creation_height: 45,
                confirmations: 1,
            }],
            pool: 30_000_000,
            external_height: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_store_loads_none() {
        let store = AnchorStore::new(MemoryStore::new());
        assert!(store.load_snapshot().unwrap().is_none());
    }

    #[test]
    fn test_save_load_roundtrip_preserves_block_order() {
        let store = AnchorStore::new(MemoryStore::new());
        // 300 blocks so that height keys cross a byte boundary.
        let snapshot = make_snapshot(300);
        store.save_snapshot(&snapshot).unwrap();
        let loaded = store.load_snapshot().unwrap().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_block_change_touches_only_that_block() {
        let kv = Arc::new(MemoryStore::new());
        let store = AnchorStore::new(Arc::clone(&kv));
        let mut snapshot = make_snapshot(10);
        store.save_snapshot(&snapshot).unwrap();
        let stored_five = kv.get(&block_key(5)).unwrap();

        let next = make_block(10);
        let ops = store
            .save_changes(
                &[BlockChange::Connect(&next), BlockChange::Disconnect(9)],
                &[StateRecord::Meta {
                    pool: 0,
                    external_height: 4,
                }],
            )
            .unwrap();
        // Schema, two blocks and the meta record.
        assert_eq!(ops, 4);
        assert_eq!(kv.get(&block_key(5)).unwrap(), stored_five);
        assert!(store.load_block(9).unwrap().is_none());
        assert_eq!(store.load_block(10).unwrap(), Some(next.clone()));

        snapshot.blocks.truncate(9);
        snapshot.blocks.push(next);
        snapshot.pool = 0;
        snapshot.external_height = 4;
        assert_eq!(store.load_snapshot().unwrap().unwrap(), snapshot);
    }

    #[test]
    fn test_state_record_replaces_collection() {
        let store = AnchorStore::new(MemoryStore::new());
        let mut snapshot = make_snapshot(3);
        store.save_snapshot(&snapshot).unwrap();

        store
            .save_changes(&[], &[StateRecord::Pending(vec![])])
            .unwrap();
        snapshot.pending.clear();
        assert_eq!(store.load_snapshot().unwrap().unwrap(), snapshot);
    }

    #[test]
    fn test_schema_mismatch_rejected() {
        let kv = Arc::new(MemoryStore::new());
        let store = AnchorStore::new(Arc::clone(&kv));
        store.save_snapshot(&make_snapshot(2)).unwrap();
        kv.put(SCHEMA_KEY, &99u32.to_be_bytes()).unwrap();
        let err = store.load_snapshot().unwrap_err();
        assert!(matches!(
            err,
            StorageError::SchemaMismatch {
                found: 99,
                expected: SCHEMA_VERSION
            }
        ));
    }

    #[test]
    fn test_sqlite_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anchor.db");
        let snapshot = make_snapshot(20);
        {
            let store = AnchorStore::new(SqliteStore::new(&path).unwrap());
            store.save_snapshot(&snapshot).unwrap();
        }
        let store = AnchorStore::new(SqliteStore::new(&path).unwrap());
        assert_eq!(store.load_snapshot().unwrap().unwrap(), snapshot);
    }
}
