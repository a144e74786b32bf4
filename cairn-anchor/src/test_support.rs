//! Fixtures shared by the unit tests of this crate.

use cairn_crypto::keys::Keypair;
use cairn_types::anchor::{AnchorPayload, AnchorTeam, AnchorTransaction, ExternalInput, SignerSignature};
use cairn_types::chain::{BlockRecord, LocalBlock};
use cairn_types::primitives::*;

use crate::auth::sign_auth;
use crate::chain::{build_block, genesis_block, LocalChain};
use crate::engine::{AnchorEngine, CreateAnchorRequest};
use crate::params::AnchorParams;
use crate::payload::{build_anchor_transaction, FundingInput};
use crate::team::AnchorTeamSelector;
use crate::validators::ValidatorRegistry;

pub const GENESIS_TIME: Timestamp = 1_700_000_000;
/// Eight minutes: 15 blocks are two hours, 30 blocks four.
pub const BLOCK_SECS: Timestamp = 480;

pub fn make_keys(n: usize) -> Vec<Keypair> {
    (0..n)
        .map(|i| Keypair::from_seed(&[i as u8 + 1; 32]))
        .collect()
}

pub fn make_genesis(keys: &[Keypair]) -> LocalBlock {
    let validators: Vec<PublicKey> = keys.iter().map(|k| k.public_key()).collect();
    genesis_block(GENESIS_TIME, &validators).unwrap()
}

/// A chain of `len` blocks (heights 0 to len-1) whose genesis registers
/// `n_validators` validators.
pub fn make_chain(n_validators: usize, len: u64) -> (LocalChain, ValidatorRegistry, Vec<Keypair>) {
    let keys = make_keys(n_validators);
    let genesis = make_genesis(&keys);
    let mut registry = ValidatorRegistry::new();
    registry
        .apply_updates(0, &genesis.validator_updates)
        .unwrap();

    let mut records = vec![BlockRecord {
        block: genesis,
        pool_after: 0,
    }];
    for i in 1..len {
        let parent = &records[records.len() - 1].block;
        let block = build_block(parent, GENESIS_TIME + i * BLOCK_SECS, vec![], None).unwrap();
        records.push(BlockRecord {
            block,
            pool_after: 0,
        });
    }
    (LocalChain::from_records(records).unwrap(), registry, keys)
}

/// Eight validators, a 46-block chain and the auth team at height 45.
pub struct AuthScenario {
    pub chain: LocalChain,
    pub team: AnchorTeam,
    pub params: AnchorParams,
    pub keys: Vec<Keypair>,
}

impl AuthScenario {
    pub fn new() -> Self {
        let (chain, registry, keys) = make_chain(8, 46);
        let params = AnchorParams::default();
        let selector = AnchorTeamSelector::new(
            params.auth_team_size,
            params.confirm_team_size,
            params.team_rotation_interval,
        );
        let team = selector.teams_at(45, &chain, &registry);
        Self {
            chain,
            team,
            params,
            keys,
        }
    }

    /// An anchor transaction for block 15 created at 45, carrying `n_auths`
    /// auth-team signatures.
    pub fn transaction(&self, n_auths: usize) -> AnchorTransaction {
        self.transaction_with_previous(n_auths, ZERO_HASH)
    }

    /// Like `transaction`, naming `previous_anchor` as the predecessor.
    pub fn transaction_with_previous(&self, n_auths: usize, previous_anchor: Hash) -> AnchorTransaction {
        let hash = self.chain.hash_at(15).unwrap();
        let auths: Vec<SignerSignature> = self
            .keys
            .iter()
            .filter(|k| self.team.is_auth_member(&k.public_key()))
            .take(n_auths)
            .map(|k| {
                let auth = sign_auth(k, 15, hash, 45);
                SignerSignature {
                    signer: auth.signer,
                    signature: auth.signature,
                }
            })
            .collect();
        let payload = AnchorPayload {
            local_block_height: 15,
            local_block_hash: hash,
            creation_height: 45,
            previous_anchor,
            reward_address: [9u8; 20],
            auths,
        };
        build_anchor_transaction(&[make_funding([0x11; 32])], payload, 1000).unwrap()
    }
}

pub fn make_funding(txid: Hash) -> FundingInput {
    FundingInput {
        input: ExternalInput {
            txid,
            vout: 0,
            amount: 1_000_000,
        },
        seed: [0xF0; 32],
    }
}

pub fn make_request(reward_address: Address, send: bool) -> CreateAnchorRequest {
    CreateAnchorRequest {
        inputs: vec![make_funding([0x11; 32])],
        reward_address,
        send,
        fee_per_kb: None,
    }
}

/// An engine with `n` genesis validators and their keys.
pub fn make_engine(n: usize) -> (AnchorEngine, Vec<Keypair>) {
    let keys = make_keys(n);
    let engine = AnchorEngine::new(AnchorParams::default(), make_genesis(&keys)).unwrap();
    (engine, keys)
}

/// Every validator signs whatever auth it is due.
pub fn auth_all(engine: &mut AnchorEngine, keys: &[Keypair]) {
    for key in keys {
        engine.produce_auth(key).unwrap();
    }
}

/// Every validator votes for the head of the unrewarded list if it can.
pub fn vote_all(engine: &mut AnchorEngine, keys: &[Keypair]) {
    for key in keys {
        engine.produce_reward_vote(key).unwrap();
    }
}

/// Connect `n` blocks spaced `BLOCK_SECS` apart, producing auths after each.
pub fn mine(engine: &mut AnchorEngine, keys: &[Keypair], n: usize) {
    for _ in 0..n {
        let timestamp = engine.tip().unwrap().timestamp + BLOCK_SECS;
        let block = engine.propose_block(timestamp, vec![]).unwrap();
        engine.connect_block(block).unwrap();
        auth_all(engine, keys);
    }
}

/// Mine to 45, commit an anchor for block 15 at external height 15, promote
/// it, and raise the external chain to 20 so that it is active.
pub fn anchor_at_15(engine: &mut AnchorEngine, keys: &[Keypair]) -> Hash {
    mine(engine, keys, 45);
    engine.set_external_height(15).unwrap();
    let created = engine.create_anchor(make_request([9u8; 20], true)).unwrap();
    mine(engine, keys, 1);
    engine.set_external_height(20).unwrap();
    assert_eq!(
        engine.active_anchor().map(|a| a.external_tx_hash),
        Some(created.tx_hash)
    );
    created.tx_hash
}
