use std::sync::Arc;

use cairn_crypto::keys::Keypair;
use cairn_storage::anchor_store::{AnchorStore, BlockChange, StateRecord};
use cairn_storage::traits::KvStore;
use cairn_types::anchor::*;
use cairn_types::chain::{BlockRecord, LocalBlock, ValidatorUpdate};
use cairn_types::primitives::*;
use cairn_types::snapshot::AnchorSnapshot;

use crate::auth::{check_eligible, sign_auth, AuthLedger};
use crate::chain::{build_block, compute_block_hash, LocalChain};
use crate::confirmation::ConfirmationEngine;
use crate::error::AnchorError;
use crate::params::AnchorParams;
use crate::payload::{
    build_anchor_transaction, decode_transaction, encode_transaction, transaction_hash,
    FundingInput,
};
use crate::payout::{reward_transaction_hash, validate_reward, CommunityRewardPool, RewardLedger};
use crate::pending::{validate_transaction, ObserveOutcome, PendingAnchorTracker};
use crate::registry::{AnchorRegistry, RecomputeSummary};
use crate::team::AnchorTeamSelector;
use crate::validators::ValidatorRegistry;
use crate::voter::{previous_anchor_height, sign_vote, RewardConfirmVoter};

/// Parameters of `AnchorEngine::create_anchor`.
pub struct CreateAnchorRequest {
    pub inputs: Vec<FundingInput>,
    pub reward_address: Address,
    /// Also submit the transaction locally once built.
    pub send: bool,
    /// Overrides the configured fee rate.
    pub fee_per_kb: Option<u64>,
}

/// A persisted collection of engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatePart {
    Validators,
    Auths,
    Pending,
    Anchors,
    Votes,
    Rewards,
    Meta,
}

impl StatePart {
    pub(crate) const ALL: [StatePart; 7] = [
        StatePart::Validators,
        StatePart::Auths,
        StatePart::Pending,
        StatePart::Anchors,
        StatePart::Votes,
        StatePart::Rewards,
        StatePart::Meta,
    ];

    /// Everything a refresh after an external height change can touch.
    pub(crate) const DERIVED: [StatePart; 5] = [
        StatePart::Auths,
        StatePart::Pending,
        StatePart::Anchors,
        StatePart::Votes,
        StatePart::Meta,
    ];
}

/// A built anchor transaction.
#[derive(Debug, Clone)]
pub struct CreatedAnchor {
    pub tx_hash: Hash,
    pub raw: Vec<u8>,
    pub transaction: AnchorTransaction,
    pub sent: bool,
}

/// The anchor consensus state machine of one node.
///
/// Every mutation happens at a block connection, a block disconnection, an
/// external height change, or an explicit submission, and is written through
/// to the attached store once it succeeded.
pub struct AnchorEngine {
    pub(crate) params: AnchorParams,
    pub(crate) confirmation: ConfirmationEngine,
    pub(crate) chain: LocalChain,
    pub(crate) validators: ValidatorRegistry,
    pub(crate) teams: AnchorTeamSelector,
    pub(crate) auths: AuthLedger,
    pub(crate) pending: PendingAnchorTracker,
    pub(crate) registry: AnchorRegistry,
    pub(crate) voter: RewardConfirmVoter,
    pub(crate) rewards: RewardLedger,
    pub(crate) pool: CommunityRewardPool,
    pub(crate) external_height: u64,
    pub(crate) halted: Option<String>,
    pub(crate) store: Option<AnchorStore<Arc<dyn KvStore>>>,
}

impl AnchorEngine {
    /// Create an engine holding only `genesis`.
    pub fn new(params: AnchorParams, genesis: LocalBlock) -> Result<Self, AnchorError> {
        params.validate()?;
        if genesis.height != 0
            || genesis.prev_hash != ZERO_HASH
            || genesis.anchor_reward.is_some()
            || compute_block_hash(&genesis)? != genesis.hash
        {
            return Err(AnchorError::InvalidBlock {
                reason: "malformed genesis block".to_string(),
            });
        }
        let mut validators = ValidatorRegistry::new();
        validators.apply_updates(0, &genesis.validator_updates)?;
        let chain = LocalChain::from_records(vec![BlockRecord {
            block: genesis,
            pool_after: 0,
        }])?;
        Ok(Self::assemble(params, chain, validators))
    }

    fn assemble(params: AnchorParams, chain: LocalChain, validators: ValidatorRegistry) -> Self {
        Self {
            confirmation: ConfirmationEngine::new(&params),
            teams: AnchorTeamSelector::new(
                params.auth_team_size,
                params.confirm_team_size,
                params.team_rotation_interval,
            ),
            pool: CommunityRewardPool::new(
                chain.tip().map(|r| r.pool_after).unwrap_or(0),
                params.reward_per_block(),
            ),
            params,
            chain,
            validators,
            auths: AuthLedger::new(),
            pending: PendingAnchorTracker::new(),
            registry: AnchorRegistry::new(),
            voter: RewardConfirmVoter::new(),
            rewards: RewardLedger::new(),
            external_height: 0,
            halted: None,
            store: None,
        }
    }

    /// Open an engine backed by `store`, resuming persisted state if present.
    pub fn open(
        params: AnchorParams,
        genesis: LocalBlock,
        store: Arc<dyn KvStore>,
    ) -> Result<Self, AnchorError> {
        let store = AnchorStore::new(store);
        let (mut engine, fresh) = match store.load_snapshot()? {
            Some(snapshot) => {
                let engine = Self::from_snapshot(params, snapshot)?;
                if engine.chain.hash_at(0) != Some(genesis.hash) {
                    return Err(AnchorError::InvalidParams {
                        reason: "stored chain has a different genesis".to_string(),
                    });
                }
                tracing::info!(
                    height = engine.tip_height(),
                    external_height = engine.external_height,
                    anchors = engine.registry.len(),
                    "resumed anchor state"
                );
                (engine, false)
            }
            None => (Self::new(params, genesis)?, true),
        };
        if fresh {
            store.save_snapshot(&engine.snapshot())?;
        }
        engine.store = Some(store);
        if !fresh {
            // Loading recomputes derived views, which may prune stale entries.
            engine.persist(&StatePart::DERIVED)?;
        }
        Ok(engine)
    }

    /// Rebuild an engine from persisted state; derived views are recomputed.
    pub fn from_snapshot(params: AnchorParams, snapshot: AnchorSnapshot) -> Result<Self, AnchorError> {
        params.validate()?;
        let chain = LocalChain::from_records(snapshot.blocks)?;
        if chain.tip().is_none() {
            return Err(AnchorError::InvalidBlock {
                reason: "stored chain has no genesis".to_string(),
            });
        }
        let mut engine = Self::assemble(
            params,
            chain,
            ValidatorRegistry::from_records(snapshot.validators),
        );
        engine.auths = AuthLedger::from_auths(snapshot.auths);
        engine.pending = PendingAnchorTracker::from_entries(snapshot.pending);
        engine.registry = AnchorRegistry::from_anchors(snapshot.anchors);
        engine.voter = RewardConfirmVoter::from_votes(snapshot.votes);
        engine.rewards = RewardLedger::from_records(snapshot.rewards);
        engine.pool.restore(snapshot.pool);
        engine.external_height = snapshot.external_height;
        engine.refresh();
        engine.registry.verify_lineage(&engine.rewards)?;
        Ok(engine)
    }

    /// Capture the persistent state.
    pub fn snapshot(&self) -> AnchorSnapshot {
        AnchorSnapshot {
            blocks: self.chain.records().to_vec(),
            validators: self.validators.records(),
            auths: self.auths.auths(),
            pending: self.pending.list(),
            anchors: self.registry.list(),
            votes: self.voter.votes(),
            rewards: self.rewards.list(),
            pool: self.pool.balance(),
            external_height: self.external_height,
        }
    }

    fn state_record(&self, part: StatePart) -> StateRecord {
        match part {
            StatePart::Validators => StateRecord::Validators(self.validators.records()),
            StatePart::Auths => StateRecord::Auths(self.auths.auths()),
            StatePart::Pending => StateRecord::Pending(self.pending.list()),
            StatePart::Anchors => StateRecord::Anchors(self.registry.list()),
            StatePart::Votes => StateRecord::Votes(self.voter.votes()),
            StatePart::Rewards => StateRecord::Rewards(self.rewards.list()),
            StatePart::Meta => StateRecord::Meta {
                pool: self.pool.balance(),
                external_height: self.external_height,
            },
        }
    }

    /// Write the given state collections to the attached store.
    pub(crate) fn persist(&self, parts: &[StatePart]) -> Result<(), AnchorError> {
        self.persist_blocks(std::iter::empty::<u64>(), parts)
    }

    /// Write the blocks at `heights` as they now stand, deleting heights
    /// above the tip, together with the given state collections.
    pub(crate) fn persist_blocks(
        &self,
        heights: impl Iterator<Item = u64>,
        parts: &[StatePart],
    ) -> Result<(), AnchorError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let blocks: Vec<BlockChange<'_>> = heights
            .map(|height| match self.chain.get(height) {
                Some(record) => BlockChange::Connect(record),
                None => BlockChange::Disconnect(height),
            })
            .collect();
        let records: Vec<StateRecord> = parts.iter().map(|p| self.state_record(*p)).collect();
        store.save_changes(&blocks, &records)?;
        Ok(())
    }

    pub(crate) fn ensure_running(&self) -> Result<(), AnchorError> {
        match &self.halted {
            Some(reason) => Err(AnchorError::Halted {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Stop applying state after a fatal inconsistency.
    pub(crate) fn halt(&mut self, reason: String) -> AnchorError {
        tracing::error!(reason = %reason, "anchor engine halted");
        self.halted = Some(reason.clone());
        AnchorError::RollbackInconsistency { reason }
    }

    /// Recompute every derived view after a state change.
    pub(crate) fn refresh(&mut self) -> RecomputeSummary {
        self.pending.recompute(self.external_height);
        let summary = self.registry.recompute(
            self.external_height,
            &self.chain,
            &self.rewards,
            &self.confirmation,
        );
        let team = self.anchor_teams();
        let dropped = self.voter.revalidate(&self.registry, &team);
        let pruned = self.auths.drop_orphaned(&self.chain)
            + self.auths.prune_below(self.registry.active_height());

        if summary.active_changed() {
            match self.registry.active() {
                Some(active) => tracing::info!(
                    local_height = active.local_block_height,
                    external_height = active.external_block_height,
                    tx = %hex::encode(active.external_tx_hash),
                    "anchor activated"
                ),
                None => tracing::info!("no active anchor"),
            }
        }
        if dropped > 0 || pruned > 0 {
            tracing::debug!(votes = dropped, auths = pruned, "discarded stale anchor data");
        }
        summary
    }

    // ─── Queries ─────────────────────────────────────────────────────────────

    pub fn params(&self) -> &AnchorParams {
        &self.params
    }

    pub fn tip_height(&self) -> u64 {
        self.chain.tip_height()
    }

    pub fn tip(&self) -> Option<&LocalBlock> {
        self.chain.tip().map(|r| &r.block)
    }

    pub fn block(&self, height: u64) -> Option<&LocalBlock> {
        self.chain.get(height).map(|r| &r.block)
    }

    pub fn external_height(&self) -> u64 {
        self.external_height
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    pub fn halt_reason(&self) -> Option<&str> {
        self.halted.as_deref()
    }

    /// Validators active at the tip.
    pub fn active_validators(&self) -> Vec<PublicKey> {
        self.validators.active_at(self.tip_height())
    }

    pub fn list_auths(&self) -> Vec<AuthGroup> {
        self.auths.list_groups()
    }

    pub fn list_pending_anchors(&self) -> Vec<PendingAnchor> {
        self.pending.list()
    }

    pub fn list_anchors(&self) -> Vec<Anchor> {
        self.registry.list()
    }

    pub fn active_anchor(&self) -> Option<&Anchor> {
        self.registry.active()
    }

    pub fn list_unrewarded_anchors(&self) -> Vec<UnrewardedAnchor> {
        self.registry.unrewarded().to_vec()
    }

    pub fn list_reward_confirms(&self) -> Vec<RewardConfirm> {
        let team = self.anchor_teams();
        self.voter
            .tally(&self.registry, &team)
            .into_iter()
            .collect()
    }

    pub fn list_reward_records(&self) -> Vec<RewardRecord> {
        self.rewards.list()
    }

    /// Teams at the current tip.
    pub fn anchor_teams(&self) -> AnchorTeam {
        self.teams_at(self.tip_height())
    }

    pub fn teams_at(&self, height: u64) -> AnchorTeam {
        self.teams.teams_at(height, &self.chain, &self.validators)
    }

    pub fn community_balances(&self) -> CommunityBalances {
        CommunityBalances {
            anchor_reward: self.pool.balance(),
        }
    }

    // ─── Auths ───────────────────────────────────────────────────────────────

    /// Validate and store an auth received from a validator.
    pub fn submit_auth(&mut self, auth: Auth) -> Result<(), AnchorError> {
        self.ensure_running()?;
        let team = self.teams_at(auth.creation_height.min(self.tip_height()));
        if let Err(err) = self.auths.validate(
            &auth,
            &self.chain,
            &team,
            self.registry.active_height(),
            &self.params,
        ) {
            tracing::debug!(
                block_height = auth.block_height,
                signer = %hex::encode(auth.signer),
                %err,
                "auth rejected"
            );
            return Err(err);
        }
        tracing::debug!(
            block_height = auth.block_height,
            creation_height = auth.creation_height,
            signer = %hex::encode(auth.signer),
            "auth accepted"
        );
        self.auths.insert(auth);
        self.persist(&[StatePart::Auths])
    }

    /// Sign and store an auth for the best candidate height, if `keypair`
    /// belongs to the auth team and the tip is at an anchoring boundary.
    pub fn produce_auth(&mut self, keypair: &Keypair) -> Result<Option<Auth>, AnchorError> {
        self.ensure_running()?;
        let tip = self.tip_height();
        let frequency = self.params.anchor_frequency;
        if tip == 0 || tip % frequency != 0 {
            return Ok(None);
        }
        let signer = keypair.public_key();
        if !self.anchor_teams().is_auth_member(&signer) {
            return Ok(None);
        }

        let active = self.registry.active_height();
        let mut candidate = None;
        let mut height = tip;
        while height > active && height > 0 {
            if check_eligible(height, tip, &self.chain, &self.params).is_ok() {
                candidate = Some(height);
                break;
            }
            height -= frequency;
        }
        let Some(height) = candidate else {
            return Ok(None);
        };
        let Some(hash) = self.chain.hash_at(height) else {
            return Ok(None);
        };
        if self.auths.contains(height, &hash, &signer) {
            return Ok(None);
        }

        let auth = sign_auth(keypair, height, hash, tip);
        self.submit_auth(auth.clone())?;
        Ok(Some(auth))
    }

    // ─── Anchor transactions ─────────────────────────────────────────────────

    /// Build an anchor transaction from the best auth group reaching quorum.
    pub fn create_anchor(&mut self, request: CreateAnchorRequest) -> Result<CreatedAnchor, AnchorError> {
        self.ensure_running()?;
        let quorum = self.params.quorum;
        let group = self
            .auths
            .best_group(&self.chain, quorum)
            .map_err(|have| AnchorError::QuorumNotMet { have, need: quorum })?;

        let team = self.teams_at(group.creation_height);
        let mut auths: Vec<SignerSignature> = self
            .auths
            .signatures_for(&group)
            .into_iter()
            .filter(|s| team.is_auth_member(&s.signer))
            .collect();
        if auths.len() < quorum {
            return Err(AnchorError::QuorumNotMet {
                have: auths.len(),
                need: quorum,
            });
        }
        auths.truncate(quorum);

        let payload = AnchorPayload {
            local_block_height: group.block_height,
            local_block_hash: group.block_hash,
            creation_height: group.creation_height,
            previous_anchor: self
                .registry
                .expected_previous(group.block_height, &self.rewards),
            reward_address: request.reward_address,
            auths,
        };

        let transaction = build_anchor_transaction(
            &request.inputs,
            payload,
            request.fee_per_kb.unwrap_or(self.params.fee_per_kb),
        )?;
        let raw = encode_transaction(&transaction)?;
        let tx_hash = transaction_hash(&raw);
        tracing::info!(
            local_height = group.block_height,
            creation_height = group.creation_height,
            fee = transaction.fee,
            tx = %hex::encode(tx_hash),
            "anchor transaction created"
        );

        if request.send {
            self.submit_anchor_transaction(&raw)?;
        }
        Ok(CreatedAnchor {
            tx_hash,
            raw,
            transaction,
            sent: request.send,
        })
    }

    /// Accept a raw anchor transaction as included at the current external height.
    pub fn submit_anchor_transaction(&mut self, raw: &[u8]) -> Result<ObserveOutcome, AnchorError> {
        self.observe_external_transaction(raw, self.external_height)
    }

    /// Record an anchor transaction seen in external block `included_at`.
    pub fn observe_external_transaction(
        &mut self,
        raw: &[u8],
        included_at: u64,
    ) -> Result<ObserveOutcome, AnchorError> {
        self.ensure_running()?;
        let tx = decode_transaction(raw)?;
        let tx_hash = transaction_hash(raw);
        if self.registry.contains(&tx_hash) {
            return Ok(ObserveOutcome::AlreadyKnown);
        }

        let team = self.teams_at(tx.payload.creation_height.min(self.tip_height()));
        let expected_previous = self
            .registry
            .expected_previous(tx.payload.local_block_height, &self.rewards);
        let entry = validate_transaction(
            &tx,
            tx_hash,
            self.external_height,
            included_at,
            &self.chain,
            &team,
            expected_previous,
            &self.params,
        )
        .inspect_err(|err| {
            tracing::debug!(tx = %hex::encode(tx_hash), %err, "anchor transaction rejected")
        })?;

        let outcome = self.pending.insert(entry);
        if outcome != ObserveOutcome::AlreadyKnown {
            tracing::info!(
                tx = %hex::encode(tx_hash),
                local_height = tx.payload.local_block_height,
                external_height = included_at,
                ?outcome,
                "anchor transaction pending"
            );
            self.persist(&[StatePart::Pending])?;
        }
        Ok(outcome)
    }

    /// Move the external chain to `height`. Lowering it demotes anchors
    /// included above the new height back to pending.
    pub fn set_external_height(&mut self, height: u64) -> Result<(), AnchorError> {
        self.ensure_running()?;
        if height < self.external_height {
            if let Some(rewarded) = self.registry.list().into_iter().find(|a| {
                a.external_block_height > height && self.rewards.contains(&a.external_tx_hash)
            }) {
                return Err(self.halt(format!(
                    "external reorg to {} orphans rewarded anchor {}",
                    height,
                    hex::encode(rewarded.external_tx_hash)
                )));
            }
            for anchor in self.registry.take_above_external(height) {
                tracing::warn!(
                    tx = %hex::encode(anchor.external_tx_hash),
                    local_height = anchor.local_block_height,
                    "anchor demoted by external reorg"
                );
                self.pending.insert(anchor.into_pending());
            }
            tracing::warn!(from = self.external_height, to = height, "external chain reorganized");
        }
        self.external_height = height;
        self.refresh();
        self.persist(&StatePart::DERIVED)
    }

    // ─── Reward confirms ─────────────────────────────────────────────────────

    /// Validate and store a reward vote. Returns false for a redelivered vote.
    pub fn submit_reward_vote(&mut self, vote: RewardVote) -> Result<bool, AnchorError> {
        self.ensure_running()?;
        let team = self.anchor_teams();
        let signer = vote.signer;
        let fresh = self
            .voter
            .record(vote, &self.registry, &team)
            .inspect_err(|err| {
                tracing::debug!(signer = %hex::encode(signer), %err, "reward vote rejected")
            })?;
        if fresh {
            tracing::debug!(signer = %hex::encode(signer), "reward vote recorded");
            self.persist(&[StatePart::Votes])?;
        }
        Ok(fresh)
    }

    /// Sign and store a vote for the head of the unrewarded list, if
    /// `keypair` belongs to the confirm team and has not voted yet.
    pub fn produce_reward_vote(&mut self, keypair: &Keypair) -> Result<Option<RewardVote>, AnchorError> {
        self.ensure_running()?;
        let signer = keypair.public_key();
        let Some(head) = self.registry.unrewarded_head() else {
            return Ok(None);
        };
        if !self.anchor_teams().is_confirm_member(&signer)
            || self.voter.has_voted(&head.external_tx_hash, &signer)
        {
            return Ok(None);
        }
        let vote = sign_vote(keypair, head, previous_anchor_height(head, &self.registry));
        self.submit_reward_vote(vote.clone())?;
        Ok(Some(vote))
    }

    // ─── Blocks ──────────────────────────────────────────────────────────────

    /// The reward a block built on the current tip must carry, if a confirm
    /// for the head of the unrewarded list has settled.
    pub fn prepare_block_reward(&self) -> Option<RewardTransaction> {
        if self.is_halted() {
            return None;
        }
        let team = self.anchor_teams();
        let confirm = self.voter.tally(&self.registry, &team)?;
        if confirm.signer_count < self.params.quorum {
            return None;
        }
        Some(RewardTransaction {
            anchor_tx_hash: confirm.external_tx_hash,
            reward_address: confirm.reward_address,
            amount: self.pool.balance(),
            confirm_signatures: self
                .voter
                .signatures_for(&confirm.external_tx_hash, &team),
        })
    }

    /// Build the next block on the tip, embedding a settled reward.
    pub fn propose_block(
        &self,
        timestamp: Timestamp,
        validator_updates: Vec<ValidatorUpdate>,
    ) -> Result<LocalBlock, AnchorError> {
        self.ensure_running()?;
        let tip = self.tip().ok_or_else(|| AnchorError::InvalidBlock {
            reason: "chain has no tip".to_string(),
        })?;
        build_block(
            tip,
            timestamp.max(tip.timestamp),
            validator_updates,
            self.prepare_block_reward(),
        )
    }

    /// Connect a block on top of the tip.
    pub fn connect_block(&mut self, block: LocalBlock) -> Result<(), AnchorError> {
        self.ensure_running()?;
        self.apply_block(block)?;
        let tip = self.tip_height();
        self.persist_blocks(std::iter::once(tip), &StatePart::ALL)
    }

    /// Validate and apply `block`. Nothing is mutated when validation fails.
    pub(crate) fn apply_block(&mut self, block: LocalBlock) -> Result<(), AnchorError> {
        let (tip_height, tip_hash, tip_time) = match self.chain.tip() {
            Some(tip) => (tip.height(), tip.hash(), tip.timestamp()),
            None => {
                return Err(AnchorError::InvalidBlock {
                    reason: "chain has no tip".to_string(),
                })
            }
        };
        if block.height != tip_height + 1 {
            return Err(AnchorError::InvalidBlock {
                reason: format!("expected height {}, got {}", tip_height + 1, block.height),
            });
        }
        if block.prev_hash != tip_hash {
            return Err(AnchorError::InvalidBlock {
                reason: "prev_hash does not match tip".to_string(),
            });
        }
        if compute_block_hash(&block)? != block.hash {
            return Err(AnchorError::InvalidBlock {
                reason: "hash mismatch".to_string(),
            });
        }
        if block.timestamp < tip_time {
            return Err(AnchorError::InvalidBlock {
                reason: "timestamp before parent".to_string(),
            });
        }

        let mut validators = self.validators.clone();
        validators.apply_updates(block.height, &block.validator_updates)?;

        let mut pool = self.pool;
        let paid = match &block.anchor_reward {
            Some(reward) => {
                let team = self.teams_at(tip_height);
                let head = self.registry.unrewarded_head();
                let previous = head
                    .map(|a| previous_anchor_height(a, &self.registry))
                    .unwrap_or(0);
                validate_reward(reward, head, previous, pool.balance(), &team, self.params.quorum)?;
                let reward_tx_hash = reward_transaction_hash(reward)?;
                Some((pool.pay_out(), reward_tx_hash))
            }
            None => {
                pool.accrue()?;
                None
            }
        };

        self.validators = validators;
        self.pool = pool;
        if let (Some(reward), Some((amount, reward_tx_hash))) = (&block.anchor_reward, paid) {
            let record = RewardRecord {
                anchor_tx_hash: reward.anchor_tx_hash,
                reward_tx_hash,
                local_height: block.height,
                local_hash: block.hash,
            };
            tracing::info!(
                height = block.height,
                amount = amount as u64,
                anchor = %hex::encode(record.anchor_tx_hash),
                reward_tx = %hex::encode(record.reward_tx_hash),
                "anchor reward paid"
            );
            self.rewards.insert(record);
        }
        let height = block.height;
        self.chain.push(BlockRecord {
            block,
            pool_after: pool.balance(),
        });

        for pending in self.pending.take_promotable(self.confirmation.promote_depth()) {
            tracing::info!(
                tx = %hex::encode(pending.external_tx_hash),
                local_height = pending.local_block_height,
                confirmations = pending.confirmations,
                "anchor promoted"
            );
            self.registry.insert(Anchor::from_pending(pending));
        }
        self.refresh();
        tracing::trace!(height, pool = pool.balance() as u64, "block connected");
        Ok(())
    }
}
