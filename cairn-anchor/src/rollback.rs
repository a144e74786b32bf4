use cairn_types::chain::LocalBlock;

use crate::engine::{AnchorEngine, StatePart};
use crate::error::AnchorError;

/// Outcome of a local chain reorganization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorgSummary {
    /// Last block shared by the old and the new chain.
    pub fork_height: u64,
    pub disconnected: usize,
    pub connected: usize,
    pub tip_height: u64,
}

impl AnchorEngine {
    /// Disconnect the tip block, undoing everything it applied.
    pub fn disconnect_block(&mut self) -> Result<LocalBlock, AnchorError> {
        self.ensure_running()?;
        let block = self.unapply_block()?;
        self.persist_blocks(std::iter::once(block.height), &StatePart::ALL)?;
        Ok(block)
    }

    /// Switch to `branch`, a contiguous run of blocks whose first
    /// non-canonical block forks off the current chain. Blocks already on
    /// the canonical chain are skipped, so replaying a branch is a no-op.
    /// If any new block is rejected the previous chain is restored.
    pub fn reorganize(&mut self, branch: Vec<LocalBlock>) -> Result<ReorgSummary, AnchorError> {
        self.ensure_running()?;
        let Some(first_new) = branch
            .iter()
            .position(|b| !self.chain.is_canonical(b.height, &b.hash))
        else {
            let tip_height = self.tip_height();
            return Ok(ReorgSummary {
                fork_height: tip_height,
                disconnected: 0,
                connected: 0,
                tip_height,
            });
        };
        let new_blocks = &branch[first_new..];
        if new_blocks
            .windows(2)
            .any(|pair| pair[1].height != pair[0].height + 1 || pair[1].prev_hash != pair[0].hash)
        {
            return Err(AnchorError::InvalidBlock {
                reason: "branch is not contiguous".to_string(),
            });
        }

        let first = &new_blocks[0];
        let fork_height = first
            .height
            .checked_sub(1)
            .ok_or_else(|| AnchorError::InvalidBlock {
                reason: "branch replaces genesis".to_string(),
            })?;
        if !self.chain.is_canonical(fork_height, &first.prev_hash) {
            return Err(AnchorError::UnknownBlock {
                height: fork_height,
            });
        }

        let old_tip = self.tip_height();
        let mut disconnected = Vec::new();
        while self.tip_height() > fork_height {
            disconnected.push(self.unapply_block()?);
        }

        for block in new_blocks {
            let height = block.height;
            if let Err(err) = self.apply_block(block.clone()) {
                tracing::warn!(height, %err, "reorg branch rejected, restoring previous chain");
                self.restore_chain(fork_height, &disconnected)?;
                self.persist_blocks(fork_height + 1..=old_tip, &StatePart::ALL)?;
                return Err(err);
            }
        }

        let summary = ReorgSummary {
            fork_height,
            disconnected: disconnected.len(),
            connected: new_blocks.len(),
            tip_height: self.tip_height(),
        };
        tracing::info!(
            fork_height,
            disconnected = summary.disconnected,
            connected = summary.connected,
            tip = summary.tip_height,
            "local chain reorganized"
        );
        let last = old_tip.max(summary.tip_height);
        self.persist_blocks(fork_height + 1..=last, &StatePart::ALL)?;
        Ok(summary)
    }

    /// Undo the tip block: validator updates, the reward it paid and its
    /// pool accrual. Pending anchors and votes are kept.
    pub(crate) fn unapply_block(&mut self) -> Result<LocalBlock, AnchorError> {
        if self.tip_height() == 0 {
            return Err(AnchorError::InvalidBlock {
                reason: "cannot disconnect genesis".to_string(),
            });
        }
        let Some(record) = self.chain.pop() else {
            return Err(AnchorError::InvalidBlock {
                reason: "chain has no tip".to_string(),
            });
        };
        let block = record.block;
        self.validators
            .revert_updates(block.height, &block.validator_updates);

        if let Some(reward) = &block.anchor_reward {
            match self.rewards.remove(&reward.anchor_tx_hash) {
                Some(paid) if paid.local_hash == block.hash => {
                    tracing::info!(
                        height = block.height,
                        anchor = %hex::encode(reward.anchor_tx_hash),
                        "anchor reward rolled back"
                    );
                }
                _ => {
                    return Err(self.halt(format!(
                        "block {} pays anchor {} without a matching reward record",
                        block.height,
                        hex::encode(reward.anchor_tx_hash)
                    )));
                }
            }
        }

        let balance = self.chain.tip().map(|r| r.pool_after).unwrap_or(0);
        self.pool.restore(balance);
        self.teams.invalidate();
        self.refresh();
        if let Err(err) = self.registry.verify_lineage(&self.rewards) {
            return Err(self.halt(err.to_string()));
        }
        tracing::debug!(height = block.height, "block disconnected");
        Ok(block)
    }

    /// Reconnect the blocks disconnected above `fork_height`, tip first in `old`.
    fn restore_chain(&mut self, fork_height: u64, old: &[LocalBlock]) -> Result<(), AnchorError> {
        while self.tip_height() > fork_height {
            self.unapply_block()?;
        }
        for block in old.iter().rev() {
            let height = block.height;
            if let Err(err) = self.apply_block(block.clone()) {
                return Err(self.halt(format!("cannot restore block {}: {}", height, err)));
            }
        }
        Ok(())
    }
}
