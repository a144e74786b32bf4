use serde::{Deserialize, Serialize};

use cairn_anchor::pending::ObserveOutcome;
use cairn_types::anchor::*;
use cairn_types::constants::COIN;
use cairn_types::primitives::Amount;

/// Format a base-unit amount as a decimal coin string with 8 decimals.
pub fn format_coin(amount: Amount) -> String {
    format!("{}.{:08}", amount / COIN, amount % COIN)
}

/// Parse a decimal coin string ("4.6", "4.60000000", "12") into base units.
pub fn parse_coin(s: &str) -> Option<Amount> {
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if frac.len() > 8 || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let whole: Amount = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let frac: Amount = format!("{:0<8}", frac).parse().ok()?;
    whole.checked_mul(COIN)?.checked_add(frac)
}

/// An auth group as listed by `anchor_listAuths`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthInfo {
    pub block_height: u64,
    pub block_hash: String,
    pub creation_height: u64,
    pub signers: usize,
}

impl From<AuthGroup> for AuthInfo {
    fn from(g: AuthGroup) -> Self {
        Self {
            block_height: g.block_height,
            block_hash: hex::encode(g.block_hash),
            creation_height: g.creation_height,
            signers: g.signers,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAnchorInfo {
    pub tx_hash: String,
    pub external_block_height: u64,
    pub local_block_height: u64,
    pub local_block_hash: String,
    pub reward_address: String,
    pub confirmations: u64,
    pub signatures: u32,
    pub anchor_creation_height: u64,
}

impl From<PendingAnchor> for PendingAnchorInfo {
    fn from(p: PendingAnchor) -> Self {
        Self {
            tx_hash: hex::encode(p.external_tx_hash),
            external_block_height: p.external_block_height,
            local_block_height: p.local_block_height,
            local_block_hash: hex::encode(p.local_block_hash),
            reward_address: hex::encode(p.reward_address),
            confirmations: p.confirmations,
            signatures: p.signature_count,
            anchor_creation_height: p.creation_height,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorInfo {
    pub external_block_height: u64,
    pub external_tx_hash: String,
    pub previous_anchor: String,
    pub local_block_height: u64,
    pub local_block_hash: String,
    pub reward_address: String,
    pub confirmations: u64,
    pub signatures: u32,
    pub anchor_creation_height: u64,
    pub active: bool,
}

impl From<Anchor> for AnchorInfo {
    fn from(a: Anchor) -> Self {
        Self {
            external_block_height: a.external_block_height,
            external_tx_hash: hex::encode(a.external_tx_hash),
            previous_anchor: hex::encode(a.previous_anchor_tx_hash),
            local_block_height: a.local_block_height,
            local_block_hash: hex::encode(a.local_block_hash),
            reward_address: hex::encode(a.reward_address),
            confirmations: a.confirmations,
            signatures: a.signature_count,
            anchor_creation_height: a.creation_height,
            active: a.active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnrewardedInfo {
    pub local_height: u64,
    pub local_hash: String,
    pub external_height: u64,
    pub external_hash: String,
}

impl From<UnrewardedAnchor> for UnrewardedInfo {
    fn from(u: UnrewardedAnchor) -> Self {
        Self {
            local_height: u.local_height,
            local_hash: hex::encode(u.local_hash),
            external_height: u.external_height,
            external_hash: hex::encode(u.external_hash),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardConfirmInfo {
    pub anchor_height: u64,
    pub prev_anchor_height: u64,
    pub reward_address: String,
    pub signers: usize,
    pub external_tx_hash: String,
}

impl From<RewardConfirm> for RewardConfirmInfo {
    fn from(c: RewardConfirm) -> Self {
        Self {
            anchor_height: c.local_anchor_height,
            prev_anchor_height: c.previous_anchor_height,
            reward_address: hex::encode(c.reward_address),
            signers: c.signer_count,
            external_tx_hash: hex::encode(c.external_tx_hash),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardRecordInfo {
    #[serde(rename = "AnchorTxHash")]
    pub anchor_tx_hash: String,
    #[serde(rename = "RewardTxHash")]
    pub reward_tx_hash: String,
    #[serde(rename = "localHeight")]
    pub local_height: u64,
}

impl From<RewardRecord> for RewardRecordInfo {
    fn from(r: RewardRecord) -> Self {
        Self {
            anchor_tx_hash: hex::encode(r.anchor_tx_hash),
            reward_tx_hash: hex::encode(r.reward_tx_hash),
            local_height: r.local_height,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamsInfo {
    pub height: u64,
    pub auth: Vec<String>,
    pub confirm: Vec<String>,
}

impl TeamsInfo {
    pub fn new(height: u64, team: AnchorTeam) -> Self {
        Self {
            height,
            auth: team.auth.iter().map(hex::encode).collect(),
            confirm: team.confirm.iter().map(hex::encode).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityBalancesInfo {
    #[serde(rename = "AnchorReward")]
    pub anchor_reward: String,
}

impl From<CommunityBalances> for CommunityBalancesInfo {
    fn from(b: CommunityBalances) -> Self {
        Self {
            anchor_reward: format_coin(b.anchor_reward),
        }
    }
}

/// One external output funding `anchor_createAnchor`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingInputParam {
    pub txid: String,
    pub vout: u32,
    /// Decimal coin amount.
    pub amount: String,
    /// Hex seed of the key owning the output.
    pub privkey: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnchorResult {
    pub txid: String,
    pub hex: String,
    pub fee: String,
    pub sent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResult {
    pub success: bool,
    pub reason: Option<String>,
}

impl SubmitResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            reason: None,
        }
    }

    pub fn observed(outcome: ObserveOutcome) -> Self {
        match outcome {
            ObserveOutcome::Accepted | ObserveOutcome::Updated => Self::ok(),
            ObserveOutcome::AlreadyKnown => Self {
                success: true,
                reason: Some("already known".to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthInfo {
    pub height: u64,
    pub external_height: u64,
    pub halted: bool,
    pub halt_reason: Option<String>,
    pub status: String,
}
