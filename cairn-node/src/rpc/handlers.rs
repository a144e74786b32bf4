use std::sync::Arc;
use tokio::sync::RwLock;

use borsh::BorshDeserialize;
use jsonrpsee::core::async_trait;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::ErrorObjectOwned;

use cairn_anchor::engine::{AnchorEngine, CreateAnchorRequest};
use cairn_anchor::error::AnchorError;
use cairn_anchor::payload::FundingInput;
use cairn_types::anchor::{Auth, ExternalInput, RewardVote};

use super::types::{
    format_coin, parse_coin, AnchorInfo, AuthInfo, CommunityBalancesInfo, CreateAnchorResult,
    FundingInputParam, HealthInfo, PendingAnchorInfo, RewardConfirmInfo, RewardRecordInfo,
    SubmitResult, TeamsInfo, UnrewardedInfo,
};
use crate::genesis::parse_hex32;
use crate::metrics::NodeMetrics;

/// JSON-RPC surface of the anchor subsystem.
#[rpc(server)]
pub trait AnchorRpc {
    /// Build an anchor transaction from the best auth group; optionally submit it.
    #[method(name = "anchor_createAnchor")]
    async fn create_anchor(
        &self,
        inputs: Vec<FundingInputParam>,
        reward_address: String,
        send: Option<bool>,
        fee_per_kb: Option<u64>,
    ) -> Result<CreateAnchorResult, ErrorObjectOwned>;

    /// Submit a raw anchor transaction (hex) as included at the current external height.
    #[method(name = "anchor_submitAnchorTransaction")]
    async fn submit_anchor_transaction(&self, raw: String) -> Result<SubmitResult, ErrorObjectOwned>;

    /// Record a raw anchor transaction (hex) seen in external block `height`.
    #[method(name = "anchor_observeExternalTransaction")]
    async fn observe_external_transaction(
        &self,
        raw: String,
        height: u64,
    ) -> Result<SubmitResult, ErrorObjectOwned>;

    /// Submit an auth (hex-encoded borsh bytes).
    #[method(name = "anchor_submitAuth")]
    async fn submit_auth(&self, auth: String) -> Result<SubmitResult, ErrorObjectOwned>;

    /// Submit a reward vote (hex-encoded borsh bytes).
    #[method(name = "anchor_submitRewardVote")]
    async fn submit_reward_vote(&self, vote: String) -> Result<SubmitResult, ErrorObjectOwned>;

    #[method(name = "anchor_listAuths")]
    async fn list_auths(&self) -> Result<Vec<AuthInfo>, ErrorObjectOwned>;

    #[method(name = "anchor_listPendingAnchors")]
    async fn list_pending_anchors(&self) -> Result<Vec<PendingAnchorInfo>, ErrorObjectOwned>;

    #[method(name = "anchor_listAnchors")]
    async fn list_anchors(&self) -> Result<Vec<AnchorInfo>, ErrorObjectOwned>;

    #[method(name = "anchor_listUnrewardedAnchors")]
    async fn list_unrewarded_anchors(&self) -> Result<Vec<UnrewardedInfo>, ErrorObjectOwned>;

    #[method(name = "anchor_listRewardConfirms")]
    async fn list_reward_confirms(&self) -> Result<Vec<RewardConfirmInfo>, ErrorObjectOwned>;

    #[method(name = "anchor_listRewardRecords")]
    async fn list_reward_records(&self) -> Result<Vec<RewardRecordInfo>, ErrorObjectOwned>;

    /// Teams at `height`, or at the tip when omitted.
    #[method(name = "anchor_getAnchorTeams")]
    async fn get_anchor_teams(&self, height: Option<u64>) -> Result<TeamsInfo, ErrorObjectOwned>;

    #[method(name = "anchor_getCommunityBalances")]
    async fn get_community_balances(&self) -> Result<CommunityBalancesInfo, ErrorObjectOwned>;

    /// Move the external chain to `height`; lowering it is an external reorg.
    #[method(name = "anchor_setExternalChainHeight")]
    async fn set_external_chain_height(&self, height: u64) -> Result<SubmitResult, ErrorObjectOwned>;

    #[method(name = "anchor_health")]
    async fn health(&self) -> Result<HealthInfo, ErrorObjectOwned>;

    /// Node metrics in Prometheus text exposition format.
    #[method(name = "anchor_getMetrics")]
    async fn get_metrics(&self) -> Result<String, ErrorObjectOwned>;
}

/// Implementation of the AnchorRpc trait.
pub struct AnchorRpcImpl {
    pub engine: Arc<RwLock<AnchorEngine>>,
    pub metrics: Arc<NodeMetrics>,
}

fn invalid_params(message: impl Into<String>) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(-32602, message.into(), None::<()>)
}

fn rejected(err: AnchorError) -> ErrorObjectOwned {
    match err {
        AnchorError::MalformedPayload { .. } | AnchorError::InvalidParams { .. } => {
            invalid_params(err.to_string())
        }
        other => ErrorObjectOwned::owned(-32000, other.to_string(), None::<()>),
    }
}

fn decode_hex(s: &str, what: &str) -> Result<Vec<u8>, ErrorObjectOwned> {
    hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| invalid_params(format!("invalid {} hex: {}", what, e)))
}

fn parse_address(s: &str) -> Result<[u8; 20], ErrorObjectOwned> {
    let bytes = decode_hex(s, "address")?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| invalid_params(format!("address must be 20 bytes, got {}", b.len())))
}

fn parse_input(param: &FundingInputParam) -> Result<FundingInput, ErrorObjectOwned> {
    let txid = parse_hex32(&param.txid, "txid").map_err(|e| invalid_params(e.to_string()))?;
    let seed = parse_hex32(&param.privkey, "privkey").map_err(|e| invalid_params(e.to_string()))?;
    let amount = parse_coin(&param.amount)
        .and_then(|a| u64::try_from(a).ok())
        .ok_or_else(|| invalid_params(format!("invalid amount '{}'", param.amount)))?;
    Ok(FundingInput {
        input: ExternalInput {
            txid,
            vout: param.vout,
            amount,
        },
        seed,
    })
}

impl AnchorRpcImpl {
    async fn after_mutation(&self) {
        let engine = self.engine.read().await;
        self.metrics.observe(&engine);
    }
}

#[async_trait]
impl AnchorRpcServer for AnchorRpcImpl {
    async fn create_anchor(
        &self,
        inputs: Vec<FundingInputParam>,
        reward_address: String,
        send: Option<bool>,
        fee_per_kb: Option<u64>,
    ) -> Result<CreateAnchorResult, ErrorObjectOwned> {
        let request = CreateAnchorRequest {
            inputs: inputs.iter().map(parse_input).collect::<Result<_, _>>()?,
            reward_address: parse_address(&reward_address)?,
            send: send.unwrap_or(true),
            fee_per_kb,
        };
        let created = self
            .engine
            .write()
            .await
            .create_anchor(request)
            .map_err(rejected)?;
        self.after_mutation().await;
        Ok(CreateAnchorResult {
            txid: hex::encode(created.tx_hash),
            hex: hex::encode(&created.raw),
            fee: format_coin(created.transaction.fee as u128),
            sent: created.sent,
        })
    }

    async fn submit_anchor_transaction(&self, raw: String) -> Result<SubmitResult, ErrorObjectOwned> {
        let bytes = decode_hex(&raw, "transaction")?;
        let outcome = self
            .engine
            .write()
            .await
            .submit_anchor_transaction(&bytes)
            .map_err(rejected)?;
        self.after_mutation().await;
        Ok(SubmitResult::observed(outcome))
    }

    async fn observe_external_transaction(
        &self,
        raw: String,
        height: u64,
    ) -> Result<SubmitResult, ErrorObjectOwned> {
        let bytes = decode_hex(&raw, "transaction")?;
        let outcome = self
            .engine
            .write()
            .await
            .observe_external_transaction(&bytes, height)
            .map_err(rejected)?;
        self.after_mutation().await;
        Ok(SubmitResult::observed(outcome))
    }

    async fn submit_auth(&self, auth: String) -> Result<SubmitResult, ErrorObjectOwned> {
        let bytes = decode_hex(&auth, "auth")?;
        let auth = Auth::try_from_slice(&bytes)
            .map_err(|e| invalid_params(format!("invalid auth: {}", e)))?;
        self.engine
            .write()
            .await
            .submit_auth(auth)
            .map_err(rejected)?;
        Ok(SubmitResult::ok())
    }

    async fn submit_reward_vote(&self, vote: String) -> Result<SubmitResult, ErrorObjectOwned> {
        let bytes = decode_hex(&vote, "vote")?;
        let vote = RewardVote::try_from_slice(&bytes)
            .map_err(|e| invalid_params(format!("invalid vote: {}", e)))?;
        let fresh = self
            .engine
            .write()
            .await
            .submit_reward_vote(vote)
            .map_err(rejected)?;
        Ok(SubmitResult {
            success: true,
            reason: (!fresh).then(|| "already known".to_string()),
        })
    }

    async fn list_auths(&self) -> Result<Vec<AuthInfo>, ErrorObjectOwned> {
        let engine = self.engine.read().await;
        Ok(engine.list_auths().into_iter().map(AuthInfo::from).collect())
    }

    async fn list_pending_anchors(&self) -> Result<Vec<PendingAnchorInfo>, ErrorObjectOwned> {
        let engine = self.engine.read().await;
        Ok(engine
            .list_pending_anchors()
            .into_iter()
            .map(PendingAnchorInfo::from)
            .collect())
    }

    async fn list_anchors(&self) -> Result<Vec<AnchorInfo>, ErrorObjectOwned> {
        let engine = self.engine.read().await;
        Ok(engine.list_anchors().into_iter().map(AnchorInfo::from).collect())
    }

    async fn list_unrewarded_anchors(&self) -> Result<Vec<UnrewardedInfo>, ErrorObjectOwned> {
        let engine = self.engine.read().await;
        Ok(engine
            .list_unrewarded_anchors()
            .into_iter()
            .map(UnrewardedInfo::from)
            .collect())
    }

    async fn list_reward_confirms(&self) -> Result<Vec<RewardConfirmInfo>, ErrorObjectOwned> {
        let engine = self.engine.read().await;
        Ok(engine
            .list_reward_confirms()
            .into_iter()
            .map(RewardConfirmInfo::from)
            .collect())
    }

    async fn list_reward_records(&self) -> Result<Vec<RewardRecordInfo>, ErrorObjectOwned> {
        let engine = self.engine.read().await;
        Ok(engine
            .list_reward_records()
            .into_iter()
            .map(RewardRecordInfo::from)
            .collect())
    }

    async fn get_anchor_teams(&self, height: Option<u64>) -> Result<TeamsInfo, ErrorObjectOwned> {
        let engine = self.engine.read().await;
        let height = height.unwrap_or_else(|| engine.tip_height());
        if height > engine.tip_height() {
            return Err(invalid_params(format!(
                "height {} is above the tip {}",
                height,
                engine.tip_height()
            )));
        }
        Ok(TeamsInfo::new(height, engine.teams_at(height)))
    }

    async fn get_community_balances(&self) -> Result<CommunityBalancesInfo, ErrorObjectOwned> {
        let engine = self.engine.read().await;
        Ok(engine.community_balances().into())
    }

    async fn set_external_chain_height(&self, height: u64) -> Result<SubmitResult, ErrorObjectOwned> {
        self.engine
            .write()
            .await
            .set_external_height(height)
            .map_err(rejected)?;
        self.after_mutation().await;
        Ok(SubmitResult::ok())
    }

    async fn health(&self) -> Result<HealthInfo, ErrorObjectOwned> {
        let engine = self.engine.read().await;
        Ok(HealthInfo {
            height: engine.tip_height(),
            external_height: engine.external_height(),
            halted: engine.is_halted(),
            halt_reason: engine.halt_reason().map(str::to_string),
            status: if engine.is_halted() { "halted" } else { "ok" }.to_string(),
        })
    }

    async fn get_metrics(&self) -> Result<String, ErrorObjectOwned> {
        self.metrics
            .encode()
            .map_err(|e| ErrorObjectOwned::owned(-32603, e.to_string(), None::<()>))
    }
}
