use serde::{Deserialize, Serialize};

use cairn_types::constants::*;

use crate::error::AnchorError;

/// Rule applied when two winning candidates at one local height have equal
/// signature counts. The lowest external tx hash decides any remaining tie.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    #[default]
    EarliestExternalHeight,
    LatestExternalHeight,
}

/// Tunable policy of the anchor subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorParams {
    pub anchor_frequency: u64,
    pub min_anchor_age_secs: u64,
    pub auth_team_size: usize,
    pub confirm_team_size: usize,
    pub quorum: usize,
    pub promote_depth: u64,
    pub activate_depth: u64,
    pub team_rotation_interval: u64,
    /// Pool accrual per local block, in base units.
    pub reward_per_block: u64,
    /// Default external fee rate for `create_anchor`, per 1000 bytes.
    pub fee_per_kb: u64,
    pub tie_break: TieBreak,
}

impl Default for AnchorParams {
    fn default() -> Self {
        Self {
            anchor_frequency: ANCHOR_FREQUENCY,
            min_anchor_age_secs: MIN_ANCHOR_AGE_SECS,
            auth_team_size: AUTH_TEAM_SIZE,
            confirm_team_size: CONFIRM_TEAM_SIZE,
            quorum: ANCHOR_QUORUM,
            promote_depth: PROMOTE_DEPTH,
            activate_depth: ACTIVATE_DEPTH,
            team_rotation_interval: TEAM_ROTATION_INTERVAL,
            reward_per_block: ANCHOR_REWARD_PER_BLOCK as u64,
            fee_per_kb: DEFAULT_FEE_PER_KB,
            tie_break: TieBreak::default(),
        }
    }
}

impl AnchorParams {
    /// Reject parameter sets the engine cannot operate with.
    pub fn validate(&self) -> Result<(), AnchorError> {
        let fail = |reason: &str| {
            Err(AnchorError::InvalidParams {
                reason: reason.to_string(),
            })
        };
        if self.anchor_frequency == 0 {
            return fail("anchor_frequency must be positive");
        }
        if self.team_rotation_interval == 0 {
            return fail("team_rotation_interval must be positive");
        }
        if self.quorum == 0 {
            return fail("quorum must be positive");
        }
        if self.quorum > self.auth_team_size || self.quorum > self.confirm_team_size {
            return fail("quorum exceeds team size");
        }
        if self.promote_depth == 0 {
            return fail("promote_depth must be at least 1");
        }
        if self.activate_depth <= self.promote_depth {
            return fail("activate_depth must be greater than promote_depth");
        }
        Ok(())
    }

    pub fn reward_per_block(&self) -> cairn_types::primitives::Amount {
        self.reward_per_block as u128
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let params = AnchorParams::default();
        params.validate().unwrap();
        assert_eq!(params.reward_per_block(), COIN / 10);
    }

    #[test]
    fn test_activate_must_exceed_promote() {
        let params = AnchorParams {
            promote_depth: 6,
            activate_depth: 6,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(AnchorError::InvalidParams { .. })
        ));
    }

    #[test]
    fn test_quorum_bounded_by_team() {
        let params = AnchorParams {
            quorum: 4,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let params: AnchorParams =
            serde_json::from_str(r#"{"activate_depth": 10, "tie_break": "latest_external_height"}"#)
                .unwrap();
        assert_eq!(params.activate_depth, 10);
        assert_eq!(params.tie_break, TieBreak::LatestExternalHeight);
        assert_eq!(params.anchor_frequency, ANCHOR_FREQUENCY);
    }
}
