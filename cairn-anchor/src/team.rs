use std::collections::BTreeMap;
use std::sync::Mutex;

use cairn_crypto::hash::blake3_hash_domain;
use cairn_types::anchor::AnchorTeam;
use cairn_types::primitives::*;

use crate::chain::LocalChain;
use crate::validators::ValidatorRegistry;

const TEAM_DOMAIN: &str = "cairn anchor team v1";

/// Memoized epochs kept before the oldest entry is evicted.
const TEAM_CACHE_CAPACITY: usize = 64;

/// First height of the rotation epoch containing `height`.
pub fn epoch_start(height: u64, interval: u64) -> u64 {
    if interval == 0 {
        return height;
    }
    height - height % interval
}

/// Pick `size` members from `validators` for `role` in the epoch starting at `epoch`.
///
/// Each validator is scored by a domain-separated hash of its key, the epoch
/// and the role; the lowest scores win. The result is sorted by key and does
/// not depend on the order of `validators`.
fn select(validators: &[PublicKey], epoch: u64, role: &[u8], size: usize) -> Vec<PublicKey> {
    let mut scored: Vec<(Hash, PublicKey)> = validators
        .iter()
        .map(|pk| {
            let mut data = Vec::with_capacity(32 + 8 + role.len());
            data.extend_from_slice(pk);
            data.extend_from_slice(&epoch.to_le_bytes());
            data.extend_from_slice(role);
            (blake3_hash_domain(TEAM_DOMAIN, &data), *pk)
        })
        .collect();
    scored.sort();
    scored.dedup_by(|a, b| a.1 == b.1);
    let mut team: Vec<PublicKey> = scored.into_iter().take(size).map(|(_, pk)| pk).collect();
    team.sort();
    team
}

/// Derive both teams from an active validator set.
pub fn derive_teams(
    validators: &[PublicKey],
    epoch: u64,
    auth_size: usize,
    confirm_size: usize,
) -> AnchorTeam {
    AnchorTeam {
        auth: select(validators, epoch, b"auth", auth_size),
        confirm: select(validators, epoch, b"confirm", confirm_size),
    }
}

/// Derives anchor teams per height, memoized per (epoch start, canonical hash
/// at the epoch start). The cache is cleared on every rollback.
#[derive(Debug)]
pub struct AnchorTeamSelector {
    auth_size: usize,
    confirm_size: usize,
    interval: u64,
    cache: Mutex<BTreeMap<(u64, Hash), AnchorTeam>>,
}

impl AnchorTeamSelector {
    pub fn new(auth_size: usize, confirm_size: usize, interval: u64) -> Self {
        Self {
            auth_size,
            confirm_size,
            interval,
            cache: Mutex::new(BTreeMap::new()),
        }
    }

    /// Teams for `height`, a pure function of the validator set at the epoch start.
    pub fn teams_at(
        &self,
        height: u64,
        chain: &LocalChain,
        validators: &ValidatorRegistry,
    ) -> AnchorTeam {
        let start = epoch_start(height, self.interval);
        let key = (start, chain.hash_at(start).unwrap_or(ZERO_HASH));

        if let Ok(cache) = self.cache.lock() {
            if let Some(team) = cache.get(&key) {
                return team.clone();
            }
        }

        let team = derive_teams(
            &validators.active_at(start),
            start,
            self.auth_size,
            self.confirm_size,
        );

        if let Ok(mut cache) = self.cache.lock() {
            if cache.len() >= TEAM_CACHE_CAPACITY {
                cache.pop_first();
            }
            cache.insert(key, team.clone());
        }
        team
    }

    /// Drop every memoized team.
    pub fn invalidate(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    #[cfg(test)]
    fn cached(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::make_chain;

    fn make_pubkey(byte: u8) -> PublicKey {
        [byte; 32]
    }

    #[test]
    fn test_epoch_start() {
        assert_eq!(epoch_start(0, 15), 0);
        assert_eq!(epoch_start(14, 15), 0);
        assert_eq!(epoch_start(45, 15), 45);
        assert_eq!(epoch_start(46, 15), 45);
        assert_eq!(epoch_start(7, 0), 7);
    }

    #[test]
    fn test_team_sizes_with_eight_validators() {
        let validators: Vec<PublicKey> = (1..=8).map(make_pubkey).collect();
        let team = derive_teams(&validators, 45, 3, 3);
        assert_eq!(team.auth.len(), 3);
        assert_eq!(team.confirm.len(), 3);
        assert!(team.auth.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_small_set_uses_everyone() {
        let validators = vec![make_pubkey(1), make_pubkey(2)];
        let team = derive_teams(&validators, 0, 3, 3);
        assert_eq!(team.auth, validators);
        assert_eq!(team.confirm, validators);
    }

    #[test]
    fn test_independent_of_input_order() {
        let forward: Vec<PublicKey> = (1..=8).map(make_pubkey).collect();
        let mut backward = forward.clone();
        backward.reverse();
        assert_eq!(derive_teams(&forward, 30, 3, 3), derive_teams(&backward, 30, 3, 3));
    }

    #[test]
    fn test_teams_rotate_between_epochs() {
        let validators: Vec<PublicKey> = (1..=32).map(make_pubkey).collect();
        let teams: Vec<_> = (0..8)
            .map(|e| derive_teams(&validators, e * 15, 3, 3).auth)
            .collect();
        assert!(teams.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn test_selector_memoizes_per_epoch() {
        let (chain, registry, _) = make_chain(8, 40);
        let selector = AnchorTeamSelector::new(3, 3, 15);
        let a = selector.teams_at(31, &chain, &registry);
        let b = selector.teams_at(39, &chain, &registry);
        assert_eq!(a, b);
        assert_eq!(selector.cached(), 1);
        selector.teams_at(15, &chain, &registry);
        assert_eq!(selector.cached(), 2);
        selector.invalidate();
        assert_eq!(selector.cached(), 0);
    }
}
