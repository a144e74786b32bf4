use std::collections::BTreeMap;

use cairn_crypto::address::pubkey_to_address;
use cairn_types::chain::{Validator, ValidatorUpdate};
use cairn_types::primitives::*;

use crate::error::AnchorError;

/// Validator registry with per-validator activity windows.
///
/// Entries are never dropped on resignation, so the active set as of any
/// past height can be recomputed and a disconnected block undone exactly.
#[derive(Debug, Clone, Default)]
pub struct ValidatorRegistry {
    validators: BTreeMap<PublicKey, Validator>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<Validator>) -> Self {
        Self {
            validators: records.into_iter().map(|v| (v.pubkey, v)).collect(),
        }
    }

    pub fn records(&self) -> Vec<Validator> {
        self.validators.values().cloned().collect()
    }

    pub fn get(&self, pubkey: &PublicKey) -> Option<&Validator> {
        self.validators.get(pubkey)
    }

    /// Public keys active as of `height`, sorted.
    pub fn active_at(&self, height: u64) -> Vec<PublicKey> {
        self.validators
            .values()
            .filter(|v| v.is_active_at(height))
            .map(|v| v.pubkey)
            .collect()
    }

    /// Apply the updates of the block at `height`. Callers validate on a
    /// clone: on error the registry may be partially updated.
    pub fn apply_updates(
        &mut self,
        height: u64,
        updates: &[ValidatorUpdate],
    ) -> Result<(), AnchorError> {
        for update in updates {
            match update {
                ValidatorUpdate::Register { pubkey } => {
                    if self.validators.contains_key(pubkey) {
                        return Err(AnchorError::InvalidBlock {
                            reason: format!("validator {} already registered", hex::encode(pubkey)),
                        });
                    }
                    self.validators.insert(
                        *pubkey,
                        Validator {
                            pubkey: *pubkey,
                            address: pubkey_to_address(pubkey),
                            registered_at: height,
                            resigned_at: None,
                        },
                    );
                }
                ValidatorUpdate::Resign { pubkey } => {
                    let validator = self.validators.get_mut(pubkey).ok_or_else(|| {
                        AnchorError::InvalidBlock {
                            reason: format!("validator {} not registered", hex::encode(pubkey)),
                        }
                    })?;
                    if validator.resigned_at.is_some() || validator.registered_at >= height {
                        return Err(AnchorError::InvalidBlock {
                            reason: format!("validator {} cannot resign", hex::encode(pubkey)),
                        });
                    }
                    validator.resigned_at = Some(height);
                }
            }
        }
        Ok(())
    }

    /// Undo the updates applied by the block at `height`.
    pub fn revert_updates(&mut self, height: u64, updates: &[ValidatorUpdate]) {
        for update in updates.iter().rev() {
            match update {
                ValidatorUpdate::Register { pubkey } => {
                    if self
                        .validators
                        .get(pubkey)
                        .is_some_and(|v| v.registered_at == height)
                    {
                        self.validators.remove(pubkey);
                    }
                }
                ValidatorUpdate::Resign { pubkey } => {
                    if let Some(v) = self.validators.get_mut(pubkey) {
                        if v.resigned_at == Some(height) {
                            v.resigned_at = None;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_pubkey(byte: u8) -> PublicKey {
        [byte; 32]
    }

    fn register(byte: u8) -> ValidatorUpdate {
        ValidatorUpdate::Register {
            pubkey: make_pubkey(byte),
        }
    }

    #[test]
    fn test_active_set_history() {
        let mut registry = ValidatorRegistry::new();
        registry.apply_updates(0, &[register(1), register(2)]).unwrap();
        registry.apply_updates(10, &[register(3)]).unwrap();
        registry
            .apply_updates(20, &[ValidatorUpdate::Resign { pubkey: make_pubkey(1) }])
            .unwrap();

        assert_eq!(registry.active_at(5), vec![make_pubkey(1), make_pubkey(2)]);
        assert_eq!(registry.active_at(15).len(), 3);
        assert_eq!(registry.active_at(20), vec![make_pubkey(2), make_pubkey(3)]);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ValidatorRegistry::new();
        registry.apply_updates(0, &[register(1)]).unwrap();
        assert!(registry.apply_updates(1, &[register(1)]).is_err());
    }

    #[test]
    fn test_resign_unknown_rejected() {
        let mut registry = ValidatorRegistry::new();
        let err = registry
            .apply_updates(1, &[ValidatorUpdate::Resign { pubkey: make_pubkey(7) }])
            .unwrap_err();
        assert!(matches!(err, AnchorError::InvalidBlock { .. }));
    }

    #[test]
    fn test_revert_restores_previous_state() {
        let mut registry = ValidatorRegistry::new();
        registry.apply_updates(0, &[register(1), register(2)]).unwrap();
        let before = registry.records();

        let updates = vec![
            register(3),
            ValidatorUpdate::Resign {
                pubkey: make_pubkey(2),
            },
        ];
        registry.apply_updates(5, &updates).unwrap();
        assert_eq!(registry.active_at(5), vec![make_pubkey(1), make_pubkey(3)]);

        registry.revert_updates(5, &updates);
        assert_eq!(registry.records(), before);
    }
}
