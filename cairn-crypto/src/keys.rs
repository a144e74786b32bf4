//! Ed25519 keys held by validators and by the owners of anchor funding inputs.

use cairn_types::error::CairnError;
use cairn_types::primitives::{Address, PublicKey, Signature};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};

use crate::address::pubkey_to_address;

/// A signing key together with its encoded public half. The secret half is
/// zeroized when the keypair is dropped.
pub struct Keypair {
    secret: SigningKey,
    public: PublicKey,
}

impl Keypair {
    fn from_signing_key(secret: SigningKey) -> Self {
        let public = secret.verifying_key().to_bytes();
        Self { secret, public }
    }

    /// A fresh key from the operating system's random source.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut rand::rngs::OsRng))
    }

    /// The key whose secret scalar is derived from `seed`.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(seed))
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Reward address owned by this key.
    pub fn address(&self) -> Address {
        pubkey_to_address(&self.public)
    }

    /// The seed this key was built from; `from_seed(&kp.seed())` yields the same key.
    pub fn seed(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.secret.sign(message).to_bytes()
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Keypair({})", hex_prefix(&self.public))
    }
}

fn hex_prefix(bytes: &[u8]) -> String {
    bytes.iter().take(4).map(|b| format!("{:02x}", b)).collect()
}

fn parse_public_key(pubkey: &PublicKey, index: usize) -> Result<VerifyingKey, CairnError> {
    VerifyingKey::from_bytes(pubkey).map_err(|_| CairnError::InvalidSignature {
        signer_index: index,
    })
}

/// Check one signature over `message`.
pub fn verify(message: &[u8], signature: &Signature, pubkey: &PublicKey) -> Result<(), CairnError> {
    let key = VerifyingKey::from_bytes(pubkey).map_err(|_| CairnError::InvalidKeyMaterial)?;
    key.verify(message, &ed25519_dalek::Signature::from_bytes(signature))
        .map_err(|_| CairnError::InvalidSignature { signer_index: 0 })
}

/// Check a set of signatures, one per message and key.
///
/// The whole set is checked in one batch. When the batch fails, each
/// signature is checked on its own and the error names the first bad index.
pub fn batch_verify(
    messages: &[&[u8]],
    signatures: &[Signature],
    pubkeys: &[PublicKey],
) -> Result<(), CairnError> {
    let count = messages.len();
    if signatures.len() != count || pubkeys.len() != count {
        return Err(CairnError::InvalidSignature { signer_index: 0 });
    }

    let keys = pubkeys
        .iter()
        .enumerate()
        .map(|(i, pk)| parse_public_key(pk, i))
        .collect::<Result<Vec<VerifyingKey>, CairnError>>()?;
    let sigs: Vec<ed25519_dalek::Signature> = signatures
        .iter()
        .map(ed25519_dalek::Signature::from_bytes)
        .collect();

    if count == 0 || ed25519_dalek::verify_batch(messages, &sigs, &keys).is_ok() {
        return Ok(());
    }
    match (0..count).find(|&i| keys[i].verify(messages[i], &sigs[i]).is_err()) {
        Some(signer_index) => Err(CairnError::InvalidSignature { signer_index }),
        None => Ok(()),
    }
}
