use borsh::BorshDeserialize;

use cairn_crypto::hash::blake3_hash_domain;
use cairn_crypto::keys::{verify, Keypair};
use cairn_types::anchor::{AnchorPayload, AnchorTransaction, ExternalInput, SignerSignature};
use cairn_types::constants::{MAX_ANCHOR_AUTHS, MAX_ANCHOR_TX_SIZE};
use cairn_types::primitives::*;

use crate::error::AnchorError;

const TX_HASH_DOMAIN: &str = "cairn anchor transaction v1";
const INPUT_SIG_TAG: &[u8] = b"cairn:anchor-input:";

/// An external output to spend, with the seed of the key that owns it.
#[derive(Clone)]
pub struct FundingInput {
    pub input: ExternalInput,
    pub seed: [u8; 32],
}

/// Serialize a transaction to its raw wire form.
pub fn encode_transaction(tx: &AnchorTransaction) -> Result<Vec<u8>, AnchorError> {
    borsh::to_vec(tx).map_err(|e| AnchorError::MalformedPayload {
        reason: e.to_string(),
    })
}

/// Parse a raw anchor transaction, enforcing size and structure limits.
pub fn decode_transaction(raw: &[u8]) -> Result<AnchorTransaction, AnchorError> {
    if raw.len() > MAX_ANCHOR_TX_SIZE {
        return Err(AnchorError::MalformedPayload {
            reason: format!("{} bytes exceeds limit of {}", raw.len(), MAX_ANCHOR_TX_SIZE),
        });
    }
    let tx = AnchorTransaction::try_from_slice(raw).map_err(|e| AnchorError::MalformedPayload {
        reason: e.to_string(),
    })?;
    if tx.payload.auths.len() > MAX_ANCHOR_AUTHS {
        return Err(AnchorError::MalformedPayload {
            reason: format!("{} auths exceeds limit of {}", tx.payload.auths.len(), MAX_ANCHOR_AUTHS),
        });
    }
    if tx.inputs.is_empty() || tx.inputs.len() != tx.input_signatures.len() {
        return Err(AnchorError::MalformedPayload {
            reason: "every input needs exactly one signature".to_string(),
        });
    }
    Ok(tx)
}

/// Hash identifying an anchor transaction on the external chain.
pub fn transaction_hash(raw: &[u8]) -> Hash {
    blake3_hash_domain(TX_HASH_DOMAIN, raw)
}

/// Bytes signed by every input owner.
pub fn input_signing_data(
    inputs: &[ExternalInput],
    fee: u64,
    payload: &AnchorPayload,
) -> Result<Vec<u8>, AnchorError> {
    let bytes = borsh::to_vec(&(inputs, fee, payload)).map_err(|e| AnchorError::MalformedPayload {
        reason: e.to_string(),
    })?;
    let mut data = Vec::with_capacity(INPUT_SIG_TAG.len() + bytes.len());
    data.extend_from_slice(INPUT_SIG_TAG);
    data.extend_from_slice(&bytes);
    Ok(data)
}

/// Check that every input carries exactly one valid signature.
pub fn verify_inputs(tx: &AnchorTransaction) -> Result<(), AnchorError> {
    if tx.inputs.is_empty() || tx.inputs.len() != tx.input_signatures.len() {
        return Err(AnchorError::MalformedPayload {
            reason: format!(
                "{} inputs but {} input signatures",
                tx.inputs.len(),
                tx.input_signatures.len()
            ),
        });
    }
    let data = input_signing_data(&tx.inputs, tx.fee, &tx.payload)?;
    for (i, sig) in tx.input_signatures.iter().enumerate() {
        verify(&data, &sig.signature, &sig.signer).map_err(|_| AnchorError::InvalidSignature {
            reason: format!("input {} signature", i),
        })?;
    }
    Ok(())
}

/// Fee for a transaction of `size` bytes at `fee_per_kb`, never zero.
pub fn estimate_fee(size: usize, fee_per_kb: u64) -> u64 {
    (size as u64 * fee_per_kb / 1000).max(1)
}

/// Build and sign an anchor transaction paying `fee_per_kb` from `inputs`.
pub fn build_anchor_transaction(
    inputs: &[FundingInput],
    payload: AnchorPayload,
    fee_per_kb: u64,
) -> Result<AnchorTransaction, AnchorError> {
    if inputs.is_empty() {
        return Err(AnchorError::InvalidParams {
            reason: "at least one input is required".to_string(),
        });
    }
    let keypairs: Vec<Keypair> = inputs.iter().map(|i| Keypair::from_seed(&i.seed)).collect();
    let external_inputs: Vec<ExternalInput> = inputs.iter().map(|i| i.input.clone()).collect();

    // Size with placeholder signatures; signatures have a fixed width.
    let mut tx = AnchorTransaction {
        inputs: external_inputs,
        fee: 0,
        payload,
        input_signatures: keypairs
            .iter()
            .map(|kp| SignerSignature {
                signer: kp.public_key(),
                signature: [0u8; 64],
            })
            .collect(),
    };
    let size = encode_transaction(&tx)?.len();
    tx.fee = estimate_fee(size, fee_per_kb);

    let available = tx
        .inputs
        .iter()
        .try_fold(0u64, |acc, i| acc.checked_add(i.amount))
        .unwrap_or(u64::MAX);
    if available < tx.fee {
        return Err(AnchorError::InsufficientFunds {
            have: available,
            need: tx.fee,
        });
    }

    let data = input_signing_data(&tx.inputs, tx.fee, &tx.payload)?;
    for (sig, kp) in tx.input_signatures.iter_mut().zip(keypairs.iter()) {
        sig.signature = kp.sign(&data);
    }
    Ok(tx)
}
