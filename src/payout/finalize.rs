//! Finalization
//!
//! Moves each verified signature into its input's witness, re-checks that
//! the previous-output scripts recorded at build time still match the
//! funding script, and renders the transaction into its broadcastable form.

use bitcoin::consensus::encode::serialize_hex;
use bitcoin::psbt::Psbt;
use bitcoin::{Transaction, Txid, Witness};
use tracing::info;

use crate::keys::{FundingKeys, SigningScheme};

#[derive(Debug, thiserror::Error)]
pub enum FinalizeError {
    #[error("input {index} is missing its signature")]
    MissingSignature { index: usize },

    #[error("input {index} is missing its previous output data")]
    MissingPrevout { index: usize },

    #[error("input {index}'s previous-output script no longer matches the funding script")]
    ScriptChanged { index: usize },

    #[error("outputs ({outputs} sats) exceed inputs ({inputs} sats)")]
    ValueMismatch { inputs: u64, outputs: u64 },

    #[error("failed to extract the final transaction: {0}")]
    Extract(#[from] bitcoin::psbt::ExtractTxError),
}

/// The finished artifact: serialized wire form plus its id and cost.
#[derive(Debug, Clone)]
pub struct FinalTransaction {
    pub txid: Txid,
    pub tx: Transaction,
    pub hex: String,
    pub fee: u64,
    pub vsize: usize,
}

/// Attach every signature as witness data and serialize.
///
/// Every input must carry both its previous output (still locked to the
/// funding script) and a signature produced by the signer; anything else is
/// a defect in the earlier stages and fails here rather than producing a
/// partially-signed transaction.
pub fn finalize(mut psbt: Psbt, keys: &FundingKeys) -> Result<FinalTransaction, FinalizeError> {
    let pubkey = bitcoin::PublicKey::new(keys.public);
    let mut total_input = 0u64;

    for (index, input) in psbt.inputs.iter_mut().enumerate() {
        let prevout = input
            .witness_utxo
            .as_ref()
            .ok_or(FinalizeError::MissingPrevout { index })?;
        if prevout.script_pubkey != keys.script_pubkey {
            return Err(FinalizeError::ScriptChanged { index });
        }
        total_input += prevout.value.to_sat();

        let witness = match keys.scheme {
            SigningScheme::WitnessKeyHash => {
                let signature = input
                    .partial_sigs
                    .get(&pubkey)
                    .ok_or(FinalizeError::MissingSignature { index })?;
                Witness::from_slice(&[signature.to_vec(), pubkey.to_bytes()])
            }
            SigningScheme::TaprootKeyPath => {
                let signature = input
                    .tap_key_sig
                    .ok_or(FinalizeError::MissingSignature { index })?;
                Witness::from_slice(&[signature.to_vec()])
            }
        };
        input.final_script_witness = Some(witness);

        // Clear non-final fields per BIP 174.
        input.partial_sigs.clear();
        input.sighash_type = None;
        input.redeem_script = None;
        input.witness_script = None;
        input.bip32_derivation.clear();
        input.tap_key_sig = None;
        input.tap_script_sigs.clear();
        input.tap_scripts.clear();
        input.tap_key_origins.clear();
        input.tap_internal_key = None;
        input.tap_merkle_root = None;
    }

    let total_output: u64 = psbt
        .unsigned_tx
        .output
        .iter()
        .map(|o| o.value.to_sat())
        .sum();
    let fee = total_input
        .checked_sub(total_output)
        .ok_or(FinalizeError::ValueMismatch {
            inputs: total_input,
            outputs: total_output,
        })?;

    let tx = psbt.extract_tx()?;
    let txid = tx.compute_txid();
    let vsize = tx.vsize();
    let hex = serialize_hex(&tx);

    info!(
        "finalized transaction {}: {} inputs, {} outputs, {} vB, fee {} sats",
        txid,
        tx.input.len(),
        tx.output.len(),
        vsize,
        fee
    );

    Ok(FinalTransaction {
        txid,
        tx,
        hex,
        fee,
        vsize,
    })
}
