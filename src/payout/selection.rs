//! UTXO selection
//!
//! Greedy accumulation: keep adding candidate UTXOs until the running input
//! total covers the payout plus the fee implied by the inputs selected so
//! far. The fee is re-estimated after every addition because it depends on
//! the very input count being decided; a one-shot estimate would
//! systematically underfund the transaction.

use bitcoin::{OutPoint, Script};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::explorer::Utxo;
use crate::fee::FeeQuote;
use crate::keys::SigningScheme;

/// Order in which candidates are considered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionOrder {
    /// As returned by the chain source.
    #[default]
    Arrival,
    /// Largest value first, minimizing the input count.
    LargestFirst,
}

#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("insufficient funds: {required} sats required (payout + fee), {available} sats available")]
    InsufficientFunds { required: u64, available: u64 },

    #[error(
        "UTXO {outpoint} is not locked to the funding script (expected {expected}, found {found})"
    )]
    ScriptMismatch {
        outpoint: OutPoint,
        expected: String,
        found: String,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct SelectionParams {
    pub scheme: SigningScheme,
    pub fee_rate: f64,
    pub payout_total: u64,
    pub recipient_count: usize,
    pub order: SelectionOrder,
}

/// The chosen input set and the fee quote it was chosen under.
#[derive(Debug, Clone)]
pub struct Selection {
    pub utxos: Vec<Utxo>,
    pub total_input: u64,
    pub fee_quote: FeeQuote,
}

/// Accumulate candidates until `payout_total + fee` is covered.
///
/// Every accepted candidate must be locked to the funding script exactly; a
/// mismatch means the chain source returned data for the wrong address (or
/// substituted it) and aborts the run before anything is signed.
pub fn select_utxos(
    candidates: Vec<Utxo>,
    funding_script: &Script,
    params: &SelectionParams,
) -> Result<Selection, SelectionError> {
    let mut candidates = candidates;
    if params.order == SelectionOrder::LargestFirst {
        candidates.sort_by(|a, b| b.value.cmp(&a.value));
    }

    // One anticipated change output on top of the recipient outputs.
    let output_count = params.recipient_count + 1;

    let mut selected: Vec<Utxo> = Vec::new();
    let mut total_input = 0u64;
    let mut quote = FeeQuote::new(params.scheme, 0, output_count, params.fee_rate);

    for utxo in candidates {
        if utxo.script_pubkey.as_script() != funding_script {
            return Err(SelectionError::ScriptMismatch {
                outpoint: utxo.outpoint,
                expected: hex::encode(funding_script.as_bytes()),
                found: hex::encode(utxo.script_pubkey.as_bytes()),
            });
        }

        total_input += utxo.value.to_sat();
        selected.push(utxo);
        quote = FeeQuote::new(params.scheme, selected.len(), output_count, params.fee_rate);

        if total_input >= params.payout_total + quote.fee {
            info!(
                "selected {} UTXOs totalling {} sats (payout {} + fee {})",
                selected.len(),
                total_input,
                params.payout_total,
                quote.fee
            );
            return Ok(Selection {
                utxos: selected,
                total_input,
                fee_quote: quote,
            });
        }
    }

    Err(SelectionError::InsufficientFunds {
        required: params.payout_total + quote.fee,
        available: total_input,
    })
}
