//! Unsigned transaction assembly
//!
//! Turns a selection into an unsigned PSBT: one input per selected UTXO
//! bound to its previous output's value and script, one output per recipient
//! in list order, and a change output back to the funding script when the
//! change clears the dust threshold.

use bitcoin::absolute::LockTime;
use bitcoin::psbt::Psbt;
use bitcoin::transaction::Version;
use bitcoin::{Address, Amount, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};
use tracing::info;

use crate::fee::DUST_THRESHOLD;

use super::selection::Selection;

#[derive(Debug, Clone)]
pub struct Recipient {
    pub address: Address,
    pub amount: Amount,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Selection guaranteed sufficiency, so a shortfall here is a bug in the
    /// selector or builder, not an operator problem.
    #[error(
        "internal invariant violated: inputs {total_input} sats cannot cover payout {payout_total} plus fee {fee}"
    )]
    ArithmeticFault {
        total_input: u64,
        payout_total: u64,
        fee: u64,
    },

    #[error("could not derive a PSBT from the unsigned transaction: {0}")]
    Psbt(#[from] bitcoin::psbt::Error),
}

/// The unsigned transaction plus the value split it encodes.
#[derive(Debug)]
pub struct UnsignedPayout {
    pub psbt: Psbt,
    /// Fee quoted at selection time.
    pub fee: u64,
    /// Change emitted as an output; zero when below dust.
    pub change: u64,
    /// Sub-dust change folded into the fee instead of an output.
    pub absorbed: u64,
}

/// Assemble the unsigned transaction for a completed selection.
pub fn build_unsigned(
    selection: &Selection,
    recipients: &[Recipient],
    funding_script: &ScriptBuf,
) -> Result<UnsignedPayout, BuildError> {
    let payout_total: u64 = recipients.iter().map(|r| r.amount.to_sat()).sum();
    let fee = selection.fee_quote.fee;

    let change = payout_total
        .checked_add(fee)
        .and_then(|spent| selection.total_input.checked_sub(spent))
        .ok_or(BuildError::ArithmeticFault {
            total_input: selection.total_input,
            payout_total,
            fee,
        })?;

    let inputs: Vec<TxIn> = selection
        .utxos
        .iter()
        .map(|utxo| TxIn {
            previous_output: utxo.outpoint,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::new(),
        })
        .collect();

    let mut outputs: Vec<TxOut> = recipients
        .iter()
        .map(|r| TxOut {
            value: r.amount,
            script_pubkey: r.address.script_pubkey(),
        })
        .collect();

    let (emitted, absorbed) = if change >= DUST_THRESHOLD {
        outputs.push(TxOut {
            value: Amount::from_sat(change),
            script_pubkey: funding_script.clone(),
        });
        (change, 0)
    } else {
        (0, change)
    };

    let unsigned_tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: inputs,
        output: outputs,
    };

    let mut psbt = Psbt::from_unsigned_tx(unsigned_tx)?;
    for (psbt_input, utxo) in psbt.inputs.iter_mut().zip(&selection.utxos) {
        psbt_input.witness_utxo = Some(TxOut {
            value: utxo.value,
            script_pubkey: utxo.script_pubkey.clone(),
        });
    }

    info!(
        "built unsigned transaction: {} inputs, {} outputs, payout {} sats, fee {} sats, change {} sats{}",
        psbt.unsigned_tx.input.len(),
        psbt.unsigned_tx.output.len(),
        payout_total,
        fee,
        emitted,
        if absorbed > 0 {
            format!(" ({absorbed} sats of dust absorbed into the fee)")
        } else {
            String::new()
        }
    );

    Ok(UnsignedPayout {
        psbt,
        fee,
        change: emitted,
        absorbed,
    })
}
