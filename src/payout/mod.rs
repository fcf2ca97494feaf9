//! Payout pipeline
//!
//! One run pays a fixed amount to every recipient from a single funding
//! address: fetch UTXOs, resolve the fee rate, select inputs, build the
//! unsigned transaction, sign, finalize, broadcast. Each stage lives in its
//! own submodule; this module threads one run through them.

pub mod builder;
pub mod finalize;
pub mod selection;

pub use builder::{BuildError, Recipient, UnsignedPayout};
pub use finalize::{FinalTransaction, FinalizeError};
pub use selection::{Selection, SelectionError, SelectionOrder, SelectionParams};

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bitcoin::{Address, Txid};
use tracing::{info, warn};

use crate::explorer::ChainSource;
use crate::fee;
use crate::keys::FundingKeys;
use crate::signer;

/// A single payout run. Holds the signing material and the chain source;
/// nothing carries over between runs, and the secret scalar is zeroized
/// when the session drops.
pub struct PayoutSession {
    keys: FundingKeys,
    chain: Arc<dyn ChainSource>,
}

impl PayoutSession {
    pub fn new(keys: FundingKeys, chain: Arc<dyn ChainSource>) -> Self {
        Self { keys, chain }
    }

    pub fn funding_address(&self) -> &Address {
        &self.keys.address
    }

    /// Run the pipeline up to (not including) broadcast.
    ///
    /// Every input of the returned transaction carries a verified
    /// signature; broadcast is gated on this method having succeeded.
    pub async fn run(
        &self,
        recipients: &[Recipient],
        configured_fee_rate: Option<f64>,
        order: SelectionOrder,
    ) -> Result<FinalTransaction> {
        if recipients.is_empty() {
            bail!("recipient list is empty");
        }
        let payout_total: u64 = recipients.iter().map(|r| r.amount.to_sat()).sum();

        info!(
            "💰 paying {} sats across {} recipients from {}",
            payout_total,
            recipients.len(),
            self.keys.address
        );

        let candidates = self
            .chain
            .fetch_utxos(&self.keys.address)
            .await
            .with_context(|| format!("fetching UTXOs for {}", self.keys.address))?;
        let available: u64 = candidates.iter().map(|u| u.value.to_sat()).sum();
        info!(
            "{} candidate UTXOs, {} sats available",
            candidates.len(),
            available
        );

        let fee_rate = fee::resolve_fee_rate(configured_fee_rate, self.chain.as_ref()).await?;

        let params = SelectionParams {
            scheme: self.keys.scheme,
            fee_rate,
            payout_total,
            recipient_count: recipients.len(),
            order,
        };
        let selected = selection::select_utxos(candidates, &self.keys.script_pubkey, &params)
            .with_context(|| format!("selecting inputs for {}", self.keys.address))?;

        let unsigned = builder::build_unsigned(&selected, recipients, &self.keys.script_pubkey)?;

        let mut psbt = unsigned.psbt;
        signer::sign_inputs(&mut psbt, &self.keys)?;

        let final_tx = finalize::finalize(psbt, &self.keys)?;
        info!(
            "✅ transaction {} ready: fee {} sats over {} vB ({:.2} sat/vB effective)",
            final_tx.txid,
            final_tx.fee,
            final_tx.vsize,
            final_tx.fee as f64 / final_tx.vsize as f64
        );

        Ok(final_tx)
    }

    /// Hand the finalized transaction to the chain source.
    ///
    /// A rejection leaves the transaction valid and re-broadcastable; the
    /// rejection reason is surfaced verbatim.
    pub async fn broadcast(&self, final_tx: &FinalTransaction) -> Result<Txid> {
        info!("📡 broadcasting {}", final_tx.txid);
        let accepted = self
            .chain
            .broadcast(&final_tx.hex)
            .await
            .with_context(|| format!("broadcasting {}", final_tx.txid))?;

        if accepted != final_tx.txid {
            warn!(
                "chain source reported txid {} for our {}",
                accepted, final_tx.txid
            );
        }
        Ok(accepted)
    }

    pub async fn run_and_broadcast(
        &self,
        recipients: &[Recipient],
        configured_fee_rate: Option<f64>,
        order: SelectionOrder,
    ) -> Result<(FinalTransaction, Txid)> {
        let final_tx = self.run(recipients, configured_fee_rate, order).await?;
        let txid = self.broadcast(&final_tx).await?;
        Ok((final_tx, txid))
    }
}
