//! Fee estimation
//!
//! Models virtual size from input/output counts with scheme-specific
//! constants and turns a sat/vB rate into an absolute fee. The rate itself
//! comes from an explicit configured value when present, otherwise from the
//! chain source's recommended rate.

use crate::explorer::ChainSource;
use crate::keys::SigningScheme;

/// Minimum economically spendable output value in satoshis. Change at or
/// above this value gets its own output; below it, the change is absorbed
/// into the fee.
pub const DUST_THRESHOLD: u64 = 546;

/// Shared transaction overhead: version, segwit marker/flag, io counts,
/// locktime.
const BASE_VBYTES: f64 = 10.5;

/// P2WPKH input: 41 vB outpoint/sequence plus ~27 vB for the
/// signature+pubkey witness stack.
const P2WPKH_INPUT_VBYTES: f64 = 68.0;

/// P2TR key-path input: 41 vB plus ~16.5 vB for the single-signature
/// witness stack.
const P2TR_INPUT_VBYTES: f64 = 57.5;

/// Worst-case output (value, script length, 34-byte witness program).
const OUTPUT_VBYTES: f64 = 43.0;

#[derive(Debug, thiserror::Error)]
pub enum FeeError {
    #[error("fee rate must be a positive number of sat/vB, got {0}")]
    InvalidRate(f64),

    #[error("no fee rate available: no configured rate and the recommended-rate fetch failed")]
    NoRateAvailable,
}

/// A fee computation pinned to the counts it was made for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeQuote {
    pub rate: f64,
    pub vsize: u64,
    pub fee: u64,
}

impl FeeQuote {
    pub fn new(scheme: SigningScheme, inputs: usize, outputs: usize, rate: f64) -> Self {
        Self {
            rate,
            vsize: estimate_vsize(scheme, inputs, outputs),
            fee: estimate_fee(scheme, inputs, outputs, rate),
        }
    }
}

/// Estimated virtual size in whole vbytes, rounded up.
pub fn estimate_vsize(scheme: SigningScheme, inputs: usize, outputs: usize) -> u64 {
    let per_input = match scheme {
        SigningScheme::WitnessKeyHash => P2WPKH_INPUT_VBYTES,
        SigningScheme::TaprootKeyPath => P2TR_INPUT_VBYTES,
    };
    let vbytes = BASE_VBYTES + inputs as f64 * per_input + outputs as f64 * OUTPUT_VBYTES;
    vbytes.ceil() as u64
}

/// Absolute fee in satoshis: `ceil(rate * estimated_vsize)`.
pub fn estimate_fee(scheme: SigningScheme, inputs: usize, outputs: usize, rate: f64) -> u64 {
    let vsize = estimate_vsize(scheme, inputs, outputs);
    (rate * vsize as f64).ceil() as u64
}

fn validate_rate(rate: f64) -> Result<f64, FeeError> {
    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err(FeeError::InvalidRate(rate))
    }
}

/// Resolve the sat/vB rate for this run.
///
/// An explicit configured rate takes priority. Without one, the chain
/// source's recommended rate is fetched; if that fetch fails there is
/// nothing left to fall back on and the run aborts.
pub async fn resolve_fee_rate(
    configured: Option<f64>,
    chain: &dyn ChainSource,
) -> Result<f64, FeeError> {
    if let Some(rate) = configured {
        let rate = validate_rate(rate)?;
        tracing::info!("using configured fee rate: {:.2} sat/vB", rate);
        return Ok(rate);
    }

    match chain.fetch_recommended_fee_rate().await {
        Ok(rate) => {
            let rate = validate_rate(rate)?;
            tracing::info!("using recommended fee rate: {:.2} sat/vB", rate);
            Ok(rate)
        }
        Err(e) => {
            tracing::warn!("recommended fee rate fetch failed: {}", e);
            Err(FeeError::NoRateAvailable)
        }
    }
}
