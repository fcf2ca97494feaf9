//! Per-input signing
//!
//! Produces and self-verifies one signature per input, dispatching once on
//! the funding scheme: BIP143 ECDSA for witness-key-hash inputs, BIP341
//! key-path Schnorr for taproot inputs. A signature that fails its own
//! verification aborts the run; retrying with the same key can never fix it.

use bitcoin::hashes::Hash;
use bitcoin::psbt::Psbt;
use bitcoin::secp256k1::{All, Keypair, Message, Secp256k1, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, Prevouts, SighashCache, TapSighashType};
use bitcoin::TxOut;

use crate::keys::{FundingKeys, SigningScheme};

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("input {index} is missing its previous output data")]
    MissingPrevout { index: usize },

    #[error("segwit sighash computation failed: {0}")]
    SegwitSighash(#[from] bitcoin::sighash::P2wpkhError),

    #[error("taproot sighash computation failed: {0}")]
    TaprootSighash(#[from] bitcoin::sighash::TaprootError),

    #[error("signature for input {index} failed self-verification")]
    SignatureInvalid { index: usize },
}

/// Sign every input of the unsigned transaction, in ascending index order.
///
/// Signatures are stored on the PSBT inputs (`partial_sigs` for P2WPKH,
/// `tap_key_sig` for taproot); the finalizer turns them into witness stacks.
pub fn sign_inputs(psbt: &mut Psbt, keys: &FundingKeys) -> Result<(), SignerError> {
    let prevouts = collect_prevouts(psbt)?;

    match keys.scheme {
        SigningScheme::WitnessKeyHash => sign_segwit_v0(psbt, keys, &prevouts),
        SigningScheme::TaprootKeyPath => sign_taproot(psbt, keys, &prevouts),
    }
}

fn collect_prevouts(psbt: &Psbt) -> Result<Vec<TxOut>, SignerError> {
    psbt.inputs
        .iter()
        .enumerate()
        .map(|(index, input)| {
            input
                .witness_utxo
                .clone()
                .ok_or(SignerError::MissingPrevout { index })
        })
        .collect()
}

fn sign_segwit_v0(
    psbt: &mut Psbt,
    keys: &FundingKeys,
    prevouts: &[TxOut],
) -> Result<(), SignerError> {
    let secp = Secp256k1::new();
    let mut cache = SighashCache::new(&psbt.unsigned_tx);
    let pubkey = bitcoin::PublicKey::new(keys.public);

    let mut signatures = Vec::with_capacity(prevouts.len());
    for (index, prevout) in prevouts.iter().enumerate() {
        let sighash = cache.p2wpkh_signature_hash(
            index,
            &prevout.script_pubkey,
            prevout.value,
            EcdsaSighashType::All,
        )?;
        let msg = Message::from_digest(sighash.to_byte_array());

        let signature = secp.sign_ecdsa(&msg, &keys.secret);
        secp.verify_ecdsa(&msg, &signature, &keys.public)
            .map_err(|_| SignerError::SignatureInvalid { index })?;

        signatures.push(bitcoin::ecdsa::Signature {
            signature,
            sighash_type: EcdsaSighashType::All,
        });
    }

    for (input, signature) in psbt.inputs.iter_mut().zip(signatures) {
        input.partial_sigs.insert(pubkey, signature);
    }

    tracing::info!("signed {} P2WPKH inputs", prevouts.len());
    Ok(())
}

fn sign_taproot(
    psbt: &mut Psbt,
    keys: &FundingKeys,
    prevouts: &[TxOut],
) -> Result<(), SignerError> {
    let secp = Secp256k1::new();
    let mut cache = SighashCache::new(&psbt.unsigned_tx);

    // The output commits to the even-parity x-only key; sign with the
    // negated scalar when the raw key's y is odd.
    let signing_secret = even_parity_secret(&secp, &keys.secret);
    let keypair = Keypair::from_secret_key(&secp, &signing_secret);

    let all_prevouts = Prevouts::All(prevouts);
    let mut signatures = Vec::with_capacity(prevouts.len());
    for index in 0..prevouts.len() {
        let sighash =
            cache.taproot_key_spend_signature_hash(index, &all_prevouts, TapSighashType::Default)?;
        let msg = Message::from_digest(sighash.to_byte_array());

        let signature = secp.sign_schnorr(&msg, &keypair);
        secp.verify_schnorr(&signature, &msg, &keys.xonly)
            .map_err(|_| SignerError::SignatureInvalid { index })?;

        signatures.push(bitcoin::taproot::Signature {
            signature,
            sighash_type: TapSighashType::Default,
        });
    }

    for (input, signature) in psbt.inputs.iter_mut().zip(signatures) {
        input.tap_key_sig = Some(signature);
    }

    tracing::info!("signed {} taproot key-path inputs", prevouts.len());
    Ok(())
}

/// The effective taproot signing scalar: the raw secret if its public key
/// already has even y parity, its negation mod n otherwise. Either way the
/// result corresponds to the x-only key the funding output commits to.
pub fn even_parity_secret(secp: &Secp256k1<All>, secret: &SecretKey) -> SecretKey {
    let public = secret.public_key(secp);
    if public.serialize()[0] == 0x03 {
        secret.negate()
    } else {
        *secret
    }
}
