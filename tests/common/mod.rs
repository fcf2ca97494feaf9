#![allow(dead_code)]

//! Shared fixtures: a deterministic in-memory chain source standing in for
//! the esplora collaborator, plus key/UTXO helpers.

use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::SecretKey;
use bitcoin::{
    Address, Amount, Network, NetworkKind, OutPoint, PrivateKey, ScriptBuf, Transaction, Txid,
    WPubkeyHash,
};

use batchpay::explorer::{BroadcastError, ChainSource, FetchError, Utxo};
use batchpay::keys::{FundingKeys, SigningScheme};

/// In-memory chain source serving fixed fixtures and recording broadcasts.
pub struct MockChain {
    utxos: Vec<Utxo>,
    fee_rate: Option<f64>,
    reject_broadcast: Option<String>,
    pub broadcasts: Mutex<Vec<String>>,
}

impl MockChain {
    pub fn new(utxos: Vec<Utxo>) -> Self {
        Self {
            utxos,
            fee_rate: None,
            reject_broadcast: None,
            broadcasts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fee_rate(mut self, rate: f64) -> Self {
        self.fee_rate = Some(rate);
        self
    }

    pub fn rejecting(mut self, reason: &str) -> Self {
        self.reject_broadcast = Some(reason.to_string());
        self
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn fetch_utxos(&self, _address: &Address) -> Result<Vec<Utxo>, FetchError> {
        Ok(self.utxos.clone())
    }

    async fn fetch_prev_script(&self, txid: Txid, vout: u32) -> Result<ScriptBuf, FetchError> {
        self.utxos
            .iter()
            .find(|u| u.outpoint == OutPoint::new(txid, vout))
            .map(|u| u.script_pubkey.clone())
            .ok_or(FetchError::MissingOutput { txid, vout })
    }

    async fn fetch_recommended_fee_rate(&self) -> Result<f64, FetchError> {
        self.fee_rate
            .ok_or_else(|| FetchError::ParseError("no recommended rate configured".to_string()))
    }

    async fn broadcast(&self, tx_hex: &str) -> Result<Txid, BroadcastError> {
        if let Some(reason) = &self.reject_broadcast {
            return Err(BroadcastError::Rejected(reason.clone()));
        }
        self.broadcasts.lock().unwrap().push(tx_hex.to_string());

        let bytes = hex::decode(tx_hex).map_err(|e| BroadcastError::ParseError(e.to_string()))?;
        let tx: Transaction = bitcoin::consensus::encode::deserialize(&bytes)
            .map_err(|e| BroadcastError::ParseError(e.to_string()))?;
        Ok(tx.compute_txid())
    }
}

pub fn secret_from_byte(byte: u8) -> SecretKey {
    let mut bytes = [0u8; 32];
    bytes[31] = byte;
    SecretKey::from_slice(&bytes).unwrap()
}

pub fn funding_keys(byte: u8, scheme: SigningScheme) -> FundingKeys {
    let wif = PrivateKey::new(secret_from_byte(byte), NetworkKind::Test).to_wif();
    FundingKeys::from_wif(&wif, Network::Regtest, scheme).unwrap()
}

pub fn utxo(script: &ScriptBuf, vout: u32, value: u64) -> Utxo {
    let txid =
        Txid::from_str("4242424242424242424242424242424242424242424242424242424242424242").unwrap();
    Utxo {
        outpoint: OutPoint::new(txid, vout),
        value: Amount::from_sat(value),
        script_pubkey: script.clone(),
    }
}

/// A throwaway P2WPKH recipient address derived from a marker byte.
pub fn recipient_address(byte: u8) -> Address {
    let script = ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([byte; 20]));
    Address::from_script(&script, Network::Regtest).unwrap()
}
