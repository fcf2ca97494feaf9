//! Block-explorer access
//!
//! Provides the `ChainSource` interface the payout pipeline depends on:
//! UTXO listing for the funding address, previous-output script lookup,
//! recommended fee rate, and transaction broadcast. The live implementation
//! talks to an esplora-style HTTP API (mempool.space); tests inject an
//! in-memory source instead.

use std::str::FromStr;
use std::time::Duration;

use bitcoin::{Address, Amount, Network, OutPoint, ScriptBuf, Txid};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("network not supported without an explicit esplora URL: {0:?}")]
    UnsupportedNetwork(Network),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API returned status {status} for {url}")]
    BadStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("transaction {txid} has no output at index {vout}")]
    MissingOutput { txid: Txid, vout: u32 },

    #[error("parse error: {0}")]
    ParseError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("network rejected the transaction: {0}")]
    Rejected(String),

    #[error("unparseable broadcast response: {0}")]
    ParseError(String),
}

/// An unspent output of the funding address.
///
/// `script_pubkey` is the previous output's locking script as reported by
/// the chain source; the selector rejects any UTXO whose script does not
/// exactly match the derived funding script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub outpoint: OutPoint,
    pub value: Amount,
    pub script_pubkey: ScriptBuf,
}

/// The external collaborator the pipeline calls for chain data.
///
/// Calls are not retried internally: a failure aborts the current run.
#[async_trait::async_trait]
pub trait ChainSource: Send + Sync {
    /// List unspent outputs for an address, in the source's own order.
    async fn fetch_utxos(&self, address: &Address) -> Result<Vec<Utxo>, FetchError>;

    /// Fetch the locking script of a specific previous output.
    async fn fetch_prev_script(&self, txid: Txid, vout: u32) -> Result<ScriptBuf, FetchError>;

    /// Current recommended fee rate in sat/vB.
    async fn fetch_recommended_fee_rate(&self) -> Result<f64, FetchError>;

    /// Submit a serialized transaction; returns the txid the network
    /// accepted it under.
    async fn broadcast(&self, tx_hex: &str) -> Result<Txid, BroadcastError>;
}

/// esplora-style HTTP implementation (mempool.space endpoints).
pub struct EsploraApi {
    base_url: String,
    timeout_secs: u64,
}

impl EsploraApi {
    /// Build a client for `network`. Regtest has no public esplora instance,
    /// so it requires an explicit `base_url`.
    pub fn new(network: Network, base_url: Option<String>) -> Result<Self, FetchError> {
        let base_url = match base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => match network {
                Network::Bitcoin => "https://mempool.space/api".to_string(),
                Network::Testnet => "https://mempool.space/testnet/api".to_string(),
                Network::Signet => "https://mempool.space/signet/api".to_string(),
                _ => return Err(FetchError::UnsupportedNetwork(network)),
            },
        };
        Ok(Self {
            base_url,
            timeout_secs: 10,
        })
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    fn client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let response = self.client()?.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::BadStatus {
                url: url.to_string(),
                status: response.status(),
            });
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl ChainSource for EsploraApi {
    async fn fetch_utxos(&self, address: &Address) -> Result<Vec<Utxo>, FetchError> {
        let url = format!("{}/address/{}/utxo", self.base_url, address);
        tracing::debug!("fetching UTXOs from {}", url);

        let entries: Vec<UtxoEntry> = self.get(&url).await?.json().await?;

        let unconfirmed = entries.iter().filter(|e| !e.status.confirmed).count();
        if unconfirmed > 0 {
            tracing::info!("skipping {} unconfirmed UTXOs", unconfirmed);
        }

        // The list endpoint does not include the locking script; resolve it
        // per output so the selector can check it against the funding script.
        let mut utxos = Vec::new();
        for entry in entries.into_iter().filter(|e| e.status.confirmed) {
            let txid = Txid::from_str(&entry.txid)
                .map_err(|e| FetchError::ParseError(e.to_string()))?;
            let script_pubkey = self.fetch_prev_script(txid, entry.vout).await?;
            utxos.push(Utxo {
                outpoint: OutPoint::new(txid, entry.vout),
                value: Amount::from_sat(entry.value),
                script_pubkey,
            });
        }

        tracing::info!("fetched {} spendable UTXOs for {}", utxos.len(), address);
        Ok(utxos)
    }

    async fn fetch_prev_script(&self, txid: Txid, vout: u32) -> Result<ScriptBuf, FetchError> {
        let url = format!("{}/tx/{}", self.base_url, txid);
        let tx: TxEntry = self.get(&url).await?.json().await?;

        let output = tx
            .vout
            .get(vout as usize)
            .ok_or(FetchError::MissingOutput { txid, vout })?;
        let bytes = hex::decode(&output.scriptpubkey)
            .map_err(|e| FetchError::ParseError(e.to_string()))?;

        Ok(ScriptBuf::from_bytes(bytes))
    }

    async fn fetch_recommended_fee_rate(&self) -> Result<f64, FetchError> {
        let url = format!("{}/v1/fees/recommended", self.base_url);
        tracing::debug!("fetching recommended fees from {}", url);

        let fees: RecommendedFees = self.get(&url).await?.json().await?;
        Ok(fees.half_hour_fee as f64)
    }

    async fn broadcast(&self, tx_hex: &str) -> Result<Txid, BroadcastError> {
        let url = format!("{}/tx", self.base_url);
        tracing::info!("broadcasting transaction via {}", url);

        let response = self
            .client()
            .map_err(BroadcastError::HttpError)?
            .post(&url)
            .body(tx_hex.to_string())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            // Surface the rejection reason (fee-too-low, already-in-mempool,
            // ...) verbatim so the operator can act on it.
            return Err(BroadcastError::Rejected(format!("{}: {}", status, body.trim())));
        }

        Txid::from_str(body.trim()).map_err(|e| BroadcastError::ParseError(e.to_string()))
    }
}

/// esplora `/address/:addr/utxo` entry.
#[derive(Debug, serde::Deserialize)]
struct UtxoEntry {
    txid: String,
    vout: u32,
    value: u64,
    status: UtxoConfirmation,
}

#[derive(Debug, serde::Deserialize)]
struct UtxoConfirmation {
    confirmed: bool,
}

/// esplora `/tx/:txid` response, reduced to the fields we read.
#[derive(Debug, serde::Deserialize)]
struct TxEntry {
    vout: Vec<TxOutEntry>,
}

#[derive(Debug, serde::Deserialize)]
struct TxOutEntry {
    scriptpubkey: String,
}

/// mempool.space `/v1/fees/recommended` response.
#[derive(Debug, serde::Deserialize)]
struct RecommendedFees {
    #[serde(rename = "fastestFee")]
    #[allow(dead_code)]
    fastest_fee: u32,
    #[serde(rename = "halfHourFee")]
    half_hour_fee: u32,
    #[serde(rename = "hourFee")]
    #[allow(dead_code)]
    hour_fee: u32,
    #[serde(rename = "economyFee")]
    #[allow(dead_code)]
    economy_fee: u32,
    #[serde(rename = "minimumFee")]
    #[allow(dead_code)]
    minimum_fee: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regtest_requires_explicit_url() {
        assert!(matches!(
            EsploraApi::new(Network::Regtest, None),
            Err(FetchError::UnsupportedNetwork(_))
        ));
        assert!(EsploraApi::new(
            Network::Regtest,
            Some("http://localhost:3002/".to_string())
        )
        .is_ok());
    }

    #[test]
    fn base_url_is_normalized() {
        let api = EsploraApi::new(
            Network::Regtest,
            Some("http://localhost:3002/".to_string()),
        )
        .unwrap();
        assert_eq!(api.base_url, "http://localhost:3002");
    }

    #[test]
    fn fee_response_parses_mempool_space_shape() {
        let json = r#"{"fastestFee":20,"halfHourFee":10,"hourFee":5,"economyFee":2,"minimumFee":1}"#;
        let fees: RecommendedFees = serde_json::from_str(json).unwrap();
        assert_eq!(fees.half_hour_fee, 10);
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn fetch_recommended_fee_rate_signet() {
        let api = EsploraApi::new(Network::Signet, None).unwrap();
        let rate = api.fetch_recommended_fee_rate().await.unwrap();
        assert!(rate > 0.0);
    }
}
