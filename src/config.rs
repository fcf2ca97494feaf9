//! Run configuration
//!
//! A payout run is described by a TOML file: network, spending scheme,
//! per-recipient amount, and the paths holding the recipient list and the
//! funding key. The recipient list and WIF are read-only inputs; nothing
//! here is ever written back.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use zeroize::Zeroizing;

use crate::fee::DUST_THRESHOLD;
use crate::keys::SigningScheme;
use crate::payout::SelectionOrder;

/// Bitcoin network to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Regtest,
    Signet,
    Testnet,
    Mainnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Regtest => "regtest",
            Network::Signet => "signet",
            Network::Testnet => "testnet",
            Network::Mainnet => "mainnet",
        }
    }

    pub fn to_bitcoin_network(&self) -> bitcoin::Network {
        match self {
            Network::Regtest => bitcoin::Network::Regtest,
            Network::Signet => bitcoin::Network::Signet,
            Network::Testnet => bitcoin::Network::Testnet,
            Network::Mainnet => bitcoin::Network::Bitcoin,
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Network {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "regtest" => Ok(Network::Regtest),
            "signet" => Ok(Network::Signet),
            "testnet" => Ok(Network::Testnet),
            "mainnet" | "bitcoin" => Ok(Network::Mainnet),
            _ => Err(anyhow::anyhow!("Invalid network: {}", s)),
        }
    }
}

/// Payout run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bitcoin network to use.
    pub network: Network,

    /// How the funding address is spent: "p2wpkh" or "p2tr".
    pub scheme: SigningScheme,

    /// Amount paid to every recipient, in satoshis.
    pub amount_sats: u64,

    /// File with one recipient address per line.
    pub recipients_file: PathBuf,

    /// File holding the funding key in WIF on a single line.
    pub wif_file: PathBuf,

    /// Explicit fee rate in sat/vB. When absent the recommended rate is
    /// fetched from the explorer.
    pub fee_rate: Option<f64>,

    /// Esplora base URL override; required for regtest.
    pub esplora_url: Option<String>,

    /// Order in which candidate UTXOs are considered.
    #[serde(default)]
    pub selection_order: SelectionOrder,

    /// HTTP timeout for explorer calls.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Config {
    /// Load configuration from `path`, or from the default location when no
    /// path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path()?,
        };

        let contents = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        tracing::info!("📝 Loaded config from: {}", config_path.display());
        Ok(config)
    }

    /// Validate configuration before a run.
    pub fn validate(&self) -> Result<()> {
        if self.amount_sats < DUST_THRESHOLD {
            return Err(anyhow::anyhow!(
                "per-recipient amount {} sats is below the {} sat dust threshold",
                self.amount_sats,
                DUST_THRESHOLD
            ));
        }

        if let Some(rate) = self.fee_rate {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(anyhow::anyhow!(
                    "fee_rate must be a positive number of sat/vB, got {}",
                    rate
                ));
            }
        }

        if self.timeout_secs == 0 {
            return Err(anyhow::anyhow!("timeout_secs must be greater than zero"));
        }

        Ok(())
    }
}

/// Read the recipient list: one address per line, blank lines and
/// `#` comments skipped. Every address must belong to `network`.
pub fn read_recipients(path: &Path, network: bitcoin::Network) -> Result<Vec<bitcoin::Address>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read recipients file: {}", path.display()))?;

    let mut recipients = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let address = bitcoin::Address::from_str(line)
            .with_context(|| format!("{}:{}: invalid address", path.display(), lineno + 1))?
            .require_network(network)
            .with_context(|| {
                format!("{}:{}: address is not for {}", path.display(), lineno + 1, network)
            })?;
        recipients.push(address);
    }

    if recipients.is_empty() {
        return Err(anyhow::anyhow!(
            "recipients file {} contains no addresses",
            path.display()
        ));
    }

    tracing::info!("read {} recipients from {}", recipients.len(), path.display());
    Ok(recipients)
}

/// Read the funding key WIF. The returned buffer zeroizes on drop.
pub fn read_wif(path: &Path) -> Result<Zeroizing<String>> {
    let contents = Zeroizing::new(
        fs::read_to_string(path)
            .with_context(|| format!("Failed to read key file: {}", path.display()))?,
    );

    let trimmed = contents.trim();
    if trimmed.is_empty() {
        return Err(anyhow::anyhow!("key file {} is empty", path.display()));
    }

    Ok(Zeroizing::new(trimmed.to_string()))
}

fn default_timeout_secs() -> u64 {
    10
}

/// Default configuration file path.
fn default_config_path() -> Result<PathBuf> {
    let config_dir = directories::ProjectDirs::from("", "", "batchpay")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config").join("batchpay")
        });

    Ok(config_dir.join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_config() -> Config {
        Config {
            network: Network::Regtest,
            scheme: SigningScheme::WitnessKeyHash,
            amount_sats: 10_000,
            recipients_file: PathBuf::from("recipients.txt"),
            wif_file: PathBuf::from("funding.wif"),
            fee_rate: Some(5.0),
            esplora_url: Some("http://localhost:3002".to_string()),
            selection_order: SelectionOrder::Arrival,
            timeout_secs: 10,
        }
    }

    #[test]
    fn network_from_str() {
        assert_eq!("regtest".parse::<Network>().unwrap(), Network::Regtest);
        assert_eq!("SIGNET".parse::<Network>().unwrap(), Network::Signet);
        assert_eq!("bitcoin".parse::<Network>().unwrap(), Network::Mainnet);
        assert!("litecoin".parse::<Network>().is_err());
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = sample_config();
        let toml = toml::to_string(&config).unwrap();
        assert!(toml.contains("network = \"regtest\""));
        assert!(toml.contains("scheme = \"p2wpkh\""));

        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.network, Network::Regtest);
        assert_eq!(parsed.scheme, SigningScheme::WitnessKeyHash);
        assert_eq!(parsed.amount_sats, 10_000);
    }

    #[test]
    fn optional_fields_default() {
        let toml = r#"
            network = "signet"
            scheme = "p2tr"
            amount_sats = 20000
            recipients_file = "r.txt"
            wif_file = "k.wif"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.fee_rate, None);
        assert_eq!(config.selection_order, SelectionOrder::Arrival);
        assert_eq!(config.timeout_secs, 10);
    }

    #[test]
    fn validate_rejects_dust_amount_and_bad_rate() {
        let mut config = sample_config();
        config.amount_sats = 500;
        assert!(config.validate().is_err());

        let mut config = sample_config();
        config.fee_rate = Some(0.0);
        assert!(config.validate().is_err());

        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn recipients_file_parsing() {
        use bitcoin::hashes::Hash;
        use bitcoin::{Address, ScriptBuf, WPubkeyHash};

        let script = ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([0x11; 20]));
        let address = Address::from_script(&script, bitcoin::Network::Regtest).unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# payout batch 7").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "{address}").unwrap();
        writeln!(file, "  {address}  ").unwrap();

        let recipients = read_recipients(file.path(), bitcoin::Network::Regtest).unwrap();
        assert_eq!(recipients.len(), 2);
        assert_eq!(recipients[0], address);
    }

    #[test]
    fn recipients_file_rejects_wrong_network_and_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not-an-address").unwrap();
        assert!(read_recipients(file.path(), bitcoin::Network::Regtest).is_err());

        let mut empty = tempfile::NamedTempFile::new().unwrap();
        writeln!(empty, "# nothing here").unwrap();
        assert!(read_recipients(empty.path(), bitcoin::Network::Regtest).is_err());
    }

    #[test]
    fn wif_file_is_trimmed_and_must_be_nonempty() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  cThisIsNotValidatedHere  ").unwrap();
        let wif = read_wif(file.path()).unwrap();
        assert_eq!(wif.as_str(), "cThisIsNotValidatedHere");

        let empty = tempfile::NamedTempFile::new().unwrap();
        assert!(read_wif(empty.path()).is_err());
    }
}
