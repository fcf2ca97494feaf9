//! Funding key material
//!
//! Derives the signing key pair and the funding address/script from a WIF
//! private key, for either spending scheme. Purely a derivation step: the
//! same WIF, network and scheme always produce the same material.

use bitcoin::key::TweakedPublicKey;
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey, XOnlyPublicKey};
use bitcoin::{Address, Network, NetworkKind, PrivateKey, ScriptBuf};
use serde::{Deserialize, Serialize};

/// How the funding address is spent. Selected once at session setup;
/// every downstream component dispatches on this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigningScheme {
    /// P2WPKH, spent with an ECDSA signature over the BIP143 sighash.
    #[serde(rename = "p2wpkh")]
    WitnessKeyHash,
    /// P2TR key-path, spent with a Schnorr signature over the BIP341 sighash.
    #[serde(rename = "p2tr")]
    TaprootKeyPath,
}

impl SigningScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            SigningScheme::WitnessKeyHash => "p2wpkh",
            SigningScheme::TaprootKeyPath => "p2tr",
        }
    }
}

impl std::fmt::Display for SigningScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SigningScheme {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, KeyError> {
        match s.to_lowercase().as_str() {
            "p2wpkh" | "segwit" => Ok(SigningScheme::WitnessKeyHash),
            "p2tr" | "taproot" => Ok(SigningScheme::TaprootKeyPath),
            other => Err(KeyError::UnknownScheme(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("malformed WIF private key: {0}")]
    InvalidKey(#[from] bitcoin::key::FromWifError),

    #[error("key is for {key_network:?} but the configured network is {expected}")]
    NetworkMismatch {
        key_network: NetworkKind,
        expected: Network,
    },

    #[error("uncompressed keys cannot fund segwit outputs")]
    UncompressedKey,

    #[error("unknown signing scheme: {0} (expected p2wpkh or p2tr)")]
    UnknownScheme(String),

    #[error("failed to derive funding address: {0}")]
    Address(#[from] bitcoin::address::FromScriptError),
}

/// The session's signing material: private scalar, public key (full and
/// x-only) and the funding address with its locking script.
///
/// The secret scalar lives only as long as this struct; `SecretKey` zeroizes
/// itself on drop.
#[derive(Debug)]
pub struct FundingKeys {
    pub scheme: SigningScheme,
    pub network: Network,
    pub secret: SecretKey,
    pub public: PublicKey,
    pub xonly: XOnlyPublicKey,
    pub address: Address,
    pub script_pubkey: ScriptBuf,
}

impl FundingKeys {
    /// Decode a WIF private key and derive the funding address for `scheme`.
    ///
    /// The WIF's embedded network tag must match `network`, and the key must
    /// be compressed (uncompressed keys are unspendable under segwit rules).
    pub fn from_wif(
        wif: &str,
        network: Network,
        scheme: SigningScheme,
    ) -> Result<Self, KeyError> {
        let privkey = PrivateKey::from_wif(wif)?;

        if privkey.network != NetworkKind::from(network) {
            return Err(KeyError::NetworkMismatch {
                key_network: privkey.network,
                expected: network,
            });
        }
        if !privkey.compressed {
            return Err(KeyError::UncompressedKey);
        }

        let secp = Secp256k1::new();
        let secret = privkey.inner;
        let public = secret.public_key(&secp);
        let xonly = XOnlyPublicKey::from(public);

        let script_pubkey = match scheme {
            SigningScheme::WitnessKeyHash => {
                let pubkey = bitcoin::PublicKey::new(public);
                let wpkh = pubkey
                    .wpubkey_hash()
                    .map_err(|_| KeyError::UncompressedKey)?;
                ScriptBuf::new_p2wpkh(&wpkh)
            }
            SigningScheme::TaprootKeyPath => {
                // The output commits to the raw x-only key; parity is
                // handled at signing time by negating the scalar.
                let output_key = TweakedPublicKey::dangerous_assume_tweaked(xonly);
                ScriptBuf::new_p2tr_tweaked(output_key)
            }
        };

        let address = Address::from_script(&script_pubkey, network)?;

        tracing::debug!(
            "derived {} funding address {} on {}",
            scheme,
            address,
            network
        );

        Ok(Self {
            scheme,
            network,
            secret,
            public,
            xonly,
            address,
            script_pubkey,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn test_wif(byte: u8) -> String {
        let secret = SecretKey::from_slice(&[byte; 32]).unwrap();
        PrivateKey::new(secret, NetworkKind::Test).to_wif()
    }

    #[test]
    fn scheme_from_str() {
        assert_eq!(
            SigningScheme::from_str("p2wpkh").unwrap(),
            SigningScheme::WitnessKeyHash
        );
        assert_eq!(
            SigningScheme::from_str("TAPROOT").unwrap(),
            SigningScheme::TaprootKeyPath
        );
        assert!(SigningScheme::from_str("p2sh").is_err());
    }

    #[test]
    fn derives_p2wpkh_address() {
        let keys = FundingKeys::from_wif(
            &test_wif(0x11),
            Network::Regtest,
            SigningScheme::WitnessKeyHash,
        )
        .unwrap();

        assert!(keys.script_pubkey.is_p2wpkh());
        assert_eq!(keys.address.script_pubkey(), keys.script_pubkey);
    }

    #[test]
    fn derives_p2tr_address_committing_to_raw_xonly_key() {
        let keys = FundingKeys::from_wif(
            &test_wif(0x22),
            Network::Regtest,
            SigningScheme::TaprootKeyPath,
        )
        .unwrap();

        assert!(keys.script_pubkey.is_p2tr());
        // OP_1 <32-byte x-only key>, no script-tree tweak applied
        let script_bytes = keys.script_pubkey.as_bytes();
        assert_eq!(script_bytes.len(), 34);
        assert_eq!(&script_bytes[2..34], &keys.xonly.serialize());
    }

    #[test]
    fn rejects_wrong_network() {
        let secret = SecretKey::from_slice(&[0x33; 32]).unwrap();
        let mainnet_wif = PrivateKey::new(secret, NetworkKind::Main).to_wif();

        let err = FundingKeys::from_wif(
            &mainnet_wif,
            Network::Regtest,
            SigningScheme::WitnessKeyHash,
        )
        .unwrap_err();
        assert!(matches!(err, KeyError::NetworkMismatch { .. }));
    }

    #[test]
    fn rejects_garbage_wif() {
        let err = FundingKeys::from_wif(
            "not-a-key",
            Network::Regtest,
            SigningScheme::WitnessKeyHash,
        )
        .unwrap_err();
        assert!(matches!(err, KeyError::InvalidKey(_)));
    }

    #[test]
    fn rejects_uncompressed_key() {
        let secret = SecretKey::from_slice(&[0x44; 32]).unwrap();
        let uncompressed = PrivateKey::new_uncompressed(secret, NetworkKind::Test).to_wif();

        let err = FundingKeys::from_wif(
            &uncompressed,
            Network::Regtest,
            SigningScheme::WitnessKeyHash,
        )
        .unwrap_err();
        assert!(matches!(err, KeyError::UncompressedKey));
    }
}
