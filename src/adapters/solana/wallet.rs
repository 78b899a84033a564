//! Wallet keypair loading.
//!
//! Accepts the standard JSON-array keypair file, or the `WALLET_PRIVATE_KEY`
//! environment variable holding either a base58 string or a comma-separated
//! byte list. Secret material never appears in logs.

use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const WALLET_KEY_ENV: &str = "WALLET_PRIVATE_KEY";

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("failed to load keypair: {0}")]
    Load(String),
    #[error("invalid keypair bytes: {0}")]
    InvalidKeypair(String),
    #[error("no wallet configured: set {WALLET_KEY_ENV} or a keypair_path")]
    Missing,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct Wallet {
    keypair: Keypair,
}

impl Wallet {
    /// Load from a JSON-array keypair file (`solana-keygen` format).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, WalletError> {
        let contents = fs::read_to_string(path.as_ref())
            .map_err(|e| WalletError::Load(format!("cannot read keypair file: {e}")))?;
        let bytes: Vec<u8> = serde_json::from_str(&contents)
            .map_err(|e| WalletError::Load(format!("keypair file is not a JSON byte array: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Load from the `WALLET_PRIVATE_KEY` environment variable.
    pub fn from_env() -> Result<Self, WalletError> {
        let raw = std::env::var(WALLET_KEY_ENV).map_err(|_| WalletError::Missing)?;
        Self::from_secret_string(raw.trim())
    }

    /// Parse a secret in either supported textual form.
    pub fn from_secret_string(raw: &str) -> Result<Self, WalletError> {
        let bytes: Vec<u8> = if raw.contains(',') {
            raw.trim_matches(['[', ']'])
                .split(',')
                .map(|part| part.trim().parse::<u8>())
                .collect::<Result<_, _>>()
                .map_err(|e| WalletError::InvalidKeypair(e.to_string()))?
        } else {
            bs58::decode(raw)
                .into_vec()
                .map_err(|e| WalletError::InvalidKeypair(e.to_string()))?
        };
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WalletError> {
        let keypair =
            Keypair::from_bytes(bytes).map_err(|e| WalletError::InvalidKeypair(e.to_string()))?;
        Ok(Self { keypair })
    }

    /// A throwaway keypair for dry runs and tests.
    pub fn new_random() -> Self {
        Self {
            keypair: Keypair::new(),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn public_key(&self) -> String {
        self.keypair.pubkey().to_string()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn random_wallet_has_pubkey() {
        let wallet = Wallet::new_random();
        assert!(!wallet.public_key().is_empty());
    }

    #[test]
    fn round_trips_through_file() {
        let wallet = Wallet::new_random();
        let file = NamedTempFile::new().unwrap();
        let bytes = wallet.keypair.to_bytes().to_vec();
        fs::write(file.path(), serde_json::to_string(&bytes).unwrap()).unwrap();

        let loaded = Wallet::from_file(file.path()).unwrap();
        assert_eq!(loaded.public_key(), wallet.public_key());
    }

    #[test]
    fn parses_comma_separated_secret() {
        let wallet = Wallet::new_random();
        let bytes = wallet.keypair.to_bytes();
        let raw = format!(
            "[{}]",
            bytes
                .iter()
                .map(|b| b.to_string())
                .collect::<Vec<_>>()
                .join(",")
        );
        let loaded = Wallet::from_secret_string(&raw).unwrap();
        assert_eq!(loaded.public_key(), wallet.public_key());
    }

    #[test]
    fn parses_base58_secret() {
        let wallet = Wallet::new_random();
        let raw = bs58::encode(wallet.keypair.to_bytes()).into_string();
        let loaded = Wallet::from_secret_string(&raw).unwrap();
        assert_eq!(loaded.public_key(), wallet.public_key());
    }

    #[test]
    fn garbage_secret_fails() {
        assert!(Wallet::from_secret_string("not-a-key").is_err());
        assert!(Wallet::from_secret_string("1,2,3").is_err());
    }

    #[test]
    fn missing_file_fails() {
        assert!(Wallet::from_file("/nonexistent/keypair.json").is_err());
    }
}
