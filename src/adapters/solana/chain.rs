//! Chain-query adapter over the JSON-RPC client.
//!
//! Read-only lookups for the LP-lock layer. The sync RPC client runs inside
//! `spawn_blocking`; the two bulk reads a screen needs are issued
//! sequentially, never multiplexed.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use solana_client::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::program_pack::Pack;
use solana_sdk::pubkey::Pubkey;
use spl_token::state::Account as TokenAccount;

use crate::domain::known_addresses::SYSTEM_PROGRAM;
use crate::ports::chain::{ChainError, ChainQueryPort};

#[derive(Clone)]
pub struct ChainQueries {
    client: Arc<RpcClient>,
}

impl ChainQueries {
    pub fn new(rpc_url: String) -> Self {
        let client = Arc::new(RpcClient::new_with_commitment(
            rpc_url,
            CommitmentConfig::confirmed(),
        ));
        Self { client }
    }

    fn parse_pubkey(address: &str) -> Result<Pubkey, ChainError> {
        Pubkey::from_str(address).map_err(|e| ChainError::InvalidAddress(e.to_string()))
    }

    fn parse_pubkeys(addresses: &[String]) -> Result<Vec<Pubkey>, ChainError> {
        addresses.iter().map(|a| Self::parse_pubkey(a)).collect()
    }
}

#[async_trait]
impl ChainQueryPort for ChainQueries {
    async fn native_balance(&self, address: &str) -> Result<u64, ChainError> {
        let pubkey = Self::parse_pubkey(address)?;
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || {
            client
                .get_balance(&pubkey)
                .map_err(|e| ChainError::Rpc(e.to_string()))
        })
        .await
        .map_err(|e| ChainError::Rpc(format!("task join error: {e}")))?
    }

    async fn token_supply(&self, mint: &str) -> Result<u64, ChainError> {
        let pubkey = Self::parse_pubkey(mint)?;
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || {
            client
                .get_token_supply(&pubkey)
                .map_err(|e| ChainError::Rpc(e.to_string()))
                .and_then(|supply| {
                    supply
                        .amount
                        .parse::<u64>()
                        .map_err(|e| ChainError::Rpc(format!("supply parse error: {e}")))
                })
        })
        .await
        .map_err(|e| ChainError::Rpc(format!("task join error: {e}")))?
    }

    async fn largest_token_accounts(
        &self,
        mint: &str,
    ) -> Result<Vec<(String, u64)>, ChainError> {
        let pubkey = Self::parse_pubkey(mint)?;
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || {
            let accounts = client
                .get_token_largest_accounts(&pubkey)
                .map_err(|e| ChainError::Rpc(e.to_string()))?;
            Ok(accounts
                .into_iter()
                .filter_map(|acct| {
                    let amount = acct.amount.amount.parse::<u64>().ok()?;
                    Some((acct.address, amount))
                })
                .collect())
        })
        .await
        .map_err(|e| ChainError::Rpc(format!("task join error: {e}")))?
    }

    async fn account_authorities(
        &self,
        accounts: &[String],
    ) -> Result<HashMap<String, String>, ChainError> {
        let pubkeys = Self::parse_pubkeys(accounts)?;
        let addresses: Vec<String> = accounts.to_vec();
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || {
            let infos = client
                .get_multiple_accounts(&pubkeys)
                .map_err(|e| ChainError::Rpc(e.to_string()))?;
            let mut map = HashMap::new();
            for (address, info) in addresses.into_iter().zip(infos) {
                let authority = match info {
                    // Account closed on-chain: classification reads this as
                    // burned.
                    None => SYSTEM_PROGRAM.to_string(),
                    Some(account) => match TokenAccount::unpack(&account.data) {
                        Ok(token_account) => token_account.owner.to_string(),
                        // Not a token account; fall back to the program owner.
                        Err(_) => account.owner.to_string(),
                    },
                };
                map.insert(address, authority);
            }
            Ok(map)
        })
        .await
        .map_err(|e| ChainError::Rpc(format!("task join error: {e}")))?
    }

    async fn account_owners(
        &self,
        addresses: &[String],
    ) -> Result<HashMap<String, String>, ChainError> {
        let pubkeys = Self::parse_pubkeys(addresses)?;
        let names: Vec<String> = addresses.to_vec();
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || {
            let infos = client
                .get_multiple_accounts(&pubkeys)
                .map_err(|e| ChainError::Rpc(e.to_string()))?;
            let mut map = HashMap::new();
            for (address, info) in names.into_iter().zip(infos) {
                let owner = match info {
                    // No on-chain account: a regular (unfunded) wallet.
                    None => SYSTEM_PROGRAM.to_string(),
                    Some(account) => account.owner.to_string(),
                };
                map.insert(address, owner);
            }
            Ok(map)
        })
        .await
        .map_err(|e| ChainError::Rpc(format!("task join error: {e}")))?
    }
}
