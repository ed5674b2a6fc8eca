//! Transaction signer and sender for liquidations.
//! Uses Alloy providers for type-safe RPC interactions.
//!
//! Several liquidation attempts may be in flight at once. Nonce assignment
//! and submission happen under one lock, so the counter only ever moves past
//! nonces the node has accepted; receipts are awaited outside the lock.

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{parse_url, ChainError};
use crate::gas::GasPolicy;

/// Deadline for handing a signed transaction to the node.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(20);

/// Deadline for a submitted transaction to be mined.
pub const RECEIPT_TIMEOUT: Duration = Duration::from_secs(60);

/// Next-nonce bookkeeping. Lives behind the submission lock.
#[derive(Debug, Default)]
pub struct NonceManager {
    next: Option<u64>,
}

impl NonceManager {
    /// Whether a chain count has been adopted since the last failure.
    pub fn is_synced(&self) -> bool {
        self.next.is_some()
    }

    /// Adopt the chain's pending transaction count.
    pub fn sync(&mut self, pending_count: u64) {
        self.next = Some(pending_count);
    }

    /// Hand out the next nonce; `None` until synced.
    pub fn reserve(&mut self) -> Option<u64> {
        let nonce = self.next?;
        self.next = Some(nonce + 1);
        Some(nonce)
    }

    /// Forget the counter after a failed submission. The node may or may not
    /// have seen the transaction, so the next reservation resyncs.
    pub fn invalidate(&mut self) {
        self.next = None;
    }
}

/// Signs, submits and waits for one receipt per transaction.
pub struct TransactionSender {
    rpc_url: String,
    wallet: EthereumWallet,
    /// Signer address
    pub address: Address,
    chain_id: u64,
    nonces: Mutex<NonceManager>,
}

impl TransactionSender {
    /// Create a sender from a hex private key (with or without `0x`).
    ///
    /// No RPC is made here; the account nonce is read on first submission.
    pub fn new(private_key: &str, rpc_url: &str, chain_id: u64) -> Result<Self, ChainError> {
        let key_str = private_key.trim().trim_start_matches("0x");
        let signer: PrivateKeySigner = key_str
            .parse()
            .map_err(|e| ChainError::InvalidKey(format!("{e}")))?;
        let address = signer.address();
        parse_url(rpc_url)?;

        info!(address = %address, chain_id = chain_id, "Transaction sender initialized");

        Ok(Self {
            rpc_url: rpc_url.to_string(),
            wallet: EthereumWallet::from(signer),
            address,
            chain_id,
            nonces: Mutex::new(NonceManager::default()),
        })
    }

    /// Send a transaction and wait for its receipt.
    ///
    /// Returns the transaction hash when the receipt reports success and
    /// `ChainError::Reverted` when it does not.
    pub async fn send_transaction(
        &self,
        to: Address,
        calldata: Bytes,
        gas: GasPolicy,
    ) -> Result<B256, ChainError> {
        let total_start = Instant::now();
        let provider = ProviderBuilder::new()
            .wallet(self.wallet.clone())
            .on_http(parse_url(&self.rpc_url)?);

        let (pending, nonce) = {
            let mut nonces = self.nonces.lock().await;
            if !nonces.is_synced() {
                let count = provider
                    .get_transaction_count(self.address)
                    .pending()
                    .await
                    .map_err(ChainError::rpc)?;
                nonces.sync(count);
                debug!(nonce = count, "Nonce synced from pending count");
            }
            let nonce = nonces
                .reserve()
                .ok_or_else(|| ChainError::Rpc("nonce not synced".to_string()))?;

            let mut tx = TransactionRequest::default()
                .with_to(to)
                .with_input(calldata)
                .with_nonce(nonce)
                .with_chain_id(self.chain_id);
            gas.apply(&mut tx);

            debug!(
                to = %to,
                nonce = nonce,
                gas_policy = gas.name(),
                gas_price = ?gas.gas_price(),
                "Sending transaction"
            );

            match tokio::time::timeout(SEND_TIMEOUT, provider.send_transaction(tx)).await {
                Ok(Ok(pending)) => (pending, nonce),
                Ok(Err(e)) => {
                    nonces.invalidate();
                    return Err(ChainError::rpc(e));
                }
                Err(_) => {
                    nonces.invalidate();
                    return Err(ChainError::Timeout {
                        op: "send",
                        after_ms: SEND_TIMEOUT.as_millis() as u64,
                    });
                }
            }
        };
        let tx_hash = *pending.tx_hash();

        info!(tx_hash = %tx_hash, nonce = nonce, "Transaction submitted, waiting for receipt");

        let receipt = match tokio::time::timeout(RECEIPT_TIMEOUT, pending.get_receipt()).await {
            Ok(receipt) => receipt.map_err(ChainError::rpc)?,
            Err(_) => {
                warn!(tx_hash = %tx_hash, nonce = nonce, "Receipt timeout, transaction may still be pending");
                return Err(ChainError::Timeout {
                    op: "receipt",
                    after_ms: RECEIPT_TIMEOUT.as_millis() as u64,
                });
            }
        };
        let total_elapsed = total_start.elapsed();

        if receipt.status() {
            info!(
                tx_hash = %tx_hash,
                block = receipt.block_number.unwrap_or(0),
                gas_used = receipt.gas_used,
                total_ms = total_elapsed.as_millis(),
                "Transaction confirmed"
            );
            Ok(tx_hash)
        } else {
            // A mined revert still consumes its nonce
            warn!(
                tx_hash = %tx_hash,
                total_ms = total_elapsed.as_millis(),
                "Transaction reverted"
            );
            Err(ChainError::Reverted(tx_hash))
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

impl std::fmt::Debug for TransactionSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSender")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("rpc_url", &self.rpc_url)
            .finish_non_exhaustive()
    }
}
