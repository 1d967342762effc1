//! Transaction building, signing and submission.
//!
//! # Responsibilities
//! - Pick a fee strategy per chain (legacy `gasPrice` or EIP-1559)
//! - Estimate gas and add headroom for estimation error
//! - Sign locally and submit via `eth_sendRawTransaction`
//! - Recover submissions that error but still land under the local hash
//! - Poll for receipts with a hard deadline
//!
//! # Design Decisions
//! - Nonce is read from `eth_getTransactionCount(addr, "pending")` on every send
//! - Only node-reported RPC errors trigger submission recovery; transport
//!   failures propagate untouched
//! - Overrides (gas, fees) skip the corresponding RPC lookup

use alloy::consensus::{TxEip1559, TxLegacy};
use alloy::primitives::{Address, Bytes, TxKind, B256, U256};
use std::time::Duration;
use tokio::time::{sleep, timeout};

use crate::blockchain::rpc::RpcClient;
use crate::blockchain::types::{
    BlockTag, BlockchainError, BlockchainResult, CallRequest, RpcReceipt, SentTx,
};
use crate::blockchain::wallet::{SignedTx, Wallet};
use crate::config::schema::SignerConfig;
use crate::observability::metrics;

/// A contract call to submit, with optional overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxRequest {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    /// Replaces the gas estimate; headroom is still applied.
    pub gas: Option<u64>,
    /// Legacy only.
    pub gas_price: Option<u128>,
    /// EIP-1559 only.
    pub max_fee_per_gas: Option<u128>,
    /// EIP-1559 only; still floored at the configured minimum tip.
    pub max_priority_fee_per_gas: Option<u128>,
}

impl TxRequest {
    /// Zero-value call of `data` on `to`.
    pub fn call(to: Address, data: Bytes) -> Self {
        Self {
            to,
            data,
            ..Default::default()
        }
    }
}

/// How fees are expressed in the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeStrategy {
    Legacy,
    Eip1559,
}

impl FeeStrategy {
    pub fn for_chain(chain_id: u64, legacy_chain_ids: &[u64]) -> Self {
        if legacy_chain_ids.contains(&chain_id) {
            FeeStrategy::Legacy
        } else {
            FeeStrategy::Eip1559
        }
    }
}

/// A fully populated, unsigned transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsignedTx {
    Legacy(TxLegacy),
    Eip1559(TxEip1559),
}

impl UnsignedTx {
    pub fn nonce(&self) -> u64 {
        match self {
            UnsignedTx::Legacy(tx) => tx.nonce,
            UnsignedTx::Eip1559(tx) => tx.nonce,
        }
    }

    pub fn gas_limit(&self) -> u64 {
        match self {
            UnsignedTx::Legacy(tx) => tx.gas_limit,
            UnsignedTx::Eip1559(tx) => tx.gas_limit,
        }
    }

    /// `None` for legacy transactions.
    pub fn max_fee_per_gas(&self) -> Option<u128> {
        match self {
            UnsignedTx::Legacy(_) => None,
            UnsignedTx::Eip1559(tx) => Some(tx.max_fee_per_gas),
        }
    }

    pub fn max_priority_fee_per_gas(&self) -> Option<u128> {
        match self {
            UnsignedTx::Legacy(_) => None,
            UnsignedTx::Eip1559(tx) => Some(tx.max_priority_fee_per_gas),
        }
    }
}

/// `max(estimate + abs, estimate * ratio)`.
pub fn gas_with_headroom(estimate: u64, abs: u64, ratio: f64) -> u64 {
    let scaled = (estimate as f64 * ratio) as u64;
    estimate.saturating_add(abs).max(scaled)
}

/// Signs and submits transactions for one key on one chain.
#[derive(Debug, Clone)]
pub struct TxSigner {
    rpc: RpcClient,
    chain_id: u64,
    wallet: Wallet,
    settings: SignerConfig,
    strategy: FeeStrategy,
}

impl TxSigner {
    pub fn new(rpc: RpcClient, chain_id: u64, wallet: Wallet, settings: SignerConfig) -> Self {
        let strategy = FeeStrategy::for_chain(chain_id, &settings.legacy_chain_ids);
        Self {
            rpc,
            chain_id,
            wallet,
            settings,
            strategy,
        }
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn strategy(&self) -> FeeStrategy {
        self.strategy
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    /// Fill nonce, gas and fees for `request`.
    pub async fn build(&self, request: &TxRequest) -> BlockchainResult<UnsignedTx> {
        let nonce = self
            .rpc
            .get_transaction_count(self.address(), BlockTag::Pending)
            .await?;

        match self.strategy {
            FeeStrategy::Legacy => {
                let gas_price = match request.gas_price {
                    Some(price) => price,
                    None => self.rpc.gas_price().await?,
                };
                let gas_limit = self.gas_limit(request).await?;
                Ok(UnsignedTx::Legacy(TxLegacy {
                    chain_id: Some(self.chain_id),
                    nonce,
                    gas_price,
                    gas_limit,
                    to: TxKind::Call(request.to),
                    value: request.value,
                    input: request.data.clone(),
                }))
            }
            FeeStrategy::Eip1559 => {
                let base_fee = self.base_fee().await?;
                let priority_fee = self.priority_fee(request.max_priority_fee_per_gas).await;
                let max_fee_per_gas = request
                    .max_fee_per_gas
                    .unwrap_or_else(|| base_fee.saturating_mul(2).saturating_add(priority_fee));
                let gas_limit = self.gas_limit(request).await?;
                Ok(UnsignedTx::Eip1559(TxEip1559 {
                    chain_id: self.chain_id,
                    nonce,
                    gas_limit,
                    max_fee_per_gas,
                    max_priority_fee_per_gas: priority_fee,
                    to: TxKind::Call(request.to),
                    value: request.value,
                    access_list: Default::default(),
                    input: request.data.clone(),
                }))
            }
        }
    }

    async fn gas_limit(&self, request: &TxRequest) -> BlockchainResult<u64> {
        let estimate = match request.gas {
            Some(gas) => gas,
            None => {
                let call = CallRequest {
                    from: Some(self.address()),
                    to: request.to,
                    value: Some(request.value),
                    data: request.data.clone(),
                };
                self.rpc.estimate_gas(&call).await?
            }
        };
        Ok(gas_with_headroom(
            estimate,
            self.settings.gas_headroom_abs,
            self.settings.gas_headroom_ratio,
        ))
    }

    /// Latest block's base fee, or the gas price on chains without one.
    async fn base_fee(&self) -> BlockchainResult<u128> {
        let from_block = match self.rpc.latest_block().await {
            Ok(block) => block
                .and_then(|b| b.base_fee_per_gas)
                .and_then(|fee| u128::try_from(fee).ok()),
            Err(e) => {
                tracing::debug!(chain_id = self.chain_id, error = %e, "Latest block unavailable for base fee");
                None
            }
        };
        match from_block {
            Some(fee) => Ok(fee),
            None => self.rpc.gas_price().await,
        }
    }

    async fn priority_fee(&self, requested: Option<u128>) -> u128 {
        let minimum = u128::from(self.settings.min_priority_fee_wei);
        let suggested = match requested {
            Some(fee) => Some(fee),
            None => self.rpc.max_priority_fee_per_gas().await.ok(),
        };
        suggested.unwrap_or(minimum).max(minimum)
    }

    pub fn sign(&self, tx: UnsignedTx) -> BlockchainResult<SignedTx> {
        match tx {
            UnsignedTx::Legacy(tx) => self.wallet.sign(tx),
            UnsignedTx::Eip1559(tx) => self.wallet.sign(tx),
        }
    }

    /// Build, sign and submit.
    pub async fn send(&self, request: &TxRequest) -> BlockchainResult<SentTx> {
        let tx = self.build(request).await?;
        let nonce = tx.nonce();
        let signed = self.sign(tx)?;
        let from_address = self.address();

        tracing::debug!(
            chain_id = self.chain_id,
            from = %from_address,
            to = %request.to,
            nonce,
            tx_hash = %signed.hash,
            "Submitting transaction"
        );

        match self.rpc.send_raw_transaction(&signed.raw).await {
            Ok(tx_hash) => {
                metrics::record_tx_submitted(self.chain_id, "accepted");
                Ok(SentTx {
                    tx_hash,
                    from_address,
                    nonce,
                })
            }
            Err(err @ BlockchainError::Rpc { .. }) => {
                if self.submission_landed(signed.hash).await {
                    tracing::warn!(
                        chain_id = self.chain_id,
                        tx_hash = %signed.hash,
                        error = %err,
                        "Submission reported an error but the transaction is known to the node"
                    );
                    metrics::record_tx_submitted(self.chain_id, "recovered");
                    Ok(SentTx {
                        tx_hash: signed.hash,
                        from_address,
                        nonce,
                    })
                } else {
                    metrics::record_tx_submitted(self.chain_id, "rejected");
                    Err(err)
                }
            }
            Err(err) => {
                metrics::record_tx_submitted(self.chain_id, "rejected");
                Err(err)
            }
        }
    }

    /// Whether a transaction or receipt exists under `hash`.
    async fn submission_landed(&self, hash: B256) -> bool {
        let interval = Duration::from_millis(self.settings.submit_recovery_interval_ms);
        for _ in 0..self.settings.submit_recovery_attempts {
            if let Ok(Some(_)) = self.rpc.get_transaction_by_hash(hash).await {
                return true;
            }
            if let Ok(Some(_)) = self.rpc.get_transaction_receipt(hash).await {
                return true;
            }
            sleep(interval).await;
        }
        false
    }

    /// Poll until a receipt exists or `limit` elapses.
    pub async fn wait_for_receipt(&self, hash: B256, limit: Duration) -> BlockchainResult<RpcReceipt> {
        match timeout(limit, self.poll_receipt(hash)).await {
            Ok(result) => result,
            Err(_) => Err(BlockchainError::Timeout(format!(
                "Timed out waiting for receipt: {}",
                hash
            ))),
        }
    }

    async fn poll_receipt(&self, hash: B256) -> BlockchainResult<RpcReceipt> {
        let interval = Duration::from_millis(self.settings.receipt_poll_interval_ms.max(1));
        loop {
            if let Some(receipt) = self.rpc.get_transaction_receipt(hash).await? {
                return Ok(receipt);
            }
            sleep(interval).await;
        }
    }

    /// Submit and block until the receipt is available.
    pub async fn send_and_wait(
        &self,
        request: &TxRequest,
        limit: Duration,
    ) -> BlockchainResult<(SentTx, RpcReceipt)> {
        let sent = self.send(request).await?;
        let receipt = self.wait_for_receipt(sent.tx_hash, limit).await?;
        Ok((sent, receipt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headroom_uses_larger_of_abs_and_ratio() {
        // Small estimates get the absolute margin.
        assert_eq!(gas_with_headroom(21_000, 50_000, 1.2), 71_000);
        // Large estimates get the ratio.
        assert_eq!(gas_with_headroom(1_000_000, 50_000, 1.2), 1_200_000);
        assert_eq!(gas_with_headroom(0, 50_000, 1.2), 50_000);
    }

    #[test]
    fn test_strategy_selection() {
        let legacy = [31337u64];
        assert_eq!(FeeStrategy::for_chain(31337, &legacy), FeeStrategy::Legacy);
        assert_eq!(FeeStrategy::for_chain(11155111, &legacy), FeeStrategy::Eip1559);
        assert_eq!(FeeStrategy::for_chain(1, &legacy), FeeStrategy::Eip1559);
        assert_eq!(FeeStrategy::for_chain(31337, &[]), FeeStrategy::Eip1559);
    }

    #[test]
    fn test_unsigned_accessors() {
        let legacy = UnsignedTx::Legacy(TxLegacy {
            nonce: 3,
            gas_limit: 90_000,
            ..Default::default()
        });
        assert_eq!(legacy.nonce(), 3);
        assert_eq!(legacy.gas_limit(), 90_000);
        assert_eq!(legacy.max_fee_per_gas(), None);

        let dynamic = UnsignedTx::Eip1559(TxEip1559 {
            max_fee_per_gas: 7,
            max_priority_fee_per_gas: 1,
            ..Default::default()
        });
        assert_eq!(dynamic.max_fee_per_gas(), Some(7));
        assert_eq!(dynamic.max_priority_fee_per_gas(), Some(1));
    }
}
