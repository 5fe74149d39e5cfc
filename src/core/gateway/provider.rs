//! 基于 ethers 的网关与签名器实现

use super::{BlockNumberStream, ChainGateway, GatewayConnector, StrikeSigner};
use crate::core::types::{
    BlockObservation, BotError, CallRequest, InclusionReceipt, Result, TransactionSummary,
    UnsignedStrike,
};
use async_trait::async_trait;
use ethers::{
    providers::{Middleware, PendingTransaction, Provider, Ws},
    signers::{LocalWallet, Signer},
    types::{
        transaction::eip2718::TypedTransaction, Address, BlockNumber, Bytes,
        Eip1559TransactionRequest, H256, U256, U64,
    },
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// WebSocket 链网关
pub struct EthersGateway {
    provider: Arc<Provider<Ws>>,
    inclusion_timeout: Duration,
}

impl EthersGateway {
    pub async fn connect(ws_url: &str, inclusion_timeout: Duration) -> Result<Self> {
        let provider = Provider::<Ws>::connect(ws_url)
            .await
            .map_err(|e| BotError::Connection(format!("Failed to connect to WebSocket: {}", e)))?;

        info!("Connected to gateway");

        Ok(Self {
            provider: Arc::new(provider),
            inclusion_timeout,
        })
    }
}

fn rpc_err(context: &str, e: impl std::fmt::Display) -> BotError {
    BotError::RpcError(format!("{}: {}", context, e))
}

#[async_trait]
impl ChainGateway for EthersGateway {
    async fn subscribe_blocks(&self) -> Result<BlockNumberStream> {
        let provider = self.provider.clone();

        let stream = async_stream::stream! {
            let mut blocks = match provider.subscribe_blocks().await {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Failed to subscribe to blocks: {}", e);
                    return;
                }
            };

            while let Some(block) = blocks.next().await {
                if let Some(number) = block.number {
                    yield number.as_u64();
                }
            }

            debug!("Block subscription closed");
        };

        Ok(Box::pin(stream))
    }

    async fn get_block(&self, number: u64) -> Result<Option<BlockObservation>> {
        let block = self
            .provider
            .get_block_with_txs(number)
            .await
            .map_err(|e| rpc_err("get_block", e))?;

        Ok(block.map(|block| {
            let transactions = block
                .transactions
                .iter()
                .map(|tx| TransactionSummary::new(tx.hash, tx.value))
                .collect();
            BlockObservation::new(
                block.number.map(|n| n.as_u64()).unwrap_or(number),
                transactions,
            )
        }))
    }

    async fn block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .map(|n| n.as_u64())
            .map_err(|e| BotError::Connection(format!("Heartbeat failed: {}", e)))
    }

    async fn get_balance(&self, address: Address) -> Result<U256> {
        self.provider
            .get_balance(address, None)
            .await
            .map_err(|e| rpc_err("get_balance", e))
    }

    async fn fee_estimate(&self) -> Result<Option<U256>> {
        let (max_fee_per_gas, _) = self
            .provider
            .estimate_eip1559_fees(None)
            .await
            .map_err(|e| rpc_err("fee_estimate", e))?;

        Ok((!max_fee_per_gas.is_zero()).then_some(max_fee_per_gas))
    }

    async fn simulate_call(&self, call: &CallRequest) -> Result<Bytes> {
        let tx: TypedTransaction = Eip1559TransactionRequest::new()
            .from(call.from)
            .to(call.to)
            .data(call.data.clone())
            .into();

        self.provider.call(&tx, None).await.map_err(|e| {
            let msg = e.to_string();
            if msg.to_lowercase().contains("revert") {
                BotError::SimulationReverted(msg)
            } else {
                rpc_err("eth_call", msg)
            }
        })
    }

    async fn sequence_count(&self, address: Address) -> Result<U256> {
        self.provider
            .get_transaction_count(address, Some(BlockNumber::Latest.into()))
            .await
            .map_err(|e| rpc_err("get_transaction_count", e))
    }

    async fn broadcast(&self, raw: Bytes) -> Result<H256> {
        let pending = self.provider.send_raw_transaction(raw).await.map_err(|e| {
            let msg = e.to_string();
            if msg.to_lowercase().contains("nonce") {
                BotError::NonceConflict(msg)
            } else {
                BotError::TransactionError(msg)
            }
        })?;

        Ok(pending.tx_hash())
    }

    async fn wait_for_inclusion(&self, tx_hash: H256) -> Result<Option<InclusionReceipt>> {
        let pending = PendingTransaction::new(tx_hash, self.provider.as_ref());

        let receipt = match tokio::time::timeout(self.inclusion_timeout, pending).await {
            Ok(result) => result.map_err(|e| rpc_err("wait_for_inclusion", e))?,
            Err(_) => return Ok(None),
        };

        Ok(receipt.map(|r| InclusionReceipt {
            tx_hash: r.transaction_hash,
            block_number: r.block_number.map(|n| n.as_u64()),
            succeeded: r.status == Some(U64::from(1)),
            gas_used: r.gas_used,
        }))
    }
}

/// 生产环境连接器
pub struct EthersConnector {
    ws_url: String,
    inclusion_timeout: Duration,
}

impl EthersConnector {
    pub fn new(ws_url: &str, inclusion_timeout: Duration) -> Self {
        Self {
            ws_url: ws_url.to_string(),
            inclusion_timeout,
        }
    }
}

#[async_trait]
impl GatewayConnector for EthersConnector {
    async fn connect(&self) -> Result<Arc<dyn ChainGateway>> {
        let gateway = EthersGateway::connect(&self.ws_url, self.inclusion_timeout).await?;
        Ok(Arc::new(gateway))
    }
}

/// 本地私钥签名器
pub struct WalletSigner {
    wallet: LocalWallet,
}

impl WalletSigner {
    pub fn new(private_key: &str, chain_id: u64) -> Result<Self> {
        let wallet = private_key
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| BotError::ConfigError(format!("Invalid private key: {}", e)))?
            .with_chain_id(chain_id);

        Ok(Self { wallet })
    }
}

#[async_trait]
impl StrikeSigner for WalletSigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn sign(&self, tx: &UnsignedStrike, sequence: U256) -> Result<Bytes> {
        let request = Eip1559TransactionRequest::new()
            .from(self.wallet.address())
            .to(tx.to)
            .data(tx.data.clone())
            .gas(tx.gas_limit)
            .max_fee_per_gas(tx.max_fee_per_gas)
            .max_priority_fee_per_gas(tx.max_priority_fee_per_gas)
            .nonce(sequence)
            .chain_id(tx.chain_id);

        let typed: TypedTransaction = request.into();
        let signature = self
            .wallet
            .sign_transaction(&typed)
            .await
            .map_err(|e| BotError::SigningError(e.to_string()))?;

        Ok(typed.rlp_signed(&signature))
    }
}
