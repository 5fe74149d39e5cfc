//! 链网关与签名器
//!
//! 节点连接和私钥管理都是外部协作者，这里只定义打击流水线需要的最小接口。
//! 生产实现见 `provider` 子模块 (基于 ethers)。

use crate::core::types::{
    BlockObservation, CallRequest, InclusionReceipt, Result, UnsignedStrike,
};
use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

pub mod provider;

pub use provider::{EthersConnector, EthersGateway, WalletSigner};

/// 新区块号流
pub type BlockNumberStream = Pin<Box<dyn Stream<Item = u64> + Send>>;

/// 链网关trait
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// 订阅新区块，流结束表示连接已断开
    async fn subscribe_blocks(&self) -> Result<BlockNumberStream>;

    /// 获取区块及其交易摘要
    async fn get_block(&self, number: u64) -> Result<Option<BlockObservation>>;

    /// 当前区块高度，用于心跳
    async fn block_number(&self) -> Result<u64>;

    async fn get_balance(&self, address: Address) -> Result<U256>;

    /// 当前 maxFeePerGas 估算，节点未提供时返回 None
    async fn fee_estimate(&self) -> Result<Option<U256>>;

    /// 只读模拟调用，不修改链上状态
    async fn simulate_call(&self, call: &CallRequest) -> Result<Bytes>;

    /// 账户的权威交易计数
    async fn sequence_count(&self, address: Address) -> Result<U256>;

    /// 广播已签名交易，返回交易哈希
    async fn broadcast(&self, raw: Bytes) -> Result<H256>;

    /// 等待交易上链；超时返回 None
    async fn wait_for_inclusion(&self, tx_hash: H256) -> Result<Option<InclusionReceipt>>;
}

/// 签名器trait
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StrikeSigner: Send + Sync {
    fn address(&self) -> Address;

    /// 使用显式序号签名，返回RLP编码的已签名交易
    async fn sign(&self, tx: &UnsignedStrike, sequence: U256) -> Result<Bytes>;
}

/// 网关连接器，供重连使用
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn ChainGateway>>;
}
