//! 核心数据类型
//!
//! 区块观察、鲸鱼事件、打击参数、利润评估以及统一的错误类型

use chrono::{DateTime, Utc};
use ethers::types::{Address, Bytes, H256, I256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// 交易摘要：区块中一笔交易的只读视图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub hash: H256,
    /// 原生币数量 (wei)
    pub value: U256,
}

impl TransactionSummary {
    pub fn new(hash: H256, value: U256) -> Self {
        Self { hash, value }
    }
}

/// 区块观察：每次新区块通知产生一次，扫描后丢弃
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockObservation {
    pub number: u64,
    pub transactions: Vec<TransactionSummary>,
}

impl BlockObservation {
    pub fn new(number: u64, transactions: Vec<TransactionSummary>) -> Self {
        Self {
            number,
            transactions,
        }
    }
}

/// 鲸鱼事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhaleEvent {
    /// 用于日志关联的唯一ID
    pub id: Uuid,
    pub block_number: u64,
    pub triggering_hash: H256,
    pub value: U256,
    pub detected_at: DateTime<Utc>,
}

impl WhaleEvent {
    pub fn new(block_number: u64, tx: &TransactionSummary) -> Self {
        Self {
            id: Uuid::new_v4(),
            block_number,
            triggering_hash: tx.hash,
            value: tx.value,
            detected_at: Utc::now(),
        }
    }
}

/// 闪电贷打击参数，每个鲸鱼事件重新计算
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrikeParameters {
    pub loan_asset: Address,
    pub loan_amount: U256,
    pub swap_path: Vec<Address>,
}

/// Gas费用快照，不跨打击缓存
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEstimate {
    pub max_fee_per_gas: U256,
    pub gas_cost: U256,
    /// false 表示使用了配置的费用上限
    pub live: bool,
}

/// 利润评估
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfitAssessment {
    pub raw_simulated_return: U256,
    pub gas_cost: U256,
    pub loan_fee: U256,
    pub total_expense: U256,
    /// 可能为负
    pub net_profit: I256,
}

impl fmt::Display for ProfitAssessment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "return={} wei, gas={} wei, loan_fee={} wei, net={} wei",
            self.raw_simulated_return, self.gas_cost, self.loan_fee, self.net_profit
        )
    }
}

/// 只读调用请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
}

/// 未签名的打击交易 (EIP-1559)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedStrike {
    pub chain_id: u64,
    pub to: Address,
    pub data: Bytes,
    pub gas_limit: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

/// 交易上链收据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionReceipt {
    pub tx_hash: H256,
    pub block_number: Option<u64>,
    pub succeeded: bool,
    pub gas_used: Option<U256>,
}

/// 拒绝原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    NoProfit,
    SimulationRevert,
}

/// 失败类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// 序号冲突，已触发重新同步
    NonceRetry,
    Other,
}

/// 单个鲸鱼事件的状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrikeState {
    Detected,
    Sizing,
    Simulating,
    Rejected(RejectReason),
    Approved,
    Submitting,
    Confirmed,
    Failed(FailureKind),
}

impl StrikeState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StrikeState::Rejected(_)
                | StrikeState::Confirmed
                | StrikeState::Failed(FailureKind::Other)
        )
    }
}

impl fmt::Display for StrikeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrikeState::Detected => write!(f, "Detected"),
            StrikeState::Sizing => write!(f, "Sizing"),
            StrikeState::Simulating => write!(f, "Simulating"),
            StrikeState::Rejected(RejectReason::NoProfit) => write!(f, "Rejected(no-profit)"),
            StrikeState::Rejected(RejectReason::SimulationRevert) => {
                write!(f, "Rejected(simulation-revert)")
            }
            StrikeState::Approved => write!(f, "Approved"),
            StrikeState::Submitting => write!(f, "Submitting"),
            StrikeState::Confirmed => write!(f, "Confirmed"),
            StrikeState::Failed(FailureKind::NonceRetry) => write!(f, "Failed(nonce-retry)"),
            StrikeState::Failed(FailureKind::Other) => write!(f, "Failed(other)"),
        }
    }
}

/// 运行统计 (仅内存)
#[derive(Debug, Default)]
pub struct StrikeStatistics {
    blocks_scanned: AtomicU64,
    blocks_dropped: AtomicU64,
    whales_detected: AtomicU64,
    rejected_no_profit: AtomicU64,
    rejected_revert: AtomicU64,
    strikes_fired: AtomicU64,
    strikes_confirmed: AtomicU64,
    strikes_failed: AtomicU64,
}

/// 统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub blocks_scanned: u64,
    pub blocks_dropped: u64,
    pub whales_detected: u64,
    pub rejected_no_profit: u64,
    pub rejected_revert: u64,
    pub strikes_fired: u64,
    pub strikes_confirmed: u64,
    pub strikes_failed: u64,
}

impl StrikeStatistics {
    pub fn record_block(&self) {
        self.blocks_scanned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_block(&self) {
        self.blocks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_whale(&self) {
        self.whales_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self, reason: RejectReason) {
        let counter = match reason {
            RejectReason::NoProfit => &self.rejected_no_profit,
            RejectReason::SimulationRevert => &self.rejected_revert,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fired(&self) {
        self.strikes_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_confirmed(&self) {
        self.strikes_confirmed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.strikes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            blocks_scanned: self.blocks_scanned.load(Ordering::Relaxed),
            blocks_dropped: self.blocks_dropped.load(Ordering::Relaxed),
            whales_detected: self.whales_detected.load(Ordering::Relaxed),
            rejected_no_profit: self.rejected_no_profit.load(Ordering::Relaxed),
            rejected_revert: self.rejected_revert.load(Ordering::Relaxed),
            strikes_fired: self.strikes_fired.load(Ordering::Relaxed),
            strikes_confirmed: self.strikes_confirmed.load(Ordering::Relaxed),
            strikes_failed: self.strikes_failed.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Display for StatisticsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "blocks={} (dropped {}), whales={}, rejected={}/{} (no-profit/revert), fired={}, confirmed={}, failed={}",
            self.blocks_scanned,
            self.blocks_dropped,
            self.whales_detected,
            self.rejected_no_profit,
            self.rejected_revert,
            self.strikes_fired,
            self.strikes_confirmed,
            self.strikes_failed
        )
    }
}

/// 错误类型
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("RPC call failed: {0}")]
    RpcError(String),

    #[error("Simulation reverted: {0}")]
    SimulationReverted(String),

    #[error("Nonce conflict: {0}")]
    NonceConflict(String),

    #[error("Transaction failed: {0}")]
    TransactionError(String),

    #[error("Signing failed: {0}")]
    SigningError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl BotError {
    /// 广播失败是否由序号 (nonce) 引起
    pub fn is_nonce_conflict(&self) -> bool {
        match self {
            BotError::NonceConflict(_) => true,
            BotError::TransactionError(msg) | BotError::RpcError(msg) => {
                msg.to_lowercase().contains("nonce")
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
