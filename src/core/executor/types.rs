//! 执行器相关类型定义

use crate::core::types::{FailureKind, InclusionReceipt, StrikeState};
use ethers::types::{H256, U256};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// 上链确认结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationResult {
    pub tx_hash: H256,
    /// Confirmed 或 Failed(Other)
    pub state: StrikeState,
    pub receipt: Option<InclusionReceipt>,
    /// 确认时间戳
    pub timestamp: i64,
}

impl ConfirmationResult {
    pub fn confirmed(receipt: InclusionReceipt) -> Self {
        Self {
            tx_hash: receipt.tx_hash,
            state: StrikeState::Confirmed,
            receipt: Some(receipt),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn failed(tx_hash: H256, receipt: Option<InclusionReceipt>) -> Self {
        Self {
            tx_hash,
            state: StrikeState::Failed(FailureKind::Other),
            receipt,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// 已广播的打击
///
/// 上链等待在独立任务中进行，`confirmation` 可用于等待结果
#[derive(Debug)]
pub struct SubmittedStrike {
    pub event_id: Uuid,
    pub tx_hash: H256,
    pub sequence: U256,
    pub confirmation: JoinHandle<ConfirmationResult>,
}

/// 执行失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrikeFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl StrikeFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
