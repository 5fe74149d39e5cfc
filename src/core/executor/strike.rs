//! 打击执行器
//!
//! 取序号、签名、广播，然后把上链等待交给独立任务。

use super::types::{ConfirmationResult, StrikeFailure, SubmittedStrike};
use crate::core::gateway::{ChainGateway, StrikeSigner};
use crate::core::types::{
    FailureKind, StrikeState, StrikeStatistics, UnsignedStrike, WhaleEvent,
};
use crate::strategy::sequencer::SequencingManager;
use crate::strategy::simulator::SimulatedStrike;
use ethers::types::{Address, H256, U256};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// 交易费用设置，打击交易始终使用配置的上限
#[derive(Debug, Clone, Copy)]
pub struct StrikeFees {
    pub gas_limit: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

pub struct StrikeExecutor {
    signer: Arc<dyn StrikeSigner>,
    sequencer: Arc<SequencingManager>,
    stats: Arc<StrikeStatistics>,
    chain_id: u64,
    target_contract: Address,
    fees: StrikeFees,
}

impl StrikeExecutor {
    pub fn new(
        signer: Arc<dyn StrikeSigner>,
        sequencer: Arc<SequencingManager>,
        stats: Arc<StrikeStatistics>,
        chain_id: u64,
        target_contract: Address,
        fees: StrikeFees,
    ) -> Self {
        Self {
            signer,
            sequencer,
            stats,
            chain_id,
            target_contract,
            fees,
        }
    }

    pub fn operator(&self) -> Address {
        self.signer.address()
    }

    fn unsigned(&self, strike: &SimulatedStrike) -> UnsignedStrike {
        UnsignedStrike {
            chain_id: self.chain_id,
            to: self.target_contract,
            data: strike.calldata.clone(),
            gas_limit: self.fees.gas_limit,
            max_fee_per_gas: self.fees.max_fee_per_gas,
            max_priority_fee_per_gas: self.fees.max_priority_fee_per_gas,
        }
    }

    /// 发射一次打击
    ///
    /// 序号在签名成功后、广播之前提交。`started` 是收到区块的时刻，用于延迟统计。
    pub async fn execute(
        &self,
        gateway: &Arc<dyn ChainGateway>,
        strike: &SimulatedStrike,
        event: &WhaleEvent,
        started: Instant,
    ) -> std::result::Result<SubmittedStrike, StrikeFailure> {
        let ticket = match self.sequencer.reserve(gateway.as_ref()).await {
            Ok(ticket) => ticket,
            Err(e) => {
                error!(event = %event.id, "Failed to reserve sequence: {}", e);
                self.stats.record_failed();
                return Err(StrikeFailure::new(FailureKind::Other, e.to_string()));
            }
        };

        let unsigned = self.unsigned(strike);
        let raw = match self.signer.sign(&unsigned, ticket.sequence()).await {
            Ok(raw) => raw,
            Err(e) => {
                // ticket 未提交，计数器不变
                drop(ticket);
                error!(event = %event.id, "Failed to sign strike: {}", e);
                self.stats.record_failed();
                return Err(StrikeFailure::new(FailureKind::Other, e.to_string()));
            }
        };
        let sequence = ticket.commit();

        let tx_hash = match gateway.broadcast(raw).await {
            Ok(hash) => hash,
            Err(e) if e.is_nonce_conflict() => {
                warn!(event = %event.id, %sequence, "Nonce conflict, resyncing: {}", e);
                if let Err(sync_err) = self.sequencer.resync(gateway.as_ref()).await {
                    warn!("Resync after nonce conflict failed: {}", sync_err);
                }
                self.stats.record_failed();
                return Err(StrikeFailure::new(FailureKind::NonceRetry, e.to_string()));
            }
            Err(e) => {
                error!(event = %event.id, %sequence, "Broadcast failed: {}", e);
                // 节点是否收到交易未知，下次打击前重新同步
                self.sequencer.mark_stale().await;
                self.stats.record_failed();
                return Err(StrikeFailure::new(FailureKind::Other, e.to_string()));
            }
        };

        self.stats.record_fired();
        info!(
            event = %event.id,
            tx = ?tx_hash,
            %sequence,
            loan = %strike.params.loan_amount,
            latency_ms = started.elapsed().as_millis() as u64,
            "Strike fired"
        );

        let confirmation = tokio::spawn(watch_inclusion(
            gateway.clone(),
            self.sequencer.clone(),
            self.stats.clone(),
            tx_hash,
        ));

        Ok(SubmittedStrike {
            event_id: event.id,
            tx_hash,
            sequence,
            confirmation,
        })
    }
}

/// 未上链时交易可能已被丢弃，本地序号不再可信
async fn watch_inclusion(
    gateway: Arc<dyn ChainGateway>,
    sequencer: Arc<SequencingManager>,
    stats: Arc<StrikeStatistics>,
    tx_hash: H256,
) -> ConfirmationResult {
    let result = match gateway.wait_for_inclusion(tx_hash).await {
        Ok(Some(receipt)) if receipt.succeeded => {
            info!(tx = ?tx_hash, block = ?receipt.block_number, "Strike confirmed");
            ConfirmationResult::confirmed(receipt)
        }
        Ok(Some(receipt)) => {
            warn!(tx = ?tx_hash, block = ?receipt.block_number, "Strike reverted on chain");
            ConfirmationResult::failed(tx_hash, Some(receipt))
        }
        Ok(None) => {
            warn!(tx = ?tx_hash, "Strike not included before timeout");
            sequencer.mark_stale().await;
            ConfirmationResult::failed(tx_hash, None)
        }
        Err(e) => {
            warn!(tx = ?tx_hash, "Inclusion wait failed: {}", e);
            sequencer.mark_stale().await;
            ConfirmationResult::failed(tx_hash, None)
        }
    };

    if result.state == StrikeState::Confirmed {
        stats.record_confirmed();
    } else {
        stats.record_failed();
    }
    result
}
