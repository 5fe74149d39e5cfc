//! 打击流水线
//!
//! 每个区块走一遍：检测 → 去重 → 本金 → 模拟 → 决策 → 执行。
//! 单个鲸鱼事件的任何失败都只影响该事件，不会中断区块扫描。

use crate::core::executor::{StrikeExecutor, StrikeFees, SubmittedStrike};
use crate::core::gateway::{ChainGateway, StrikeSigner};
use crate::core::types::{
    BlockObservation, FailureKind, ProfitAssessment, RejectReason, StrikeState,
    StrikeStatistics, WhaleEvent,
};
use crate::strategy::config::{AppConfig, ExecutionMode};
use crate::strategy::decision::StrikeDecisionEngine;
use crate::strategy::detector::WhaleDetector;
use crate::strategy::recent::RecentStrikes;
use crate::strategy::sequencer::SequencingManager;
use crate::strategy::simulator::{ProfitabilitySimulator, SimulationOutcome};
use crate::strategy::sizer::{FixedPriceOracle, LoanSchedule, LoanSizer, PriceOracle};
use crate::utils::{format_eth, format_signed_eth};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// 单个区块的处理结果
#[derive(Debug)]
pub enum PipelineOutcome {
    NoWhale,
    /// 该鲸鱼交易已处理过
    Duplicate(WhaleEvent),
    Rejected {
        event: WhaleEvent,
        reason: RejectReason,
        /// 模拟回滚时没有评估
        assessment: Option<ProfitAssessment>,
    },
    /// 仅模拟模式下的批准结果，未广播
    Approved {
        event: WhaleEvent,
        assessment: ProfitAssessment,
    },
    Submitted(SubmittedStrike),
    Failed {
        event: WhaleEvent,
        kind: FailureKind,
        message: String,
    },
}

fn transition(event: &WhaleEvent, state: StrikeState) {
    debug!(event = %event.id, block = event.block_number, %state, "Strike state");
}

pub struct StrikePipeline<O = FixedPriceOracle> {
    detector: WhaleDetector,
    sizer: LoanSizer<O>,
    simulator: ProfitabilitySimulator,
    decision: StrikeDecisionEngine,
    executor: StrikeExecutor,
    recent: RecentStrikes,
    stats: Arc<StrikeStatistics>,
    mode: ExecutionMode,
}

impl StrikePipeline<FixedPriceOracle> {
    /// 按配置组装，价格使用配置中的固定值
    pub fn from_config(
        config: &AppConfig,
        signer: Arc<dyn StrikeSigner>,
        sequencer: Arc<SequencingManager>,
        stats: Arc<StrikeStatistics>,
    ) -> Self {
        let strike = &config.strike;
        let executor = StrikeExecutor::new(
            signer,
            sequencer,
            stats.clone(),
            config.network.chain_id,
            strike.target_contract,
            StrikeFees {
                gas_limit: strike.gas_limit,
                max_fee_per_gas: strike.max_fee_per_gas,
                max_priority_fee_per_gas: strike.max_priority_fee_per_gas,
            },
        );

        Self {
            detector: WhaleDetector::new(strike.whale_threshold, strike.detection_policy),
            sizer: LoanSizer::new(FixedPriceOracle::new(strike.eth_price_usd_e8)),
            simulator: ProfitabilitySimulator::new(
                strike.target_contract,
                strike.loan_asset,
                strike.swap_path(),
            ),
            decision: StrikeDecisionEngine::new(
                strike.gas_limit,
                strike.max_fee_per_gas,
                strike.min_net_profit,
            ),
            executor,
            recent: RecentStrikes::new(config.engine.max_recent_strikes),
            stats,
            mode: strike.execution_mode,
        }
    }
}

impl<O: PriceOracle> StrikePipeline<O> {
    /// 替换价格来源
    pub fn with_oracle<P: PriceOracle>(
        self,
        oracle: P,
        schedule: LoanSchedule,
    ) -> StrikePipeline<P> {
        StrikePipeline {
            detector: self.detector,
            sizer: LoanSizer::new(oracle).with_schedule(schedule),
            simulator: self.simulator,
            decision: self.decision,
            executor: self.executor,
            recent: self.recent,
            stats: self.stats,
            mode: self.mode,
        }
    }

    pub fn with_loan_schedule(self, schedule: LoanSchedule) -> Self {
        Self {
            sizer: self.sizer.with_schedule(schedule),
            ..self
        }
    }

    /// 处理一个区块
    ///
    /// `received_at` 是区块进入引擎的时刻
    pub async fn process_block(
        &mut self,
        gateway: &Arc<dyn ChainGateway>,
        block: &BlockObservation,
        received_at: Instant,
    ) -> PipelineOutcome {
        self.stats.record_block();

        let event = match self.detector.detect(block) {
            Some(event) => event,
            None => return PipelineOutcome::NoWhale,
        };

        if !self.recent.insert(event.triggering_hash) {
            debug!(tx = ?event.triggering_hash, "Whale already handled, skipping");
            return PipelineOutcome::Duplicate(event);
        }

        self.stats.record_whale();
        info!(
            event = %event.id,
            block = event.block_number,
            tx = ?event.triggering_hash,
            value = %format_eth(event.value),
            "Whale detected"
        );
        transition(&event, StrikeState::Detected);

        self.strike(gateway, event, received_at).await
    }

    async fn strike(
        &mut self,
        gateway: &Arc<dyn ChainGateway>,
        event: WhaleEvent,
        received_at: Instant,
    ) -> PipelineOutcome {
        let operator = self.executor.operator();

        transition(&event, StrikeState::Sizing);
        let principal = match self.sizer.size(gateway.as_ref(), operator).await {
            Ok(principal) => principal,
            Err(e) => {
                warn!(event = %event.id, "Loan sizing failed: {}", e);
                self.stats.record_failed();
                transition(&event, StrikeState::Failed(FailureKind::Other));
                return PipelineOutcome::Failed {
                    event,
                    kind: FailureKind::Other,
                    message: e.to_string(),
                };
            }
        };

        transition(&event, StrikeState::Simulating);
        let simulated = match self
            .simulator
            .simulate(gateway.as_ref(), operator, principal)
            .await
        {
            SimulationOutcome::Profitable(simulated) => simulated,
            SimulationOutcome::Reverted(reason) => {
                debug!(event = %event.id, "No opportunity: {}", reason);
                return self.reject(event, RejectReason::SimulationRevert, None);
            }
        };

        let live_fee = match gateway.fee_estimate().await {
            Ok(fee) => fee,
            Err(e) => {
                warn!("Fee estimate unavailable, using configured ceiling: {}", e);
                None
            }
        };
        let fee = self.decision.fee_estimate(live_fee);
        let assessment = self
            .decision
            .assess(simulated.gross_return, &fee, principal);

        if !self.decision.should_fire(&assessment) {
            debug!(event = %event.id, %assessment, "Below profit floor");
            return self.reject(event, RejectReason::NoProfit, Some(assessment));
        }

        transition(&event, StrikeState::Approved);
        info!(
            event = %event.id,
            loan = %format_eth(principal),
            net_profit = %format_signed_eth(assessment.net_profit),
            live_fee = fee.live,
            "Strike approved"
        );

        if self.mode == ExecutionMode::SimulationOnly {
            info!(event = %event.id, "Simulation-only mode, strike not broadcast");
            return PipelineOutcome::Approved { event, assessment };
        }

        transition(&event, StrikeState::Submitting);
        match self
            .executor
            .execute(gateway, &simulated, &event, received_at)
            .await
        {
            Ok(submitted) => PipelineOutcome::Submitted(submitted),
            Err(failure) => {
                transition(&event, StrikeState::Failed(failure.kind));
                PipelineOutcome::Failed {
                    event,
                    kind: failure.kind,
                    message: failure.message,
                }
            }
        }
    }

    fn reject(
        &self,
        event: WhaleEvent,
        reason: RejectReason,
        assessment: Option<ProfitAssessment>,
    ) -> PipelineOutcome {
        self.stats.record_rejection(reason);
        transition(&event, StrikeState::Rejected(reason));
        PipelineOutcome::Rejected {
            event,
            reason,
            assessment,
        }
    }
}
