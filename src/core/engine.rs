//! 打击引擎
//!
//! 收集器任务把区块放进有界通道，单个消费者按顺序跑打击流水线。
//! 心跳失败或订阅结束时会话结束，由 `run_forever` 等待后重连。

use crate::core::collectors::{BlockCollector, Collector, Event, SystemEvent};
use crate::core::gateway::{ChainGateway, GatewayConnector};
use crate::core::types::{BlockObservation, BotError, Result, StrikeStatistics};
use crate::strategy::config::{EngineConfig, NetworkConfig};
use crate::strategy::pipeline::{PipelineOutcome, StrikePipeline};
use crate::strategy::sequencer::SequencingManager;
use crate::strategy::sizer::{FixedPriceOracle, PriceOracle};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// 进入引擎的区块
#[derive(Debug)]
pub struct ReceivedBlock {
    pub block: BlockObservation,
    pub received_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Queued,
    /// 通道已满或已关闭，区块被丢弃
    Dropped,
}

/// 区块通道的发送端
#[derive(Clone)]
pub struct BlockFeed {
    tx: mpsc::Sender<ReceivedBlock>,
    stats: Arc<StrikeStatistics>,
}

impl BlockFeed {
    pub fn channel(
        capacity: usize,
        stats: Arc<StrikeStatistics>,
    ) -> (Self, mpsc::Receiver<ReceivedBlock>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, stats }, rx)
    }

    /// 不等待：消费者跟不上时丢弃新区块
    pub fn offer(&self, block: BlockObservation) -> FeedStatus {
        let number = block.number;
        let received = ReceivedBlock {
            block,
            received_at: Instant::now(),
        };
        match self.tx.try_send(received) {
            Ok(()) => FeedStatus::Queued,
            Err(e) => {
                self.stats.record_dropped_block();
                warn!(block = number, "Block dropped, consumer busy: {}", e);
                FeedStatus::Dropped
            }
        }
    }
}

pub struct WhaleEngine<O = FixedPriceOracle> {
    pipeline: StrikePipeline<O>,
    sequencer: Arc<SequencingManager>,
    stats: Arc<StrikeStatistics>,
    network: NetworkConfig,
    settings: EngineConfig,
}

impl<O: PriceOracle + 'static> WhaleEngine<O> {
    pub fn new(
        pipeline: StrikePipeline<O>,
        sequencer: Arc<SequencingManager>,
        stats: Arc<StrikeStatistics>,
        network: NetworkConfig,
        settings: EngineConfig,
    ) -> Self {
        Self {
            pipeline,
            sequencer,
            stats,
            network,
            settings,
        }
    }

    /// 运行一次连接会话
    ///
    /// 收到停止信号时返回 `Ok(())`；心跳失败或订阅结束时返回连接错误。
    pub async fn run_session(
        &mut self,
        gateway: Arc<dyn ChainGateway>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let collector = BlockCollector::new(gateway.clone(), self.network.chain_id);
        let mut events = collector.get_event_stream().await?;
        info!("Collector {} started", collector.name());

        let (feed, mut blocks) =
            BlockFeed::channel(self.settings.block_channel_capacity, self.stats.clone());

        let producer = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                match event {
                    Event::NewBlock(block) => {
                        feed.offer(block);
                    }
                    Event::System(SystemEvent::Connected) => debug!("Block subscription active"),
                    Event::System(SystemEvent::Error(e)) => warn!("Collector error: {}", e),
                    Event::System(SystemEvent::Disconnected) => break,
                }
            }
        });

        let mut heartbeat = interval(self.network.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 第一次 tick 立即完成
        heartbeat.tick().await;

        let result = loop {
            tokio::select! {
                received = blocks.recv() => {
                    let Some(received) = received else {
                        break Err(BotError::Connection("block subscription ended".to_string()));
                    };
                    let outcome = self
                        .pipeline
                        .process_block(&gateway, &received.block, received.received_at)
                        .await;
                    log_outcome(received.block.number, &outcome);
                }
                _ = heartbeat.tick() => {
                    match gateway.block_number().await {
                        Ok(number) => {
                            debug!(block = number, "Heartbeat ok");
                            info!("Stats: {}", self.stats.snapshot());
                        }
                        Err(e) => {
                            error!("Heartbeat failed: {}", e);
                            break Err(BotError::Connection(format!("heartbeat failed: {}", e)));
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("Shutdown signal received, stopping session");
                    break Ok(());
                }
            }
        };

        producer.abort();
        result
    }

    /// 持续运行，断线后等待 `reconnect_delay` 重连并重新同步序号
    pub async fn run_forever(
        &mut self,
        connector: &dyn GatewayConnector,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            match connector.connect().await {
                Ok(gateway) => {
                    info!("Gateway connected");
                    if let Err(e) = self.sequencer.resync(gateway.as_ref()).await {
                        warn!("Initial sequence sync failed: {}", e);
                    }
                    match self.run_session(gateway, &mut shutdown).await {
                        Ok(()) => return Ok(()),
                        Err(e) => warn!("Session ended: {}", e),
                    }
                }
                Err(e) => error!("Failed to connect gateway: {}", e),
            }

            info!(
                delay_secs = self.network.reconnect_delay.as_secs(),
                "Reconnecting after delay"
            );
            tokio::select! {
                _ = tokio::time::sleep(self.network.reconnect_delay) => {}
                _ = shutdown.changed() => return Ok(()),
            }
        }
    }
}

fn log_outcome(block: u64, outcome: &PipelineOutcome) {
    match outcome {
        PipelineOutcome::NoWhale => debug!(block, "No whale"),
        PipelineOutcome::Duplicate(event) => {
            debug!(block, tx = ?event.triggering_hash, "Duplicate whale ignored")
        }
        PipelineOutcome::Rejected { event, reason, .. } => {
            info!(block, event = %event.id, ?reason, "Strike rejected")
        }
        PipelineOutcome::Approved { event, .. } => {
            info!(block, event = %event.id, "Strike approved (not broadcast)")
        }
        PipelineOutcome::Submitted(submitted) => {
            info!(block, event = %submitted.event_id, tx = ?submitted.tx_hash, "Strike submitted")
        }
        PipelineOutcome::Failed {
            event,
            kind,
            message,
        } => warn!(block, event = %event.id, ?kind, "Strike failed: {}", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gateway::{
        BlockNumberStream, MockChainGateway, MockGatewayConnector, MockStrikeSigner,
    };
    use crate::core::types::TransactionSummary;
    use crate::strategy::config::AppConfig;
    use ethers::types::{Address, H256, U256};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn engine(heartbeat: Duration) -> WhaleEngine {
        let mut config = AppConfig::default();
        config.network.heartbeat_interval = heartbeat;
        config.network.reconnect_delay = Duration::from_millis(10);

        let mut signer = MockStrikeSigner::new();
        signer.expect_address().return_const(Address::from_low_u64_be(0xabc));
        let sequencer = Arc::new(SequencingManager::new(Address::from_low_u64_be(0xabc)));
        let stats = Arc::new(StrikeStatistics::default());
        let pipeline = StrikePipeline::from_config(
            &config,
            Arc::new(signer),
            sequencer.clone(),
            stats.clone(),
        );
        WhaleEngine::new(pipeline, sequencer, stats, config.network, config.engine)
    }

    fn numbers(v: Vec<u64>) -> BlockNumberStream {
        Box::pin(futures::stream::iter(v))
    }

    fn silent() -> BlockNumberStream {
        Box::pin(futures::stream::pending::<u64>())
    }

    fn quiet_block(number: u64) -> BlockObservation {
        BlockObservation::new(
            number,
            vec![TransactionSummary::new(H256::from_low_u64_be(number), U256::exp10(17))],
        )
    }

    #[test]
    fn test_feed_drops_when_full() {
        let stats = Arc::new(StrikeStatistics::default());
        let (feed, mut rx) = BlockFeed::channel(1, stats.clone());

        assert_eq!(feed.offer(quiet_block(1)), FeedStatus::Queued);
        assert_eq!(feed.offer(quiet_block(2)), FeedStatus::Dropped);
        assert_eq!(stats.snapshot().blocks_dropped, 1);
        assert_eq!(rx.try_recv().unwrap().block.number, 1);
    }

    #[tokio::test]
    async fn test_session_ends_when_subscription_closes() {
        let mut gateway = MockChainGateway::new();
        gateway
            .expect_subscribe_blocks()
            .returning(|| Ok(numbers(vec![1, 2, 3])));
        gateway
            .expect_get_block()
            .returning(|n| Ok(Some(quiet_block(n))));
        gateway.expect_block_number().returning(|| Ok(3));
        gateway.expect_broadcast().never();
        let gateway: Arc<dyn ChainGateway> = Arc::new(gateway);

        let mut engine = engine(Duration::from_secs(60));
        let (_tx, mut shutdown) = watch::channel(false);
        let result = engine.run_session(gateway, &mut shutdown).await;

        assert!(matches!(result, Err(BotError::Connection(_))));
        assert_eq!(engine.stats.snapshot().blocks_scanned, 3);
    }

    #[tokio::test]
    async fn test_heartbeat_failure_ends_session() {
        let mut gateway = MockChainGateway::new();
        gateway
            .expect_subscribe_blocks()
            .returning(|| Ok(silent()));
        gateway
            .expect_block_number()
            .returning(|| Err(BotError::Connection("socket closed".into())));
        let gateway: Arc<dyn ChainGateway> = Arc::new(gateway);

        let mut engine = engine(Duration::from_millis(20));
        let (_tx, mut shutdown) = watch::channel(false);
        let result = engine.run_session(gateway, &mut shutdown).await;

        assert!(matches!(result, Err(BotError::Connection(msg)) if msg.contains("heartbeat")));
    }

    #[tokio::test]
    async fn test_shutdown_stops_session() {
        let mut gateway = MockChainGateway::new();
        gateway
            .expect_subscribe_blocks()
            .returning(|| Ok(silent()));
        gateway.expect_block_number().returning(|| Ok(1));
        let gateway: Arc<dyn ChainGateway> = Arc::new(gateway);

        let mut engine = engine(Duration::from_secs(60));
        let (tx, mut shutdown) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = tx.send(true);
        });

        assert!(engine.run_session(gateway, &mut shutdown).await.is_ok());
    }

    #[tokio::test]
    async fn test_supervisor_reconnects_and_resyncs() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let resyncs = Arc::new(AtomicUsize::new(0));

        let mut connector = MockGatewayConnector::new();
        let (attempts_in, resyncs_in) = (attempts.clone(), resyncs.clone());
        connector.expect_connect().returning(move || {
            if attempts_in.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(BotError::Connection("refused".into()));
            }
            let resyncs = resyncs_in.clone();
            let mut gateway = MockChainGateway::new();
            gateway.expect_sequence_count().returning(move |_| {
                resyncs.fetch_add(1, Ordering::SeqCst);
                Ok(U256::from(4u64))
            });
            gateway
                .expect_subscribe_blocks()
                .returning(|| Ok(silent()));
            gateway.expect_block_number().returning(|| Ok(1));
            Ok(Arc::new(gateway) as Arc<dyn ChainGateway>)
        });

        let mut engine = engine(Duration::from_secs(60));
        let (tx, shutdown) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = tx.send(true);
        });

        engine.run_forever(&connector, shutdown).await.unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(resyncs.load(Ordering::SeqCst), 1);
        assert_eq!(engine.sequencer.current().await, Some(U256::from(4u64)));
    }
}
