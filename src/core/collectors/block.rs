//! 区块收集器
//!
//! 订阅新区块号，逐个拉取完整区块 (含交易) 并产出 `Event::NewBlock`

use super::{Collector, Event, EventStream, SystemEvent};
use crate::core::gateway::ChainGateway;
use crate::core::types::Result;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 区块收集器
pub struct BlockCollector {
    gateway: Arc<dyn ChainGateway>,
    chain_id: u64,
}

impl BlockCollector {
    pub fn new(gateway: Arc<dyn ChainGateway>, chain_id: u64) -> Self {
        Self { gateway, chain_id }
    }
}

#[async_trait]
impl Collector for BlockCollector {
    fn name(&self) -> &str {
        "BlockCollector"
    }

    async fn get_event_stream(&self) -> Result<EventStream> {
        let gateway = self.gateway.clone();
        let chain_id = self.chain_id;

        let mut block_numbers = match gateway.subscribe_blocks().await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to subscribe to blocks: {}", e);
                return Err(e);
            }
        };

        let stream = async_stream::stream! {
            info!("Starting block collection for chain {}", chain_id);
            yield Event::System(SystemEvent::Connected);

            while let Some(number) = block_numbers.next().await {
                match gateway.get_block(number).await {
                    Ok(Some(block)) => {
                        debug!(
                            block = number,
                            txs = block.transactions.len(),
                            "Received new block"
                        );
                        yield Event::NewBlock(block);
                    }
                    Ok(None) => {
                        debug!(block = number, "Block not found");
                    }
                    Err(e) => {
                        // 单个区块拉取失败不影响后续区块
                        warn!(block = number, "Failed to fetch block: {}", e);
                        yield Event::System(SystemEvent::Error(e.to_string()));
                    }
                }
            }

            yield Event::System(SystemEvent::Disconnected);
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gateway::{BlockNumberStream, MockChainGateway};
    use crate::core::types::{BlockObservation, BotError, TransactionSummary};
    use ethers::types::{H256, U256};

    #[tokio::test]
    async fn test_block_events_follow_subscription() {
        let mut gateway = MockChainGateway::new();
        gateway
            .expect_subscribe_blocks()
            .returning(|| {
                let numbers: BlockNumberStream =
                    Box::pin(futures::stream::iter(vec![10u64, 11, 12]));
                Ok(numbers)
            });
        gateway.expect_get_block().returning(|number| match number {
            10 => Ok(Some(BlockObservation::new(
                10,
                vec![TransactionSummary::new(H256::repeat_byte(1), U256::one())],
            ))),
            11 => Err(BotError::RpcError("timeout".into())),
            _ => Ok(None),
        });

        let collector = BlockCollector::new(Arc::new(gateway), 8453);
        let events: Vec<Event> = collector.get_event_stream().await.unwrap().collect().await;

        assert_eq!(events.len(), 4);
        assert_eq!(events[0], Event::System(SystemEvent::Connected));
        assert!(matches!(&events[1], Event::NewBlock(b) if b.number == 10));
        assert!(matches!(&events[2], Event::System(SystemEvent::Error(_))));
        assert_eq!(events[3], Event::System(SystemEvent::Disconnected));
    }

    #[tokio::test]
    async fn test_subscription_failure_is_reported() {
        let mut gateway = MockChainGateway::new();
        gateway
            .expect_subscribe_blocks()
            .returning(|| Err(BotError::Connection("refused".into())));

        let collector = BlockCollector::new(Arc::new(gateway), 8453);
        assert!(collector.get_event_stream().await.is_err());
    }
}
