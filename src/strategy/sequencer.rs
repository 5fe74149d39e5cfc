//! 交易序号 (nonce) 管理
//!
//! 本地缓存下一个序号，避免每次打击都查询网关。只有本进程使用该私钥发送交易时
//! 才成立；其他发送方会造成冲突，冲突后从网关重新同步。

use crate::core::gateway::ChainGateway;
use crate::core::types::Result;
use ethers::types::{Address, U256};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

#[derive(Debug)]
struct SequenceState {
    next: U256,
    /// 需要在下次使用前从网关同步
    stale: bool,
}

/// 序号票据
///
/// 持有期间其他打击无法获取序号。`commit` 递增计数器；未提交直接丢弃则计数器不变，
/// 签名失败时不会留下空洞。
pub struct SequenceTicket {
    guard: OwnedMutexGuard<SequenceState>,
    sequence: U256,
}

impl SequenceTicket {
    pub fn sequence(&self) -> U256 {
        self.sequence
    }

    /// 交易构造完成、发送之前调用
    pub fn commit(mut self) -> U256 {
        self.guard.next = self.sequence + U256::one();
        debug!(sequence = %self.sequence, "Sequence committed");
        self.sequence
    }
}

pub struct SequencingManager {
    address: Address,
    state: Arc<Mutex<SequenceState>>,
}

impl SequencingManager {
    /// 新建的管理器处于待同步状态
    pub fn new(address: Address) -> Self {
        Self {
            address,
            state: Arc::new(Mutex::new(SequenceState {
                next: U256::zero(),
                stale: true,
            })),
        }
    }

    /// 从网关获取权威计数
    pub async fn resync(&self, gateway: &dyn ChainGateway) -> Result<U256> {
        let mut state = self.state.lock().await;
        match gateway.sequence_count(self.address).await {
            Ok(count) => {
                state.next = count;
                state.stale = false;
                info!(sequence = %count, "Sequence synchronized");
                Ok(count)
            }
            Err(e) => {
                state.stale = true;
                warn!("Sequence resync failed, will retry before next strike: {}", e);
                Err(e)
            }
        }
    }

    /// 获取下一个序号
    pub async fn reserve(&self, gateway: &dyn ChainGateway) -> Result<SequenceTicket> {
        let mut guard = self.state.clone().lock_owned().await;
        if guard.stale {
            guard.next = gateway.sequence_count(self.address).await?;
            guard.stale = false;
            info!(sequence = %guard.next, "Sequence synchronized before reserve");
        }
        let sequence = guard.next;
        Ok(SequenceTicket { guard, sequence })
    }

    pub async fn mark_stale(&self) {
        self.state.lock().await.stale = true;
    }

    /// 当前缓存的下一个序号，待同步时返回 None
    pub async fn current(&self) -> Option<U256> {
        let state = self.state.lock().await;
        (!state.stale).then_some(state.next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gateway::MockChainGateway;
    use crate::core::types::BotError;

    fn gateway_with_count(count: u64) -> MockChainGateway {
        let mut gateway = MockChainGateway::new();
        gateway
            .expect_sequence_count()
            .returning(move |_| Ok(U256::from(count)));
        gateway
    }

    #[tokio::test]
    async fn test_commit_increments_once() {
        let gateway = gateway_with_count(5);
        let manager = SequencingManager::new(Address::zero());
        manager.resync(&gateway).await.unwrap();

        let ticket = manager.reserve(&gateway).await.unwrap();
        assert_eq!(ticket.commit(), U256::from(5u64));
        let ticket = manager.reserve(&gateway).await.unwrap();
        assert_eq!(ticket.commit(), U256::from(6u64));
        assert_eq!(manager.current().await, Some(U256::from(7u64)));
    }

    #[tokio::test]
    async fn test_dropped_ticket_leaves_counter() {
        let gateway = gateway_with_count(3);
        let manager = SequencingManager::new(Address::zero());
        manager.resync(&gateway).await.unwrap();

        let ticket = manager.reserve(&gateway).await.unwrap();
        assert_eq!(ticket.sequence(), U256::from(3u64));
        drop(ticket);
        assert_eq!(manager.current().await, Some(U256::from(3u64)));
    }

    #[tokio::test]
    async fn test_stale_manager_fetches_before_reserve() {
        let mut gateway = MockChainGateway::new();
        gateway
            .expect_sequence_count()
            .times(1)
            .returning(|_| Ok(U256::from(11u64)));
        let manager = SequencingManager::new(Address::zero());
        assert_eq!(manager.current().await, None);

        let ticket = manager.reserve(&gateway).await.unwrap();
        assert_eq!(ticket.commit(), U256::from(11u64));
        // 已同步，不再查询
        assert_eq!(manager.reserve(&gateway).await.unwrap().sequence(), U256::from(12u64));
    }

    #[tokio::test]
    async fn test_resync_replaces_local_count() {
        let mut gateway = MockChainGateway::new();
        let mut calls = 0u64;
        gateway.expect_sequence_count().returning(move |_| {
            calls += 1;
            Ok(U256::from(if calls == 1 { 1u64 } else { 40u64 }))
        });
        let manager = SequencingManager::new(Address::zero());
        manager.resync(&gateway).await.unwrap();
        manager.reserve(&gateway).await.unwrap().commit();
        manager.reserve(&gateway).await.unwrap().commit();

        manager.resync(&gateway).await.unwrap();
        assert_eq!(manager.reserve(&gateway).await.unwrap().sequence(), U256::from(40u64));
    }

    #[tokio::test]
    async fn test_failed_resync_marks_stale() {
        let mut gateway = MockChainGateway::new();
        let mut calls = 0u64;
        gateway.expect_sequence_count().returning(move |_| {
            calls += 1;
            match calls {
                1 => Ok(U256::from(2u64)),
                2 => Err(BotError::Connection("down".into())),
                _ => Ok(U256::from(9u64)),
            }
        });
        let manager = SequencingManager::new(Address::zero());
        manager.resync(&gateway).await.unwrap();
        assert!(manager.resync(&gateway).await.is_err());
        assert_eq!(manager.current().await, None);
        assert_eq!(manager.reserve(&gateway).await.unwrap().sequence(), U256::from(9u64));
    }

    #[tokio::test]
    async fn test_concurrent_reserves_never_share_sequence() {
        let gateway = Arc::new(gateway_with_count(0));
        let manager = Arc::new(SequencingManager::new(Address::zero()));
        manager.resync(gateway.as_ref()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let manager = manager.clone();
            let gateway = gateway.clone();
            handles.push(tokio::spawn(async move {
                let ticket = manager.reserve(gateway.as_ref()).await.unwrap();
                tokio::task::yield_now().await;
                ticket.commit()
            }));
        }

        let mut seen = Vec::new();
        for handle in handles {
            seen.push(handle.await.unwrap());
        }
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 16);
        assert_eq!(manager.current().await, Some(U256::from(16u64)));
    }
}
