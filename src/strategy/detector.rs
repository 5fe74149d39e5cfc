//! 鲸鱼检测器
//!
//! 默认策略是区块内第一笔达到阈值的交易胜出，同一区块后面更大的交易不再评估。
//! 这是有意的简化：结果确定、可测试，但可能错过同一区块内更大的机会。

use crate::core::types::{BlockObservation, BotError, TransactionSummary, WhaleEvent};
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// 鲸鱼选择策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionPolicy {
    /// 区块顺序中第一笔达到阈值的交易
    #[default]
    FirstMatch,
    /// 达到阈值的交易中金额最大者，金额相同取先出现的
    Largest,
}

impl FromStr for DetectionPolicy {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "first" | "firstmatch" => Ok(DetectionPolicy::FirstMatch),
            "largest" => Ok(DetectionPolicy::Largest),
            other => Err(BotError::ConfigError(format!(
                "Unknown detection policy: {}",
                other
            ))),
        }
    }
}

pub struct WhaleDetector {
    threshold: U256,
    policy: DetectionPolicy,
}

impl WhaleDetector {
    pub fn new(threshold: U256, policy: DetectionPolicy) -> Self {
        Self { threshold, policy }
    }

    /// 扫描区块，最多产生一个鲸鱼事件
    pub fn detect(&self, block: &BlockObservation) -> Option<WhaleEvent> {
        let mut qualifying = block
            .transactions
            .iter()
            .filter(|tx| tx.value >= self.threshold);

        let hit: Option<&TransactionSummary> = match self.policy {
            DetectionPolicy::FirstMatch => qualifying.next(),
            DetectionPolicy::Largest => qualifying.fold(None, |best, tx| match best {
                Some(b) if b.value >= tx.value => Some(b),
                _ => Some(tx),
            }),
        };

        hit.map(|tx| WhaleEvent::new(block.number, tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::H256;

    fn eth(n: u64) -> U256 {
        U256::from(n) * U256::exp10(18)
    }

    fn block(values: &[u64]) -> BlockObservation {
        let txs = values
            .iter()
            .enumerate()
            .map(|(i, v)| TransactionSummary::new(H256::from_low_u64_be(i as u64 + 1), eth(*v)))
            .collect();
        BlockObservation::new(100, txs)
    }

    #[test]
    fn test_no_whale_below_threshold() {
        let detector = WhaleDetector::new(eth(15), DetectionPolicy::FirstMatch);
        assert!(detector.detect(&block(&[1, 14, 3])).is_none());
        assert!(detector.detect(&block(&[])).is_none());
    }

    #[test]
    fn test_first_match_wins_over_larger() {
        let detector = WhaleDetector::new(eth(15), DetectionPolicy::FirstMatch);
        let event = detector.detect(&block(&[2, 20, 500, 16])).unwrap();
        assert_eq!(event.triggering_hash, H256::from_low_u64_be(2));
        assert_eq!(event.value, eth(20));
        assert_eq!(event.block_number, 100);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let detector = WhaleDetector::new(eth(15), DetectionPolicy::FirstMatch);
        let event = detector.detect(&block(&[15])).unwrap();
        assert_eq!(event.triggering_hash, H256::from_low_u64_be(1));
    }

    #[test]
    fn test_largest_policy() {
        let detector = WhaleDetector::new(eth(15), DetectionPolicy::Largest);
        let event = detector.detect(&block(&[20, 500, 16, 500])).unwrap();
        assert_eq!(event.triggering_hash, H256::from_low_u64_be(2));
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("first-match".parse::<DetectionPolicy>().unwrap(), DetectionPolicy::FirstMatch);
        assert_eq!("LARGEST".parse::<DetectionPolicy>().unwrap(), DetectionPolicy::Largest);
        assert!("all".parse::<DetectionPolicy>().is_err());
    }
}
