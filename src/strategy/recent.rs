//! 已处理鲸鱼交易的去重缓存

use ethers::types::H256;
use std::collections::{HashSet, VecDeque};

/// 最近处理过的鲸鱼交易
///
/// 同一区块被重复投递时，同一笔鲸鱼交易只会进入一次打击流程。
/// 容量满时淘汰最早的记录。
pub struct RecentStrikes {
    capacity: usize,
    order: VecDeque<H256>,
    seen: HashSet<H256>,
}

impl RecentStrikes {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// 首次出现返回 true
    pub fn insert(&mut self, hash: H256) -> bool {
        if !self.seen.insert(hash) {
            return false;
        }
        self.order.push_back(hash);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}
