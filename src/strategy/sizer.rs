//! 闪电贷本金计算
//!
//! 按运营账户余额的美元价值分档决定借多少。价格来自 `PriceOracle`，默认实现是
//! 固定价格，所以分档只是近似值。

use crate::core::gateway::ChainGateway;
use crate::core::types::Result;
use async_trait::async_trait;
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// 价格精度 (8位小数，与链上喂价一致)
pub const PRICE_DECIMALS: usize = 8;

/// 价格预言机
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// 每个原生币的美元价格，8位小数
    async fn current_price(&self) -> Result<U256>;
}

/// 固定价格
pub struct FixedPriceOracle {
    price_e8: U256,
}

impl FixedPriceOracle {
    pub fn new(price_e8: U256) -> Self {
        Self { price_e8 }
    }

    pub fn from_usd(usd: u64) -> Self {
        Self::new(U256::from(usd) * U256::exp10(PRICE_DECIMALS))
    }
}

#[async_trait]
impl PriceOracle for FixedPriceOracle {
    async fn current_price(&self) -> Result<U256> {
        Ok(self.price_e8)
    }
}

/// 一档本金
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTier {
    /// 余额美元价值下限 (含)
    pub min_value_usd: u64,
    pub principal: U256,
}

/// 分档表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanSchedule {
    tiers: Vec<LoanTier>,
    base_principal: U256,
}

impl LoanSchedule {
    pub fn new(mut tiers: Vec<LoanTier>, base_principal: U256) -> Self {
        tiers.sort_by(|a, b| b.min_value_usd.cmp(&a.min_value_usd));
        Self {
            tiers,
            base_principal,
        }
    }

    /// `value_usd_e8` 为8位小数的美元价值
    pub fn principal_for(&self, value_usd_e8: U256) -> U256 {
        let unit = U256::exp10(PRICE_DECIMALS);
        self.tiers
            .iter()
            .find(|tier| value_usd_e8 >= U256::from(tier.min_value_usd) * unit)
            .map(|tier| tier.principal)
            .unwrap_or(self.base_principal)
    }
}

impl Default for LoanSchedule {
    fn default() -> Self {
        let eth = |n: u64| U256::from(n) * U256::exp10(18);
        Self::new(
            vec![
                LoanTier {
                    min_value_usd: 200,
                    principal: eth(100),
                },
                LoanTier {
                    min_value_usd: 100,
                    principal: eth(75),
                },
                LoanTier {
                    min_value_usd: 75,
                    principal: eth(50),
                },
            ],
            eth(25),
        )
    }
}

pub struct LoanSizer<O> {
    oracle: O,
    schedule: LoanSchedule,
}

impl<O: PriceOracle> LoanSizer<O> {
    pub fn new(oracle: O) -> Self {
        Self {
            oracle,
            schedule: LoanSchedule::default(),
        }
    }

    pub fn with_schedule(mut self, schedule: LoanSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// 余额 (wei) 对应的本金
    pub async fn principal_for_balance(&self, balance_wei: U256) -> Result<U256> {
        let price = self.oracle.current_price().await?;
        let value_usd_e8 = balance_wei.saturating_mul(price) / U256::exp10(18);
        let principal = self.schedule.principal_for(value_usd_e8);
        debug!(%balance_wei, %value_usd_e8, %principal, "Loan sized");
        Ok(principal)
    }

    /// 查询运营账户余额并计算本金
    pub async fn size(&self, gateway: &dyn ChainGateway, operator: Address) -> Result<U256> {
        let balance = gateway.get_balance(operator).await?;
        self.principal_for_balance(balance).await
    }
}
