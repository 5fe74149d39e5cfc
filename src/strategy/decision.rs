//! 打击决策
//!
//! 净利润 = 模拟毛收益 − (gas成本 + 闪电贷手续费)，全部整数运算。
//! 只有净利润严格大于下限时才开火。

use crate::core::types::{FeeEstimate, ProfitAssessment};
use ethers::types::{I256, U256};

/// 闪电贷手续费 0.05%
pub const LOAN_FEE_BPS: u64 = 5;
pub const BPS_DENOMINATOR: u64 = 10_000;

/// 截断的手续费
pub fn loan_fee(principal: U256) -> U256 {
    principal.saturating_mul(U256::from(LOAN_FEE_BPS)) / U256::from(BPS_DENOMINATOR)
}

fn to_signed(value: U256) -> I256 {
    if value > I256::MAX.into_raw() {
        I256::MAX
    } else {
        I256::from_raw(value)
    }
}

pub struct StrikeDecisionEngine {
    gas_limit: U256,
    max_fee_ceiling: U256,
    min_net_profit: U256,
}

impl StrikeDecisionEngine {
    pub fn new(gas_limit: U256, max_fee_ceiling: U256, min_net_profit: U256) -> Self {
        Self {
            gas_limit,
            max_fee_ceiling,
            min_net_profit,
        }
    }

    /// `live_max_fee` 为 None 时回落到配置上限
    pub fn fee_estimate(&self, live_max_fee: Option<U256>) -> FeeEstimate {
        let (max_fee_per_gas, live) = match live_max_fee {
            Some(fee) => (fee, true),
            None => (self.max_fee_ceiling, false),
        };
        FeeEstimate {
            max_fee_per_gas,
            gas_cost: self.gas_limit.saturating_mul(max_fee_per_gas),
            live,
        }
    }

    pub fn assess(&self, raw_return: U256, fee: &FeeEstimate, principal: U256) -> ProfitAssessment {
        let loan_fee = loan_fee(principal);
        let total_expense = fee.gas_cost.saturating_add(loan_fee);
        let net_profit = to_signed(raw_return) - to_signed(total_expense);

        ProfitAssessment {
            raw_simulated_return: raw_return,
            gas_cost: fee.gas_cost,
            loan_fee,
            total_expense,
            net_profit,
        }
    }

    /// 严格大于：等于下限不开火
    pub fn should_fire(&self, assessment: &ProfitAssessment) -> bool {
        assessment.net_profit > to_signed(self.min_net_profit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::utils::parse_ether;

    fn eth(s: &str) -> U256 {
        parse_ether(s).unwrap()
    }

    /// gas_limit 1_000_000 * 10 gwei = 0.01 ETH
    fn engine() -> StrikeDecisionEngine {
        StrikeDecisionEngine::new(
            U256::from(1_000_000u64),
            U256::from(500_000_000u64),
            eth("0.012"),
        )
    }

    #[test]
    fn test_loan_fee_truncates() {
        assert_eq!(loan_fee(eth("1")), eth("0.0005"));
        assert_eq!(loan_fee(U256::from(1999u64)), U256::zero());
        assert_eq!(loan_fee(U256::from(2000u64)), U256::one());
        assert_eq!(loan_fee(U256::from(3999u64)), U256::one());
    }

    #[test]
    fn test_fee_estimate_fallback() {
        let engine = engine();
        let live = engine.fee_estimate(Some(U256::from(10_000_000_000u64)));
        assert!(live.live);
        assert_eq!(live.gas_cost, eth("0.01"));

        let fallback = engine.fee_estimate(None);
        assert!(!fallback.live);
        assert_eq!(fallback.max_fee_per_gas, U256::from(500_000_000u64));
        assert_eq!(fallback.gas_cost, U256::from(500_000_000_000_000u64));
    }

    #[test]
    fn test_net_profit_formula() {
        let engine = engine();
        let fee = engine.fee_estimate(Some(U256::from(10_000_000_000u64)));

        let approved = engine.assess(eth("0.05"), &fee, eth("1"));
        assert_eq!(approved.loan_fee, eth("0.0005"));
        assert_eq!(approved.total_expense, eth("0.0105"));
        assert_eq!(approved.net_profit, I256::from_raw(eth("0.0395")));
        assert!(engine.should_fire(&approved));

        let rejected = engine.assess(eth("0.015"), &fee, eth("1"));
        assert_eq!(rejected.net_profit, I256::from_raw(eth("0.0045")));
        assert!(!engine.should_fire(&rejected));
    }

    #[test]
    fn test_floor_is_strict() {
        let engine = engine();
        let fee = engine.fee_estimate(Some(U256::from(10_000_000_000u64)));

        // 0.0225 − 0.0105 = 0.012，正好等于下限
        let at_floor = engine.assess(eth("0.0225"), &fee, eth("1"));
        assert_eq!(at_floor.net_profit, I256::from_raw(eth("0.012")));
        assert!(!engine.should_fire(&at_floor));

        let above = engine.assess(eth("0.0225") + U256::one(), &fee, eth("1"));
        assert!(engine.should_fire(&above));
    }

    #[test]
    fn test_negative_net_profit() {
        let engine = engine();
        let fee = engine.fee_estimate(Some(U256::from(10_000_000_000u64)));
        let assessment = engine.assess(U256::zero(), &fee, eth("100"));
        assert!(assessment.net_profit.is_negative());
        assert!(!engine.should_fire(&assessment));
    }
}
