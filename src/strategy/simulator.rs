//! 利润模拟器
//!
//! 对目标合约做只读 `eth_call`，返回值按大端整数解释为毛收益。
//! 任何调用失败都视为"没有机会"，不向上传播。

use crate::core::gateway::ChainGateway;
use crate::core::types::{BotError, CallRequest, StrikeParameters};
use ethers::abi::{self, Token};
use ethers::types::{Address, Bytes, U256};
use ethers::utils::id;
use tracing::{debug, warn};

/// 合约入口函数签名
pub const REQUEST_TITAN_LOAN: &str = "requestTitanLoan(address,uint256,address[])";

/// 编码 `requestTitanLoan(asset, amount, path)`
pub fn encode_strike_call(params: &StrikeParameters) -> Bytes {
    let args = abi::encode(&[
        Token::Address(params.loan_asset),
        Token::Uint(params.loan_amount),
        Token::Array(params.swap_path.iter().copied().map(Token::Address).collect()),
    ]);

    let mut data = id(REQUEST_TITAN_LOAN).to_vec();
    data.extend(args);
    Bytes::from(data)
}

/// 返回数据解释为 uint256；空数据视为回滚
pub fn decode_gross_return(data: &Bytes) -> Option<U256> {
    if data.is_empty() {
        return None;
    }
    let word = &data[..data.len().min(32)];
    Some(U256::from_big_endian(word))
}

/// 模拟成功的打击
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedStrike {
    pub params: StrikeParameters,
    pub calldata: Bytes,
    pub gross_return: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationOutcome {
    Profitable(SimulatedStrike),
    Reverted(String),
}

pub struct ProfitabilitySimulator {
    target_contract: Address,
    loan_asset: Address,
    swap_path: Vec<Address>,
}

impl ProfitabilitySimulator {
    pub fn new(target_contract: Address, loan_asset: Address, swap_path: Vec<Address>) -> Self {
        Self {
            target_contract,
            loan_asset,
            swap_path,
        }
    }

    pub fn parameters(&self, loan_amount: U256) -> StrikeParameters {
        StrikeParameters {
            loan_asset: self.loan_asset,
            loan_amount,
            swap_path: self.swap_path.clone(),
        }
    }

    /// 以运营账户身份模拟调用
    pub async fn simulate(
        &self,
        gateway: &dyn ChainGateway,
        operator: Address,
        loan_amount: U256,
    ) -> SimulationOutcome {
        let params = self.parameters(loan_amount);
        let calldata = encode_strike_call(&params);
        let call = CallRequest {
            from: operator,
            to: self.target_contract,
            data: calldata.clone(),
        };

        let data = match gateway.simulate_call(&call).await {
            Ok(data) => data,
            Err(BotError::SimulationReverted(reason)) => {
                debug!(%loan_amount, "Simulation reverted: {}", reason);
                return SimulationOutcome::Reverted(reason);
            }
            Err(e) => {
                warn!(%loan_amount, "Simulation call failed: {}", e);
                return SimulationOutcome::Reverted(e.to_string());
            }
        };

        match decode_gross_return(&data) {
            Some(gross_return) => SimulationOutcome::Profitable(SimulatedStrike {
                params,
                calldata,
                gross_return,
            }),
            None => SimulationOutcome::Reverted("empty return data".to_string()),
        }
    }
}
