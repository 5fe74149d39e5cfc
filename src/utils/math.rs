//! 数值显示工具
//!
//! 所有金额计算都用整数完成，这里的字符串转换只用于日志

use ethers::types::{I256, U256};
use ethers::utils::format_ether;

/// 将Wei格式化为ETH字符串 (用于显示)
pub fn format_eth(wei: U256) -> String {
    format_ether(wei)
}

/// 有符号金额，负数带前缀
pub fn format_signed_eth(wei: I256) -> String {
    if wei.is_negative() {
        format!("-{}", format_ether(wei.unsigned_abs()))
    } else {
        format_ether(wei.into_raw())
    }
}
