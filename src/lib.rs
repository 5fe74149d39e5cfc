//! 鲸鱼跟随闪电贷打击机器人
//!
//! 监听新区块中的大额转账，模拟闪电贷套利调用，净利润超过下限时签名并广播。

pub mod core;
pub mod strategy;
pub mod utils;
