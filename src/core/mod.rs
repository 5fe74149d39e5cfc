//! 核心模块
//!
//! 链网关、区块收集、打击执行和引擎主循环

pub mod collectors;
pub mod engine;
pub mod executor;
pub mod gateway;
pub mod types;

pub use engine::WhaleEngine;
pub use types::{BotError, Result};
