//! 数据收集器模块
//!
//! 把网关推送的新区块转换为统一的事件流

use crate::core::types::{BlockObservation, Result};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

pub mod block;

pub use block::*;

/// 事件类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// 新区块事件
    NewBlock(BlockObservation),
    /// 系统事件
    System(SystemEvent),
}

/// 系统事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemEvent {
    Connected,
    Disconnected,
    Error(String),
}

/// 事件流类型
pub type EventStream = Pin<Box<dyn Stream<Item = Event> + Send>>;

/// 收集器trait
#[async_trait]
pub trait Collector: Send + Sync {
    /// 收集器名称
    fn name(&self) -> &str;

    /// 获取事件流
    async fn get_event_stream(&self) -> Result<EventStream>;
}
