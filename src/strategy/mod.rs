//! 打击策略模块
//!
//! 鲸鱼检测、本金计算、利润模拟、决策以及序号管理

pub mod config;
pub mod decision;
pub mod detector;
pub mod pipeline;
pub mod recent;
pub mod sequencer;
pub mod simulator;
pub mod sizer;

pub use pipeline::{PipelineOutcome, StrikePipeline};
