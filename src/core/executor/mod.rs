//! 执行器模块
//!
//! 负责把已批准的打击签名并广播，上链结果在后台任务中跟踪

pub mod strike;
pub mod types;

pub use strike::{StrikeExecutor, StrikeFees};
pub use types::{ConfirmationResult, StrikeFailure, SubmittedStrike};
