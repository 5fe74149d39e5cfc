use crate::core::types::{BotError, Result};
use crate::strategy::detector::DetectionPolicy;
use crate::utils::format_eth;
use ethers::types::{Address, U256};
use ethers::utils::{parse_ether, parse_units};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const BASE_CHAIN_ID: u64 = 8453;
pub const DEFAULT_TARGET_CONTRACT: &str = "0x83EF5c401fAa5B9674BAfAcFb089b30bAc67C9A0";
pub const BASE_WETH: &str = "0x4200000000000000000000000000000000000006";
pub const BASE_USDC: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";

/// 执行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// 签名并广播
    Live,
    /// 只跑到决策阶段，不占用序号也不广播
    SimulationOnly,
}

/// 网络配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// WebSocket 网关地址
    pub ws_url: String,
    /// 链ID (Base主网: 8453)
    pub chain_id: u64,
    /// 心跳间隔
    pub heartbeat_interval: Duration,
    /// 重连等待时间
    pub reconnect_delay: Duration,
    /// 等待交易上链的超时
    pub inclusion_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://base-mainnet.g.alchemy.com/v2/your-api-key".to_string(),
            chain_id: BASE_CHAIN_ID,
            heartbeat_interval: Duration::from_secs(20),
            reconnect_delay: Duration::from_secs(5),
            inclusion_timeout: Duration::from_secs(120),
        }
    }
}

/// 打击配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrikeConfig {
    /// 闪电贷合约地址
    pub target_contract: Address,
    /// 借贷资产，同时是兑换路径起点
    pub loan_asset: Address,
    /// 兑换路径第二跳
    pub quote_asset: Address,
    /// 鲸鱼阈值 (wei)
    pub whale_threshold: U256,
    /// 最小净利润 (wei)
    pub min_net_profit: U256,
    pub gas_limit: U256,
    /// 最大 gas 单价上限 (wei)，估算不可用时也用于成本计算
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    /// ETH 价格假设 (美元, 8位小数)
    pub eth_price_usd_e8: U256,
    pub detection_policy: DetectionPolicy,
    pub execution_mode: ExecutionMode,
}

impl Default for StrikeConfig {
    fn default() -> Self {
        Self {
            target_contract: Address::from_str(DEFAULT_TARGET_CONTRACT).unwrap(),
            loan_asset: Address::from_str(BASE_WETH).unwrap(),
            quote_asset: Address::from_str(BASE_USDC).unwrap(),
            whale_threshold: U256::from(15u64) * U256::exp10(18),
            min_net_profit: U256::from(12u64) * U256::exp10(15), // 0.012 ETH
            gas_limit: U256::from(980_000u64),
            max_fee_per_gas: U256::from(500_000_000u64), // 0.5 gwei
            max_priority_fee_per_gas: U256::from(400_000_000u64), // 0.4 gwei
            eth_price_usd_e8: U256::from(3300u64) * U256::exp10(8),
            detection_policy: DetectionPolicy::FirstMatch,
            execution_mode: ExecutionMode::Live,
        }
    }
}

impl StrikeConfig {
    /// 固定的两跳兑换路径
    pub fn swap_path(&self) -> Vec<Address> {
        vec![self.loan_asset, self.quote_asset]
    }
}

/// 引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 区块通道容量
    pub block_channel_capacity: usize,
    /// 最近处理过的鲸鱼交易数量，用于去重
    pub max_recent_strikes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_channel_capacity: 16,
            max_recent_strikes: 256,
        }
    }
}

/// 完整的应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub strike: StrikeConfig,
    pub engine: EngineConfig,
    /// 私钥 (从环境变量读取)
    #[serde(skip)]
    pub private_key: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            strike: StrikeConfig::default(),
            engine: EngineConfig::default(),
            private_key: String::new(),
        }
    }
}

fn parse_address(name: &str, value: &str) -> Result<Address> {
    Address::from_str(value).map_err(|_| BotError::ConfigError(format!("Invalid {}", name)))
}

fn parse_eth_amount(name: &str, value: &str) -> Result<U256> {
    parse_ether(value).map_err(|_| BotError::ConfigError(format!("Invalid {}", name)))
}

fn parse_gwei(name: &str, value: &str) -> Result<U256> {
    parse_units(value, "gwei")
        .map(U256::from)
        .map_err(|_| BotError::ConfigError(format!("Invalid {}", name)))
}

fn parse_secs(name: &str, value: &str) -> Result<Duration> {
    value
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| BotError::ConfigError(format!("Invalid {}", name)))
}

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 从环境变量加载配置
    pub fn load_from_env() -> Result<AppConfig> {
        dotenv::dotenv().ok();
        Self::load_from(|key| env::var(key).ok())
    }

    /// 从任意键值来源加载，缺省项使用默认值
    pub fn load_from<F>(lookup: F) -> Result<AppConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AppConfig::default();

        config.private_key = lookup("TREASURY_PRIVATE_KEY").ok_or_else(|| {
            BotError::ConfigError(
                "TREASURY_PRIVATE_KEY environment variable is required".to_string(),
            )
        })?;

        // 网络配置
        if let Some(ws_url) = lookup("WSS_URL") {
            config.network.ws_url = ws_url;
        }
        if let Some(chain_id) = lookup("CHAIN_ID") {
            config.network.chain_id = chain_id
                .parse()
                .map_err(|_| BotError::ConfigError("Invalid CHAIN_ID".to_string()))?;
        }
        if let Some(v) = lookup("HEARTBEAT_SECS") {
            config.network.heartbeat_interval = parse_secs("HEARTBEAT_SECS", &v)?;
        }
        if let Some(v) = lookup("RECONNECT_DELAY_SECS") {
            config.network.reconnect_delay = parse_secs("RECONNECT_DELAY_SECS", &v)?;
        }
        if let Some(v) = lookup("INCLUSION_TIMEOUT_SECS") {
            config.network.inclusion_timeout = parse_secs("INCLUSION_TIMEOUT_SECS", &v)?;
        }

        // 打击配置
        if let Some(v) = lookup("TARGET_CONTRACT") {
            config.strike.target_contract = parse_address("TARGET_CONTRACT", &v)?;
        }
        if let Some(v) = lookup("LOAN_ASSET") {
            config.strike.loan_asset = parse_address("LOAN_ASSET", &v)?;
        }
        if let Some(v) = lookup("QUOTE_ASSET") {
            config.strike.quote_asset = parse_address("QUOTE_ASSET", &v)?;
        }
        if let Some(v) = lookup("WHALE_THRESHOLD_ETH") {
            config.strike.whale_threshold = parse_eth_amount("WHALE_THRESHOLD_ETH", &v)?;
        }
        if let Some(v) = lookup("MIN_NET_PROFIT_ETH") {
            config.strike.min_net_profit = parse_eth_amount("MIN_NET_PROFIT_ETH", &v)?;
        }
        if let Some(v) = lookup("GAS_LIMIT") {
            config.strike.gas_limit = U256::from_dec_str(&v)
                .map_err(|_| BotError::ConfigError("Invalid GAS_LIMIT".to_string()))?;
        }
        if let Some(v) = lookup("MAX_FEE_GWEI") {
            config.strike.max_fee_per_gas = parse_gwei("MAX_FEE_GWEI", &v)?;
        }
        if let Some(v) = lookup("MAX_PRIORITY_FEE_GWEI") {
            config.strike.max_priority_fee_per_gas = parse_gwei("MAX_PRIORITY_FEE_GWEI", &v)?;
        }
        if let Some(v) = lookup("ETH_PRICE_USD") {
            config.strike.eth_price_usd_e8 = parse_units(&v, 8u32)
                .map(U256::from)
                .map_err(|_| BotError::ConfigError("Invalid ETH_PRICE_USD".to_string()))?;
        }
        if let Some(v) = lookup("DETECTION_POLICY") {
            config.strike.detection_policy = v.parse()?;
        }

        // 引擎配置
        if let Some(v) = lookup("BLOCK_CHANNEL_CAPACITY") {
            config.engine.block_channel_capacity = v
                .parse()
                .map_err(|_| BotError::ConfigError("Invalid BLOCK_CHANNEL_CAPACITY".to_string()))?;
        }
        if let Some(v) = lookup("MAX_RECENT_STRIKES") {
            config.engine.max_recent_strikes = v
                .parse()
                .map_err(|_| BotError::ConfigError("Invalid MAX_RECENT_STRIKES".to_string()))?;
        }

        Self::validate_config(&config)?;

        Ok(config)
    }

    /// 验证配置的有效性
    pub fn validate_config(config: &AppConfig) -> Result<()> {
        let key = config.private_key.trim_start_matches("0x");
        if key.len() != 64 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(BotError::ConfigError("Invalid private key format".to_string()));
        }

        let url = url::Url::parse(&config.network.ws_url)
            .map_err(|e| BotError::ConfigError(format!("Invalid WSS_URL: {}", e)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(BotError::ConfigError("WSS_URL must use ws:// or wss://".to_string()));
        }

        if config.network.heartbeat_interval.is_zero() {
            return Err(BotError::ConfigError("heartbeat interval cannot be zero".to_string()));
        }

        let strike = &config.strike;
        if strike.target_contract.is_zero() {
            return Err(BotError::ConfigError("target contract cannot be zero".to_string()));
        }
        if strike.loan_asset == strike.quote_asset {
            return Err(BotError::ConfigError("swap path assets must differ".to_string()));
        }
        if strike.gas_limit.is_zero() {
            return Err(BotError::ConfigError("gas limit cannot be zero".to_string()));
        }
        if strike.max_priority_fee_per_gas > strike.max_fee_per_gas {
            return Err(BotError::ConfigError(
                "max priority fee cannot exceed max fee".to_string(),
            ));
        }
        if strike.eth_price_usd_e8.is_zero() {
            return Err(BotError::ConfigError("ETH price cannot be zero".to_string()));
        }

        if config.engine.block_channel_capacity == 0 {
            return Err(BotError::ConfigError("block channel capacity cannot be zero".to_string()));
        }

        Ok(())
    }

    /// 打印配置摘要 (不包含敏感信息)
    pub fn print_config_summary(config: &AppConfig) {
        let strike = &config.strike;
        tracing::info!("=== Config summary ===");
        tracing::info!("Chain ID: {}", config.network.chain_id);
        tracing::info!("Gateway: {}", redact_url(&config.network.ws_url));
        tracing::info!("Target contract: {:?}", strike.target_contract);
        tracing::info!("Swap path: {:?} -> {:?}", strike.loan_asset, strike.quote_asset);
        tracing::info!("Whale threshold: {} ETH", format_eth(strike.whale_threshold));
        tracing::info!("Min net profit: {} ETH", format_eth(strike.min_net_profit));
        tracing::info!("Gas limit: {}", strike.gas_limit);
        tracing::info!(
            "Max fee: {} wei, max priority fee: {} wei",
            strike.max_fee_per_gas,
            strike.max_priority_fee_per_gas
        );
        tracing::info!("Detection policy: {:?}", strike.detection_policy);
        tracing::info!("Execution mode: {:?}", strike.execution_mode);
        tracing::info!("======================");
    }
}

/// 隐藏 URL 路径中的 API key
fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(url) => format!("{}://{}/…", url.scheme(), url.host_str().unwrap_or("?")),
        Err(_) => "<invalid>".to_string(),
    }
}
