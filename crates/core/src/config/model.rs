use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Environment;

/// 传输类型：入队即同步执行，或落库等待worker消费
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Sync,
    Queued,
}

/// 传输配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    pub name: String,
    pub kind: TransportKind,
    pub queue: String,
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// 重试策略配置
///
/// 退避公式 `delay(n) = min(delay * multiplier^n, max_delay)`，
/// 只依赖尝试次数，纯函数便于测试。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryStrategyConfig {
    #[serde(alias = "maxRetries")]
    pub max_retries: i32,
    #[serde(alias = "delay", alias = "delayMs")]
    pub delay_ms: u64,
    pub multiplier: f64,
    #[serde(alias = "maxDelay", alias = "maxDelayMs")]
    pub max_delay_ms: u64,
}

impl Default for RetryStrategyConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_ms: 1000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryStrategyConfig {
    /// 第`attempt`次失败后的重试延迟（attempt从0开始计）
    pub fn delay_for(&self, attempt: i32) -> Duration {
        let exponent = attempt.max(0);
        let raw = self.delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = raw.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// 重试预算是否已耗尽
    pub fn is_exhausted(&self, retry_count: i32) -> bool {
        retry_count >= self.max_retries
    }
}

/// 去重配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupConfig {
    /// 滚动去重窗口（毫秒）
    pub window_ms: u64,
    /// true时重复入队抛错，false时透明返回原始信封id
    pub reject_duplicates: bool,
    /// 是否记录DuplicateAttempt审计
    pub track_attempts: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window_ms: 86_400_000, // 24小时
            reject_duplicates: false,
            track_attempts: true,
        }
    }
}

/// 调度器进程级配置
///
/// 启动时构造一次的不可变值，通过引用注入路由器、去重器和执行器，
/// 不存在隐藏的全局可变状态。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub environment: Environment,
    pub default_transport: String,
    pub default_queue: String,
    pub default_priority: i32,
    /// 传输名 -> 传输配置
    pub transports: HashMap<String, TransportConfig>,
    /// 消息类型 -> 传输名
    pub routing: HashMap<String, String>,
    /// 消息类型 -> 优先级覆盖
    pub priority_routing: HashMap<String, i32>,
    pub batch_max_size: usize,
    pub dedup: DedupConfig,
    pub default_retry: RetryStrategyConfig,
    /// 消息类型 -> 重试策略覆盖
    pub retry_overrides: HashMap<String, RetryStrategyConfig>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        let default_transport = "default".to_string();
        let default_queue = "default".to_string();
        let mut transports = HashMap::new();
        transports.insert(
            default_transport.clone(),
            TransportConfig {
                name: default_transport.clone(),
                kind: TransportKind::Queued,
                queue: default_queue.clone(),
                priority: 3,
                enabled: true,
            },
        );
        Self {
            environment: Environment::Development,
            default_transport,
            default_queue,
            default_priority: 3,
            transports,
            routing: HashMap::new(),
            priority_routing: HashMap::new(),
            batch_max_size: 100,
            dedup: DedupConfig::default(),
            default_retry: RetryStrategyConfig::default(),
            retry_overrides: HashMap::new(),
        }
    }
}

impl DispatcherConfig {
    pub fn transport(&self, name: &str) -> Option<&TransportConfig> {
        self.transports.get(name)
    }

    /// 消息类型的重试策略，无覆盖时回退到默认策略
    pub fn retry_strategy(&self, message_type: &str) -> &RetryStrategyConfig {
        self.retry_overrides
            .get(message_type)
            .unwrap_or(&self.default_retry)
    }

    pub fn dedup_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.dedup.window_ms as i64)
    }
}
