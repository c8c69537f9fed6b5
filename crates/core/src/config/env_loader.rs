use std::collections::HashMap;
use std::str::FromStr;

use tracing::debug;

use crate::errors::{SymphonyError, SymphonyResult};

use super::{DispatcherConfig, Environment, TransportConfig, TransportKind};

const ENV_PREFIX: &str = "SYMPHONY_";
const TRANSPORT_PREFIX: &str = "SYMPHONY_TRANSPORT_";

impl DispatcherConfig {
    /// 启动时从进程环境变量构建配置
    ///
    /// 先读取`SYMPHONY_*`变量，然后按`APP_ENV`叠加环境级覆盖。
    pub fn from_env() -> SymphonyResult<Self> {
        Self::from_vars(std::env::vars())
    }

    /// 从给定的变量集合构建配置，便于测试时不触碰进程环境
    pub fn from_vars(vars: impl Iterator<Item = (String, String)>) -> SymphonyResult<Self> {
        let vars: HashMap<String, String> = vars
            .filter(|(key, _)| key.starts_with(ENV_PREFIX) || key == "APP_ENV")
            .collect();

        let mut config = DispatcherConfig::default();

        if let Some(value) = vars.get("SYMPHONY_DEFAULT_TRANSPORT") {
            config.default_transport = value.clone();
        }
        if let Some(value) = vars.get("SYMPHONY_DEFAULT_QUEUE") {
            config.default_queue = value.clone();
        }
        if let Some(value) = vars.get("SYMPHONY_DEFAULT_PRIORITY") {
            config.default_priority = parse_var("SYMPHONY_DEFAULT_PRIORITY", value)?;
        }
        if let Some(value) = vars.get("SYMPHONY_BATCH_MAX_SIZE") {
            config.batch_max_size = parse_var("SYMPHONY_BATCH_MAX_SIZE", value)?;
        }
        if let Some(value) = vars.get("SYMPHONY_DEDUPLICATION_WINDOW_MS") {
            config.dedup.window_ms = parse_var("SYMPHONY_DEDUPLICATION_WINDOW_MS", value)?;
        }

        if let Some(value) = vars.get("SYMPHONY_RETRY_MAX_RETRIES") {
            config.default_retry.max_retries = parse_var("SYMPHONY_RETRY_MAX_RETRIES", value)?;
        }
        if let Some(value) = vars.get("SYMPHONY_RETRY_DELAY") {
            config.default_retry.delay_ms = parse_var("SYMPHONY_RETRY_DELAY", value)?;
        }
        if let Some(value) = vars.get("SYMPHONY_RETRY_MULTIPLIER") {
            config.default_retry.multiplier = parse_var("SYMPHONY_RETRY_MULTIPLIER", value)?;
        }
        if let Some(value) = vars.get("SYMPHONY_RETRY_MAX_DELAY") {
            config.default_retry.max_delay_ms = parse_var("SYMPHONY_RETRY_MAX_DELAY", value)?;
        }

        if let Some(value) = vars.get("SYMPHONY_ROUTING") {
            config.routing = parse_json_var("SYMPHONY_ROUTING", value)?;
        }
        if let Some(value) = vars.get("SYMPHONY_PRIORITY_ROUTING") {
            config.priority_routing = parse_json_var("SYMPHONY_PRIORITY_ROUTING", value)?;
        }
        if let Some(value) = vars.get("SYMPHONY_RETRY_CONFIGS") {
            config.retry_overrides = parse_json_var("SYMPHONY_RETRY_CONFIGS", value)?;
        }

        load_transports(&vars, &mut config)?;

        // 默认传输没有显式声明时合成一个队列式传输
        if !config.transports.contains_key(&config.default_transport) {
            config.transports.insert(
                config.default_transport.clone(),
                TransportConfig {
                    name: config.default_transport.clone(),
                    kind: TransportKind::Queued,
                    queue: config.default_queue.clone(),
                    priority: config.default_priority,
                    enabled: true,
                },
            );
        }

        for (message_type, transport_name) in &config.routing {
            if !config.transports.contains_key(transport_name) {
                return Err(SymphonyError::Configuration(format!(
                    "routing for {message_type} references unknown transport {transport_name}"
                )));
            }
        }

        let environment = match vars.get("APP_ENV") {
            Some(value) => Environment::parse(value)?,
            None => Environment::Development,
        };
        environment.apply_overrides(&mut config);

        debug!(
            environment = %config.environment,
            default_transport = %config.default_transport,
            transports = config.transports.len(),
            routes = config.routing.len(),
            "dispatcher configuration loaded"
        );
        Ok(config)
    }
}

/// 收集`SYMPHONY_TRANSPORT_<NAME>_{ENABLED,QUEUE,PRIORITY,KIND}`变量
fn load_transports(
    vars: &HashMap<String, String>,
    config: &mut DispatcherConfig,
) -> SymphonyResult<()> {
    let mut declared: HashMap<String, HashMap<String, String>> = HashMap::new();
    for (key, value) in vars {
        let Some(rest) = key.strip_prefix(TRANSPORT_PREFIX) else {
            continue;
        };
        // 后缀拼写错误必须显式报错，否则会静默声明一个全默认值的传输
        let Some((name, attribute)) = rest.rsplit_once('_') else {
            return Err(SymphonyError::Configuration(format!(
                "malformed transport variable {key}: expected SYMPHONY_TRANSPORT_<NAME>_<ATTRIBUTE>"
            )));
        };
        if !matches!(attribute, "ENABLED" | "QUEUE" | "PRIORITY" | "KIND") {
            return Err(SymphonyError::Configuration(format!(
                "unknown transport attribute in {key}: {attribute}"
            )));
        }
        declared
            .entry(name.to_lowercase())
            .or_default()
            .insert(attribute.to_string(), value.clone());
    }

    for (name, attributes) in declared {
        let enabled = match attributes.get("ENABLED") {
            Some(value) => parse_bool(&format!("{TRANSPORT_PREFIX}{}_ENABLED", name.to_uppercase()), value)?,
            None => true,
        };
        let queue = attributes
            .get("QUEUE")
            .cloned()
            .unwrap_or_else(|| config.default_queue.clone());
        let priority = match attributes.get("PRIORITY") {
            Some(value) => parse_var::<i32>(
                &format!("{TRANSPORT_PREFIX}{}_PRIORITY", name.to_uppercase()),
                value,
            )?,
            None => config.default_priority,
        };
        let kind = match attributes.get("KIND").map(|v| v.to_lowercase()).as_deref() {
            Some("sync") => TransportKind::Sync,
            Some("queued") | None => TransportKind::Queued,
            Some(other) => {
                return Err(SymphonyError::Configuration(format!(
                    "invalid transport kind for {name}: {other}"
                )))
            }
        };
        config.transports.insert(
            name.clone(),
            TransportConfig {
                name,
                kind,
                queue,
                priority,
                enabled,
            },
        );
    }
    Ok(())
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> SymphonyResult<T> {
    value.parse().map_err(|_| {
        SymphonyError::Configuration(format!("invalid value for {name}: {value}"))
    })
}

fn parse_bool(name: &str, value: &str) -> SymphonyResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(SymphonyError::Configuration(format!(
            "invalid boolean for {name}: {value}"
        ))),
    }
}

fn parse_json_var<T: serde::de::DeserializeOwned>(name: &str, value: &str) -> SymphonyResult<T> {
    serde_json::from_str(value).map_err(|e| {
        SymphonyError::Configuration(format!("invalid JSON in {name}: {e}"))
    })
}
