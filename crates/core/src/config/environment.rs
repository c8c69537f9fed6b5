use serde::{Deserialize, Serialize};

use crate::errors::SymphonyError;

use super::DispatcherConfig;

/// Deployment environment.
///
/// Environments only change numeric knobs on top of the loaded
/// configuration. The dispatch code path is identical everywhere; there is
/// no business logic branching on the environment name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Testing,
    Staging,
    Production,
}

impl Environment {
    pub fn parse(env: &str) -> Result<Self, SymphonyError> {
        match env.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testing" | "test" => Ok(Environment::Testing),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(SymphonyError::Configuration(format!(
                "invalid environment: {env}"
            ))),
        }
    }

    /// Layer environment-specific overrides onto a loaded configuration.
    ///
    /// Production raises priority and retry aggressiveness; development and
    /// testing lower retries and the base delay for fast iteration.
    pub fn apply_overrides(&self, config: &mut DispatcherConfig) {
        config.environment = *self;
        match self {
            Environment::Production => {
                config.default_priority = 7;
                config.default_retry.max_retries = 5;
                config.default_retry.max_delay_ms = 300_000;
            }
            Environment::Staging => {
                config.default_priority = 5;
                config.default_retry.max_retries = 4;
            }
            Environment::Development | Environment::Testing => {
                config.default_priority = 3;
                config.default_retry.max_retries = 2;
                config.default_retry.delay_ms = 100;
            }
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Staging => "staging",
            Environment::Production => "production",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_long_names() {
        assert_eq!(Environment::parse("prod").unwrap(), Environment::Production);
        assert_eq!(
            Environment::parse("Development").unwrap(),
            Environment::Development
        );
        assert!(Environment::parse("cloud").is_err());
    }

    #[test]
    fn production_raises_priority_and_retry_budget() {
        let mut config = DispatcherConfig::default();
        Environment::Production.apply_overrides(&mut config);
        assert_eq!(config.default_priority, 7);
        assert_eq!(config.default_retry.max_retries, 5);
        assert_eq!(config.default_retry.max_delay_ms, 300_000);
    }

    #[test]
    fn development_keeps_low_priority_and_short_delays() {
        let mut config = DispatcherConfig::default();
        Environment::Development.apply_overrides(&mut config);
        assert_eq!(config.default_priority, 3);
        assert_eq!(config.default_retry.max_retries, 2);
        assert_eq!(config.default_retry.delay_ms, 100);
    }
}
