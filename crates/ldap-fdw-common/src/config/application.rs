use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{LdapFdwError, LdapFdwResult};

const DEFAULT_CONFIG: &str = include_str!("default.toml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub execution: ExecutionConfig,
}

impl AppConfig {
    pub fn load() -> LdapFdwResult<Self> {
        Self::figment()
            .admerge(Env::prefixed("LDAP_FDW__").map(|p| p.as_str().replace("__", ".").into()))
            .extract()
            .map_err(|e| LdapFdwError::Configuration(e.to_string()))
    }

    /// Loads the built-in defaults only, ignoring the environment.
    pub fn load_defaults() -> LdapFdwResult<Self> {
        Self::figment()
            .extract()
            .map_err(|e| LdapFdwError::Configuration(e.to_string()))
    }

    fn figment() -> Figment {
        Figment::from(Toml::string(DEFAULT_CONFIG))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub connect_timeout_secs: u64,
    pub operation_timeout_secs: u64,
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.connect_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.operation_timeout_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            operation_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub batch_size: usize,
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}
