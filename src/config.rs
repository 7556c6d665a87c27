use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{NamingError, Result};
use crate::naming::{MAX_TTL_SECS, validate_ttl};

/// 注册中心后端类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    #[default]
    Etcd,
    Redis,
}

impl std::str::FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "etcd" => Ok(BackendType::Etcd),
            "redis" => Ok(BackendType::Redis),
            _ => Err(format!("Unknown backend type: {}", s)),
        }
    }
}

/// 命名服务配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NamingConfig {
    #[serde(default)]
    pub backend: BackendType,
    pub service_name: String,
    /// etcd 为多个地址；Redis 只使用第一个地址（`host:port`）
    pub endpoints: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_dial_timeout_secs")]
    pub dial_timeout_secs: u64,
    pub request_timeout_secs: Option<u64>,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// 本进程对外发布的地址（`host:port`）
    pub advertise_address: Option<String>,
}

fn default_dial_timeout_secs() -> u64 {
    15
}

fn default_ttl_secs() -> u64 {
    10
}

fn default_poll_interval_secs() -> u64 {
    5
}

impl NamingConfig {
    pub fn new(
        backend: BackendType,
        endpoints: Vec<String>,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            service_name: service_name.into(),
            endpoints,
            username: None,
            password: None,
            dial_timeout_secs: default_dial_timeout_secs(),
            request_timeout_secs: None,
            ttl_secs: default_ttl_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            advertise_address: None,
        }
    }

    /// 解析 etcd 风格的地址串，多个地址以 `;` 分隔
    pub fn parse_endpoints(endpoints: &str) -> Vec<String> {
        endpoints
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: NamingConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 使用环境变量覆盖部分配置
    ///
    /// - `NAMING_TTL_SECONDS`：注册 TTL
    /// - `NAMING_POLL_INTERVAL_SECONDS`：Redis 轮询间隔
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(ttl) = env_u64("NAMING_TTL_SECONDS") {
            self.ttl_secs = ttl;
        }
        if let Some(interval) = env_u64("NAMING_POLL_INTERVAL_SECONDS") {
            self.poll_interval_secs = interval;
        }
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    pub fn with_advertise_address(mut self, address: impl Into<String>) -> Self {
        self.advertise_address = Some(address.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.service_name.trim().is_empty() {
            return Err(NamingError::config("invalid service name"));
        }
        if self.endpoints.is_empty() {
            return Err(NamingError::config("registry endpoints not configured"));
        }
        validate_ttl(self.ttl_secs)?;
        if self.poll_interval_secs == 0 || self.poll_interval_secs > MAX_TTL_SECS {
            return Err(NamingError::config(format!(
                "poll interval must be between 1 and {MAX_TTL_SECS} seconds"
            )));
        }
        Ok(())
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse::<u64>().ok())
}
