//! etcd 注册中心
//!
//! 注册通过租约（lease）+ keep-alive 实现，并周期性回读 key 以修复
//! keep-alive 静默失败的情况；解析通过前缀 watch 实现。

mod naming;
mod resolver;

use etcd_client::{Client, ConnectOptions};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::NamingConfig;
use crate::error::{NamingError, Result};
use crate::naming::resolver as resolver_registry;
use crate::naming::{PREFIX, Registry, TaskSet, validate_service_name};

/// etcd 连接超时
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(15);

/// etcd 连接选项
#[derive(Debug, Clone)]
pub struct EtcdOptions {
    pub endpoints: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub dial_timeout: Duration,
    pub request_timeout: Option<Duration>,
}

impl EtcdOptions {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            endpoints,
            username: None,
            password: None,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            request_timeout: None,
        }
    }

    pub fn with_user(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    fn connect_options(&self) -> ConnectOptions {
        let mut opts = ConnectOptions::new().with_connect_timeout(self.dial_timeout);
        if let Some(timeout) = self.request_timeout {
            opts = opts.with_timeout(timeout);
        }
        if let (Some(user), Some(password)) = (&self.username, &self.password) {
            opts = opts.with_user(user.clone(), password.clone());
        }
        opts
    }
}

impl From<&NamingConfig> for EtcdOptions {
    fn from(config: &NamingConfig) -> Self {
        let mut opts =
            EtcdOptions::new(config.endpoints.clone()).with_dial_timeout(config.dial_timeout());
        opts.username = config.username.clone();
        opts.password = config.password.clone();
        opts.request_timeout = config.request_timeout();
        opts
    }
}

/// etcd 注册中心
///
/// 同时实现服务注册（`Registrar`）和解析器构建（`ResolverBuilder`）
pub struct EtcdRegistry {
    client: Client,
    endpoints: String,
    service_name: String,
    registrations: TaskSet,
}

impl EtcdRegistry {
    /// 连接 etcd，`etcd_addrs` 中多个地址以 `;` 分隔
    pub async fn new(etcd_addrs: &str, service_name: &str) -> Result<Self> {
        let options = EtcdOptions::new(NamingConfig::parse_endpoints(etcd_addrs));
        Self::with_options(options, service_name).await
    }

    /// 使用自定义连接选项（认证、超时）连接 etcd
    pub async fn with_options(options: EtcdOptions, service_name: &str) -> Result<Self> {
        validate_service_name(service_name)?;
        if options.endpoints.is_empty() {
            return Err(NamingError::config("etcd endpoints not configured"));
        }

        let client = Client::connect(&options.endpoints, Some(options.connect_options())).await?;
        let endpoints = options.endpoints.join(";");
        info!(etcd = %endpoints, service = %service_name, "connected to etcd registry");

        Ok(Self {
            client,
            endpoints,
            service_name: service_name.to_string(),
            registrations: TaskSet::new(),
        })
    }

    /// 从配置创建
    pub async fn from_config(config: &NamingConfig) -> Result<Self> {
        config.validate()?;
        Self::with_options(EtcdOptions::from(config), &config.service_name).await
    }

    /// 创建注册中心并将其注册为进程级解析器
    pub async fn new_resolver(etcd_addrs: &str, service_name: &str) -> Result<Arc<Self>> {
        let registry = Arc::new(Self::new(etcd_addrs, service_name).await?);
        resolver_registry::register(registry.clone());
        Ok(registry)
    }

    /// 使用自定义连接选项创建并注册解析器
    pub async fn new_resolver_with_options(
        options: EtcdOptions,
        service_name: &str,
    ) -> Result<Arc<Self>> {
        let registry = Arc::new(Self::with_options(options, service_name).await?);
        resolver_registry::register(registry.clone());
        Ok(registry)
    }

    /// 底层 etcd 客户端
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// 停止本实例所有续期任务并撤销租约，绑定的 key 随之删除
    pub async fn shutdown(&self) {
        self.registrations.shutdown_all().await;
    }
}

impl Registry for EtcdRegistry {
    fn service_name(&self) -> &str {
        &self.service_name
    }
}

impl std::fmt::Debug for EtcdRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtcdRegistry")
            .field("endpoints", &self.endpoints)
            .field("service_name", &self.service_name)
            .field("scheme", &PREFIX)
            .finish()
    }
}
