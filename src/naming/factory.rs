//! 注册中心工厂
//!
//! 根据 `NamingConfig` 创建对应后端的注册中心

use std::sync::Arc;
use tracing::info;

use crate::config::{BackendType, NamingConfig};
use crate::error::{NamingError, Result};
use crate::naming::{Registry, resolver};

/// 注册中心工厂
pub struct NamingFactory;

impl NamingFactory {
    /// 从配置创建注册中心
    pub async fn create_registry(config: &NamingConfig) -> Result<Arc<dyn Registry>> {
        config.validate()?;
        info!(
            backend = ?config.backend,
            service = %config.service_name,
            endpoints = ?config.endpoints,
            "creating naming registry"
        );

        match config.backend {
            #[cfg(feature = "etcd")]
            BackendType::Etcd => {
                let registry = crate::naming::EtcdRegistry::from_config(config).await?;
                Ok(Arc::new(registry))
            }
            #[cfg(feature = "redis")]
            BackendType::Redis => {
                let registry = crate::naming::RedisRegistry::from_config(config).await?;
                Ok(Arc::new(registry))
            }
            #[allow(unreachable_patterns)]
            backend => Err(NamingError::config(format!(
                "backend {:?} is not enabled in this build",
                backend
            ))),
        }
    }

    /// 创建注册中心并将其注册为进程级解析器
    pub async fn create_resolver(config: &NamingConfig) -> Result<Arc<dyn Registry>> {
        let registry = Self::create_registry(config).await?;
        let builder: Arc<dyn resolver::ResolverBuilder> = registry.clone();
        resolver::register(builder);
        Ok(registry)
    }

    /// 创建注册中心并注册 `advertise_address`
    ///
    /// 配置中没有发布地址时返回配置错误
    pub async fn register_from_config(config: &NamingConfig) -> Result<Arc<dyn Registry>> {
        let addr = config
            .advertise_address
            .as_deref()
            .ok_or_else(|| NamingError::config("advertise address not configured"))?;
        let registry = Self::create_registry(config).await?;
        registry.register(addr, config.ttl_secs).await?;
        Ok(registry)
    }
}
