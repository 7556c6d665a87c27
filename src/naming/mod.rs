//! 服务注册与名字解析模块
//!
//! 支持两种注册中心后端：etcd（租约 + 变更通知）和 Redis（key 过期 + 轮询）。
//! 每个后端都同时实现注册（`Registrar`）与解析（`ResolverBuilder`），
//! 由 `Registry` 统一对外。

pub mod address;
#[cfg(feature = "etcd")]
pub mod etcd;
pub mod factory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod resolver;
pub mod revision;
pub mod task;

use async_trait::async_trait;
use tracing::error;

use crate::error::{NamingError, Result};
use address::AddressSet;
use resolver::{ClientConn, ResolverBuilder, State};

pub use address::{Address, AddressChange};
#[cfg(feature = "etcd")]
pub use etcd::EtcdRegistry;
pub use factory::NamingFactory;
#[cfg(feature = "redis")]
pub use redis::RedisRegistry;
pub use resolver::{BuildOptions, ResolveNowOptions, Resolver, Target};
pub use revision::{EventKind, RevisionedSet};
pub use task::{SHUTDOWN_TIMEOUT, ShutdownSignal, TaskHandle, TaskSet};

/// 注册中心 key 前缀，同时作为解析器的 scheme
///
/// 用于区分本库写入的 key 和注册中心里的其他数据
pub const PREFIX: &str = "_DENNY_";

/// 注册 TTL 上限（秒），一年
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// 服务实例在注册中心中的 key：`/{PREFIX}/{service_name}/{addr}`
pub fn service_key(service_name: &str, addr: &str) -> String {
    format!("/{}/{}/{}", PREFIX, service_name, addr)
}

/// 某个服务下所有实例 key 的公共前缀：`/{scheme}/{endpoint}/`
pub fn service_prefix(scheme: &str, endpoint: &str) -> String {
    format!("/{}/{}/", scheme, endpoint)
}

/// 服务注册 Trait
#[async_trait]
pub trait Registrar: Send + Sync {
    /// 注册服务地址并启动后台续期
    ///
    /// 立即返回；注册中心暂时不可用只记录日志，由续期任务自行恢复
    async fn register(&self, addr: &str, ttl: u64) -> Result<()>;

    /// 停止续期并从注册中心删除地址
    async fn unregister(&self, addr: &str) -> Result<()>;
}

/// 注册中心：同时负责注册和解析
pub trait Registry: Registrar + ResolverBuilder {
    /// 服务名
    fn service_name(&self) -> &str;

    /// 客户端拨号目标，格式为 `scheme:///service_name`
    fn svc_name(&self) -> String {
        format!("{}:///{}", self.scheme(), self.service_name())
    }
}

pub(crate) fn validate_service_name(service_name: &str) -> Result<()> {
    if service_name.trim().is_empty() {
        return Err(NamingError::config("invalid service name"));
    }
    Ok(())
}

/// 校验注册 TTL：必须在 `1..=MAX_TTL_SECS` 之间
pub fn validate_ttl(ttl: u64) -> Result<()> {
    if ttl == 0 {
        return Err(NamingError::config("ttl must be greater than zero"));
    }
    if ttl > MAX_TTL_SECS {
        return Err(NamingError::config(format!(
            "ttl {ttl}s exceeds the maximum of {MAX_TTL_SECS}s"
        )));
    }
    Ok(())
}

/// 校验一次注册请求的地址与 TTL
pub fn validate_registration(addr: &str, ttl: u64) -> Result<()> {
    if addr.trim().is_empty() {
        return Err(NamingError::config("empty service address"));
    }
    validate_ttl(ttl)
}

/// 推送当前地址集合的快照，失败只记录日志
pub(crate) async fn push_state(cc: &dyn ClientConn, set: &AddressSet, prefix: &str) {
    if let Err(e) = cc.update_state(State::new(set.snapshot())).await {
        error!(prefix = %prefix, error = %e, "failed to push address update");
    }
}
