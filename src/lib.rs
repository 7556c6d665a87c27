//! Denny Naming
//!
//! 服务自注册与 gRPC 名字解析：服务进程把自己的地址写入 etcd 或 Redis 并持续续期，
//! 客户端通过 `_DENNY_:///service` 拨号，解析器持续推送存活地址集合。

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod naming;

// Re-exports
pub use client::{
    DEFAULT_BALANCING_POLICY, DialOptions, LoadBalancingPolicy, NamingClient, ServiceConfig,
    default_balance_policy, dial,
};
pub use config::{BackendType, NamingConfig};
pub use error::{ErrorCategory, ErrorCode, NamingError, Result};
pub use logging::{LogFormat, LoggingConfig, init_logging};
pub use naming::{
    Address, AddressChange, BuildOptions, NamingFactory, PREFIX, Registrar, Registry,
    ResolveNowOptions, Resolver, Target, service_key, service_prefix,
};
#[cfg(feature = "etcd")]
pub use naming::EtcdRegistry;
#[cfg(feature = "redis")]
pub use naming::RedisRegistry;
