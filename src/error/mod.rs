//! 命名服务错误处理模块
//!
//! 提供统一的错误类型、错误代码分类以及与 gRPC 状态之间的转换

pub mod code;
pub mod conversions;

pub use code::{ErrorCategory, ErrorCode};

use thiserror::Error;

/// 命名服务统一错误类型
#[derive(Error, Debug)]
pub enum NamingError {
    /// 配置错误（服务名为空、TTL 为 0、注册中心地址缺失等）
    #[error("invalid configuration: {0}")]
    Config(String),

    /// 拨号目标格式错误
    #[error("invalid dial target {target:?}: {reason}")]
    InvalidTarget { target: String, reason: String },

    /// 未注册的解析器 scheme
    #[error("no resolver registered for scheme {0:?}")]
    UnknownScheme(String),

    /// 没有可用的服务地址
    #[error("no available address for {0}")]
    NoAvailableAddress(String),

    /// 租约已过期（etcd keep-alive 返回 TTL <= 0）
    #[error("lease {0} expired")]
    LeaseExpired(i64),

    /// 监听流被关闭
    #[error("watch stream closed: {0}")]
    WatchClosed(String),

    /// etcd 客户端错误
    #[cfg(feature = "etcd")]
    #[error("etcd error: {0}")]
    Etcd(#[from] etcd_client::Error),

    /// Redis 客户端错误
    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// gRPC 传输层错误
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// 负载均衡器错误
    #[error("balancer error: {0}")]
    Balance(String),

    /// 操作超时
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 配置文件解析错误
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// JSON 解析错误
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// 命名服务结果类型
pub type Result<T> = std::result::Result<T, NamingError>;

impl NamingError {
    /// 创建配置错误
    pub fn config(msg: impl Into<String>) -> Self {
        NamingError::Config(msg.into())
    }

    /// 创建拨号目标错误
    pub fn invalid_target(target: impl Into<String>, reason: impl Into<String>) -> Self {
        NamingError::InvalidTarget {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// 获取错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            NamingError::Config(_) | NamingError::ConfigParse(_) | NamingError::Json(_) => {
                ErrorCode::ConfigurationError
            }
            NamingError::InvalidTarget { .. } => ErrorCode::InvalidTarget,
            NamingError::UnknownScheme(_) => ErrorCode::UnknownScheme,
            NamingError::NoAvailableAddress(_) => ErrorCode::NoAvailableAddress,
            NamingError::LeaseExpired(_) => ErrorCode::LeaseExpired,
            NamingError::WatchClosed(_) => ErrorCode::ConnectionClosed,
            #[cfg(feature = "etcd")]
            NamingError::Etcd(_) => ErrorCode::StorageError,
            #[cfg(feature = "redis")]
            NamingError::Redis(_) => ErrorCode::StorageError,
            NamingError::Transport(_) => ErrorCode::ConnectionFailed,
            NamingError::Balance(_) => ErrorCode::ServiceUnavailable,
            NamingError::Timeout(_) => ErrorCode::OperationTimeout,
            NamingError::Io(_) => ErrorCode::InternalError,
        }
    }

    /// 判断是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }
}
