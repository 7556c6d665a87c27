//! 错误类型转换实现
//!
//! 提供 NamingError 与 gRPC Status 之间的转换

use super::{ErrorCategory, NamingError};
use tonic::Status;

impl From<NamingError> for Status {
    fn from(err: NamingError) -> Self {
        let message = err.to_string();
        match err {
            NamingError::NoAvailableAddress(_) => Status::unavailable(message),
            NamingError::Timeout(_) => Status::deadline_exceeded(message),
            NamingError::InvalidTarget { .. }
            | NamingError::UnknownScheme(_)
            | NamingError::Config(_)
            | NamingError::ConfigParse(_) => Status::invalid_argument(message),
            other => match other.code().category() {
                ErrorCategory::Connection => Status::unavailable(message),
                ErrorCategory::System if other.is_retryable() => Status::unavailable(message),
                ErrorCategory::System => Status::failed_precondition(message),
                _ => Status::internal(message),
            },
        }
    }
}

impl From<tower::BoxError> for NamingError {
    fn from(err: tower::BoxError) -> Self {
        NamingError::Balance(err.to_string())
    }
}
