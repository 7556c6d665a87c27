//! 错误码与 gRPC 状态转换测试

use denny_naming::{ErrorCategory, ErrorCode, NamingError};
use tonic::{Code, Status};

#[test]
fn test_error_codes() {
    assert_eq!(NamingError::config("bad").code(), ErrorCode::ConfigurationError);
    assert_eq!(
        NamingError::invalid_target("demo", "missing scheme").code(),
        ErrorCode::InvalidTarget
    );
    assert_eq!(NamingError::UnknownScheme("x".into()).code(), ErrorCode::UnknownScheme);
    assert_eq!(NamingError::LeaseExpired(7).code(), ErrorCode::LeaseExpired);
    assert_eq!(ErrorCode::NoAvailableAddress.as_u32(), 7002);
    assert_eq!(ErrorCode::NoAvailableAddress.as_str(), "NO_AVAILABLE_ADDRESS");
    assert_eq!(ErrorCode::ConnectionFailed.category(), ErrorCategory::Connection);
    assert_eq!(ErrorCode::UnknownScheme.category(), ErrorCategory::Naming);
}

#[test]
fn test_retryable() {
    assert!(NamingError::LeaseExpired(1).is_retryable());
    assert!(NamingError::Timeout("connect".into()).is_retryable());
    assert!(NamingError::WatchClosed("stream".into()).is_retryable());
    assert!(!NamingError::config("bad").is_retryable());
    assert!(!NamingError::NoAvailableAddress("demo".into()).is_retryable());
}

#[test]
fn test_status_mapping() {
    let status: Status = NamingError::NoAvailableAddress("_DENNY_:///demo".into()).into();
    assert_eq!(status.code(), Code::Unavailable);
    assert!(status.message().contains("_DENNY_:///demo"));

    let status: Status = NamingError::config("empty service name").into();
    assert_eq!(status.code(), Code::InvalidArgument);

    let status: Status = NamingError::UnknownScheme("nope".into()).into();
    assert_eq!(status.code(), Code::InvalidArgument);

    let status: Status = NamingError::Timeout("connect".into()).into();
    assert_eq!(status.code(), Code::DeadlineExceeded);

    let status: Status = NamingError::WatchClosed("stream".into()).into();
    assert_eq!(status.code(), Code::Unavailable);
}

#[test]
fn test_balance_error_conversion() {
    let boxed: tower::BoxError = "no ready services".into();
    let err = NamingError::from(boxed);
    assert!(matches!(err, NamingError::Balance(_)));
    assert_eq!(err.code(), ErrorCode::ServiceUnavailable);
}
