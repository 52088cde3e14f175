use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Stable error codes carried across the wire in `"<CODE>: <message>"` form.
///
/// The codes split into three classes which drive propagation policy:
/// business codes travel inside a failure [`Response`](super::Response),
/// framework codes are raised synchronously at setup/call time, and network
/// codes are the only class subject to retry and circuit-breaker accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Business
    ServiceNotFound,
    MethodNotFound,
    // Framework
    ProviderRegisterFailed,
    ConsumerInjectFailed,
    NoAvailableInstance,
    CircuitBreakerOpen,
    // Network
    NetworkError,
    ResponseParseError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ServiceNotFound => "SERVICE_NOT_FOUND",
            ErrorCode::MethodNotFound => "METHOD_NOT_FOUND",
            ErrorCode::ProviderRegisterFailed => "PROVIDER_REGISTER_FAILED",
            ErrorCode::ConsumerInjectFailed => "CONSUMER_INJECT_FAILED",
            ErrorCode::NoAvailableInstance => "NO_AVAILABLE_INSTANCE",
            ErrorCode::CircuitBreakerOpen => "CIRCUIT_BREAKER_OPEN",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::ResponseParseError => "RESPONSE_PARSE_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCode {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "SERVICE_NOT_FOUND" => Ok(ErrorCode::ServiceNotFound),
            "METHOD_NOT_FOUND" => Ok(ErrorCode::MethodNotFound),
            "PROVIDER_REGISTER_FAILED" => Ok(ErrorCode::ProviderRegisterFailed),
            "CONSUMER_INJECT_FAILED" => Ok(ErrorCode::ConsumerInjectFailed),
            "NO_AVAILABLE_INSTANCE" => Ok(ErrorCode::NoAvailableInstance),
            "CIRCUIT_BREAKER_OPEN" => Ok(ErrorCode::CircuitBreakerOpen),
            "NETWORK_ERROR" => Ok(ErrorCode::NetworkError),
            "RESPONSE_PARSE_ERROR" => Ok(ErrorCode::ResponseParseError),
            _ => Err(()),
        }
    }
}

/// Unified error type for the relay runtime.
///
/// The variant is the error *class*; the [`ErrorCode`] pins the concrete
/// condition. Only [`RpcError::Network`] errors are retried or counted
/// against the circuit breaker, since a well-formed business failure is not
/// evidence that the remote is unhealthy.
#[derive(Error, Debug)]
pub enum RpcError {
    /// Call-level failure reported by the provider (service/method not found,
    /// or an error raised by the implementation itself).
    #[error("{code}: {message}")]
    Business { code: ErrorCode, message: String },

    /// Setup- or call-time failure inside the framework: registration,
    /// consumer injection, no available instance, open circuit breaker.
    #[error("{code}: {message}")]
    Framework { code: ErrorCode, message: String },

    /// Transport I/O failure, response-parse failure, or timeout.
    #[error("{code}: {message}")]
    Network { code: ErrorCode, message: String },

    /// Failure raised by the provider's method implementation, relayed
    /// verbatim as `"<ExceptionName>: <message>"`. Carries no registered
    /// code.
    #[error("{message}")]
    Remote { message: String },
}

impl RpcError {
    pub fn business(code: ErrorCode, message: impl Into<String>) -> Self {
        RpcError::Business { code, message: message.into() }
    }

    pub fn framework(code: ErrorCode, message: impl Into<String>) -> Self {
        RpcError::Framework { code, message: message.into() }
    }

    pub fn network(message: impl Into<String>) -> Self {
        RpcError::Network { code: ErrorCode::NetworkError, message: message.into() }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            RpcError::Business { code, .. }
            | RpcError::Framework { code, .. }
            | RpcError::Network { code, .. } => Some(*code),
            RpcError::Remote { .. } => None,
        }
    }

    /// Whether this error belongs to the network class (the only class
    /// subject to retry and circuit-breaker accounting).
    pub fn is_network(&self) -> bool {
        matches!(self, RpcError::Network { .. })
    }

    /// Recovers a typed error from a failure response's
    /// `"<CODE>: <message>"` string. An unknown or missing code is treated
    /// as a provider-side business error carrying the raw message.
    pub fn from_error_message(message: &str) -> Self {
        if let Some((prefix, rest)) = message.split_once(": ") {
            if let Ok(code) = prefix.parse::<ErrorCode>() {
                return match code {
                    ErrorCode::ServiceNotFound | ErrorCode::MethodNotFound => {
                        RpcError::Business { code, message: rest.to_string() }
                    }
                    ErrorCode::NetworkError | ErrorCode::ResponseParseError => {
                        RpcError::Network { code, message: rest.to_string() }
                    }
                    _ => RpcError::Framework { code, message: rest.to_string() },
                };
            }
        }
        // Provider-side implementation errors arrive as
        // "<ExceptionName>: <message>" with no registered code.
        RpcError::Remote {
            message: message.to_string(),
        }
    }
}

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        RpcError::Network {
            code: ErrorCode::NetworkError,
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::Network {
            code: ErrorCode::ResponseParseError,
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
