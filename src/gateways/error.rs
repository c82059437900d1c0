//! Gateway error types with transient-failure classification

use std::fmt;

/// Errors that can occur when calling an external gateway
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// Request exceeded the configured timeout
    Timeout { gateway: String },
    /// Connection-level failure
    Network { gateway: String, message: String },
    /// Non-success HTTP status
    Http {
        gateway: String,
        status: u16,
        message: String,
    },
    /// Response body did not match the expected shape
    Decode { gateway: String, message: String },
    /// Service answered but returned nothing usable
    EmptyResponse { gateway: String, what: String },
    /// Request rejected before it was sent
    InvalidInput { gateway: String, message: String },
    /// Gateway has no URL configured
    NotConfigured { gateway: String },
}

impl GatewayError {
    pub fn timeout(gateway: impl Into<String>) -> Self {
        GatewayError::Timeout {
            gateway: gateway.into(),
        }
    }

    pub fn network(gateway: impl Into<String>, message: impl Into<String>) -> Self {
        GatewayError::Network {
            gateway: gateway.into(),
            message: message.into(),
        }
    }

    pub fn http(gateway: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        GatewayError::Http {
            gateway: gateway.into(),
            status,
            message: message.into(),
        }
    }

    pub fn decode(gateway: impl Into<String>, message: impl Into<String>) -> Self {
        GatewayError::Decode {
            gateway: gateway.into(),
            message: message.into(),
        }
    }

    pub fn empty(gateway: impl Into<String>, what: impl Into<String>) -> Self {
        GatewayError::EmptyResponse {
            gateway: gateway.into(),
            what: what.into(),
        }
    }

    pub fn invalid_input(gateway: impl Into<String>, message: impl Into<String>) -> Self {
        GatewayError::InvalidInput {
            gateway: gateway.into(),
            message: message.into(),
        }
    }

    pub fn not_configured(gateway: impl Into<String>) -> Self {
        GatewayError::NotConfigured {
            gateway: gateway.into(),
        }
    }

    /// Classify a reqwest failure
    pub fn from_reqwest(gateway: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::timeout(gateway)
        } else if err.is_decode() {
            GatewayError::decode(gateway, err.to_string())
        } else if let Some(status) = err.status() {
            GatewayError::http(gateway, status.as_u16(), err.to_string())
        } else {
            GatewayError::network(gateway, err.to_string())
        }
    }

    /// Worth retrying: timeouts, connection errors, 429 and 5xx
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Timeout { .. } | GatewayError::Network { .. } => true,
            GatewayError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, GatewayError::Timeout { .. })
    }

    pub fn is_network(&self) -> bool {
        matches!(self, GatewayError::Network { .. })
    }

    pub fn gateway_name(&self) -> &str {
        match self {
            GatewayError::Timeout { gateway }
            | GatewayError::Network { gateway, .. }
            | GatewayError::Http { gateway, .. }
            | GatewayError::Decode { gateway, .. }
            | GatewayError::EmptyResponse { gateway, .. }
            | GatewayError::InvalidInput { gateway, .. }
            | GatewayError::NotConfigured { gateway } => gateway,
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Timeout { gateway } => write!(f, "{}: request timed out", gateway),
            GatewayError::Network { gateway, message } => {
                write!(f, "{}: network error - {}", gateway, message)
            }
            GatewayError::Http {
                gateway,
                status,
                message,
            } => write!(f, "{}: HTTP {} - {}", gateway, status, message),
            GatewayError::Decode { gateway, message } => {
                write!(f, "{}: malformed response - {}", gateway, message)
            }
            GatewayError::EmptyResponse { gateway, what } => {
                write!(f, "{}: empty {}", gateway, what)
            }
            GatewayError::InvalidInput { gateway, message } => {
                write!(f, "{}: invalid input - {}", gateway, message)
            }
            GatewayError::NotConfigured { gateway } => {
                write!(f, "{}: not configured (no URL set)", gateway)
            }
        }
    }
}

impl std::error::Error for GatewayError {}
