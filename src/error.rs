//! Error types for decoding share links and probing nodes

use crate::node::models::NodeStatus;
use thiserror::Error;

/// Failure to turn a raw token into a node
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The token matched a scheme prefix but its payload could not be decoded
    #[error("malformed {scheme} link: {reason}")]
    Malformed { scheme: &'static str, reason: String },
    /// The payload decoded but a field failed domain validation
    #[error("invalid field `{field}`: {value}")]
    InvalidField { field: &'static str, value: String },
}

impl DecodeError {
    pub(crate) fn malformed(scheme: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            scheme,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            value: value.into(),
        }
    }
}

/// Failure of a single probe
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("probe timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    ConnectionRefused(String),
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    #[error("probe cancelled")]
    Cancelled,
    #[error("probe failed unexpectedly: {0}")]
    Internal(String),
}

impl ProbeError {
    /// Status a node takes after this failure
    pub fn status(&self) -> NodeStatus {
        match self {
            ProbeError::InvalidTarget(_) => NodeStatus::Invalid,
            _ => NodeStatus::Unreachable,
        }
    }
}

/// Raised only when the validator pool cannot be built
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolConfigurationError {
    #[error("validator parallelism must be positive, got {0}")]
    NonPositiveParallelism(usize),
    #[error("validator timeout must be positive")]
    ZeroTimeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_error_status() {
        assert_eq!(ProbeError::Timeout.status(), NodeStatus::Unreachable);
        assert_eq!(
            ProbeError::ConnectionRefused("refused".into()).status(),
            NodeStatus::Unreachable
        );
        assert_eq!(
            ProbeError::HandshakeFailed("bad cert".into()).status(),
            NodeStatus::Unreachable
        );
        assert_eq!(ProbeError::Cancelled.status(), NodeStatus::Unreachable);
        assert_eq!(
            ProbeError::Internal("panic".into()).status(),
            NodeStatus::Unreachable
        );
        assert_eq!(
            ProbeError::InvalidTarget("no such host".into()).status(),
            NodeStatus::Invalid
        );
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::invalid("port", "70000");
        assert_eq!(err.to_string(), "invalid field `port`: 70000");
        let err = DecodeError::malformed("vmess", "bad base64");
        assert_eq!(err.to_string(), "malformed vmess link: bad base64");
    }
}
