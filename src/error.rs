//! Error types for the KNX bridge
//!
//! This module provides the error taxonomy shared by the configuration loader,
//! the gateway supervisor, the state store and the HTTP query surface, together
//! with structured error codes and the HTTP status mapping used by the API.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, KnxError>;

/// Error types for KNX bridge operations
#[derive(Error, Debug)]
pub enum KnxError {
    /// Malformed line in the configuration file
    #[error("Syntax error in {file} line {line}: {message}")]
    ConfigSyntax {
        file: String,
        line: usize,
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Could not establish a gateway connection
    #[error("Gateway connection failed: {0}")]
    TransportConnect(String),

    /// Could not hand an event to a live gateway connection
    #[error("Gateway send failed: {0}")]
    TransportSend(String),

    /// Datapoint type tag is not registered
    #[error("Unknown datapoint type: {0}")]
    UnknownType(String),

    /// Malformed value text or payload
    #[error("Parsing error: {0}")]
    Parse(String),

    /// Value kind has no numeric representation
    #[error("Unsupported value kind: {0}")]
    UnsupportedKind(String),

    /// Target has no codec able to validate a written value
    #[error("Unsupported write: {0}")]
    UnsupportedWrite(String),

    /// Name resolved to zero or several group addresses
    #[error("Address {query:?} resolves to {matches} group addresses")]
    AmbiguousOrUnknownAddress { query: String, matches: usize },

    /// Nothing was ever observed for the target group address
    #[error("No prior traffic for {0}")]
    NoPriorTraffic(String),

    /// Gateway is not currently connected
    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Snapshot persistence errors
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors
    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

/// Structured error code for machine-readable error handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Configuration errors (1200-1299)
    ConfigurationInvalid,
    ConfigurationSyntax,

    // Gateway errors (1300-1399)
    GatewayConnectFailed,
    GatewaySendFailed,
    GatewayUnavailable,
    NoPriorTraffic,

    // Data errors (1400-1499)
    ParsingFailed,
    UnknownDatapointType,
    UnsupportedKind,
    UnsupportedWrite,
    AddressNotFound,
    AddressAmbiguous,

    // Storage errors (1500-1599)
    SnapshotFailed,

    // Internal errors (1900-1999)
    InternalError,
}

impl ErrorCode {
    /// Get numeric error code
    pub fn as_number(&self) -> u32 {
        match self {
            ErrorCode::ConfigurationInvalid => 1201,
            ErrorCode::ConfigurationSyntax => 1202,

            ErrorCode::GatewayConnectFailed => 1301,
            ErrorCode::GatewaySendFailed => 1302,
            ErrorCode::GatewayUnavailable => 1303,
            ErrorCode::NoPriorTraffic => 1304,

            ErrorCode::ParsingFailed => 1401,
            ErrorCode::UnknownDatapointType => 1402,
            ErrorCode::UnsupportedKind => 1403,
            ErrorCode::UnsupportedWrite => 1404,
            ErrorCode::AddressNotFound => 1405,
            ErrorCode::AddressAmbiguous => 1406,

            ErrorCode::SnapshotFailed => 1501,

            ErrorCode::InternalError => 1901,
        }
    }

    /// Get error category
    pub fn category(&self) -> &'static str {
        match self.as_number() {
            1200..=1299 => "configuration",
            1300..=1399 => "gateway",
            1400..=1499 => "data",
            1500..=1599 => "storage",
            1900..=1999 => "internal",
            _ => "unknown",
        }
    }
}

impl KnxError {
    /// Create a configuration syntax error
    pub fn config_syntax<F: Into<String>, S: Into<String>>(file: F, line: usize, msg: S) -> Self {
        Self::ConfigSyntax {
            file: file.into(),
            line,
            message: msg.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connection error
    pub fn transport_connect<S: Into<String>>(msg: S) -> Self {
        Self::TransportConnect(msg.into())
    }

    /// Create a send error
    pub fn transport_send<S: Into<String>>(msg: S) -> Self {
        Self::TransportSend(msg.into())
    }

    /// Create an unknown datapoint type error
    pub fn unknown_type<S: Into<String>>(tag: S) -> Self {
        Self::UnknownType(tag.into())
    }

    /// Create a parsing error
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::Parse(msg.into())
    }

    /// Create an unsupported kind error
    pub fn unsupported_kind<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedKind(msg.into())
    }

    /// Create an unsupported write error
    pub fn unsupported_write<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedWrite(msg.into())
    }

    /// Create an ambiguous-or-unknown address error
    pub fn unresolved<S: Into<String>>(query: S, matches: usize) -> Self {
        Self::AmbiguousOrUnknownAddress {
            query: query.into(),
            matches,
        }
    }

    /// Create a no-prior-traffic error
    pub fn no_prior_traffic<S: Into<String>>(msg: S) -> Self {
        Self::NoPriorTraffic(msg.into())
    }

    /// Create a gateway unavailable error
    pub fn gateway_unavailable<S: Into<String>>(gateway: S) -> Self {
        Self::GatewayUnavailable(gateway.into())
    }

    /// Create a snapshot error
    pub fn snapshot<S: Into<String>>(msg: S) -> Self {
        Self::Snapshot(msg.into())
    }

    /// Map KnxError to structured error code
    pub fn to_error_code(&self) -> ErrorCode {
        match self {
            KnxError::ConfigSyntax { .. } => ErrorCode::ConfigurationSyntax,
            KnxError::Config(_) => ErrorCode::ConfigurationInvalid,
            KnxError::TransportConnect(_) => ErrorCode::GatewayConnectFailed,
            KnxError::TransportSend(_) => ErrorCode::GatewaySendFailed,
            KnxError::UnknownType(_) => ErrorCode::UnknownDatapointType,
            KnxError::Parse(_) => ErrorCode::ParsingFailed,
            KnxError::UnsupportedKind(_) => ErrorCode::UnsupportedKind,
            KnxError::UnsupportedWrite(_) => ErrorCode::UnsupportedWrite,
            KnxError::AmbiguousOrUnknownAddress { matches: 0, .. } => ErrorCode::AddressNotFound,
            KnxError::AmbiguousOrUnknownAddress { .. } => ErrorCode::AddressAmbiguous,
            KnxError::NoPriorTraffic(_) => ErrorCode::NoPriorTraffic,
            KnxError::GatewayUnavailable(_) => ErrorCode::GatewayUnavailable,
            KnxError::Snapshot(_) => ErrorCode::SnapshotFailed,
            KnxError::Json(_) => ErrorCode::ParsingFailed,
            KnxError::Io(_) | KnxError::Generic(_) => ErrorCode::InternalError,
        }
    }

    /// HTTP status reported to query-surface callers
    pub fn status_code(&self) -> StatusCode {
        match self {
            KnxError::AmbiguousOrUnknownAddress { matches: 0, .. } => StatusCode::NOT_FOUND,
            KnxError::AmbiguousOrUnknownAddress { .. } | KnxError::Parse(_) => {
                StatusCode::BAD_REQUEST
            }
            KnxError::NoPriorTraffic(_)
            | KnxError::UnknownType(_)
            | KnxError::UnsupportedKind(_)
            | KnxError::UnsupportedWrite(_) => StatusCode::NOT_ACCEPTABLE,
            KnxError::GatewayUnavailable(_) | KnxError::TransportSend(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            KnxError::TransportConnect(_)
                | KnxError::TransportSend(_)
                | KnxError::GatewayUnavailable(_)
        )
    }

    /// Format error for API responses
    pub fn to_api_body(&self) -> serde_json::Value {
        let code = self.to_error_code();
        serde_json::json!({
            "error": {
                "code": code.as_number(),
                "category": code.category(),
                "message": self.to_string(),
                "retryable": self.is_retryable(),
            }
        })
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for KnxError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        KnxError::TransportSend(err.to_string())
    }
}
