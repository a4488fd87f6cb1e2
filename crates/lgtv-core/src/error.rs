//! Core error types for lgtv-bridge

use lgtv_protocol::{CorrelationId, ProtocolError};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type delivered to callers and observers
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// No response arrived in time
    #[error("Request {id} timed out after {after:?}")]
    Timeout { id: CorrelationId, after: Duration },

    /// Pairing error
    #[error("Pairing error: {0}")]
    Pairing(#[from] PairingError),

    /// Credential storage error outside of pairing
    #[error("Credential storage error: {0}")]
    Storage(#[from] StorageError),

    /// Device answered with an error envelope
    #[error("Device error: {message}")]
    Device { message: String },

    /// Call was dropped by `disconnect()` or client shutdown
    #[error("Client disconnected")]
    Disconnected,
}

/// Transport-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Dial failed
    #[error("Failed to connect to {url}: {message}")]
    Dial { url: String, message: String },

    /// Mid-session socket error
    #[error("Socket error: {0}")]
    Socket(String),

    /// Connection already closed
    #[error("Connection closed")]
    Closed,
}

/// Pairing-related errors
#[derive(Error, Debug, Clone)]
pub enum PairingError {
    /// Device rejected the registration manifest
    #[error("Registration rejected: {0}")]
    Rejected(String),

    /// Client key could not be read
    #[error("Failed to read client key: {0}")]
    Storage(#[from] StorageError),
}

/// Credential-storage errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Backend could not be reached
    #[error("Credential store unavailable: {0}")]
    Unavailable(String),

    /// Backend answered with a non-success status
    #[error("Credential store returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Backend answer could not be interpreted
    #[error("Invalid credential store response: {0}")]
    InvalidResponse(String),

    /// Local I/O failure
    #[error("Credential file error at {path}: {message}")]
    Io { path: PathBuf, message: String },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

}
