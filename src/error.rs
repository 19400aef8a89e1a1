// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the simulator.
//!
//! This module provides the error hierarchy used across the crate:
//! value validation, broker communication, and message parsing.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred during value validation.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// Error occurred during broker communication.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error occurred while parsing a message.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Runtime is not in a state that allows the requested operation.
    #[error("runtime is {0}, operation not allowed")]
    InvalidRunState(&'static str),
}

/// Errors related to value validation and constraints.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// An invalid power state string was provided.
    #[error("invalid power state: {0}")]
    InvalidPowerState(String),

    /// A status level outside the supported range (0-12).
    #[error("status level {0} is out of range [0, 12]")]
    InvalidStatusLevel(String),

    /// An unknown text command was received on the command endpoint.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// No power profile exists under the given name.
    #[error("unknown power profile: {0}")]
    UnknownProfile(String),
}

/// Errors related to broker communication.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// MQTT request could not be queued or sent.
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Connection to the broker failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection retries were exhausted without success.
    #[error("broker unreachable after {attempts} attempts")]
    RetriesExhausted {
        /// Number of connection attempts made.
        attempts: u32,
    },

    /// Request timed out.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// Client is not connected to the broker.
    #[error("not connected to broker")]
    NotConnected,

    /// Internal channel was closed.
    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

/// Errors related to parsing inbound messages.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Topic does not match any known channel layout.
    #[error("unrecognized topic: {0}")]
    UnknownTopic(String),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_error_display() {
        let err = ValueError::InvalidStatusLevel("13".to_string());
        assert_eq!(err.to_string(), "status level 13 is out of range [0, 12]");
    }

    #[test]
    fn error_from_value_error() {
        let value_err = ValueError::InvalidPowerState("maybe".to_string());
        let err: Error = value_err.into();
        assert!(matches!(err, Error::Value(ValueError::InvalidPowerState(_))));
    }

    #[test]
    fn retries_exhausted_display() {
        let err = ProtocolError::RetriesExhausted { attempts: 10 };
        assert_eq!(err.to_string(), "broker unreachable after 10 attempts");
    }
}
