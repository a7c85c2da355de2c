//! Error types for the farm.
//!
//! [`ErrorCode`] is the machine-readable taxonomy carried by every error
//! envelope. The integer values are part of the wire format and must not be
//! renumbered.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Error codes emitted in the `code` field of an error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The backend failed, or the request could not be read.
    UnexpectedError,
    InvalidShepardId,
    InvalidShepardQuery,
    InvalidBehbbleId,
    NoQueryProvided,
    /// Reserved for backends; the dispatcher never emits it on its own.
    ShepardNotFound,
    ReachedCapacity,
    /// Fallback for backend rejections that carry no code of their own.
    CustomError,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 8] = [
        ErrorCode::UnexpectedError,
        ErrorCode::InvalidShepardId,
        ErrorCode::InvalidShepardQuery,
        ErrorCode::InvalidBehbbleId,
        ErrorCode::NoQueryProvided,
        ErrorCode::ShepardNotFound,
        ErrorCode::ReachedCapacity,
        ErrorCode::CustomError,
    ];

    /// Wire value of the code.
    pub fn as_u8(self) -> u8 {
        match self {
            ErrorCode::UnexpectedError => 1,
            ErrorCode::InvalidShepardId => 2,
            ErrorCode::InvalidShepardQuery => 3,
            ErrorCode::InvalidBehbbleId => 4,
            ErrorCode::NoQueryProvided => 5,
            ErrorCode::ShepardNotFound => 6,
            ErrorCode::ReachedCapacity => 7,
            ErrorCode::CustomError => 8,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.as_u8() == value)
    }

    /// Symbolic name, e.g. `"INVALID_SHEPARD_ID"`.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::UnexpectedError => "UNEXPECTED_ERROR",
            ErrorCode::InvalidShepardId => "INVALID_SHEPARD_ID",
            ErrorCode::InvalidShepardQuery => "INVALID_SHEPARD_QUERY",
            ErrorCode::InvalidBehbbleId => "INVALID_BEHBBLE_ID",
            ErrorCode::NoQueryProvided => "NO_QUERY_PROVIDED",
            ErrorCode::ShepardNotFound => "SHEPARD_NOT_FOUND",
            ErrorCode::ReachedCapacity => "REACHED_CAPACITY",
            ErrorCode::CustomError => "CUSTOM_ERROR",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.as_str() == name)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CodeVisitor;

        impl Visitor<'_> for CodeVisitor {
            type Value = ErrorCode;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an error code number or name")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<ErrorCode, E> {
                u8::try_from(value)
                    .ok()
                    .and_then(ErrorCode::from_u8)
                    .ok_or_else(|| E::custom(format!("unknown error code {value}")))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<ErrorCode, E> {
                u64::try_from(value)
                    .map_err(|_| E::custom(format!("unknown error code {value}")))
                    .and_then(|v| self.visit_u64(v))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<ErrorCode, E> {
                ErrorCode::from_name(value)
                    .ok_or_else(|| E::custom(format!("unknown error code {value:?}")))
            }
        }

        deserializer.deserialize_any(CodeVisitor)
    }
}

/// Errors raised while starting or running the farm itself.
#[derive(Debug, Error)]
pub enum FarmError {
    #[error("Invalid bind address {addr}: {source}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("Invalid upstream farm: {0:#}")]
    Upstream(anyhow::Error),

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}
