//! Error types for Evflow.
//!
//! All errors in Evflow are represented by the `EvflowError` enum,
//! which provides specific variants for different error categories.
//! Store failures keep their own [`StoreError`] so callers can branch on
//! `EtagMismatch` and `NotFound` without string matching.

use std::{io::ErrorKind, string::FromUtf8Error};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

/// Unified error type for all Evflow operations.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum EvflowError {
    /// Engine-level errors (startup, shutdown, configuration).
    #[error("{0}")]
    Engine(String),

    /// Configuration parsing or validation errors.
    #[error("{0}")]
    Config(String),

    /// Data conversion errors (serialization, payload typing).
    #[error("{0}")]
    Convert(String),

    /// Runtime execution errors.
    #[error("{0}")]
    Runtime(String),

    /// Storage operation errors.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Workflow definition errors.
    #[error("{0}")]
    Workflow(String),

    /// Errors raised by user activity code.
    #[error("{0}")]
    Activity(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),

    /// Message queue errors.
    #[error("{0}")]
    Queue(String),
}

impl EvflowError {
    /// Returns the store error when this error came from the store layer.
    pub fn as_store(&self) -> Option<&StoreError> {
        match self {
            EvflowError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EvflowError> for String {
    fn from(val: EvflowError) -> Self {
        val.to_string()
    }
}

impl From<std::io::Error> for EvflowError {
    fn from(error: std::io::Error) -> Self {
        EvflowError::IoError(error.to_string())
    }
}

impl From<EvflowError> for std::io::Error {
    fn from(val: EvflowError) -> Self {
        #[allow(clippy::io_other_error)]
        std::io::Error::new(ErrorKind::Other, val.to_string())
    }
}

impl From<FromUtf8Error> for EvflowError {
    fn from(_: FromUtf8Error) -> Self {
        EvflowError::Convert("Error with utf-8 string convert".to_string())
    }
}

impl From<serde_json::Error> for EvflowError {
    fn from(error: serde_json::Error) -> Self {
        EvflowError::Convert(error.to_string())
    }
}

impl From<toml::de::Error> for EvflowError {
    fn from(error: toml::de::Error) -> Self {
        EvflowError::Config(error.to_string())
    }
}
