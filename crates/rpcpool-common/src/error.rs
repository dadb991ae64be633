// Copyright 2025 rpcpool Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by the pool and by base clients.
///
/// Base clients report what went wrong on the wire (`Http`, `Rpc`, `Transport`,
/// ...). The pool itself only ever synthesizes `Timeout`, `NoEndpointAvailable`
/// and `InvalidConfig`; everything else is passed through untouched so callers
/// see the error the endpoint actually produced.
#[derive(Error, Debug)]
pub enum PoolError {
    /// Non-success HTTP status returned by an endpoint
    #[error("HTTP error {status}: {message}")]
    Http {
        status: u16,
        message: String,
        /// Parsed `Retry-After` header, if the endpoint sent one
        retry_after: Option<Duration>,
    },

    /// JSON-RPC error object returned by an endpoint
    #[error("JSON-RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("No endpoint available")]
    NoEndpointAvailable,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PoolError {
    /// HTTP status carried by the error, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// JSON-RPC error code carried by the error, if any.
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Provider-supplied retry delay, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Whether this is the pool's own timeout marker.
    pub fn is_timeout_marker(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, PoolError>;
