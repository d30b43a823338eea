// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Errors raised while talking to an upstream source (LAPI, SIEM) or a
/// downstream enforcement plane (cluster IPSet, local packet filter).
///
/// Every call site that can fail maps to exactly one variant here; the
/// reconciler matches on the variant to decide whether to retry, warn,
/// or treat the adapter/sink as unavailable for the current tick.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("authentication failed")]
    AuthFailed,

    #[error("api error: status {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("local filter subsystem error: {0}")]
    Subsystem(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
