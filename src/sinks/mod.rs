// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

pub mod cluster;
pub mod local;

use async_trait::async_trait;

use crate::error::Result;

/// Common shape shared by both enforcement planes, so the reconciler
/// and its tests can address either sink through one narrow trait
/// instead of depending on either concrete type.
#[async_trait]
pub trait EnforcementSink: Send + Sync {
    async fn add(&self, ip: &str) -> Result<()>;
    async fn remove(&self, ip: &str) -> Result<()>;
    async fn list(&self) -> Result<Vec<String>>;
}
