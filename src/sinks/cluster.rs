// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::ClusterConfig;
use crate::error::{EngineError, Result};
use crate::http_client::{minimal_url_encode, Auth, HttpTransport};
use crate::sinks::EnforcementSink;

const CREATE_COMMENT: &str = "managed by banwarden";

#[derive(Debug, Clone, Deserialize)]
pub struct IpSetEntry {
    pub cidr: String,
    #[serde(default)]
    pub nomatch: bool,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IpSetEntriesResponse {
    data: Vec<IpSetEntry>,
}

/// Proxmox-style cluster firewall IPSet sink. Asserts membership
/// through an HTTPS form-encoded control plane, token-authenticated,
/// lazily creating the named set on first access.
pub struct ClusterIpSetSink {
    transport: HttpTransport,
    base_url: String,
    set_name: String,
    auth: Auth,
}

impl ClusterIpSetSink {
    pub fn new(cfg: &ClusterConfig) -> Self {
        Self {
            transport: HttpTransport::new(cfg.insecure_skip_verify),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            set_name: cfg.set_name.clone(),
            auth: Auth::ProxmoxToken {
                token_id: cfg.token_id.clone(),
                token_secret: cfg.token_secret.clone(),
            },
        }
    }

    /// Startup connectivity probe: `GET {base}/version` must answer
    /// 2xx. Failure here is fatal at startup per SPEC_FULL.md §4.6.
    pub async fn test_connection(&self) -> Result<()> {
        let url = format!("{}/version", self.base_url);
        let status = self
            .transport
            .request_status(Method::GET, &url, &self.auth, None)
            .await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(EngineError::ApiError {
                status: status.as_u16(),
                body: "version probe failed".to_string(),
            })
        }
    }

    /// Returns current membership of the named set, lazily creating it
    /// (and returning an empty list) if it doesn't exist yet.
    pub async fn get_set(&self, name: &str) -> Result<Vec<IpSetEntry>> {
        let url = format!("{}/cluster/firewall/ipset/{}", self.base_url, name);
        let status = self
            .transport
            .request_status(Method::GET, &url, &self.auth, None)
            .await?;

        if status == StatusCode::NOT_FOUND {
            self.create_set(name).await?;
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(EngineError::ApiError {
                status: status.as_u16(),
                body: "get_set failed".to_string(),
            });
        }

        let resp: IpSetEntriesResponse = self
            .transport
            .request_json(Method::GET, &url, &self.auth, None)
            .await?;
        Ok(resp.data)
    }

    async fn create_set(&self, name: &str) -> Result<()> {
        let url = format!("{}/cluster/firewall/ipset", self.base_url);
        let form = [
            ("name", name.to_string()),
            ("comment", CREATE_COMMENT.to_string()),
        ];
        let status = self
            .transport
            .request_status(Method::POST, &url, &self.auth, Some(&form))
            .await?;
        if status.is_success() || status == StatusCode::UNPROCESSABLE_ENTITY {
            // 422 here means "already exists" in the creation path too.
            Ok(())
        } else {
            Err(EngineError::ApiError {
                status: status.as_u16(),
                body: "ipset creation failed".to_string(),
            })
        }
    }

    pub async fn add(&self, name: &str, ip: &str, comment: Option<&str>) -> Result<()> {
        let url = format!("{}/cluster/firewall/ipset/{}", self.base_url, name);
        let mut form = vec![("cidr", ip.to_string())];
        if let Some(c) = comment {
            form.push(("comment", c.to_string()));
        }
        let status = self
            .transport
            .request_status(Method::POST, &url, &self.auth, Some(&form))
            .await?;

        match status {
            s if s.is_success() => Ok(()),
            StatusCode::UNPROCESSABLE_ENTITY => Ok(()), // duplicate, coalesced
            StatusCode::UNAUTHORIZED => Err(EngineError::AuthFailed),
            other => Err(EngineError::ApiError {
                status: other.as_u16(),
                body: "ipset add failed".to_string(),
            }),
        }
    }

    pub async fn remove(&self, name: &str, ip: &str) -> Result<()> {
        let url = format!(
            "{}/cluster/firewall/ipset/{}/{}",
            self.base_url,
            name,
            minimal_url_encode(ip)
        );
        let status = self
            .transport
            .request_status(Method::DELETE, &url, &self.auth, None)
            .await?;

        match status {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()), // absent, coalesced
            StatusCode::UNAUTHORIZED => Err(EngineError::AuthFailed),
            other => Err(EngineError::ApiError {
                status: other.as_u16(),
                body: "ipset remove failed".to_string(),
            }),
        }
    }

    /// Removes then adds, per-IP, each wrapped in its own
    /// try/log-continue so one failing IP never aborts the batch.
    /// Emits a single summary log line with the two counts.
    pub async fn bulk_update(&self, name: &str, adds: &[String], removes: &[String]) -> Result<()> {
        let mut removed = 0usize;
        let mut added = 0usize;

        for ip in removes {
            match self.remove(name, ip).await {
                Ok(()) => removed += 1,
                Err(e @ EngineError::AuthFailed) => return Err(e),
                Err(e) => warn!(%ip, error = %e, "cluster remove failed"),
            }
        }
        for ip in adds {
            match self.add(name, ip, None).await {
                Ok(()) => added += 1,
                Err(e @ EngineError::AuthFailed) => return Err(e),
                Err(e) => warn!(%ip, error = %e, "cluster add failed"),
            }
        }

        info!(added, removed, "cluster bulk_update complete");
        Ok(())
    }
}

#[async_trait]
impl EnforcementSink for ClusterIpSetSink {
    async fn add(&self, ip: &str) -> Result<()> {
        let name = self.set_name.clone();
        ClusterIpSetSink::add(self, &name, ip, None).await
    }

    async fn remove(&self, ip: &str) -> Result<()> {
        let name = self.set_name.clone();
        ClusterIpSetSink::remove(self, &name, ip).await
    }

    async fn list(&self) -> Result<Vec<String>> {
        let name = self.set_name.clone();
        let entries = self.get_set(&name).await?;
        Ok(entries.into_iter().map(|e| e.cidr).collect())
    }
}
