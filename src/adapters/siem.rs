// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use tracing::warn;

use crate::config::SiemConfig;
use crate::decision::{DecisionKind, NormalizedDecision, Origin};
use crate::error::{EngineError, Result};
use crate::http_client::{Auth, HttpTransport};

const TOKEN_LIFETIME_SECONDS: i64 = 3600;
const REFRESH_SKEW_SECONDS: i64 = 300;

/// SIEM bearer-token lifecycle. An explicit enum so transitions are
/// the only way to change state, per SPEC_FULL.md §9 ("not an ambient
/// mutable").
#[derive(Debug, Clone)]
enum TokenState {
    Unauthenticated,
    Authenticated {
        token: String,
        expires_at: DateTime<Utc>,
    },
}

#[derive(Debug, Deserialize)]
struct AuthenticateResponse {
    data: AuthenticateData,
}

#[derive(Debug, Deserialize)]
struct AuthenticateData {
    token: String,
}

#[derive(Debug, Deserialize)]
struct AlertsResponse {
    data: AlertsData,
}

#[derive(Debug, Deserialize)]
struct AlertsData {
    affected_items: Vec<Alert>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Alert {
    pub rule: RuleInfo,
    pub data: AlertData,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RuleInfo {
    pub level: u32,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AlertData {
    pub srcip: Option<String>,
}

/// Wazuh-style SIEM source adapter. Holds the token state machine
/// behind a `Mutex` since the reconciler only ever drives one tick at
/// a time, but the type still needs `Send + Sync` to live behind an
/// `Arc` alongside the other components.
pub struct SiemAdapter {
    transport: HttpTransport,
    base_url: String,
    username: String,
    password: String,
    state: Mutex<TokenState>,
}

impl SiemAdapter {
    pub fn new(cfg: &SiemConfig) -> Self {
        Self {
            transport: HttpTransport::new(false),
            base_url: cfg.url.trim_end_matches('/').to_string(),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            state: Mutex::new(TokenState::Unauthenticated),
        }
    }

    /// Best-effort authentication used at startup connectivity checks;
    /// failures are warned and swallowed.
    pub async fn authenticate_best_effort(&self) {
        if let Err(e) = self.authenticate().await {
            warn!(error = %e, "siem authenticate failed");
        }
    }

    async fn authenticate(&self) -> Result<()> {
        let url = format!("{}/security/user/authenticate", self.base_url);
        let auth = Auth::Basic {
            username: self.username.clone(),
            password: self.password.clone(),
        };
        let resp: AuthenticateResponse = self
            .transport
            .request_json(Method::POST, &url, &auth, None)
            .await?;

        let expires_at = Utc::now() + chrono::Duration::seconds(TOKEN_LIFETIME_SECONDS);
        *self.state.lock().unwrap() = TokenState::Authenticated {
            token: resp.data.token,
            expires_at,
        };
        Ok(())
    }

    /// Ensures an authenticated, non-stale token is in place before the
    /// caller issues a request, proactively refreshing if within
    /// `REFRESH_SKEW_SECONDS` of expiry.
    async fn ensure_authenticated(&self) -> Result<String> {
        let needs_refresh = {
            match &*self.state.lock().unwrap() {
                TokenState::Unauthenticated => true,
                TokenState::Authenticated { expires_at, .. } => {
                    Utc::now() >= *expires_at - chrono::Duration::seconds(REFRESH_SKEW_SECONDS)
                }
            }
        };
        if needs_refresh {
            self.authenticate().await?;
        }
        match &*self.state.lock().unwrap() {
            TokenState::Authenticated { token, .. } => Ok(token.clone()),
            TokenState::Unauthenticated => Err(EngineError::AuthFailed),
        }
    }

    /// GET against the alerts endpoint. A 401 forces exactly one
    /// re-authentication and exactly one retry.
    pub async fn get_alerts(&self, since: Option<i64>, limit: u32) -> Result<Vec<Alert>> {
        let token = self.ensure_authenticated().await?;
        match self.get_alerts_with_token(since, limit, &token).await {
            Err(EngineError::AuthFailed) => {
                *self.state.lock().unwrap() = TokenState::Unauthenticated;
                self.authenticate().await?;
                let token = self.ensure_authenticated().await?;
                self.get_alerts_with_token(since, limit, &token).await
            }
            other => other,
        }
    }

    async fn get_alerts_with_token(
        &self,
        since: Option<i64>,
        limit: u32,
        token: &str,
    ) -> Result<Vec<Alert>> {
        let mut url = format!("{}/alerts?pretty=true&limit={}", self.base_url, limit);
        if let Some(ts) = since {
            url.push_str(&format!("&timestamp>={ts}"));
        }
        let auth = Auth::Bearer {
            token: token.to_string(),
        };
        let resp: AlertsResponse = self
            .transport
            .request_json(Method::GET, &url, &auth, None)
            .await?;
        Ok(resp.data.affected_items)
    }

    /// Projects alerts with a non-null `data.srcip` into decisions
    /// whose `kind` is derived purely from `rule.level`.
    pub fn to_actions(alerts: Vec<Alert>) -> Vec<NormalizedDecision> {
        alerts
            .into_iter()
            .filter_map(|alert| {
                let ip = alert.data.srcip?;
                let kind = match alert.rule.level {
                    0..=5 => DecisionKind::Monitor,
                    6..=10 => DecisionKind::Allow,
                    _ => DecisionKind::Ban,
                };
                Some(NormalizedDecision {
                    ip,
                    kind,
                    origin: Origin::Siem,
                    scenario: format!("rule level {}", alert.rule.level),
                    ttl: None,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(level: u32, ip: Option<&str>) -> Alert {
        Alert {
            rule: RuleInfo { level },
            data: AlertData {
                srcip: ip.map(|s| s.to_string()),
            },
        }
    }

    #[test]
    fn level_boundary_mapping() {
        let decisions = SiemAdapter::to_actions(vec![
            alert(5, Some("192.0.2.1")),
            alert(6, Some("192.0.2.2")),
            alert(10, Some("192.0.2.3")),
            alert(11, Some("192.0.2.4")),
            alert(16, Some("192.0.2.5")),
        ]);
        assert_eq!(decisions[0].kind, DecisionKind::Monitor);
        assert_eq!(decisions[1].kind, DecisionKind::Allow);
        assert_eq!(decisions[2].kind, DecisionKind::Allow);
        assert_eq!(decisions[3].kind, DecisionKind::Ban);
        assert_eq!(decisions[4].kind, DecisionKind::Ban);
    }

    #[test]
    fn drops_alerts_without_srcip() {
        let decisions = SiemAdapter::to_actions(vec![alert(11, None)]);
        assert!(decisions.is_empty());
    }
}
