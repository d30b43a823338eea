// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use reqwest::Method;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::config::LapiConfig;
use crate::decision::{DecisionKind, NormalizedDecision, Origin};
use crate::error::Result;
use crate::http_client::{Auth, HttpTransport};
use crate::ipv4::is_valid_ipv4_or_cidr;

#[derive(Debug, Deserialize)]
struct RawDecision {
    #[serde(rename = "type")]
    kind: String,
    scope: String,
    value: Option<String>,
    #[serde(default)]
    scenario: Option<String>,
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    simulated: bool,
}

#[derive(Debug, Deserialize, Default)]
struct DecisionsStreamResponse {
    #[serde(default)]
    new: Vec<RawDecision>,
    #[serde(default)]
    deleted: Vec<RawDecision>,
}

#[derive(Debug, Default)]
pub struct DecisionBatch {
    pub new: Vec<NormalizedDecision>,
    pub deleted: Vec<NormalizedDecision>,
    /// Count of raw entries observed, including ones later dropped by
    /// the `type`/`scope`/`simulated`/missing-`ip` filters. Distinct
    /// from `new.len() + deleted.len()` because `lapi_decisions_total`
    /// counts every raw decision, not just retained ones.
    pub raw_count: usize,
}

/// Parses CrowdSec-style durations like `"4h"`, `"4h30m"`, `"90s"`.
/// Unparseable durations are treated as "no TTL" rather than failing
/// the whole decision, since `ttl` is documented as advisory.
fn parse_duration(s: &str) -> Option<Duration> {
    let mut total = Duration::ZERO;
    let mut num = String::new();
    let mut any = false;
    for ch in s.chars() {
        if ch.is_ascii_digit() {
            num.push(ch);
        } else {
            let Ok(n) = num.parse::<u64>() else {
                return None;
            };
            num.clear();
            let unit = match ch {
                'h' => Duration::from_secs(3600),
                'm' => Duration::from_secs(60),
                's' => Duration::from_secs(1),
                _ => return None,
            };
            total += unit * n as u32;
            any = true;
        }
    }
    if any {
        Some(total)
    } else {
        None
    }
}

fn decode(raw: RawDecision, origin: Origin) -> Option<NormalizedDecision> {
    if raw.kind != "ban" || raw.scope != "Ip" || raw.simulated {
        return None;
    }
    let ip = raw.value?;
    // §3 invariant: `ip` must be syntactically valid IPv4 or IPv4/CIDR.
    // `scope == "Ip"` is expected to carry a bare host address, but a
    // malformed upstream value (or a CIDR mislabeled as host scope)
    // must not reach the reconciler.
    if !is_valid_ipv4_or_cidr(&ip) {
        return None;
    }
    Some(NormalizedDecision {
        ip,
        kind: DecisionKind::Ban,
        origin,
        scenario: raw.scenario.unwrap_or_default(),
        ttl: raw.duration.as_deref().and_then(parse_duration),
    })
}

/// LAPI (CrowdSec-style) source adapter: polls the decisions delta
/// stream and sends best-effort heartbeats under a stable machine
/// identity.
pub struct LapiAdapter {
    transport: HttpTransport,
    base_url: String,
    api_key: String,
    machine_id: String,
}

impl LapiAdapter {
    pub fn new(cfg: &LapiConfig) -> Self {
        let machine_id = cfg
            .machine_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self {
            transport: HttpTransport::new(false),
            base_url: cfg.url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            machine_id,
        }
    }

    fn auth(&self) -> Auth {
        Auth::ApiKey {
            header: "X-Api-Key",
            key: self.api_key.clone(),
        }
    }

    /// One round trip against the decisions stream. `startup=true`
    /// requests the full current corpus; otherwise only the delta
    /// since the last poll.
    pub async fn get_decisions(&self, startup: bool) -> Result<DecisionBatch> {
        let url = if startup {
            format!("{}/v1/decisions/stream?startup=true", self.base_url)
        } else {
            format!("{}/v1/decisions/stream", self.base_url)
        };

        let resp: DecisionsStreamResponse = self
            .transport
            .request_json(Method::GET, &url, &self.auth(), None)
            .await?;

        let raw_count = resp.new.len() + resp.deleted.len();
        let new = resp
            .new
            .into_iter()
            .filter_map(|d| decode(d, Origin::Lapi))
            .collect();
        let deleted = resp
            .deleted
            .into_iter()
            .filter_map(|d| decode(d, Origin::Lapi))
            .collect();

        Ok(DecisionBatch {
            new,
            deleted,
            raw_count,
        })
    }

    /// Best-effort heartbeat; failures are warned and swallowed, never
    /// propagated to the caller.
    pub async fn heartbeat(&self) {
        let url = format!("{}/v1/heartbeat", self.base_url);
        let form = [("machine_id", self.machine_id.clone())];
        let result = self
            .transport
            .request_status(Method::POST, &url, &self.auth(), Some(&form))
            .await;
        if let Err(e) = result {
            warn!(error = %e, "lapi heartbeat failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_non_ban_and_non_ip_scope() {
        let ban_ip = RawDecision {
            kind: "ban".to_string(),
            scope: "Ip".to_string(),
            value: Some("203.0.113.5".to_string()),
            scenario: Some("ssh-bf".to_string()),
            duration: Some("4h".to_string()),
            simulated: false,
        };
        assert!(decode(ban_ip, Origin::Lapi).is_some());

        let not_ban = RawDecision {
            kind: "captcha".to_string(),
            scope: "Ip".to_string(),
            value: Some("203.0.113.5".to_string()),
            scenario: None,
            duration: None,
            simulated: false,
        };
        assert!(decode(not_ban, Origin::Lapi).is_none());

        let not_ip_scope = RawDecision {
            kind: "ban".to_string(),
            scope: "Range".to_string(),
            value: Some("203.0.113.0/24".to_string()),
            scenario: None,
            duration: None,
            simulated: false,
        };
        assert!(decode(not_ip_scope, Origin::Lapi).is_none());
    }

    #[test]
    fn drops_simulated_decisions() {
        let simulated = RawDecision {
            kind: "ban".to_string(),
            scope: "Ip".to_string(),
            value: Some("203.0.113.5".to_string()),
            scenario: None,
            duration: None,
            simulated: true,
        };
        assert!(decode(simulated, Origin::Lapi).is_none());
    }

    #[test]
    fn drops_malformed_ip_value() {
        let bogus = RawDecision {
            kind: "ban".to_string(),
            scope: "Ip".to_string(),
            value: Some("not-an-ip".to_string()),
            scenario: None,
            duration: None,
            simulated: false,
        };
        assert!(decode(bogus, Origin::Lapi).is_none());

        let cidr = RawDecision {
            kind: "ban".to_string(),
            scope: "Ip".to_string(),
            value: Some("203.0.113.0/24".to_string()),
            scenario: None,
            duration: None,
            simulated: false,
        };
        assert!(decode(cidr, Origin::Lapi).is_some());
    }

    #[test]
    fn drops_missing_ip() {
        let missing_ip = RawDecision {
            kind: "ban".to_string(),
            scope: "Ip".to_string(),
            value: None,
            scenario: None,
            duration: None,
            simulated: false,
        };
        assert!(decode(missing_ip, Origin::Lapi).is_none());
    }

    #[test]
    fn parses_compound_durations() {
        assert_eq!(parse_duration("4h"), Some(Duration::from_secs(4 * 3600)));
        assert_eq!(
            parse_duration("4h30m"),
            Some(Duration::from_secs(4 * 3600 + 30 * 60))
        );
        assert_eq!(parse_duration("90s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("garbage"), None);
    }
}
