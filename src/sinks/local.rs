// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::LocalConfig;
use crate::error::{EngineError, Result};
use crate::ipv4::is_valid_ipv4_host;
use crate::sinks::EnforcementSink;

const IDEMPOTENCY_MARKERS: [&str; 2] = ["Object exists", "No such file or directory"];

/// Host-local packet-filter sink, asserting a named IPv4 set inside a
/// named table, referenced by a drop rule in a named chain, via
/// subprocess invocations of an `nft`-compatible binary.
///
/// Stateless across calls: every method shells out fresh. Subprocess
/// invocation goes through `tokio::process::Command` so a slow `nft`
/// call doesn't block the reconciler's other suspension points.
pub struct LocalFilterSink {
    table: String,
    chain: String,
    set_name: String,
    family: String,
    nft_binary: String,
}

impl LocalFilterSink {
    /// Ensures (create-if-missing) that the table, set, and drop rule
    /// exist. Re-asserting an existing object is not an error: the
    /// idempotency markers cover that.
    pub async fn new(cfg: &LocalConfig) -> Result<Self> {
        let sink = Self {
            table: cfg.table.clone(),
            chain: cfg.chain.clone(),
            set_name: cfg.set_name.clone(),
            family: cfg.family.clone(),
            nft_binary: "nft".to_string(),
        };
        sink.init().await?;
        Ok(sink)
    }

    async fn init(&self) -> Result<()> {
        self.run_coalescing(&[
            "add",
            "table",
            &self.family,
            &self.table,
        ])
        .await?;

        self.run_coalescing(&[
            "add",
            "set",
            &self.family,
            &self.table,
            &self.set_name,
            "{ type ipv4_addr; flags interval; }",
        ])
        .await?;

        self.run_coalescing(&[
            "add",
            "rule",
            &self.family,
            &self.table,
            &self.chain,
            &format!("ip saddr @{} drop", self.set_name),
        ])
        .await?;

        Ok(())
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output> {
        let owned_args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        debug!(args = ?owned_args, "nft invocation");
        Command::new(&self.nft_binary)
            .args(&owned_args)
            .output()
            .await
            .map_err(|e| EngineError::Subsystem(format!("failed to spawn nft: {e}")))
    }

    /// Runs `args`, coalescing the two documented idempotency markers
    /// found in stderr into success.
    async fn run_coalescing(&self, args: &[&str]) -> Result<()> {
        let output = self.run(args).await?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if IDEMPOTENCY_MARKERS.iter().any(|m| stderr.contains(m)) {
            return Ok(());
        }
        Err(EngineError::Subsystem(format!(
            "nft {:?} failed: {}",
            args, stderr
        )))
    }
}

#[async_trait]
impl EnforcementSink for LocalFilterSink {
    async fn add(&self, ip: &str) -> Result<()> {
        if !is_valid_ipv4_host(ip) {
            return Err(EngineError::InvalidInput(format!(
                "not a valid IPv4 host address: {ip}"
            )));
        }
        let element = format!("{{ {ip} }}");
        self.run_coalescing(&[
            "add",
            "element",
            &self.family,
            &self.table,
            &self.set_name,
            &element,
        ])
        .await
    }

    async fn remove(&self, ip: &str) -> Result<()> {
        if !is_valid_ipv4_host(ip) {
            return Err(EngineError::InvalidInput(format!(
                "not a valid IPv4 host address: {ip}"
            )));
        }
        let element = format!("{{ {ip} }}");
        self.run_coalescing(&[
            "delete",
            "element",
            &self.family,
            &self.table,
            &self.set_name,
            &element,
        ])
        .await
    }

    async fn list(&self) -> Result<Vec<String>> {
        let output = self
            .run(&["list", "set", &self.family, &self.table, &self.set_name])
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(%stderr, "nft list set failed");
            return Ok(Vec::new());
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_elements(&stdout))
    }
}

impl LocalFilterSink {
    /// Administrative flush of the full set, not used by the
    /// reconciler's per-tick path.
    pub async fn flush(&self) -> Result<()> {
        self.run_coalescing(&["flush", "set", &self.family, &self.table, &self.set_name])
            .await
    }
}

static ELEMENTS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"elements\s*=\s*\{([^}]*)\}").unwrap());

/// Parses the `elements = { a, b, c }` line out of `nft list set`
/// output. Tolerant of interval-flagged sets printing ranges and of
/// `nft`'s pretty-printer wrapping the element list across lines;
/// those are returned verbatim as list members.
fn parse_elements(stdout: &str) -> Vec<String> {
    let Some(caps) = ELEMENTS_RE.captures(stdout) else {
        return Vec::new();
    };
    caps[1]
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_element_list() {
        let stdout = "table ip filter {\n\tset blacklist {\n\t\ttype ipv4_addr\n\t\tflags interval\n\t\telements = { 203.0.113.5, 198.51.100.9 }\n\t}\n}\n";
        let elems = parse_elements(stdout);
        assert_eq!(elems, vec!["203.0.113.5", "198.51.100.9"]);
    }

    #[test]
    fn empty_set_has_no_elements_line() {
        let stdout = "table ip filter {\n\tset blacklist {\n\t\ttype ipv4_addr\n\t}\n}\n";
        assert!(parse_elements(stdout).is_empty());
    }

    #[test]
    fn parses_elements_wrapped_across_lines() {
        let stdout = "table ip filter {\n\tset blacklist {\n\t\ttype ipv4_addr\n\t\tflags interval\n\t\telements = { 203.0.113.5,\n\t\t             198.51.100.9 }\n\t}\n}\n";
        let elems = parse_elements(stdout);
        assert_eq!(elems, vec!["203.0.113.5", "198.51.100.9"]);
    }
}
