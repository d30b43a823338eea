// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::adapters::lapi::LapiAdapter;
use crate::adapters::siem::SiemAdapter;
use crate::config::Config;
use crate::decision::{DecisionKind, SyncTick, TickTimer};
use crate::error::EngineError;
use crate::metrics::Metrics;
use crate::sinks::cluster::ClusterIpSetSink;
use crate::sinks::local::LocalFilterSink;
use crate::whitelist::Whitelist;

/// Drives the tick cadence described in SPEC_FULL.md §4.6. Owns both
/// adapters (optionally present), both sinks (the cluster sink is
/// mandatory, the local sink optional), the whitelist, and the shared
/// metrics recorder.
pub struct Reconciler {
    config: Arc<Config>,
    metrics: Arc<Metrics>,
    whitelist: Whitelist,

    lapi: Option<LapiAdapter>,
    siem: Option<SiemAdapter>,
    cluster: ClusterIpSetSink,
    local: Option<LocalFilterSink>,

    running: Arc<AtomicBool>,
    tick_count: u64,
    /// True only until the first tick has run; requests the full LAPI
    /// decision corpus (`startup=true`) on that tick, deltas thereafter.
    lapi_startup: bool,
}

impl Reconciler {
    pub fn new(
        config: Arc<Config>,
        metrics: Arc<Metrics>,
        lapi: Option<LapiAdapter>,
        siem: Option<SiemAdapter>,
        cluster: ClusterIpSetSink,
        local: Option<LocalFilterSink>,
        running: Arc<AtomicBool>,
    ) -> Self {
        let whitelist = Whitelist::new(config.whitelist.clone());
        Self {
            config,
            metrics,
            whitelist,
            lapi,
            siem,
            cluster,
            local,
            running,
            tick_count: 0,
            lapi_startup: true,
        }
    }

    /// Startup connectivity checks: the cluster probe is retried with
    /// exponential backoff for up to 30s before being treated as fatal,
    /// since a cold cluster API on the same boot sequence as this
    /// process is a transient condition worth riding out rather than
    /// failing fast on. LAPI heartbeat and SIEM authenticate are
    /// best-effort and not retried.
    pub async fn test_connections(&self) -> Result<(), EngineError> {
        let backoff = backoff::ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        backoff::future::retry(backoff, || async {
            self.cluster
                .test_connection()
                .await
                .map_err(backoff::Error::transient)
        })
        .await?;

        if let Some(lapi) = &self.lapi {
            lapi.heartbeat().await;
        }
        if let Some(siem) = &self.siem {
            siem.authenticate_best_effort().await;
        }
        Ok(())
    }

    /// The 1-second quantum loop: runs a tick whenever the configured
    /// sync interval has elapsed, and exits as soon as `running`
    /// observes false at a quantum boundary.
    pub async fn run(&mut self) {
        let mut last_sync = tokio::time::Instant::now()
            - Duration::from_secs(self.config.sync_interval_seconds);

        while self.running.load(Ordering::SeqCst) {
            let now = tokio::time::Instant::now();
            if now.duration_since(last_sync) >= Duration::from_secs(self.config.sync_interval_seconds)
            {
                self.tick().await;
                last_sync = tokio::time::Instant::now();
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    /// Runs exactly one tick outside the normal cadence loop. Used by
    /// integration tests and available for a future admin "sync now"
    /// trigger.
    pub async fn force_tick(&mut self) {
        self.tick().await;
    }

    async fn tick(&mut self) {
        let timer = TickTimer::start();
        let mut sync = SyncTick::new();

        if let Some(lapi) = &self.lapi {
            let startup = self.lapi_startup;
            match lapi.get_decisions(startup).await {
                Ok(batch) => {
                    self.lapi_startup = false;
                    for _ in 0..batch.raw_count {
                        self.metrics.record_lapi_decision();
                    }
                    for decision in &batch.new {
                        if decision.kind != DecisionKind::Ban {
                            continue;
                        }
                        if self.whitelist.contains(&decision.ip) {
                            continue;
                        }
                        sync.to_ban.push(decision.ip.clone());
                        self.metrics.record_ban();
                    }
                    for decision in &batch.deleted {
                        if self.whitelist.contains(&decision.ip) {
                            continue;
                        }
                        sync.to_unban.push(decision.ip.clone());
                        self.metrics.record_unban();
                    }
                }
                Err(e) => {
                    warn!(error = %e, "lapi poll failed");
                    self.metrics.record_error("lapi");
                    sync.lapi_error = true;
                }
            }
        }

        if let Some(siem) = &self.siem {
            match siem.get_alerts(None, 100).await {
                Ok(alerts) => {
                    let actions = SiemAdapter::to_actions(alerts);
                    for action in &actions {
                        self.metrics.record_siem_alert();
                        match action.kind {
                            DecisionKind::Ban => {
                                if !self.whitelist.contains(&action.ip) {
                                    sync.to_ban.push(action.ip.clone());
                                    self.metrics.record_ban();
                                }
                            }
                            DecisionKind::Allow => {
                                if !self.whitelist.contains(&action.ip) {
                                    sync.to_unban.push(action.ip.clone());
                                    self.metrics.record_unban();
                                }
                            }
                            DecisionKind::Monitor => {
                                info!(ip = %action.ip, "siem monitor-only alert");
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "siem poll failed");
                    self.metrics.record_error("siem");
                    sync.siem_error = true;
                }
            }
        }

        if !sync.to_ban.is_empty() || !sync.to_unban.is_empty() {
            self.metrics.record_cluster_api_call();
            let set_name = self.config.cluster.set_name.clone();
            if let Err(e) = self
                .cluster
                .bulk_update(&set_name, &sync.to_ban, &sync.to_unban)
                .await
            {
                warn!(error = %e, "cluster bulk_update failed");
                self.metrics.record_error("cluster");
            }
        }

        if let Some(local) = &self.local {
            use crate::sinks::EnforcementSink;
            for ip in &sync.to_ban {
                self.metrics.record_local_op();
                if let Err(e) = local.add(ip).await {
                    warn!(%ip, error = %e, "local add failed");
                    self.metrics.record_error("local");
                }
            }
            for ip in &sync.to_unban {
                self.metrics.record_local_op();
                if let Err(e) = local.remove(ip).await {
                    warn!(%ip, error = %e, "local remove failed");
                    self.metrics.record_error("local");
                }
            }

            match local.list().await {
                Ok(members) => self.metrics.update_currently_banned(members.len() as u64),
                Err(e) => warn!(error = %e, "local list failed"),
            }
        }

        if sync.lapi_error || sync.siem_error {
            info!(
                lapi_error = sync.lapi_error,
                siem_error = sync.siem_error,
                "tick completed with a degraded adapter"
            );
        }

        self.metrics.record_sync_duration(timer.elapsed_seconds());

        self.tick_count += 1;
        if self.tick_count % self.config.metrics_summary_every_n_ticks.max(1) == 0 {
            self.metrics.log_summary();
        }
    }
}
