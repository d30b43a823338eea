// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

pub mod adapters;
pub mod config;
pub mod decision;
pub mod error;
pub mod http_client;
pub mod ipv4;
pub mod metrics;
pub mod metrics_server;
pub mod reconciler;
pub mod sinks;
pub mod whitelist;
