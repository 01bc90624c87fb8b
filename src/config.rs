// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Runtime configuration of the operator binary.
//!
//! Every option can be given as a flag or through its environment variable.

use crate::constants::{
    DEFAULT_HEALTH_ADDR, ERROR_REQUEUE_DURATION_SECS, NAMESPACE_READY_MAX_RETRIES,
    NAMESPACE_READY_RETRY_DELAY_SECS, REQUEUE_WHEN_READY_SECS,
};
use crate::reconcilers::retry::ReadinessRetry;
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::time::Duration;

/// Output format of the log subscriber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Parser)]
#[command(name = "k8s-iam-operator", version, about)]
pub struct OperatorConfig {
    /// Bind address of the health and metrics endpoint
    #[arg(long, env = "HEALTH_ADDR", default_value = DEFAULT_HEALTH_ADDR)]
    pub health_addr: SocketAddr,

    /// Log output format
    #[arg(long, env = "RUST_LOG_FORMAT", value_enum, ignore_case = true, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Retries of the namespace readiness check before a Role upsert aborts
    #[arg(long, env = "NAMESPACE_RETRIES", default_value_t = NAMESPACE_READY_MAX_RETRIES)]
    pub namespace_retries: u32,

    /// Delay between namespace readiness checks, in seconds
    #[arg(long, env = "NAMESPACE_RETRY_DELAY_SECS", default_value_t = NAMESPACE_READY_RETRY_DELAY_SECS)]
    pub namespace_retry_delay_secs: u64,

    /// Requeue interval after a successful reconciliation, in seconds
    #[arg(long, env = "REQUEUE_SECS", default_value_t = REQUEUE_WHEN_READY_SECS)]
    pub requeue_secs: u64,

    /// Requeue interval after a failed reconciliation, in seconds
    #[arg(long, env = "ERROR_REQUEUE_SECS", default_value_t = ERROR_REQUEUE_DURATION_SECS)]
    pub error_requeue_secs: u64,
}

impl OperatorConfig {
    #[must_use]
    pub fn readiness(&self) -> ReadinessRetry {
        ReadinessRetry {
            max_retries: self.namespace_retries,
            delay: Duration::from_secs(self.namespace_retry_delay_secs),
        }
    }

    #[must_use]
    pub fn requeue(&self) -> Duration {
        Duration::from_secs(self.requeue_secs)
    }

    #[must_use]
    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
