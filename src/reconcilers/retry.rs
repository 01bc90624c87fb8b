// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Bounded namespace readiness retry.
//!
//! The only wait the reconcilers perform on their own. A namespace created a
//! moment ago may not be visible yet, so the read is repeated a fixed number of
//! times with a fixed delay before the operation is abandoned. Anything other
//! than `NotFound` fails immediately.

use crate::constants::{NAMESPACE_READY_MAX_RETRIES, NAMESPACE_READY_RETRY_DELAY_SECS};
use crate::errors::ReconcileError;
use crate::metrics;
use crate::store::ClusterStore;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Fixed-delay retry policy for namespace readiness.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadinessRetry {
    /// Re-reads after the first attempt
    pub max_retries: u32,
    /// Delay before each re-read
    pub delay: Duration,
}

impl Default for ReadinessRetry {
    fn default() -> Self {
        Self {
            max_retries: NAMESPACE_READY_MAX_RETRIES,
            delay: Duration::from_secs(NAMESPACE_READY_RETRY_DELAY_SECS),
        }
    }
}

impl ReadinessRetry {
    /// Total number of reads, the first one included.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Wait until `namespace` is visible in the store.
///
/// With the default policy this reads at most three times, sleeping 5 seconds
/// between reads.
///
/// # Errors
///
/// - [`ReconcileError::NamespaceNotReady`] when every read returned `NotFound`
/// - [`ReconcileError::Store`] on the first non-`NotFound` failure
pub async fn wait_for_namespace(
    store: &dyn ClusterStore,
    namespace: &str,
    policy: ReadinessRetry,
) -> Result<(), ReconcileError> {
    let attempts = policy.attempts();

    for attempt in 1..=attempts {
        match store.get_namespace(namespace).await {
            Ok(_) => {
                if attempt > 1 {
                    metrics::record_namespace_readiness("ready");
                }
                debug!(namespace = %namespace, attempt, "Namespace is ready");
                return Ok(());
            }
            Err(e) if e.is_not_found() => {
                if attempt < attempts {
                    warn!(
                        namespace = %namespace,
                        attempt,
                        retry_after = ?policy.delay,
                        "Namespace not found yet, will retry"
                    );
                    metrics::record_namespace_readiness("retry");
                    tokio::time::sleep(policy.delay).await;
                }
            }
            Err(e) => {
                error!(namespace = %namespace, error = %e, "Namespace readiness check failed");
                return Err(ReconcileError::store("read namespace", e));
            }
        }
    }

    error!(namespace = %namespace, attempts, "Namespace did not become ready, giving up");
    metrics::record_namespace_readiness("exhausted");
    Err(ReconcileError::NamespaceNotReady {
        namespace: namespace.to_string(),
        attempts,
    })
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
