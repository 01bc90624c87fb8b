// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the IAM operator.
//!
//! This module provides the error taxonomy shared by every reconciler:
//! - [`StoreError`] - outcome of a single call against the cluster object store
//! - [`ReconcileError`] - outcome of a handler invocation, surfaced to the dispatcher
//!
//! `NotFound` and `Conflict` are expected outcomes that drive create-vs-patch
//! branching and idempotent deletes. Transient readiness failures are the only
//! condition the core itself retries, and only for a bounded number of attempts.

use thiserror::Error;

/// Outcome of a failed call against the cluster object store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The object does not exist (HTTP 404)
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Kind of the object, e.g. `RoleBinding`
        kind: String,
        /// Name (`namespace/name` for namespaced objects)
        name: String,
    },

    /// The object already exists or was modified concurrently (HTTP 409)
    #[error("{kind} '{name}' already exists or was modified concurrently")]
    Conflict {
        /// Kind of the object
        kind: String,
        /// Name (`namespace/name` for namespaced objects)
        name: String,
    },

    /// Any other failure, carrying the full detail for logging
    #[error("{kind} '{name}': {detail}")]
    Other {
        /// Kind of the object
        kind: String,
        /// Name (`namespace/name` for namespaced objects)
        name: String,
        /// Error detail as reported by the API server or transport
        detail: String,
    },
}

impl StoreError {
    /// Shorthand for a `NotFound` outcome.
    pub fn not_found(kind: &str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            name: name.into(),
        }
    }

    /// Shorthand for a `Conflict` outcome.
    pub fn conflict(kind: &str, name: impl Into<String>) -> Self {
        Self::Conflict {
            kind: kind.to_string(),
            name: name.into(),
        }
    }

    /// Shorthand for an `Other` outcome.
    pub fn other(kind: &str, name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Other {
            kind: kind.to_string(),
            name: name.into(),
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Short label used for the `error_type` metric dimension.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::Other { .. } => "other",
        }
    }
}

/// Result alias for store calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// One isolated failure recorded while iterating over bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// Identifier of the item, e.g. `RoleBinding team-a/alice-team-a-view`
    pub item: String,
    /// Failure description
    pub reason: String,
}

impl std::fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.item, self.reason)
    }
}

/// Error surfaced by a handler invocation to the event dispatcher.
#[derive(Error, Debug, Clone)]
pub enum ReconcileError {
    /// A gating store call failed; the remaining steps of the handler were skipped
    #[error("{operation} failed: {source}")]
    Store {
        /// What the handler was doing
        operation: String,
        /// Underlying store outcome
        source: StoreError,
    },

    /// A namespace did not become visible within the bounded readiness retry
    #[error("namespace '{namespace}' not ready after {attempts} attempts")]
    NamespaceNotReady {
        /// Namespace that was waited for
        namespace: String,
        /// Number of reads performed
        attempts: u32,
    },

    /// The service-account token has not been populated yet
    #[error("token of secret '{secret}' is not populated yet")]
    TokenNotReady {
        /// `namespace/name` of the token secret
        secret: String,
    },

    /// Some isolated item operations failed while the rest were applied
    #[error("{operation}: {} item(s) failed: {}", failures.len(), join_failures(failures))]
    Partial {
        /// Which pass produced the failures
        operation: String,
        /// Every recorded failure
        failures: Vec<ItemFailure>,
    },

    /// The custom object cannot be reconciled as given
    #[error("invalid resource: {0}")]
    InvalidResource(String),

    /// Building the derived credential bundle failed
    #[error("failed to serialize credential bundle: {0}")]
    Serialization(String),
}

impl ReconcileError {
    /// Wrap a gating store failure.
    pub fn store(operation: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            operation: operation.into(),
            source,
        }
    }

    /// Whether the failure is a readiness condition expected to clear on its own.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NamespaceNotReady { .. } | Self::TokenNotReady { .. }
        )
    }

    /// Short label used for the `error_type` metric dimension.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Store { source, .. } => source.error_type(),
            Self::NamespaceNotReady { .. } | Self::TokenNotReady { .. } => "transient_unready",
            Self::Partial { .. } => "partial",
            Self::InvalidResource(_) => "invalid_resource",
            Self::Serialization(_) => "serialization",
        }
    }
}

fn join_failures(failures: &[ItemFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
