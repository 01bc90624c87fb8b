// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Orphan sweeper.
//!
//! Removes bindings that still reference a subject although its current spec
//! no longer asks for them. Matching is by subject identity and the bindings
//! are compared against the desired `(namespace?, roleRef)` pairs.
//!
//! A `ClusterRoleBinding` is claimed by every subject listed in it. A
//! `RoleBinding` is claimed by a `Group` only when the group is its sole
//! subject, so namespaced bindings shared with other principals are never
//! swept on its behalf. A service account claims every `RoleBinding` it
//! appears in.
//!
//! The sweep is a full scan of every namespace on every call. There is no
//! index; each reconciliation re-reads current state.

use super::bindings::{ignore_not_found, BindingSpec, Subject};
use crate::constants::{KIND_CLUSTER_ROLE_BINDING, KIND_ROLE_BINDING};
use crate::errors::{ItemFailure, ReconcileError};
use crate::metrics;
use crate::store::ClusterStore;
use k8s_openapi::api::rbac::v1 as rbac;
use kube::ResourceExt;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Desired `(namespace?, roleRef name)` pairs of one subject.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DesiredRoleRefs(BTreeSet<(Option<String>, String)>);

impl DesiredRoleRefs {
    /// Collect the pairs of the given binding specs.
    #[must_use]
    pub fn from_specs(specs: &[BindingSpec]) -> Self {
        Self(
            specs
                .iter()
                .map(|s| (s.namespace().map(str::to_string), s.role_ref().name.clone()))
                .collect(),
        )
    }

    /// Keep a cluster-scoped binding to `role_ref` that is not built from the spec.
    pub fn insert_cluster(&mut self, role_ref: impl Into<String>) {
        self.0.insert((None, role_ref.into()));
    }

    #[must_use]
    pub fn contains_cluster(&self, role_ref: &str) -> bool {
        self.0.contains(&(None, role_ref.to_string()))
    }

    #[must_use]
    pub fn contains_namespaced(&self, namespace: &str, role_ref: &str) -> bool {
        self.0
            .contains(&(Some(namespace.to_string()), role_ref.to_string()))
    }
}

/// Result of one sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Removed bindings as `Kind namespace/name`
    pub removed: Vec<String>,
    /// Isolated failures; the sweep carried on past each of them
    pub failures: Vec<ItemFailure>,
}

/// Whether `subject` appears anywhere in a binding's subject list.
pub(crate) fn listed_in(subject: &Subject, subjects: Option<&Vec<rbac::Subject>>) -> bool {
    subjects.is_some_and(|list| list.iter().any(|s| subject.matches(s)))
}

/// Whether `subject` claims a `RoleBinding` with the given subject list.
pub(crate) fn claims(subject: &Subject, subjects: Option<&Vec<rbac::Subject>>) -> bool {
    let subjects = subjects.map(Vec::as_slice).unwrap_or_default();
    match subject {
        Subject::Group { .. } => subjects.len() == 1 && subject.matches(&subjects[0]),
        Subject::ServiceAccount { .. } => subjects.iter().any(|s| subject.matches(s)),
    }
}

/// Delete every binding of `subject` whose role reference is not desired.
///
/// # Errors
///
/// Fails only when the cluster-wide listings of cluster bindings or namespaces
/// fail. Per-namespace listing and per-binding deletion failures are recorded
/// in the report.
pub async fn sweep_orphans(
    store: &dyn ClusterStore,
    subject: &Subject,
    desired: &DesiredRoleRefs,
) -> Result<SweepReport, ReconcileError> {
    let mut report = SweepReport::default();

    let cluster_bindings = store
        .list_cluster_role_bindings()
        .await
        .map_err(|e| ReconcileError::store("list cluster role bindings", e))?;

    for binding in cluster_bindings {
        if !listed_in(subject, binding.subjects.as_ref())
            || desired.contains_cluster(&binding.role_ref.name)
        {
            continue;
        }
        let name = binding.name_any();
        let item = format!("{KIND_CLUSTER_ROLE_BINDING} {name}");
        match ignore_not_found(store.delete_cluster_role_binding(&name).await) {
            Ok(()) => {
                debug!(subject = %subject, binding = %item, "Swept orphan binding");
                metrics::record_resource_deleted(KIND_CLUSTER_ROLE_BINDING);
                report.removed.push(item);
            }
            Err(e) => {
                warn!(subject = %subject, binding = %item, error = %e, "Failed to sweep binding");
                report.failures.push(ItemFailure {
                    item,
                    reason: e.to_string(),
                });
            }
        }
    }

    let namespaces = store
        .list_namespaces()
        .await
        .map_err(|e| ReconcileError::store("list namespaces", e))?;

    for namespace in namespaces.iter().map(ResourceExt::name_any) {
        let bindings = match store.list_role_bindings(&namespace).await {
            Ok(bindings) => bindings,
            Err(e) => {
                warn!(namespace = %namespace, error = %e, "Failed to list role bindings");
                report.failures.push(ItemFailure {
                    item: format!("{KIND_ROLE_BINDING} {namespace}/*"),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        for binding in bindings {
            if !claims(subject, binding.subjects.as_ref())
                || desired.contains_namespaced(&namespace, &binding.role_ref.name)
            {
                continue;
            }
            let name = binding.name_any();
            let item = format!("{KIND_ROLE_BINDING} {namespace}/{name}");
            match ignore_not_found(store.delete_role_binding(&namespace, &name).await) {
                Ok(()) => {
                    debug!(subject = %subject, binding = %item, "Swept orphan binding");
                    metrics::record_resource_deleted(KIND_ROLE_BINDING);
                    report.removed.push(item);
                }
                Err(e) => {
                    warn!(subject = %subject, binding = %item, error = %e, "Failed to sweep binding");
                    report.failures.push(ItemFailure {
                        item,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    if !report.removed.is_empty() {
        info!(subject = %subject, removed = report.removed.len(), "Orphan bindings swept");
    }
    Ok(report)
}

#[cfg(test)]
#[path = "sweeper_tests.rs"]
mod sweeper_tests;
