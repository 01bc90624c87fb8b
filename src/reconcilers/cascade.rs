// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Deletion cascade of a `User` or `Group`.
//!
//! Steps, in order:
//! 1. delete the service account (users only); `NotFound` is success and any
//!    other failure aborts the cascade
//! 2. delete the dedicated namespace (enabled users only, and only when it
//!    carries the user's managed labels)
//! 3. delete every `RoleBinding` in any namespace that lists the subject
//! 4. delete every `ClusterRoleBinding` that lists the subject
//! 5. delete the restricted namespace-visibility `ClusterRole` (users only)
//! 6. delete the originating custom object (groups only)
//!
//! Steps 2 to 6 are best-effort. Their failures are collected and surfaced
//! together, which keeps the finalizer in place until a later pass succeeds.

use super::bindings::{ignore_not_found, Subject};
use super::subject::delete_dedicated_namespace;
use super::sweeper::listed_in;
use crate::constants::{
    KIND_CLUSTER_ROLE, KIND_CLUSTER_ROLE_BINDING, KIND_NAMESPACE, KIND_ROLE_BINDING,
    KIND_SERVICE_ACCOUNT,
};
use crate::errors::{ItemFailure, ReconcileError, StoreError};
use crate::metrics;
use crate::store::{ClusterStore, CustomObjectRef};
use kube::ResourceExt;
use tracing::{info, warn};

/// Everything the cascade removes for one subject.
#[derive(Clone, Debug)]
pub struct CascadeTarget {
    pub subject: Subject,
    /// Namespace named after an enabled user
    pub dedicated_namespace: Option<String>,
    /// Restricted namespace-visibility `ClusterRole` of a user
    pub restricted_cluster_role: Option<String>,
    /// The custom object itself, deleted last
    pub custom_object: Option<CustomObjectRef>,
}

/// Objects removed by a completed cascade, as `Kind namespace/name`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub removed: Vec<String>,
}

struct Steps {
    report: CascadeReport,
    failures: Vec<ItemFailure>,
}

impl Steps {
    fn settle(&mut self, item: String, kind: &str, result: Result<(), StoreError>) {
        match result {
            Ok(()) => {
                metrics::record_resource_deleted(kind);
                self.report.removed.push(item);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                warn!(object = %item, error = %e, "Cascade step failed");
                self.failures.push(ItemFailure {
                    item,
                    reason: e.to_string(),
                });
            }
        }
    }

    fn fail(&mut self, item: String, err: &StoreError) {
        warn!(object = %item, error = %err, "Cascade listing failed");
        self.failures.push(ItemFailure {
            item,
            reason: err.to_string(),
        });
    }
}

/// Run the deletion cascade for `target`.
///
/// # Errors
///
/// - [`ReconcileError::Store`] when the service account cannot be deleted
/// - [`ReconcileError::Partial`] when any best-effort step failed
pub async fn delete_subject(
    store: &dyn ClusterStore,
    target: &CascadeTarget,
) -> Result<CascadeReport, ReconcileError> {
    let subject = &target.subject;
    let mut steps = Steps {
        report: CascadeReport::default(),
        failures: Vec::new(),
    };

    if let Subject::ServiceAccount { name, namespace } = subject {
        match store.delete_service_account(namespace, name).await {
            Ok(()) => {
                metrics::record_resource_deleted(KIND_SERVICE_ACCOUNT);
                steps
                    .report
                    .removed
                    .push(format!("{KIND_SERVICE_ACCOUNT} {namespace}/{name}"));
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(ReconcileError::store("delete service account", e)),
        }
    }

    if let Some(namespace) = &target.dedicated_namespace {
        let item = format!("{KIND_NAMESPACE} {namespace}");
        match delete_dedicated_namespace(store, namespace).await {
            Ok(true) => steps.settle(item, KIND_NAMESPACE, Ok(())),
            Ok(false) => {}
            Err(e) => steps.settle(item, KIND_NAMESPACE, Err(e)),
        }
    }

    match store.list_namespaces().await {
        Ok(namespaces) => {
            for namespace in namespaces.iter().map(ResourceExt::name_any) {
                let bindings = match store.list_role_bindings(&namespace).await {
                    Ok(bindings) => bindings,
                    Err(e) => {
                        steps.fail(format!("{KIND_ROLE_BINDING} {namespace}/*"), &e);
                        continue;
                    }
                };
                for binding in bindings {
                    if !listed_in(subject, binding.subjects.as_ref()) {
                        continue;
                    }
                    let name = binding.name_any();
                    let result = store.delete_role_binding(&namespace, &name).await;
                    steps.settle(
                        format!("{KIND_ROLE_BINDING} {namespace}/{name}"),
                        KIND_ROLE_BINDING,
                        result,
                    );
                }
            }
        }
        Err(e) => steps.fail(format!("{KIND_NAMESPACE} *"), &e),
    }

    match store.list_cluster_role_bindings().await {
        Ok(bindings) => {
            for binding in bindings {
                if !listed_in(subject, binding.subjects.as_ref()) {
                    continue;
                }
                let name = binding.name_any();
                let result = store.delete_cluster_role_binding(&name).await;
                steps.settle(
                    format!("{KIND_CLUSTER_ROLE_BINDING} {name}"),
                    KIND_CLUSTER_ROLE_BINDING,
                    result,
                );
            }
        }
        Err(e) => steps.fail(format!("{KIND_CLUSTER_ROLE_BINDING} *"), &e),
    }

    if let Some(cluster_role) = &target.restricted_cluster_role {
        let result = store.delete_cluster_role(cluster_role).await;
        steps.settle(
            format!("{KIND_CLUSTER_ROLE} {cluster_role}"),
            KIND_CLUSTER_ROLE,
            result,
        );
    }

    if let Some(object) = &target.custom_object {
        if let Err(e) = ignore_not_found(store.delete_custom_object(object).await) {
            steps.fail(
                format!("{} {}/{}", object.kind, object.namespace, object.name),
                &e,
            );
        }
    }

    if steps.failures.is_empty() {
        info!(subject = %subject, removed = steps.report.removed.len(), "Deletion cascade complete");
        Ok(steps.report)
    } else {
        Err(ReconcileError::Partial {
            operation: format!("delete cascade of {subject}"),
            failures: steps.failures,
        })
    }
}

#[cfg(test)]
#[path = "cascade_tests.rs"]
mod cascade_tests;
