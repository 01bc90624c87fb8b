// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `Role` and `ClusterRole` custom resources.
//!
//! Both are mirrored into the native RBAC object of the same name with an
//! idempotent upsert: read, patch when found, create on `NotFound`. A `Role`
//! first waits for its namespace with the bounded readiness retry and is not
//! created at all when the namespace never shows up.

use super::object_identity;
use super::retry::{wait_for_namespace, ReadinessRetry};
use crate::constants::{KIND_CLUSTER_ROLE, KIND_ROLE};
use crate::crd::{IamClusterRole, IamRole};
use crate::errors::{ReconcileError, StoreError};
use crate::labels::{managed_labels, MANAGED_BY_CLUSTER_ROLE, MANAGED_BY_ROLE};
use crate::metrics;
use crate::store::ClusterStore;
use k8s_openapi::api::rbac::v1::{ClusterRole, Role};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use tracing::{debug, info};

/// Whether an upsert created or patched the object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Patched,
}

/// Upsert a native `Role`.
pub(crate) async fn upsert_role(
    store: &dyn ClusterStore,
    namespace: &str,
    role: &Role,
) -> Result<UpsertOutcome, StoreError> {
    let name = role.name_any();
    match store.get_role(namespace, &name).await {
        Ok(_) => {
            store.patch_role(namespace, role).await?;
            metrics::record_resource_updated(KIND_ROLE);
            Ok(UpsertOutcome::Patched)
        }
        Err(e) if e.is_not_found() => {
            store.create_role(namespace, role).await?;
            metrics::record_resource_created(KIND_ROLE);
            Ok(UpsertOutcome::Created)
        }
        Err(e) => Err(e),
    }
}

/// Upsert a native `ClusterRole`.
pub(crate) async fn upsert_cluster_role(
    store: &dyn ClusterStore,
    cluster_role: &ClusterRole,
) -> Result<UpsertOutcome, StoreError> {
    let name = cluster_role.name_any();
    match store.get_cluster_role(&name).await {
        Ok(_) => {
            store.patch_cluster_role(cluster_role).await?;
            metrics::record_resource_updated(KIND_CLUSTER_ROLE);
            Ok(UpsertOutcome::Patched)
        }
        Err(e) if e.is_not_found() => {
            store.create_cluster_role(cluster_role).await?;
            metrics::record_resource_created(KIND_CLUSTER_ROLE);
            Ok(UpsertOutcome::Created)
        }
        Err(e) => Err(e),
    }
}

/// Create or update the native `Role` mirrored from `role`.
///
/// # Errors
///
/// - [`ReconcileError::NamespaceNotReady`] when the namespace stays invisible
/// - [`ReconcileError::Store`] when the read, patch or create fails
pub async fn apply_role(
    store: &dyn ClusterStore,
    role: &IamRole,
    readiness: ReadinessRetry,
) -> Result<UpsertOutcome, ReconcileError> {
    let (name, namespace) = object_identity(role)?;

    wait_for_namespace(store, &namespace, readiness).await?;

    let native = Role {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace.clone()),
            labels: Some(managed_labels(MANAGED_BY_ROLE, &name)),
            ..ObjectMeta::default()
        },
        rules: Some(role.spec.rules.clone()),
    };

    let outcome = upsert_role(store, &namespace, &native)
        .await
        .map_err(|e| ReconcileError::store("upsert role", e))?;
    info!(namespace = %namespace, name = %name, ?outcome, "Role applied");
    Ok(outcome)
}

/// Delete the native `Role` mirrored from `role`. `NotFound` is success.
///
/// # Errors
///
/// Returns [`ReconcileError::Store`] on any other failure.
pub async fn delete_role(store: &dyn ClusterStore, role: &IamRole) -> Result<(), ReconcileError> {
    let (name, namespace) = object_identity(role)?;
    match store.delete_role(&namespace, &name).await {
        Ok(()) => {
            metrics::record_resource_deleted(KIND_ROLE);
            info!(namespace = %namespace, name = %name, "Role deleted");
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            debug!(namespace = %namespace, name = %name, "Role already absent");
            Ok(())
        }
        Err(e) => Err(ReconcileError::store("delete role", e)),
    }
}

/// Create or update the native `ClusterRole` mirrored from `cluster_role`.
///
/// # Errors
///
/// Returns [`ReconcileError::Store`] when the read, patch or create fails.
pub async fn apply_cluster_role(
    store: &dyn ClusterStore,
    cluster_role: &IamClusterRole,
) -> Result<UpsertOutcome, ReconcileError> {
    let name = cluster_role.name_any();
    let native = ClusterRole {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            labels: Some(managed_labels(MANAGED_BY_CLUSTER_ROLE, &name)),
            ..ObjectMeta::default()
        },
        rules: Some(cluster_role.spec.rules.clone()),
        aggregation_rule: None,
    };

    let outcome = upsert_cluster_role(store, &native)
        .await
        .map_err(|e| ReconcileError::store("upsert cluster role", e))?;
    info!(name = %name, ?outcome, "ClusterRole applied");
    Ok(outcome)
}

/// Delete the native `ClusterRole` mirrored from `cluster_role`. `NotFound` is success.
///
/// # Errors
///
/// Returns [`ReconcileError::Store`] on any other failure.
pub async fn delete_cluster_role(
    store: &dyn ClusterStore,
    cluster_role: &IamClusterRole,
) -> Result<(), ReconcileError> {
    let name = cluster_role.name_any();
    match store.delete_cluster_role(&name).await {
        Ok(()) => {
            metrics::record_resource_deleted(KIND_CLUSTER_ROLE);
            info!(name = %name, "ClusterRole deleted");
            Ok(())
        }
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(ReconcileError::store("delete cluster role", e)),
    }
}

#[cfg(test)]
#[path = "role_tests.rs"]
mod role_tests;
