// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Finalizer management for the IAM custom resources.
//!
//! Delete events are synthesized with a finalizer per kind: the finalizer is
//! added on the first reconciliation, and while it is present and a deletion
//! timestamp is set the kind's cleanup runs. The finalizer is removed only
//! after cleanup succeeds, so a failed cascade is retried on the next pass.
//!
//! # Example
//!
//! ```rust,ignore
//! use k8s_iam_operator::reconcilers::finalizers::{ensure_finalizer, handle_deletion};
//! use k8s_iam_operator::labels::FINALIZER_USER;
//!
//! async fn reconcile(client: Client, store: &dyn ClusterStore, user: User) -> Result<(), ReconcileError> {
//!     if user.metadata.deletion_timestamp.is_some() {
//!         return handle_deletion(&client, store, &user, FINALIZER_USER).await;
//!     }
//!     ensure_finalizer(&client, &user, FINALIZER_USER).await?;
//!     // Normal reconciliation...
//!     Ok(())
//! }
//! ```

use super::{group, role, user};
use crate::crd::{Group, IamClusterRole, IamRole, User};
use crate::errors::ReconcileError;
use crate::store::kube_store::{map_kube_error, patch_params};
use crate::store::ClusterStore;
use kube::api::Patch;
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use serde_json::json;
use tracing::info;

/// Resources that run a cleanup before their finalizer is removed.
///
/// If `cleanup` returns an error the finalizer stays and deletion is blocked
/// until a later reconciliation succeeds.
#[async_trait::async_trait]
pub trait FinalizerCleanup: Resource + ResourceExt + Clone {
    /// Remove everything derived from this resource.
    ///
    /// # Errors
    ///
    /// Returns the error of the failing cleanup step.
    async fn cleanup(&self, store: &dyn ClusterStore) -> Result<(), ReconcileError>;
}

#[async_trait::async_trait]
impl FinalizerCleanup for User {
    async fn cleanup(&self, store: &dyn ClusterStore) -> Result<(), ReconcileError> {
        user::on_delete(store, self).await.map(|_| ())
    }
}

#[async_trait::async_trait]
impl FinalizerCleanup for Group {
    async fn cleanup(&self, store: &dyn ClusterStore) -> Result<(), ReconcileError> {
        group::on_delete(store, self).await.map(|_| ())
    }
}

#[async_trait::async_trait]
impl FinalizerCleanup for IamRole {
    async fn cleanup(&self, store: &dyn ClusterStore) -> Result<(), ReconcileError> {
        role::delete_role(store, self).await
    }
}

#[async_trait::async_trait]
impl FinalizerCleanup for IamClusterRole {
    async fn cleanup(&self, store: &dyn ClusterStore) -> Result<(), ReconcileError> {
        role::delete_cluster_role(store, self).await
    }
}

/// Whether `finalizer` is present on `resource`.
#[must_use]
pub fn has_finalizer<T: Resource>(resource: &T, finalizer: &str) -> bool {
    resource
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == finalizer))
}

/// Finalizer list of `resource` with `finalizer` appended once.
#[must_use]
pub fn finalizers_with<T: Resource>(resource: &T, finalizer: &str) -> Vec<String> {
    let mut finalizers = resource.meta().finalizers.clone().unwrap_or_default();
    if !finalizers.iter().any(|f| f == finalizer) {
        finalizers.push(finalizer.to_string());
    }
    finalizers
}

/// Finalizer list of `resource` without `finalizer`.
#[must_use]
pub fn finalizers_without<T: Resource>(resource: &T, finalizer: &str) -> Vec<String> {
    let mut finalizers = resource.meta().finalizers.clone().unwrap_or_default();
    finalizers.retain(|f| f != finalizer);
    finalizers
}

async fn patch_finalizers<T>(
    client: &Client,
    resource: &T,
    finalizers: Vec<String>,
    operation: &str,
) -> Result<(), ReconcileError>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();

    let api: Api<T> = Api::namespaced(client.clone(), &namespace);
    let patch = json!({ "metadata": { "finalizers": finalizers } });
    api.patch(&name, &patch_params(), &Patch::Merge(&patch))
        .await
        .map(|_| ())
        .map_err(|e| {
            ReconcileError::store(
                operation,
                map_kube_error(&e, &T::kind(&()), &format!("{namespace}/{name}")),
            )
        })
}

/// Add a finalizer to a resource if not already present.
///
/// # Errors
///
/// Returns [`ReconcileError::Store`] if the patch fails.
pub async fn ensure_finalizer<T>(
    client: &Client,
    resource: &T,
    finalizer: &str,
) -> Result<(), ReconcileError>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    if has_finalizer(resource, finalizer) {
        return Ok(());
    }

    info!(
        kind = %T::kind(&()),
        namespace = %resource.namespace().unwrap_or_default(),
        name = %resource.name_any(),
        finalizer = %finalizer,
        "Adding finalizer"
    );
    patch_finalizers(
        client,
        resource,
        finalizers_with(resource, finalizer),
        "add finalizer",
    )
    .await
}

/// Remove a finalizer from a resource.
///
/// # Errors
///
/// Returns [`ReconcileError::Store`] if the patch fails.
pub async fn remove_finalizer<T>(
    client: &Client,
    resource: &T,
    finalizer: &str,
) -> Result<(), ReconcileError>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    if !has_finalizer(resource, finalizer) {
        return Ok(());
    }

    info!(
        kind = %T::kind(&()),
        namespace = %resource.namespace().unwrap_or_default(),
        name = %resource.name_any(),
        finalizer = %finalizer,
        "Removing finalizer"
    );
    patch_finalizers(
        client,
        resource,
        finalizers_without(resource, finalizer),
        "remove finalizer",
    )
    .await
}

/// Run the cleanup of a resource being deleted, then remove its finalizer.
///
/// Does nothing when the finalizer is already gone.
///
/// # Errors
///
/// Returns the cleanup error (the finalizer stays) or the patch error.
pub async fn handle_deletion<T>(
    client: &Client,
    store: &dyn ClusterStore,
    resource: &T,
    finalizer: &str,
) -> Result<(), ReconcileError>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + FinalizerCleanup
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>
        + Sync,
{
    if !has_finalizer(resource, finalizer) {
        return Ok(());
    }

    info!(
        kind = %T::kind(&()),
        namespace = %resource.namespace().unwrap_or_default(),
        name = %resource.name_any(),
        "Running cleanup"
    );
    resource.cleanup(store).await?;
    remove_finalizer(client, resource, finalizer).await
}

#[cfg(test)]
#[path = "finalizers_tests.rs"]
mod finalizers_tests;
