// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Access to the cluster object store.
//!
//! Every reconciler talks to the cluster through the [`ClusterStore`] trait,
//! which is passed in explicitly instead of being built once at load time.
//! Each call returns the object or a [`StoreError`](crate::errors::StoreError)
//! classified as `NotFound`, `Conflict` or `Other`.
//!
//! The store is the single source of truth: implementations must not cache
//! objects across calls, so every reconciliation re-reads current state.
//!
//! - [`KubeStore`] - production implementation on top of `kube::Client`
//! - `MemoryStore` - in-memory fake used by the unit tests

use crate::errors::StoreResult;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};

pub mod kube_store;

#[cfg(test)]
pub mod memory;

pub use kube_store::KubeStore;

/// Coordinates of a custom object addressed through the dynamic API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomObjectRef {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
    pub namespace: String,
    pub name: String,
}

/// Typed operations against the cluster object store.
///
/// Namespaced operations take the namespace explicitly; the namespace inside
/// the object's metadata is ignored by implementations.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// URL of the API server, written into derived credential bundles.
    fn api_server_url(&self) -> String;

    // Namespaces
    async fn get_namespace(&self, name: &str) -> StoreResult<Namespace>;
    async fn create_namespace(&self, namespace: &Namespace) -> StoreResult<Namespace>;
    /// Deletes with foreground propagation: everything inside goes with it.
    async fn delete_namespace(&self, name: &str) -> StoreResult<()>;
    async fn list_namespaces(&self) -> StoreResult<Vec<Namespace>>;

    // ServiceAccounts
    async fn create_service_account(
        &self,
        namespace: &str,
        service_account: &ServiceAccount,
    ) -> StoreResult<ServiceAccount>;
    async fn patch_service_account(
        &self,
        namespace: &str,
        service_account: &ServiceAccount,
    ) -> StoreResult<ServiceAccount>;
    async fn delete_service_account(&self, namespace: &str, name: &str) -> StoreResult<()>;

    // Secrets and ConfigMaps
    async fn create_secret(&self, namespace: &str, secret: &Secret) -> StoreResult<Secret>;
    async fn get_secret(&self, namespace: &str, name: &str) -> StoreResult<Secret>;
    async fn get_config_map(&self, namespace: &str, name: &str) -> StoreResult<ConfigMap>;

    // Roles
    async fn get_role(&self, namespace: &str, name: &str) -> StoreResult<Role>;
    async fn create_role(&self, namespace: &str, role: &Role) -> StoreResult<Role>;
    async fn patch_role(&self, namespace: &str, role: &Role) -> StoreResult<Role>;
    async fn delete_role(&self, namespace: &str, name: &str) -> StoreResult<()>;

    // ClusterRoles
    async fn get_cluster_role(&self, name: &str) -> StoreResult<ClusterRole>;
    async fn create_cluster_role(&self, cluster_role: &ClusterRole) -> StoreResult<ClusterRole>;
    async fn patch_cluster_role(&self, cluster_role: &ClusterRole) -> StoreResult<ClusterRole>;
    async fn delete_cluster_role(&self, name: &str) -> StoreResult<()>;

    // RoleBindings
    async fn get_role_binding(&self, namespace: &str, name: &str) -> StoreResult<RoleBinding>;
    async fn create_role_binding(
        &self,
        namespace: &str,
        binding: &RoleBinding,
    ) -> StoreResult<RoleBinding>;
    /// Overwrites subjects and roleRef of the existing binding.
    async fn patch_role_binding(
        &self,
        namespace: &str,
        binding: &RoleBinding,
    ) -> StoreResult<RoleBinding>;
    async fn delete_role_binding(&self, namespace: &str, name: &str) -> StoreResult<()>;
    async fn list_role_bindings(&self, namespace: &str) -> StoreResult<Vec<RoleBinding>>;

    // ClusterRoleBindings
    async fn get_cluster_role_binding(&self, name: &str) -> StoreResult<ClusterRoleBinding>;
    async fn create_cluster_role_binding(
        &self,
        binding: &ClusterRoleBinding,
    ) -> StoreResult<ClusterRoleBinding>;
    /// Replaces the existing binding wholesale.
    async fn replace_cluster_role_binding(
        &self,
        binding: &ClusterRoleBinding,
    ) -> StoreResult<ClusterRoleBinding>;
    async fn delete_cluster_role_binding(&self, name: &str) -> StoreResult<()>;
    async fn list_cluster_role_bindings(&self) -> StoreResult<Vec<ClusterRoleBinding>>;

    // Custom objects
    async fn delete_custom_object(&self, object: &CustomObjectRef) -> StoreResult<()>;
}
