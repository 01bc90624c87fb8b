// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! [`ClusterStore`] implementation backed by `kube::Client`.
//!
//! Each call maps to exactly one API request. HTTP 404 becomes
//! [`StoreError::NotFound`], HTTP 409 becomes [`StoreError::Conflict`], and
//! everything else is reported as [`StoreError::Other`] with the full detail.
//! No retries happen here; the dispatcher owns requeueing.

use super::{ClusterStore, CustomObjectRef};
use crate::constants::{
    FIELD_MANAGER, KIND_CLUSTER_ROLE, KIND_CLUSTER_ROLE_BINDING, KIND_CONFIG_MAP, KIND_NAMESPACE,
    KIND_ROLE, KIND_ROLE_BINDING, KIND_SECRET, KIND_SERVICE_ACCOUNT,
};
use crate::errors::{StoreError, StoreResult};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use kube::api::{
    ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, Patch, PatchParams,
    PostParams, PropagationPolicy,
};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::debug;

/// Grace period applied when deleting a user's service account
const SERVICE_ACCOUNT_DELETE_GRACE_SECS: u32 = 5;

/// Cluster object store backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    api_server_url: String,
}

impl KubeStore {
    /// Create a store from a client and the URL it talks to.
    ///
    /// # Arguments
    ///
    /// * `client` - Kubernetes API client
    /// * `api_server_url` - URL written into derived credential bundles
    #[must_use]
    pub fn new(client: Client, api_server_url: impl Into<String>) -> Self {
        Self {
            client,
            api_server_url: api_server_url.into(),
        }
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<DynamicType = (), Scope = kube::core::NamespaceResourceScope>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn cluster<K>(&self) -> Api<K>
    where
        K: Resource<DynamicType = ()>,
    {
        Api::all(self.client.clone())
    }
}

pub(crate) fn patch_params() -> PatchParams {
    PatchParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..PatchParams::default()
    }
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..PostParams::default()
    }
}

/// Classify a `kube::Error` into the store outcome taxonomy.
pub(crate) fn map_kube_error(err: &kube::Error, kind: &str, name: &str) -> StoreError {
    match err {
        kube::Error::Api(api_err) if api_err.code == 404 => StoreError::not_found(kind, name),
        kube::Error::Api(api_err) if api_err.code == 409 => StoreError::conflict(kind, name),
        _ => StoreError::other(kind, name, err.to_string()),
    }
}

fn qualified(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

fn object_name<K: Resource>(object: &K) -> String {
    object.meta().name.clone().unwrap_or_default()
}

async fn get<K>(api: &Api<K>, kind: &str, name: &str, qualified_name: &str) -> StoreResult<K>
where
    K: Clone + DeserializeOwned + Debug,
{
    api.get(name)
        .await
        .map_err(|e| map_kube_error(&e, kind, qualified_name))
}

async fn create<K>(api: &Api<K>, kind: &str, object: &K, qualified_name: &str) -> StoreResult<K>
where
    K: Clone + Serialize + DeserializeOwned + Debug,
{
    debug!(kind = %kind, name = %qualified_name, "Creating object");
    api.create(&post_params(), object)
        .await
        .map_err(|e| map_kube_error(&e, kind, qualified_name))
}

async fn merge_patch<K>(
    api: &Api<K>,
    kind: &str,
    object: &K,
    name: &str,
    qualified_name: &str,
) -> StoreResult<K>
where
    K: Clone + Serialize + DeserializeOwned + Debug,
{
    debug!(kind = %kind, name = %qualified_name, "Patching object");
    api.patch(name, &patch_params(), &Patch::Merge(object))
        .await
        .map_err(|e| map_kube_error(&e, kind, qualified_name))
}

async fn delete<K>(
    api: &Api<K>,
    kind: &str,
    name: &str,
    qualified_name: &str,
    params: &DeleteParams,
) -> StoreResult<()>
where
    K: Clone + DeserializeOwned + Debug,
{
    debug!(kind = %kind, name = %qualified_name, "Deleting object");
    api.delete(name, params)
        .await
        .map(|_| ())
        .map_err(|e| map_kube_error(&e, kind, qualified_name))
}

async fn list<K>(api: &Api<K>, kind: &str, scope: &str) -> StoreResult<Vec<K>>
where
    K: Clone + DeserializeOwned + Debug,
{
    api.list(&ListParams::default())
        .await
        .map(|list| list.items)
        .map_err(|e| map_kube_error(&e, kind, scope))
}

#[async_trait]
impl ClusterStore for KubeStore {
    fn api_server_url(&self) -> String {
        self.api_server_url.clone()
    }

    async fn get_namespace(&self, name: &str) -> StoreResult<Namespace> {
        get(&self.cluster::<Namespace>(), KIND_NAMESPACE, name, name).await
    }

    async fn create_namespace(&self, namespace: &Namespace) -> StoreResult<Namespace> {
        let name = object_name(namespace);
        create(&self.cluster::<Namespace>(), KIND_NAMESPACE, namespace, &name).await
    }

    async fn delete_namespace(&self, name: &str) -> StoreResult<()> {
        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Foreground),
            grace_period_seconds: Some(0),
            ..DeleteParams::default()
        };
        delete(&self.cluster::<Namespace>(), KIND_NAMESPACE, name, name, &params).await
    }

    async fn list_namespaces(&self) -> StoreResult<Vec<Namespace>> {
        list(&self.cluster::<Namespace>(), KIND_NAMESPACE, "cluster").await
    }

    async fn create_service_account(
        &self,
        namespace: &str,
        service_account: &ServiceAccount,
    ) -> StoreResult<ServiceAccount> {
        let qualified_name = qualified(namespace, &object_name(service_account));
        create(
            &self.namespaced::<ServiceAccount>(namespace),
            KIND_SERVICE_ACCOUNT,
            service_account,
            &qualified_name,
        )
        .await
    }

    async fn patch_service_account(
        &self,
        namespace: &str,
        service_account: &ServiceAccount,
    ) -> StoreResult<ServiceAccount> {
        let name = object_name(service_account);
        let qualified_name = qualified(namespace, &name);
        merge_patch(
            &self.namespaced::<ServiceAccount>(namespace),
            KIND_SERVICE_ACCOUNT,
            service_account,
            &name,
            &qualified_name,
        )
        .await
    }

    async fn delete_service_account(&self, namespace: &str, name: &str) -> StoreResult<()> {
        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Foreground),
            grace_period_seconds: Some(SERVICE_ACCOUNT_DELETE_GRACE_SECS),
            ..DeleteParams::default()
        };
        delete(
            &self.namespaced::<ServiceAccount>(namespace),
            KIND_SERVICE_ACCOUNT,
            name,
            &qualified(namespace, name),
            &params,
        )
        .await
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> StoreResult<Secret> {
        let qualified_name = qualified(namespace, &object_name(secret));
        create(
            &self.namespaced::<Secret>(namespace),
            KIND_SECRET,
            secret,
            &qualified_name,
        )
        .await
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> StoreResult<Secret> {
        get(
            &self.namespaced::<Secret>(namespace),
            KIND_SECRET,
            name,
            &qualified(namespace, name),
        )
        .await
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> StoreResult<ConfigMap> {
        get(
            &self.namespaced::<ConfigMap>(namespace),
            KIND_CONFIG_MAP,
            name,
            &qualified(namespace, name),
        )
        .await
    }

    async fn get_role(&self, namespace: &str, name: &str) -> StoreResult<Role> {
        get(
            &self.namespaced::<Role>(namespace),
            KIND_ROLE,
            name,
            &qualified(namespace, name),
        )
        .await
    }

    async fn create_role(&self, namespace: &str, role: &Role) -> StoreResult<Role> {
        let qualified_name = qualified(namespace, &object_name(role));
        create(&self.namespaced::<Role>(namespace), KIND_ROLE, role, &qualified_name).await
    }

    async fn patch_role(&self, namespace: &str, role: &Role) -> StoreResult<Role> {
        let name = object_name(role);
        let qualified_name = qualified(namespace, &name);
        merge_patch(
            &self.namespaced::<Role>(namespace),
            KIND_ROLE,
            role,
            &name,
            &qualified_name,
        )
        .await
    }

    async fn delete_role(&self, namespace: &str, name: &str) -> StoreResult<()> {
        delete(
            &self.namespaced::<Role>(namespace),
            KIND_ROLE,
            name,
            &qualified(namespace, name),
            &DeleteParams::default(),
        )
        .await
    }

    async fn get_cluster_role(&self, name: &str) -> StoreResult<ClusterRole> {
        get(&self.cluster::<ClusterRole>(), KIND_CLUSTER_ROLE, name, name).await
    }

    async fn create_cluster_role(&self, cluster_role: &ClusterRole) -> StoreResult<ClusterRole> {
        let name = object_name(cluster_role);
        create(&self.cluster::<ClusterRole>(), KIND_CLUSTER_ROLE, cluster_role, &name).await
    }

    async fn patch_cluster_role(&self, cluster_role: &ClusterRole) -> StoreResult<ClusterRole> {
        let name = object_name(cluster_role);
        merge_patch(
            &self.cluster::<ClusterRole>(),
            KIND_CLUSTER_ROLE,
            cluster_role,
            &name,
            &name,
        )
        .await
    }

    async fn delete_cluster_role(&self, name: &str) -> StoreResult<()> {
        delete(
            &self.cluster::<ClusterRole>(),
            KIND_CLUSTER_ROLE,
            name,
            name,
            &DeleteParams::default(),
        )
        .await
    }

    async fn get_role_binding(&self, namespace: &str, name: &str) -> StoreResult<RoleBinding> {
        get(
            &self.namespaced::<RoleBinding>(namespace),
            KIND_ROLE_BINDING,
            name,
            &qualified(namespace, name),
        )
        .await
    }

    async fn create_role_binding(
        &self,
        namespace: &str,
        binding: &RoleBinding,
    ) -> StoreResult<RoleBinding> {
        let qualified_name = qualified(namespace, &object_name(binding));
        create(
            &self.namespaced::<RoleBinding>(namespace),
            KIND_ROLE_BINDING,
            binding,
            &qualified_name,
        )
        .await
    }

    async fn patch_role_binding(
        &self,
        namespace: &str,
        binding: &RoleBinding,
    ) -> StoreResult<RoleBinding> {
        let name = object_name(binding);
        let qualified_name = qualified(namespace, &name);
        merge_patch(
            &self.namespaced::<RoleBinding>(namespace),
            KIND_ROLE_BINDING,
            binding,
            &name,
            &qualified_name,
        )
        .await
    }

    async fn delete_role_binding(&self, namespace: &str, name: &str) -> StoreResult<()> {
        delete(
            &self.namespaced::<RoleBinding>(namespace),
            KIND_ROLE_BINDING,
            name,
            &qualified(namespace, name),
            &DeleteParams::default(),
        )
        .await
    }

    async fn list_role_bindings(&self, namespace: &str) -> StoreResult<Vec<RoleBinding>> {
        list(
            &self.namespaced::<RoleBinding>(namespace),
            KIND_ROLE_BINDING,
            namespace,
        )
        .await
    }

    async fn get_cluster_role_binding(&self, name: &str) -> StoreResult<ClusterRoleBinding> {
        get(
            &self.cluster::<ClusterRoleBinding>(),
            KIND_CLUSTER_ROLE_BINDING,
            name,
            name,
        )
        .await
    }

    async fn create_cluster_role_binding(
        &self,
        binding: &ClusterRoleBinding,
    ) -> StoreResult<ClusterRoleBinding> {
        let name = object_name(binding);
        create(
            &self.cluster::<ClusterRoleBinding>(),
            KIND_CLUSTER_ROLE_BINDING,
            binding,
            &name,
        )
        .await
    }

    async fn replace_cluster_role_binding(
        &self,
        binding: &ClusterRoleBinding,
    ) -> StoreResult<ClusterRoleBinding> {
        let name = object_name(binding);
        debug!(kind = %KIND_CLUSTER_ROLE_BINDING, name = %name, "Replacing object");
        self.cluster::<ClusterRoleBinding>()
            .replace(&name, &post_params(), binding)
            .await
            .map_err(|e| map_kube_error(&e, KIND_CLUSTER_ROLE_BINDING, &name))
    }

    async fn delete_cluster_role_binding(&self, name: &str) -> StoreResult<()> {
        delete(
            &self.cluster::<ClusterRoleBinding>(),
            KIND_CLUSTER_ROLE_BINDING,
            name,
            name,
            &DeleteParams::default(),
        )
        .await
    }

    async fn list_cluster_role_bindings(&self) -> StoreResult<Vec<ClusterRoleBinding>> {
        list(
            &self.cluster::<ClusterRoleBinding>(),
            KIND_CLUSTER_ROLE_BINDING,
            "cluster",
        )
        .await
    }

    async fn delete_custom_object(&self, object: &CustomObjectRef) -> StoreResult<()> {
        let gvk = GroupVersionKind::gvk(&object.group, &object.version, &object.kind);
        let resource = ApiResource::from_gvk_with_plural(&gvk, &object.plural);
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), &object.namespace, &resource);
        let qualified_name = qualified(&object.namespace, &object.name);

        debug!(kind = %object.kind, name = %qualified_name, "Deleting custom object");
        api.delete(&object.name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| map_kube_error(&e, &object.kind, &qualified_name))
    }
}

#[cfg(test)]
#[path = "kube_store_tests.rs"]
mod kube_store_tests;
