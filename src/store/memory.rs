// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory [`ClusterStore`] used by the unit tests.
//!
//! Mirrors the API server behaviour the reconcilers depend on:
//! - create of an existing object returns `Conflict`
//! - read, patch and delete of a missing object return `NotFound`
//! - namespaced create into a missing namespace returns `NotFound`
//! - patching a `RoleBinding` with a different `roleRef` is rejected
//! - deleting a namespace removes everything inside it
//! - service-account token secrets get their `token` populated on create
//!
//! Failures can be injected per operation and object name with
//! [`MemoryStore::fail`], and every call is recorded for assertions.

use super::{ClusterStore, CustomObjectRef};
use crate::constants::{
    KIND_CLUSTER_ROLE, KIND_CLUSTER_ROLE_BINDING, KIND_CONFIG_MAP, KIND_NAMESPACE, KIND_ROLE,
    KIND_ROLE_BINDING, KIND_SECRET, KIND_SERVICE_ACCOUNT, SECRET_TYPE_SA_TOKEN,
    SERVICE_ACCOUNT_NAME_ANNOTATION, TOKEN_DATA_KEY,
};
use crate::errors::{StoreError, StoreResult};
use crate::labels::managed_labels;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

type Key = (String, String);

#[derive(Default)]
struct State {
    namespaces: BTreeMap<String, Namespace>,
    service_accounts: BTreeMap<Key, ServiceAccount>,
    secrets: BTreeMap<Key, Secret>,
    config_maps: BTreeMap<Key, ConfigMap>,
    roles: BTreeMap<Key, Role>,
    role_bindings: BTreeMap<Key, RoleBinding>,
    cluster_roles: BTreeMap<String, ClusterRole>,
    cluster_role_bindings: BTreeMap<String, ClusterRoleBinding>,
    custom_objects: BTreeSet<(String, String, String)>,
    failures: BTreeMap<Key, StoreError>,
    calls: Vec<Key>,
    no_token: bool,
}

impl State {
    fn record(&mut self, op: &str, name: &str) -> StoreResult<()> {
        self.calls.push((op.to_string(), name.to_string()));
        match self.failures.get(&(op.to_string(), name.to_string())) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn require_namespace(&self, namespace: &str) -> StoreResult<()> {
        if self.namespaces.contains_key(namespace) {
            Ok(())
        } else {
            Err(StoreError::not_found(KIND_NAMESPACE, namespace))
        }
    }
}

/// Thread-safe in-memory cluster.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn display(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

fn name_of(meta: &ObjectMeta) -> String {
    meta.name.clone().unwrap_or_default()
}

fn place(meta: &mut ObjectMeta, namespace: &str) {
    meta.namespace = Some(namespace.to_string());
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the given namespaces.
    pub fn with_namespaces(names: &[&str]) -> Self {
        let store = Self::new();
        for name in names {
            store.put_namespace(name);
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Make every future `op` call against `name` fail with `err`.
    ///
    /// `name` is the bare object name, without namespace.
    pub fn fail(&self, op: &str, name: &str, err: StoreError) {
        self.lock().failures.insert(key(op, name), err);
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Stop populating token data on new service-account token secrets.
    pub fn disable_token_population(&self) {
        self.lock().no_token = true;
    }

    /// Number of `op` calls made so far.
    pub fn calls(&self, op: &str) -> usize {
        self.lock().calls.iter().filter(|(o, _)| o == op).count()
    }

    /// Every call made so far as `(operation, name)`.
    pub fn call_log(&self) -> Vec<(String, String)> {
        self.lock().calls.clone()
    }

    pub fn put_namespace(&self, name: &str) {
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        };
        self.lock().namespaces.insert(name.to_string(), ns);
    }

    /// Seed a namespace carrying the labels the operator stamps for `owner`.
    pub fn put_managed_namespace(&self, name: &str, managed_by: &str, owner: &str) {
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(managed_labels(managed_by, owner)),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        };
        self.lock().namespaces.insert(name.to_string(), ns);
    }

    pub fn put_config_map(&self, namespace: &str, name: &str, data: BTreeMap<String, String>) {
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..ObjectMeta::default()
            },
            data: Some(data),
            ..ConfigMap::default()
        };
        self.lock().config_maps.insert(key(namespace, name), cm);
    }

    pub fn put_role_binding(&self, namespace: &str, mut binding: RoleBinding) {
        place(&mut binding.metadata, namespace);
        let name = name_of(&binding.metadata);
        self.lock().role_bindings.insert(key(namespace, &name), binding);
    }

    pub fn put_cluster_role_binding(&self, binding: ClusterRoleBinding) {
        let name = name_of(&binding.metadata);
        self.lock().cluster_role_bindings.insert(name, binding);
    }

    pub fn put_cluster_role(&self, role: ClusterRole) {
        let name = name_of(&role.metadata);
        self.lock().cluster_roles.insert(name, role);
    }

    pub fn put_custom_object(&self, kind: &str, namespace: &str, name: &str) {
        self.lock()
            .custom_objects
            .insert((kind.to_string(), namespace.to_string(), name.to_string()));
    }

    pub fn has_namespace(&self, name: &str) -> bool {
        self.lock().namespaces.contains_key(name)
    }

    pub fn has_custom_object(&self, kind: &str, namespace: &str, name: &str) -> bool {
        self.lock().custom_objects.contains(&(
            kind.to_string(),
            namespace.to_string(),
            name.to_string(),
        ))
    }

    pub fn service_account(&self, namespace: &str, name: &str) -> Option<ServiceAccount> {
        self.lock().service_accounts.get(&key(namespace, name)).cloned()
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.lock().secrets.get(&key(namespace, name)).cloned()
    }

    pub fn role(&self, namespace: &str, name: &str) -> Option<Role> {
        self.lock().roles.get(&key(namespace, name)).cloned()
    }

    pub fn cluster_role(&self, name: &str) -> Option<ClusterRole> {
        self.lock().cluster_roles.get(name).cloned()
    }

    pub fn role_binding(&self, namespace: &str, name: &str) -> Option<RoleBinding> {
        self.lock().role_bindings.get(&key(namespace, name)).cloned()
    }

    pub fn cluster_role_binding(&self, name: &str) -> Option<ClusterRoleBinding> {
        self.lock().cluster_role_bindings.get(name).cloned()
    }

    /// Every `RoleBinding` as `(namespace, binding)`.
    pub fn all_role_bindings(&self) -> Vec<(String, RoleBinding)> {
        self.lock()
            .role_bindings
            .iter()
            .map(|((ns, _), rb)| (ns.clone(), rb.clone()))
            .collect()
    }

    pub fn all_cluster_role_bindings(&self) -> Vec<ClusterRoleBinding> {
        self.lock().cluster_role_bindings.values().cloned().collect()
    }
}

#[async_trait]
impl ClusterStore for MemoryStore {
    fn api_server_url(&self) -> String {
        "https://kubernetes.default.svc".to_string()
    }

    async fn get_namespace(&self, name: &str) -> StoreResult<Namespace> {
        let mut state = self.lock();
        state.record("get_namespace", name)?;
        state
            .namespaces
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_found(KIND_NAMESPACE, name))
    }

    async fn create_namespace(&self, namespace: &Namespace) -> StoreResult<Namespace> {
        let name = name_of(&namespace.metadata);
        let mut state = self.lock();
        state.record("create_namespace", &name)?;
        if state.namespaces.contains_key(&name) {
            return Err(StoreError::conflict(KIND_NAMESPACE, name));
        }
        state.namespaces.insert(name, namespace.clone());
        Ok(namespace.clone())
    }

    async fn delete_namespace(&self, name: &str) -> StoreResult<()> {
        let mut state = self.lock();
        state.record("delete_namespace", name)?;
        if state.namespaces.remove(name).is_none() {
            return Err(StoreError::not_found(KIND_NAMESPACE, name));
        }
        state.service_accounts.retain(|(ns, _), _| ns != name);
        state.secrets.retain(|(ns, _), _| ns != name);
        state.config_maps.retain(|(ns, _), _| ns != name);
        state.roles.retain(|(ns, _), _| ns != name);
        state.role_bindings.retain(|(ns, _), _| ns != name);
        state.custom_objects.retain(|(_, ns, _)| ns != name);
        Ok(())
    }

    async fn list_namespaces(&self) -> StoreResult<Vec<Namespace>> {
        let mut state = self.lock();
        state.record("list_namespaces", "")?;
        Ok(state.namespaces.values().cloned().collect())
    }

    async fn create_service_account(
        &self,
        namespace: &str,
        service_account: &ServiceAccount,
    ) -> StoreResult<ServiceAccount> {
        let name = name_of(&service_account.metadata);
        let mut state = self.lock();
        state.record("create_service_account", &name)?;
        state.require_namespace(namespace)?;
        let k = key(namespace, &name);
        if state.service_accounts.contains_key(&k) {
            return Err(StoreError::conflict(
                KIND_SERVICE_ACCOUNT,
                display(namespace, &name),
            ));
        }
        let mut sa = service_account.clone();
        place(&mut sa.metadata, namespace);
        state.service_accounts.insert(k, sa.clone());
        Ok(sa)
    }

    async fn patch_service_account(
        &self,
        namespace: &str,
        service_account: &ServiceAccount,
    ) -> StoreResult<ServiceAccount> {
        let name = name_of(&service_account.metadata);
        let mut state = self.lock();
        state.record("patch_service_account", &name)?;
        let k = key(namespace, &name);
        let Some(existing) = state.service_accounts.get_mut(&k) else {
            return Err(StoreError::not_found(
                KIND_SERVICE_ACCOUNT,
                display(namespace, &name),
            ));
        };
        existing.metadata.labels = service_account.metadata.labels.clone();
        Ok(existing.clone())
    }

    async fn delete_service_account(&self, namespace: &str, name: &str) -> StoreResult<()> {
        let mut state = self.lock();
        state.record("delete_service_account", name)?;
        state
            .service_accounts
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(KIND_SERVICE_ACCOUNT, display(namespace, name)))
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> StoreResult<Secret> {
        let name = name_of(&secret.metadata);
        let mut state = self.lock();
        state.record("create_secret", &name)?;
        state.require_namespace(namespace)?;
        let k = key(namespace, &name);
        if state.secrets.contains_key(&k) {
            return Err(StoreError::conflict(KIND_SECRET, display(namespace, &name)));
        }
        let mut stored = secret.clone();
        place(&mut stored.metadata, namespace);
        let is_token = stored.type_.as_deref() == Some(SECRET_TYPE_SA_TOKEN);
        if is_token && !state.no_token {
            let account = stored
                .metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get(SERVICE_ACCOUNT_NAME_ANNOTATION))
                .cloned()
                .unwrap_or_default();
            stored.data.get_or_insert_with(BTreeMap::new).insert(
                TOKEN_DATA_KEY.to_string(),
                ByteString(format!("token-for-{account}").into_bytes()),
            );
        }
        state.secrets.insert(k, stored.clone());
        Ok(stored)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> StoreResult<Secret> {
        let mut state = self.lock();
        state.record("get_secret", name)?;
        state
            .secrets
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| StoreError::not_found(KIND_SECRET, display(namespace, name)))
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> StoreResult<ConfigMap> {
        let mut state = self.lock();
        state.record("get_config_map", name)?;
        state
            .config_maps
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| StoreError::not_found(KIND_CONFIG_MAP, display(namespace, name)))
    }

    async fn get_role(&self, namespace: &str, name: &str) -> StoreResult<Role> {
        let mut state = self.lock();
        state.record("get_role", name)?;
        state
            .roles
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| StoreError::not_found(KIND_ROLE, display(namespace, name)))
    }

    async fn create_role(&self, namespace: &str, role: &Role) -> StoreResult<Role> {
        let name = name_of(&role.metadata);
        let mut state = self.lock();
        state.record("create_role", &name)?;
        state.require_namespace(namespace)?;
        let k = key(namespace, &name);
        if state.roles.contains_key(&k) {
            return Err(StoreError::conflict(KIND_ROLE, display(namespace, &name)));
        }
        let mut stored = role.clone();
        place(&mut stored.metadata, namespace);
        state.roles.insert(k, stored.clone());
        Ok(stored)
    }

    async fn patch_role(&self, namespace: &str, role: &Role) -> StoreResult<Role> {
        let name = name_of(&role.metadata);
        let mut state = self.lock();
        state.record("patch_role", &name)?;
        let Some(existing) = state.roles.get_mut(&key(namespace, &name)) else {
            return Err(StoreError::not_found(KIND_ROLE, display(namespace, &name)));
        };
        existing.rules = role.rules.clone();
        existing.metadata.labels = role.metadata.labels.clone();
        Ok(existing.clone())
    }

    async fn delete_role(&self, namespace: &str, name: &str) -> StoreResult<()> {
        let mut state = self.lock();
        state.record("delete_role", name)?;
        state
            .roles
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(KIND_ROLE, display(namespace, name)))
    }

    async fn get_cluster_role(&self, name: &str) -> StoreResult<ClusterRole> {
        let mut state = self.lock();
        state.record("get_cluster_role", name)?;
        state
            .cluster_roles
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_found(KIND_CLUSTER_ROLE, name))
    }

    async fn create_cluster_role(&self, cluster_role: &ClusterRole) -> StoreResult<ClusterRole> {
        let name = name_of(&cluster_role.metadata);
        let mut state = self.lock();
        state.record("create_cluster_role", &name)?;
        if state.cluster_roles.contains_key(&name) {
            return Err(StoreError::conflict(KIND_CLUSTER_ROLE, name));
        }
        state.cluster_roles.insert(name, cluster_role.clone());
        Ok(cluster_role.clone())
    }

    async fn patch_cluster_role(&self, cluster_role: &ClusterRole) -> StoreResult<ClusterRole> {
        let name = name_of(&cluster_role.metadata);
        let mut state = self.lock();
        state.record("patch_cluster_role", &name)?;
        let Some(existing) = state.cluster_roles.get_mut(&name) else {
            return Err(StoreError::not_found(KIND_CLUSTER_ROLE, name));
        };
        existing.rules = cluster_role.rules.clone();
        existing.metadata.labels = cluster_role.metadata.labels.clone();
        Ok(existing.clone())
    }

    async fn delete_cluster_role(&self, name: &str) -> StoreResult<()> {
        let mut state = self.lock();
        state.record("delete_cluster_role", name)?;
        state
            .cluster_roles
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(KIND_CLUSTER_ROLE, name))
    }

    async fn get_role_binding(&self, namespace: &str, name: &str) -> StoreResult<RoleBinding> {
        let mut state = self.lock();
        state.record("get_role_binding", name)?;
        state
            .role_bindings
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| StoreError::not_found(KIND_ROLE_BINDING, display(namespace, name)))
    }

    async fn create_role_binding(
        &self,
        namespace: &str,
        binding: &RoleBinding,
    ) -> StoreResult<RoleBinding> {
        let name = name_of(&binding.metadata);
        let mut state = self.lock();
        state.record("create_role_binding", &name)?;
        state.require_namespace(namespace)?;
        let k = key(namespace, &name);
        if state.role_bindings.contains_key(&k) {
            return Err(StoreError::conflict(
                KIND_ROLE_BINDING,
                display(namespace, &name),
            ));
        }
        let mut stored = binding.clone();
        place(&mut stored.metadata, namespace);
        state.role_bindings.insert(k, stored.clone());
        Ok(stored)
    }

    async fn patch_role_binding(
        &self,
        namespace: &str,
        binding: &RoleBinding,
    ) -> StoreResult<RoleBinding> {
        let name = name_of(&binding.metadata);
        let mut state = self.lock();
        state.record("patch_role_binding", &name)?;
        let Some(existing) = state.role_bindings.get_mut(&key(namespace, &name)) else {
            return Err(StoreError::not_found(
                KIND_ROLE_BINDING,
                display(namespace, &name),
            ));
        };
        if existing.role_ref != binding.role_ref {
            return Err(StoreError::other(
                KIND_ROLE_BINDING,
                display(namespace, &name),
                "roleRef is immutable",
            ));
        }
        existing.subjects = binding.subjects.clone();
        existing.metadata.labels = binding.metadata.labels.clone();
        Ok(existing.clone())
    }

    async fn delete_role_binding(&self, namespace: &str, name: &str) -> StoreResult<()> {
        let mut state = self.lock();
        state.record("delete_role_binding", name)?;
        state
            .role_bindings
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(KIND_ROLE_BINDING, display(namespace, name)))
    }

    async fn list_role_bindings(&self, namespace: &str) -> StoreResult<Vec<RoleBinding>> {
        let mut state = self.lock();
        state.record("list_role_bindings", namespace)?;
        Ok(state
            .role_bindings
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, rb)| rb.clone())
            .collect())
    }

    async fn get_cluster_role_binding(&self, name: &str) -> StoreResult<ClusterRoleBinding> {
        let mut state = self.lock();
        state.record("get_cluster_role_binding", name)?;
        state
            .cluster_role_bindings
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_found(KIND_CLUSTER_ROLE_BINDING, name))
    }

    async fn create_cluster_role_binding(
        &self,
        binding: &ClusterRoleBinding,
    ) -> StoreResult<ClusterRoleBinding> {
        let name = name_of(&binding.metadata);
        let mut state = self.lock();
        state.record("create_cluster_role_binding", &name)?;
        if state.cluster_role_bindings.contains_key(&name) {
            return Err(StoreError::conflict(KIND_CLUSTER_ROLE_BINDING, name));
        }
        state.cluster_role_bindings.insert(name, binding.clone());
        Ok(binding.clone())
    }

    async fn replace_cluster_role_binding(
        &self,
        binding: &ClusterRoleBinding,
    ) -> StoreResult<ClusterRoleBinding> {
        let name = name_of(&binding.metadata);
        let mut state = self.lock();
        state.record("replace_cluster_role_binding", &name)?;
        let Some(existing) = state.cluster_role_bindings.get_mut(&name) else {
            return Err(StoreError::not_found(KIND_CLUSTER_ROLE_BINDING, name));
        };
        if existing.role_ref != binding.role_ref {
            return Err(StoreError::other(
                KIND_CLUSTER_ROLE_BINDING,
                name,
                "roleRef is immutable",
            ));
        }
        *existing = binding.clone();
        Ok(binding.clone())
    }

    async fn delete_cluster_role_binding(&self, name: &str) -> StoreResult<()> {
        let mut state = self.lock();
        state.record("delete_cluster_role_binding", name)?;
        state
            .cluster_role_bindings
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(KIND_CLUSTER_ROLE_BINDING, name))
    }

    async fn list_cluster_role_bindings(&self) -> StoreResult<Vec<ClusterRoleBinding>> {
        let mut state = self.lock();
        state.record("list_cluster_role_bindings", "")?;
        Ok(state.cluster_role_bindings.values().cloned().collect())
    }

    async fn delete_custom_object(&self, object: &CustomObjectRef) -> StoreResult<()> {
        let mut state = self.lock();
        state.record("delete_custom_object", &object.name)?;
        let entry = (
            object.kind.clone(),
            object.namespace.clone(),
            object.name.clone(),
        );
        if state.custom_objects.remove(&entry) {
            Ok(())
        } else {
            Err(StoreError::not_found(
                &object.kind,
                display(&object.namespace, &object.name),
            ))
        }
    }
}
