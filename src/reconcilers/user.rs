// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `User` handlers.
//!
//! A user is bound as `ServiceAccount:{namespace}/{name}`. Each `CRoles` entry
//! becomes a binding to a `ClusterRole` (with an extra `Group` subject when the
//! entry names one) and each `Roles` entry a `RoleBinding` to a `Role` in the
//! user's namespace.

use super::bindings::{reconcile_bindings, Applied, BindingOwner, BindingSpec, RoleRef, Subject};
use super::cascade::{delete_subject, CascadeReport, CascadeTarget};
use super::subject::{ensure_subject, restricted_role_name, Phase, PrincipalKind, SubjectRequest};
use super::sweeper::{sweep_orphans, DesiredRoleRefs};
use super::{merge_failures, object_identity};
use crate::crd::{ClusterRoleEntry, User, UserSpec};
use crate::errors::ReconcileError;
use crate::labels::MANAGED_BY_USER;
use crate::store::ClusterStore;
use tracing::info;

/// Binding spec of one `CRoles` entry. Scope follows the entry's namespace.
pub(crate) fn cluster_role_binding_spec(entry: &ClusterRoleEntry) -> BindingSpec {
    match &entry.namespace {
        Some(namespace) => {
            BindingSpec::namespaced(namespace, RoleRef::cluster_role(&entry.cluster_role))
        }
        None => BindingSpec::cluster(&entry.cluster_role),
    }
}

/// Every binding a user with `spec` in `namespace` should have.
#[must_use]
pub fn desired_bindings(spec: &UserSpec, namespace: &str) -> Vec<BindingSpec> {
    let cluster_roles = spec.cluster_roles.iter().map(|entry| {
        let binding = cluster_role_binding_spec(entry);
        match &entry.group {
            Some(group) => binding.with_subject(Subject::group(group)),
            None => binding,
        }
    });
    let roles = spec
        .roles
        .iter()
        .map(|role| BindingSpec::namespaced(namespace, RoleRef::role(role)));
    cluster_roles.chain(roles).collect()
}

/// Role references the sweeper must keep for this user.
#[must_use]
pub fn desired_role_refs(name: &str, spec: &UserSpec, desired: &[BindingSpec]) -> DesiredRoleRefs {
    let mut refs = DesiredRoleRefs::from_specs(desired);
    if spec.enabled {
        refs.insert_cluster(restricted_role_name(name));
    }
    refs
}

fn owner(name: &str, namespace: &str) -> BindingOwner {
    BindingOwner {
        subject: Subject::service_account(name, namespace),
        namespace: namespace.to_string(),
        managed_by: MANAGED_BY_USER,
    }
}

fn request<'a>(name: &'a str, namespace: &'a str, spec: &'a UserSpec) -> SubjectRequest<'a> {
    SubjectRequest {
        kind: PrincipalKind::User,
        name,
        namespace,
        enabled: spec.enabled,
        cluster_roles: &spec.cluster_roles,
    }
}

/// Handle a newly created `User`.
///
/// # Errors
///
/// Fails when the identity cannot be ensured or any binding fails.
pub async fn on_create(store: &dyn ClusterStore, user: &User) -> Result<Applied, ReconcileError> {
    let (name, namespace) = object_identity(user)?;
    info!(namespace = %namespace, name = %name, enabled = user.spec.enabled, "Creating user");

    ensure_subject(store, &request(&name, &namespace, &user.spec), Phase::Create).await?;

    let desired = desired_bindings(&user.spec, &namespace);
    reconcile_bindings(store, &owner(&name, &namespace), &desired).await
}

/// Handle a changed `User`: converge identity, sweep orphans, re-apply bindings.
///
/// # Errors
///
/// Fails when the identity cannot be ensured, the sweep cannot list, or any
/// sweep or binding item fails.
pub async fn on_update(store: &dyn ClusterStore, user: &User) -> Result<Applied, ReconcileError> {
    let (name, namespace) = object_identity(user)?;
    info!(namespace = %namespace, name = %name, enabled = user.spec.enabled, "Updating user");

    ensure_subject(store, &request(&name, &namespace, &user.spec), Phase::Update).await?;

    let owner = owner(&name, &namespace);
    let desired = desired_bindings(&user.spec, &namespace);
    let refs = desired_role_refs(&name, &user.spec, &desired);

    let swept = sweep_orphans(store, &owner.subject, &refs).await?;
    let applied = reconcile_bindings(store, &owner, &desired).await;
    merge_failures(&format!("update user {namespace}/{name}"), swept.failures, applied)
}

/// Handle deletion of a `User`.
///
/// # Errors
///
/// Fails when the service account cannot be deleted or any cascade step fails.
pub async fn on_delete(
    store: &dyn ClusterStore,
    user: &User,
) -> Result<CascadeReport, ReconcileError> {
    let (name, namespace) = object_identity(user)?;
    info!(namespace = %namespace, name = %name, "Deleting user");

    let target = CascadeTarget {
        subject: Subject::service_account(&name, &namespace),
        dedicated_namespace: user.spec.enabled.then(|| name.clone()),
        restricted_cluster_role: Some(restricted_role_name(&name)),
        custom_object: None,
    };
    delete_subject(store, &target).await
}

#[cfg(test)]
#[path = "user_tests.rs"]
mod user_tests;
