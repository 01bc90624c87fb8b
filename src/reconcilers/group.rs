// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `Group` handlers.
//!
//! Groups have no identity object; they exist only as `Group` subjects on
//! bindings. Deleting a group also deletes the custom object itself.

use super::bindings::{reconcile_bindings, Applied, BindingOwner, BindingSpec, RoleRef, Subject};
use super::cascade::{delete_subject, CascadeReport, CascadeTarget};
use super::subject::{ensure_subject, Phase, PrincipalKind, SubjectRequest};
use super::sweeper::{sweep_orphans, DesiredRoleRefs};
use super::user::cluster_role_binding_spec;
use super::{merge_failures, object_identity};
use crate::constants::{API_GROUP, API_VERSION, KIND_GROUP, PLURAL_GROUPS};
use crate::crd::{Group, GroupSpec};
use crate::errors::ReconcileError;
use crate::labels::MANAGED_BY_GROUP;
use crate::store::{ClusterStore, CustomObjectRef};
use tracing::info;

/// Every binding a group with `spec` in `namespace` should have.
#[must_use]
pub fn desired_bindings(spec: &GroupSpec, namespace: &str) -> Vec<BindingSpec> {
    spec.cluster_roles
        .iter()
        .map(cluster_role_binding_spec)
        .chain(
            spec.roles
                .iter()
                .map(|role| BindingSpec::namespaced(namespace, RoleRef::role(role))),
        )
        .collect()
}

fn owner(name: &str, namespace: &str) -> BindingOwner {
    BindingOwner {
        subject: Subject::group(name),
        namespace: namespace.to_string(),
        managed_by: MANAGED_BY_GROUP,
    }
}

async fn ensure_group(
    store: &dyn ClusterStore,
    name: &str,
    namespace: &str,
    spec: &GroupSpec,
    phase: Phase,
) -> Result<(), ReconcileError> {
    let request = SubjectRequest {
        kind: PrincipalKind::Group,
        name,
        namespace,
        enabled: false,
        cluster_roles: &spec.cluster_roles,
    };
    ensure_subject(store, &request, phase).await
}

/// Handle a newly created `Group`.
///
/// # Errors
///
/// Returns [`ReconcileError::Partial`] when any binding fails.
pub async fn on_create(store: &dyn ClusterStore, group: &Group) -> Result<Applied, ReconcileError> {
    let (name, namespace) = object_identity(group)?;
    info!(namespace = %namespace, name = %name, "Creating group");

    ensure_group(store, &name, &namespace, &group.spec, Phase::Create).await?;

    let desired = desired_bindings(&group.spec, &namespace);
    reconcile_bindings(store, &owner(&name, &namespace), &desired).await
}

/// Handle a changed `Group`: sweep orphans, then re-apply bindings.
///
/// # Errors
///
/// Fails when the sweep cannot list or any sweep or binding item fails.
pub async fn on_update(store: &dyn ClusterStore, group: &Group) -> Result<Applied, ReconcileError> {
    let (name, namespace) = object_identity(group)?;
    info!(namespace = %namespace, name = %name, "Updating group");

    ensure_group(store, &name, &namespace, &group.spec, Phase::Update).await?;

    let owner = owner(&name, &namespace);
    let desired = desired_bindings(&group.spec, &namespace);
    let refs = DesiredRoleRefs::from_specs(&desired);

    let swept = sweep_orphans(store, &owner.subject, &refs).await?;
    let applied = reconcile_bindings(store, &owner, &desired).await;
    merge_failures(&format!("update group {namespace}/{name}"), swept.failures, applied)
}

/// Handle deletion of a `Group`.
///
/// # Errors
///
/// Returns [`ReconcileError::Partial`] when any cascade step fails.
pub async fn on_delete(
    store: &dyn ClusterStore,
    group: &Group,
) -> Result<CascadeReport, ReconcileError> {
    let (name, namespace) = object_identity(group)?;
    info!(namespace = %namespace, name = %name, "Deleting group");

    let target = CascadeTarget {
        subject: Subject::group(&name),
        dedicated_namespace: None,
        restricted_cluster_role: None,
        custom_object: Some(CustomObjectRef {
            group: API_GROUP.to_string(),
            version: API_VERSION.to_string(),
            kind: KIND_GROUP.to_string(),
            plural: PLURAL_GROUPS.to_string(),
            namespace,
            name,
        }),
    };
    delete_subject(store, &target).await
}

#[cfg(test)]
#[path = "group_tests.rs"]
mod group_tests;
