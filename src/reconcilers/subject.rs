// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Subject lifecycle manager.
//!
//! Makes sure the identity behind a principal exists. A `User` is backed by a
//! `ServiceAccount` in its namespace; an enabled user also gets:
//!
//! - a long-lived token secret `{user}-token`
//! - a restricted namespace-visibility policy (`ClusterRole` plus binding)
//! - a dedicated namespace named after the user
//! - a kubeconfig secret `{user}-cluster-config` in that namespace
//!
//! Disabling a user on update removes the dedicated namespace (and with it
//! everything inside) and the restricted `ClusterRole`. A namespace that
//! does not carry this user's managed labels is never deleted.
//!
//! A `Group` is virtual: nothing is created for it here.
//!
//! Every step is gating. The first failure aborts the remaining steps.

use super::bindings::{apply_cluster_role_binding, RoleRef, Subject};
use super::role::upsert_cluster_role;
use crate::constants::{
    DEFAULT_NAMESPACE, KIND_CLUSTER_ROLE, KIND_NAMESPACE, KIND_SECRET, KIND_SERVICE_ACCOUNT,
    RESTRICTED_BINDING_SUFFIX, RESTRICTED_ROLE_SUFFIX, SECRET_TYPE_SA_TOKEN,
    SERVICE_ACCOUNT_NAME_ANNOTATION,
};
use crate::crd::ClusterRoleEntry;
use crate::errors::{ReconcileError, StoreError};
use crate::kubeconfig::{publish_kubeconfig, token_secret_name};
use crate::labels::{is_managed_by, managed_labels, MANAGED_BY_GROUP, MANAGED_BY_USER};
use crate::metrics;
use crate::store::ClusterStore;
use k8s_openapi::api::core::v1::{Namespace, Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Kind of principal behind a custom resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrincipalKind {
    User,
    Group,
}

impl PrincipalKind {
    /// `app.kubernetes.io/managed-by` value of objects derived from this principal.
    #[must_use]
    pub fn managed_by(self) -> &'static str {
        match self {
            Self::User => MANAGED_BY_USER,
            Self::Group => MANAGED_BY_GROUP,
        }
    }
}

/// Which lifecycle event is being handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Create,
    Update,
}

/// Input of [`ensure_subject`].
#[derive(Clone, Copy, Debug)]
pub struct SubjectRequest<'a> {
    pub kind: PrincipalKind,
    pub name: &'a str,
    /// Namespace of the custom object
    pub namespace: &'a str,
    pub enabled: bool,
    pub cluster_roles: &'a [ClusterRoleEntry],
}

impl SubjectRequest<'_> {
    /// The binding subject this principal is known as.
    #[must_use]
    pub fn subject(&self) -> Subject {
        match self.kind {
            PrincipalKind::User => Subject::service_account(self.name, self.namespace),
            PrincipalKind::Group => Subject::group(self.name),
        }
    }
}

/// Name of the restricted namespace-visibility `ClusterRole` of `user`.
#[must_use]
pub fn restricted_role_name(user: &str) -> String {
    format!("{user}{RESTRICTED_ROLE_SUFFIX}")
}

/// Name of the binding attaching `user` to its restricted `ClusterRole`.
#[must_use]
pub fn restricted_binding_name(user: &str) -> String {
    format!("{user}{RESTRICTED_BINDING_SUFFIX}")
}

/// Namespaces a restricted user may see: every namespace named in its
/// `CRoles`, `default` and its dedicated namespace. Sorted and de-duplicated.
#[must_use]
pub fn visible_namespaces(user: &str, cluster_roles: &[ClusterRoleEntry]) -> Vec<String> {
    cluster_roles
        .iter()
        .filter_map(|entry| entry.namespace.clone())
        .chain([DEFAULT_NAMESPACE.to_string(), user.to_string()])
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Ensure the identity of the principal exists and matches `enabled`.
///
/// # Errors
///
/// Returns the first failing step; later steps do not run.
pub async fn ensure_subject(
    store: &dyn ClusterStore,
    request: &SubjectRequest<'_>,
    phase: Phase,
) -> Result<(), ReconcileError> {
    match request.kind {
        PrincipalKind::Group => {
            debug!(group = %request.name, "Groups have no identity object");
            Ok(())
        }
        PrincipalKind::User => {
            ensure_service_account(store, request.name, request.namespace, phase).await?;
            if request.enabled {
                provision_credentials(store, request).await
            } else if phase == Phase::Update {
                revoke_credentials(store, request.name).await
            } else {
                Ok(())
            }
        }
    }
}

async fn ensure_service_account(
    store: &dyn ClusterStore,
    name: &str,
    namespace: &str,
    phase: Phase,
) -> Result<(), ReconcileError> {
    let service_account = ServiceAccount {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(managed_labels(MANAGED_BY_USER, name)),
            ..ObjectMeta::default()
        },
        automount_service_account_token: Some(true),
        ..ServiceAccount::default()
    };

    let result = match phase {
        Phase::Create => match store.create_service_account(namespace, &service_account).await {
            Err(e) if e.is_conflict() => store
                .patch_service_account(namespace, &service_account)
                .await
                .map(|_| metrics::record_resource_updated(KIND_SERVICE_ACCOUNT)),
            other => other.map(|_| metrics::record_resource_created(KIND_SERVICE_ACCOUNT)),
        },
        Phase::Update => match store.patch_service_account(namespace, &service_account).await {
            Err(e) if e.is_not_found() => store
                .create_service_account(namespace, &service_account)
                .await
                .map(|_| metrics::record_resource_created(KIND_SERVICE_ACCOUNT)),
            other => other.map(|_| metrics::record_resource_updated(KIND_SERVICE_ACCOUNT)),
        },
    };

    result.map_err(|e| ReconcileError::store("ensure service account", e))?;
    info!(namespace = %namespace, name = %name, "ServiceAccount ensured");
    Ok(())
}

async fn provision_credentials(
    store: &dyn ClusterStore,
    request: &SubjectRequest<'_>,
) -> Result<(), ReconcileError> {
    let name = request.name;

    create_token_secret(store, name, request.namespace).await?;
    apply_restricted_access_policy(store, name, request.namespace, request.cluster_roles).await?;
    ensure_dedicated_namespace(store, name).await?;
    publish_kubeconfig(store, name, request.namespace).await?;

    info!(user = %name, "User credentials provisioned");
    Ok(())
}

async fn create_token_secret(
    store: &dyn ClusterStore,
    name: &str,
    namespace: &str,
) -> Result<(), ReconcileError> {
    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(token_secret_name(name)),
            namespace: Some(namespace.to_string()),
            labels: Some(managed_labels(MANAGED_BY_USER, name)),
            annotations: Some(BTreeMap::from([(
                SERVICE_ACCOUNT_NAME_ANNOTATION.to_string(),
                name.to_string(),
            )])),
            ..ObjectMeta::default()
        },
        type_: Some(SECRET_TYPE_SA_TOKEN.to_string()),
        ..Secret::default()
    };

    match store.create_secret(namespace, &secret).await {
        Ok(_) => {
            metrics::record_resource_created(KIND_SECRET);
            Ok(())
        }
        Err(e) if e.is_conflict() => Ok(()),
        Err(e) => Err(ReconcileError::store("create token secret", e)),
    }
}

/// Limit namespace visibility of `user` to [`visible_namespaces`].
///
/// # Errors
///
/// Returns [`ReconcileError::Store`] when the `ClusterRole` or its binding
/// cannot be applied.
pub async fn apply_restricted_access_policy(
    store: &dyn ClusterStore,
    user: &str,
    user_namespace: &str,
    cluster_roles: &[ClusterRoleEntry],
) -> Result<(), ReconcileError> {
    let role_name = restricted_role_name(user);
    let cluster_role = ClusterRole {
        metadata: ObjectMeta {
            name: Some(role_name.clone()),
            labels: Some(managed_labels(MANAGED_BY_USER, user)),
            ..ObjectMeta::default()
        },
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec![String::new()]),
            resources: Some(vec!["namespaces".to_string()]),
            verbs: vec!["get".to_string(), "watch".to_string(), "list".to_string()],
            resource_names: Some(visible_namespaces(user, cluster_roles)),
            non_resource_urls: None,
        }]),
        aggregation_rule: None,
    };

    upsert_cluster_role(store, &cluster_role)
        .await
        .map_err(|e| ReconcileError::store("apply restricted cluster role", e))?;

    let subject = Subject::service_account(user, user_namespace);
    let binding = ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(restricted_binding_name(user)),
            labels: Some(managed_labels(MANAGED_BY_USER, user)),
            ..ObjectMeta::default()
        },
        role_ref: RoleRef::cluster_role(role_name).to_rbac(),
        subjects: Some(vec![subject.to_rbac()]),
    };

    apply_cluster_role_binding(store, &binding)
        .await
        .map_err(|e| ReconcileError::store("apply restricted cluster role binding", e))?;

    debug!(user = %user, "Restricted access policy applied");
    Ok(())
}

async fn ensure_dedicated_namespace(
    store: &dyn ClusterStore,
    name: &str,
) -> Result<(), ReconcileError> {
    match store.get_namespace(name).await {
        Ok(_) => return Ok(()),
        Err(e) if e.is_not_found() => {}
        Err(e) => {
            warn!(namespace = %name, error = %e, "Failed to read dedicated namespace, continuing");
            return Ok(());
        }
    }

    let namespace = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(managed_labels(MANAGED_BY_USER, name)),
            ..ObjectMeta::default()
        },
        ..Namespace::default()
    };

    match store.create_namespace(&namespace).await {
        Ok(_) => {
            metrics::record_resource_created(KIND_NAMESPACE);
            info!(namespace = %name, "Dedicated namespace created");
            Ok(())
        }
        Err(e) if e.is_conflict() => Ok(()),
        Err(e) => Err(ReconcileError::store("create dedicated namespace", e)),
    }
}

/// Delete the namespace named after `user` if the operator created it for that user.
///
/// A namespace without the user's managed labels is left in place. Returns
/// whether a namespace was deleted.
pub(crate) async fn delete_dedicated_namespace(
    store: &dyn ClusterStore,
    user: &str,
) -> Result<bool, StoreError> {
    let namespace = match store.get_namespace(user).await {
        Ok(namespace) => namespace,
        Err(e) if e.is_not_found() => return Ok(false),
        Err(e) => return Err(e),
    };

    if !is_managed_by(namespace.labels(), MANAGED_BY_USER, user) {
        info!(namespace = %user, "Namespace not created for this user, leaving it in place");
        return Ok(false);
    }

    match store.delete_namespace(user).await {
        Ok(()) => {
            info!(namespace = %user, "Dedicated namespace deleted");
            Ok(true)
        }
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

async fn revoke_credentials(store: &dyn ClusterStore, name: &str) -> Result<(), ReconcileError> {
    if delete_dedicated_namespace(store, name)
        .await
        .map_err(|e| ReconcileError::store("delete dedicated namespace", e))?
    {
        metrics::record_resource_deleted(KIND_NAMESPACE);
    }

    match store.delete_cluster_role(&restricted_role_name(name)).await {
        Ok(()) => metrics::record_resource_deleted(KIND_CLUSTER_ROLE),
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(ReconcileError::store("delete restricted cluster role", e)),
    }

    info!(user = %name, "User credentials revoked");
    Ok(())
}

#[cfg(test)]
#[path = "subject_tests.rs"]
mod subject_tests;
