// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Binding reconciler.
//!
//! Turns a set of desired [`BindingSpec`]s for one subject into `RoleBinding`
//! and `ClusterRoleBinding` objects. Every binding is addressed only by its
//! deterministic name `{subject}-{namespace|clusterMarker}-{roleRef}`:
//!
//! 1. Create the binding.
//! 2. On conflict, overwrite it in place: patch a `RoleBinding`, replace a
//!    `ClusterRoleBinding`. Subjects added by other actors are lost.
//! 3. When the existing binding points at a different `roleRef`, delete and
//!    recreate it because `roleRef` is immutable.
//! 4. Any other failure is recorded and the remaining items still run.
//!
//! Scope is decided by the presence of a namespace on the source entry, never
//! by the kind of the referenced role.

use crate::constants::{
    KIND_CLUSTER_ROLE, KIND_CLUSTER_ROLE_BINDING, KIND_GROUP, KIND_ROLE, KIND_ROLE_BINDING,
    KIND_SERVICE_ACCOUNT, RBAC_API_GROUP,
};
use crate::errors::{ItemFailure, ReconcileError, StoreError};
use crate::labels::managed_labels;
use crate::metrics;
use crate::store::ClusterStore;
use k8s_openapi::api::rbac::v1::{self as rbac, ClusterRoleBinding, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info, warn};

/// A principal that can be bound to a permission set.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Subject {
    ServiceAccount { name: String, namespace: String },
    Group { name: String },
}

impl Subject {
    pub fn service_account(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::ServiceAccount {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::Group { name: name.into() }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::ServiceAccount { name, .. } | Self::Group { name } => name,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ServiceAccount { .. } => KIND_SERVICE_ACCOUNT,
            Self::Group { .. } => KIND_GROUP,
        }
    }

    /// Native RBAC form of the subject.
    #[must_use]
    pub fn to_rbac(&self) -> rbac::Subject {
        match self {
            Self::ServiceAccount { name, namespace } => rbac::Subject {
                api_group: None,
                kind: KIND_SERVICE_ACCOUNT.to_string(),
                name: name.clone(),
                namespace: Some(namespace.clone()),
            },
            Self::Group { name } => rbac::Subject {
                api_group: Some(RBAC_API_GROUP.to_string()),
                kind: KIND_GROUP.to_string(),
                name: name.clone(),
                namespace: None,
            },
        }
    }

    /// Identity match: kind and name, plus namespace for service accounts.
    #[must_use]
    pub fn matches(&self, other: &rbac::Subject) -> bool {
        if other.kind != self.kind() || other.name != self.name() {
            return false;
        }
        match self {
            Self::ServiceAccount { namespace, .. } => {
                other.namespace.as_deref() == Some(namespace.as_str())
            }
            Self::Group { .. } => true,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceAccount { name, namespace } => {
                write!(f, "ServiceAccount:{namespace}/{name}")
            }
            Self::Group { name } => write!(f, "Group:{name}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RoleRefKind {
    Role,
    ClusterRole,
}

impl RoleRefKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Role => KIND_ROLE,
            Self::ClusterRole => KIND_CLUSTER_ROLE,
        }
    }
}

/// Reference to a permission set.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct RoleRef {
    pub kind: RoleRefKind,
    pub name: String,
}

impl RoleRef {
    pub fn role(name: impl Into<String>) -> Self {
        Self {
            kind: RoleRefKind::Role,
            name: name.into(),
        }
    }

    pub fn cluster_role(name: impl Into<String>) -> Self {
        Self {
            kind: RoleRefKind::ClusterRole,
            name: name.into(),
        }
    }

    #[must_use]
    pub fn to_rbac(&self) -> rbac::RoleRef {
        rbac::RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: self.kind.as_str().to_string(),
            name: self.name.clone(),
        }
    }
}

/// One desired binding.
///
/// Built only through [`BindingSpec::namespaced`] and [`BindingSpec::cluster`],
/// so a cluster-scoped binding always references a `ClusterRole`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindingSpec {
    extra_subjects: Vec<Subject>,
    role_ref: RoleRef,
    namespace: Option<String>,
}

impl BindingSpec {
    /// A `RoleBinding` in `namespace` referencing a `Role` or a `ClusterRole`.
    pub fn namespaced(namespace: impl Into<String>, role_ref: RoleRef) -> Self {
        Self {
            extra_subjects: Vec::new(),
            role_ref,
            namespace: Some(namespace.into()),
        }
    }

    /// A `ClusterRoleBinding` referencing a `ClusterRole`.
    pub fn cluster(cluster_role: impl Into<String>) -> Self {
        Self {
            extra_subjects: Vec::new(),
            role_ref: RoleRef::cluster_role(cluster_role),
            namespace: None,
        }
    }

    /// Add a subject bound next to the owning subject.
    #[must_use]
    pub fn with_subject(mut self, subject: Subject) -> Self {
        if !self.extra_subjects.contains(&subject) {
            self.extra_subjects.push(subject);
        }
        self
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    #[must_use]
    pub fn role_ref(&self) -> &RoleRef {
        &self.role_ref
    }

    #[must_use]
    pub fn extra_subjects(&self) -> &[Subject] {
        &self.extra_subjects
    }
}

/// The subject whose bindings are reconciled, with its naming context.
#[derive(Clone, Debug)]
pub struct BindingOwner {
    pub subject: Subject,
    /// Namespace of the owning custom object, used as the cluster marker in names
    pub namespace: String,
    /// One of the `MANAGED_BY_*` label values
    pub managed_by: &'static str,
}

impl BindingOwner {
    /// Deterministic name of the binding for `spec`.
    #[must_use]
    pub fn binding_name(&self, spec: &BindingSpec) -> String {
        let scope = spec.namespace().unwrap_or(&self.namespace);
        format!("{}-{}-{}", self.subject.name(), scope, spec.role_ref().name)
    }

    fn subjects(&self, spec: &BindingSpec) -> Vec<rbac::Subject> {
        let mut subjects = vec![self.subject.to_rbac()];
        subjects.extend(
            spec.extra_subjects()
                .iter()
                .filter(|s| **s != self.subject)
                .map(Subject::to_rbac),
        );
        subjects
    }

    fn metadata(&self, name: &str, namespace: Option<&str>) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: namespace.map(str::to_string),
            labels: Some(managed_labels(self.managed_by, self.subject.name())),
            ..ObjectMeta::default()
        }
    }

    /// Native `RoleBinding` for a namespaced spec.
    #[must_use]
    pub fn role_binding(&self, spec: &BindingSpec, namespace: &str) -> RoleBinding {
        RoleBinding {
            metadata: self.metadata(&self.binding_name(spec), Some(namespace)),
            role_ref: spec.role_ref().to_rbac(),
            subjects: Some(self.subjects(spec)),
        }
    }

    /// Native `ClusterRoleBinding` for a cluster-scoped spec.
    #[must_use]
    pub fn cluster_role_binding(&self, spec: &BindingSpec) -> ClusterRoleBinding {
        ClusterRoleBinding {
            metadata: self.metadata(&self.binding_name(spec), None),
            role_ref: spec.role_ref().to_rbac(),
            subjects: Some(self.subjects(spec)),
        }
    }
}

/// How one binding was converged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    Recreated,
}

/// Bindings applied by one [`reconcile_bindings`] pass, as `Kind namespace/name`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Applied {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub recreated: Vec<String>,
}

impl Applied {
    fn record(&mut self, item: String, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Created => self.created.push(item),
            ApplyOutcome::Updated => self.updated.push(item),
            ApplyOutcome::Recreated => self.recreated.push(item),
        }
    }

    /// Total number of bindings applied.
    #[must_use]
    pub fn len(&self) -> usize {
        self.created.len() + self.updated.len() + self.recreated.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Create or overwrite one `RoleBinding`.
pub(crate) async fn apply_role_binding(
    store: &dyn ClusterStore,
    namespace: &str,
    binding: &RoleBinding,
) -> Result<ApplyOutcome, StoreError> {
    let name = binding.metadata.name.clone().unwrap_or_default();

    match store.create_role_binding(namespace, binding).await {
        Ok(_) => {
            metrics::record_resource_created(KIND_ROLE_BINDING);
            return Ok(ApplyOutcome::Created);
        }
        Err(e) if e.is_conflict() => {}
        Err(e) => return Err(e),
    }

    let existing = match store.get_role_binding(namespace, &name).await {
        Ok(existing) => existing,
        Err(e) if e.is_not_found() => {
            store.create_role_binding(namespace, binding).await?;
            metrics::record_resource_created(KIND_ROLE_BINDING);
            return Ok(ApplyOutcome::Created);
        }
        Err(e) => return Err(e),
    };

    if existing.role_ref != binding.role_ref {
        debug!(
            namespace = %namespace,
            name = %name,
            "RoleBinding roleRef changed, recreating"
        );
        ignore_not_found(store.delete_role_binding(namespace, &name).await)?;
        store.create_role_binding(namespace, binding).await?;
        metrics::record_resource_deleted(KIND_ROLE_BINDING);
        metrics::record_resource_created(KIND_ROLE_BINDING);
        return Ok(ApplyOutcome::Recreated);
    }

    store.patch_role_binding(namespace, binding).await?;
    metrics::record_resource_updated(KIND_ROLE_BINDING);
    Ok(ApplyOutcome::Updated)
}

/// Create or replace one `ClusterRoleBinding`.
pub(crate) async fn apply_cluster_role_binding(
    store: &dyn ClusterStore,
    binding: &ClusterRoleBinding,
) -> Result<ApplyOutcome, StoreError> {
    let name = binding.metadata.name.clone().unwrap_or_default();

    match store.create_cluster_role_binding(binding).await {
        Ok(_) => {
            metrics::record_resource_created(KIND_CLUSTER_ROLE_BINDING);
            return Ok(ApplyOutcome::Created);
        }
        Err(e) if e.is_conflict() => {}
        Err(e) => return Err(e),
    }

    let existing = match store.get_cluster_role_binding(&name).await {
        Ok(existing) => existing,
        Err(e) if e.is_not_found() => {
            store.create_cluster_role_binding(binding).await?;
            metrics::record_resource_created(KIND_CLUSTER_ROLE_BINDING);
            return Ok(ApplyOutcome::Created);
        }
        Err(e) => return Err(e),
    };

    if existing.role_ref != binding.role_ref {
        debug!(name = %name, "ClusterRoleBinding roleRef changed, recreating");
        ignore_not_found(store.delete_cluster_role_binding(&name).await)?;
        store.create_cluster_role_binding(binding).await?;
        metrics::record_resource_deleted(KIND_CLUSTER_ROLE_BINDING);
        metrics::record_resource_created(KIND_CLUSTER_ROLE_BINDING);
        return Ok(ApplyOutcome::Recreated);
    }

    store.replace_cluster_role_binding(binding).await?;
    metrics::record_resource_updated(KIND_CLUSTER_ROLE_BINDING);
    Ok(ApplyOutcome::Updated)
}

/// Treat a `NotFound` outcome as success.
pub(crate) fn ignore_not_found(result: Result<(), StoreError>) -> Result<(), StoreError> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

/// Converge every desired binding of `owner`.
///
/// Items are independent: a failing binding is recorded and the rest still
/// run. Two specs that map onto the same object are rejected after the first.
///
/// # Errors
///
/// Returns [`ReconcileError::Partial`] listing every failed item when at least
/// one binding could not be applied. The successful ones stay applied.
pub async fn reconcile_bindings(
    store: &dyn ClusterStore,
    owner: &BindingOwner,
    desired: &[BindingSpec],
) -> Result<Applied, ReconcileError> {
    let mut applied = Applied::default();
    let mut failures = Vec::new();
    let mut seen = BTreeSet::new();

    for spec in desired {
        let name = owner.binding_name(spec);
        let (item, result) = match spec.namespace() {
            Some(namespace) => {
                let item = format!("{KIND_ROLE_BINDING} {namespace}/{name}");
                if !seen.insert(item.clone()) {
                    failures.push(collision(item, spec));
                    continue;
                }
                let binding = owner.role_binding(spec, namespace);
                (item, apply_role_binding(store, namespace, &binding).await)
            }
            None => {
                let item = format!("{KIND_CLUSTER_ROLE_BINDING} {name}");
                if !seen.insert(item.clone()) {
                    failures.push(collision(item, spec));
                    continue;
                }
                let binding = owner.cluster_role_binding(spec);
                (item, apply_cluster_role_binding(store, &binding).await)
            }
        };

        match result {
            Ok(outcome) => {
                debug!(subject = %owner.subject, binding = %item, ?outcome, "Binding applied");
                applied.record(item, outcome);
            }
            Err(e) => {
                warn!(subject = %owner.subject, binding = %item, error = %e, "Failed to apply binding");
                failures.push(ItemFailure {
                    item,
                    reason: e.to_string(),
                });
            }
        }
    }

    if failures.is_empty() {
        info!(
            subject = %owner.subject,
            created = applied.created.len(),
            updated = applied.updated.len(),
            recreated = applied.recreated.len(),
            "Bindings reconciled"
        );
        Ok(applied)
    } else {
        Err(ReconcileError::Partial {
            operation: format!("reconcile bindings of {}", owner.subject),
            failures,
        })
    }
}

fn collision(item: String, spec: &BindingSpec) -> ItemFailure {
    ItemFailure {
        item,
        reason: format!(
            "name collides with an earlier binding; {} {} skipped",
            spec.role_ref().kind.as_str(),
            spec.role_ref().name
        ),
    }
}

#[cfg(test)]
#[path = "bindings_tests.rs"]
mod bindings_tests;
