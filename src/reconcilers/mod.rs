// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation core for identity and access custom resources.
//!
//! Every handler receives the cluster store explicitly and recomputes the
//! whole desired state from the spec on each call. Nothing is cached between
//! reconciliations.
//!
//! # Components
//!
//! - [`bindings`] - converges desired bindings of one subject (create, then patch or replace)
//! - [`subject`] - ensures the identity behind a principal exists
//! - [`sweeper`] - removes bindings the current spec no longer asks for
//! - [`cascade`] - deletes everything derived from a principal
//! - [`retry`] - bounded namespace readiness wait
//!
//! # Handlers
//!
//! - [`user`] - `on_create`, `on_update`, `on_delete` for `User`
//! - [`group`] - `on_create`, `on_update`, `on_delete` for `Group`
//! - [`role`] - apply and delete for `Role` and `ClusterRole`
//!
//! # Concurrency
//!
//! Callers must never run two handlers for the same custom object at the same
//! time. Handlers for different objects may run concurrently and rely on the
//! store's conflict detection plus create-then-overwrite to converge.
//!
//! # Example: Handling a User
//!
//! ```rust,no_run
//! use k8s_iam_operator::crd::User;
//! use k8s_iam_operator::reconcilers::user;
//! use k8s_iam_operator::store::ClusterStore;
//!
//! async fn handle(store: &dyn ClusterStore, object: &User) -> anyhow::Result<()> {
//!     let applied = user::on_update(store, object).await?;
//!     println!("{} bindings applied", applied.len());
//!     Ok(())
//! }
//! ```

pub mod bindings;
pub mod cascade;
pub mod finalizers;
pub mod group;
pub mod retry;
pub mod role;
pub mod status;
pub mod subject;
pub mod sweeper;
pub mod user;

use crate::errors::{ItemFailure, ReconcileError};
use bindings::Applied;
use kube::ResourceExt;

/// Lifecycle event a reconciliation stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

/// Classify a reconciliation into a lifecycle event.
///
/// # Arguments
///
/// * `being_deleted` - whether `metadata.deletionTimestamp` is set
/// * `observed_generation` - the controller's last `status.observedGeneration`
///
/// # Returns
///
/// * `Delete` - the object is being deleted
/// * `Create` - the object was never reconciled successfully
/// * `Update` - any later reconciliation, periodic resyncs included
///
/// # Example
///
/// ```rust
/// use k8s_iam_operator::reconcilers::{classify_event, EventKind};
///
/// assert_eq!(classify_event(false, None), EventKind::Create);
/// assert_eq!(classify_event(false, Some(3)), EventKind::Update);
/// assert_eq!(classify_event(true, Some(3)), EventKind::Delete);
/// ```
#[must_use]
pub fn classify_event(being_deleted: bool, observed_generation: Option<i64>) -> EventKind {
    match (being_deleted, observed_generation) {
        (true, _) => EventKind::Delete,
        (false, None) => EventKind::Create,
        (false, Some(_)) => EventKind::Update,
    }
}

/// Name and namespace of a namespaced custom object.
///
/// # Errors
///
/// Returns [`ReconcileError::InvalidResource`] when the object has no namespace.
pub fn object_identity<K: ResourceExt>(resource: &K) -> Result<(String, String), ReconcileError> {
    let name = resource.name_any();
    let namespace = resource
        .namespace()
        .ok_or_else(|| ReconcileError::InvalidResource(format!("{name} has no namespace")))?;
    Ok((name, namespace))
}

/// Fold sweep failures into the outcome of the binding pass that followed.
pub(crate) fn merge_failures(
    operation: &str,
    mut failures: Vec<ItemFailure>,
    applied: Result<Applied, ReconcileError>,
) -> Result<Applied, ReconcileError> {
    match applied {
        Ok(applied) if failures.is_empty() => Ok(applied),
        Ok(_) => Err(ReconcileError::Partial {
            operation: operation.to_string(),
            failures,
        }),
        Err(ReconcileError::Partial {
            failures: binding_failures,
            ..
        }) => {
            failures.extend(binding_failures);
            Err(ReconcileError::Partial {
                operation: operation.to_string(),
                failures,
            })
        }
        Err(e) => Err(e),
    }
}
