// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status helpers for the IAM custom resources.
//!
//! Every kind shares [`IamStatus`]. After each reconciliation the controller
//! writes one of two shapes:
//!
//! - success: `phase: Ready`, `observedGeneration` set to the reconciled
//!   generation and a `Ready=True` condition
//! - failure: `phase: Failed`, the previous `observedGeneration` kept and a
//!   `Ready=False` condition carrying the error
//!
//! Keeping `observedGeneration` unset until the first success is what makes the
//! next attempt classify as a create again.
//!
//! # Example
//!
//! ```rust,no_run
//! use k8s_iam_operator::reconcilers::status::create_condition;
//!
//! let condition = create_condition("Ready", "True", "Reconciled", "3 binding(s) applied");
//! assert_eq!(condition.status, "True");
//! ```

use crate::constants::{PHASE_FAILED, PHASE_READY};
use crate::crd::{Condition, Group, IamClusterRole, IamRole, IamStatus, User};
use crate::errors::ReconcileError;
use crate::store::kube_store::{map_kube_error, patch_params};
use chrono::Utc;
use kube::api::Patch;
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use serde_json::json;
use tracing::debug;

/// Condition type reported by every kind.
pub const CONDITION_READY: &str = "Ready";

/// Reason of a successful reconciliation.
pub const REASON_RECONCILED: &str = "Reconciled";

/// Reason of a failed reconciliation.
pub const REASON_RECONCILE_FAILED: &str = "ReconcileFailed";

/// Reason of a readiness wait that ran out of attempts.
pub const REASON_NOT_READY: &str = "DependencyNotReady";

/// Access to the shared status of the IAM kinds.
pub trait IamStatusExt {
    fn iam_status(&self) -> Option<&IamStatus>;

    /// `status.observedGeneration`, `None` until the first successful reconciliation.
    fn observed_generation(&self) -> Option<i64> {
        self.iam_status().and_then(|s| s.observed_generation)
    }
}

macro_rules! impl_iam_status {
    ($($kind:ty),+) => {
        $(impl IamStatusExt for $kind {
            fn iam_status(&self) -> Option<&IamStatus> {
                self.status.as_ref()
            }
        })+
    };
}

impl_iam_status!(User, Group, IamRole, IamClusterRole);

/// Create a new condition with the current timestamp.
#[must_use]
pub fn create_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_transition_time: Some(Utc::now().to_rfc3339()),
    }
}

/// Find a condition by type.
#[must_use]
pub fn find_condition<'a>(
    conditions: &'a [Condition],
    condition_type: &str,
) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Update or add a condition in place.
///
/// `lastTransitionTime` is kept when the status value does not change.
pub fn update_condition_in_memory(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.r#type == condition_type) {
        let last_transition_time = if existing.status == status {
            existing
                .last_transition_time
                .clone()
                .unwrap_or_else(|| Utc::now().to_rfc3339())
        } else {
            Utc::now().to_rfc3339()
        };

        existing.status = status.to_string();
        existing.reason = Some(reason.to_string());
        existing.message = Some(message.to_string());
        existing.last_transition_time = Some(last_transition_time);
    } else {
        conditions.push(create_condition(condition_type, status, reason, message));
    }
}

/// Status after a successful reconciliation of `generation`.
#[must_use]
pub fn ready_status(existing: Option<&IamStatus>, generation: Option<i64>, message: &str) -> IamStatus {
    let mut status = existing.cloned().unwrap_or_default();
    update_condition_in_memory(
        &mut status.conditions,
        CONDITION_READY,
        "True",
        REASON_RECONCILED,
        message,
    );
    status.phase = Some(PHASE_READY.to_string());
    status.observed_generation = generation;
    status.last_reconcile_time = Some(Utc::now().to_rfc3339());
    status
}

/// Status after a failed reconciliation. `observedGeneration` is left as it was.
#[must_use]
pub fn failed_status(existing: Option<&IamStatus>, error: &ReconcileError) -> IamStatus {
    let mut status = existing.cloned().unwrap_or_default();
    let reason = if error.is_transient() {
        REASON_NOT_READY
    } else {
        REASON_RECONCILE_FAILED
    };
    update_condition_in_memory(
        &mut status.conditions,
        CONDITION_READY,
        "False",
        reason,
        &error.to_string(),
    );
    status.phase = Some(PHASE_FAILED.to_string());
    status.last_reconcile_time = Some(Utc::now().to_rfc3339());
    status
}

/// Write `status` to the status subresource of `resource`.
///
/// # Errors
///
/// Returns [`ReconcileError::Store`] if the patch fails.
pub async fn patch_status<K>(
    client: &Client,
    resource: &K,
    status: &IamStatus,
) -> Result<(), ReconcileError>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();
    let api: Api<K> = Api::namespaced(client.clone(), &namespace);
    let patch = json!({ "status": status });

    api.patch_status(&name, &patch_params(), &Patch::Merge(&patch))
        .await
        .map_err(|e| {
            ReconcileError::store(
                "patch status",
                map_kube_error(&e, &K::kind(&()), &format!("{namespace}/{name}")),
            )
        })?;

    debug!(
        kind = %K::kind(&()),
        namespace = %namespace,
        name = %name,
        phase = ?status.phase,
        "Status updated"
    );
    Ok(())
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
