// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label and finalizer constants used across all reconcilers.
//!
//! This module defines standard Kubernetes labels and operator-specific labels
//! to ensure consistency across all objects created by the controller.

use std::collections::BTreeMap;

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the name of a higher-level application this one is part of
pub const K8S_PART_OF: &str = "app.kubernetes.io/part-of";

// ============================================================================
// Kubernetes Standard Label Values
// ============================================================================

/// Value for `app.kubernetes.io/part-of` indicating this object is part of the IAM operator
pub const PART_OF_IAM: &str = "k8s-iam-operator";

/// Value for `app.kubernetes.io/managed-by` on objects derived from a `User`
pub const MANAGED_BY_USER: &str = "User";

/// Value for `app.kubernetes.io/managed-by` on objects derived from a `Group`
pub const MANAGED_BY_GROUP: &str = "Group";

/// Value for `app.kubernetes.io/managed-by` on native roles derived from a custom role
pub const MANAGED_BY_ROLE: &str = "Role";

/// Value for `app.kubernetes.io/managed-by` on native cluster roles derived from a custom cluster role
pub const MANAGED_BY_CLUSTER_ROLE: &str = "ClusterRole";

// ============================================================================
// Operator-Specific Labels
// ============================================================================

/// Label naming the custom object an operator-created object was derived from
pub const IAM_OWNER_LABEL: &str = "k8sio.auth/owner";

// ============================================================================
// Finalizers
// ============================================================================

/// Finalizer guarding the deletion cascade of a `User`
pub const FINALIZER_USER: &str = "users.k8sio.auth/finalizer";

/// Finalizer guarding the deletion cascade of a `Group`
pub const FINALIZER_GROUP: &str = "groups.k8sio.auth/finalizer";

/// Finalizer guarding the deletion of the native `Role`
pub const FINALIZER_ROLE: &str = "roles.k8sio.auth/finalizer";

/// Finalizer guarding the deletion of the native `ClusterRole`
pub const FINALIZER_CLUSTER_ROLE: &str = "clusterroles.k8sio.auth/finalizer";

/// Build the label set stamped on every object the operator creates.
///
/// # Arguments
///
/// * `managed_by` - One of the `MANAGED_BY_*` values
/// * `owner` - Name of the custom object the object was derived from
#[must_use]
pub fn managed_labels(managed_by: &str, owner: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (K8S_MANAGED_BY.to_string(), managed_by.to_string()),
        (K8S_PART_OF.to_string(), PART_OF_IAM.to_string()),
        (IAM_OWNER_LABEL.to_string(), owner.to_string()),
    ])
}

/// Whether `labels` mark an object as created by the operator for `owner`.
#[must_use]
pub fn is_managed_by(labels: &BTreeMap<String, String>, managed_by: &str, owner: &str) -> bool {
    managed_labels(managed_by, owner)
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}

#[cfg(test)]
#[path = "labels_tests.rs"]
mod labels_tests;
