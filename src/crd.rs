// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) for identity and access management.
//!
//! This module defines the Kubernetes Custom Resource Definitions the operator
//! watches and maps onto native RBAC objects.
//!
//! # Resource Types
//!
//! ## Principals
//!
//! - [`User`] - A service-account backed user with optional dedicated namespace
//! - [`Group`] - A virtual group, materialised only as binding subjects
//!
//! ## Permission Sets
//!
//! - [`IamRole`] - Mirrors a namespaced native `Role` (kind `Role`)
//! - [`IamClusterRole`] - Mirrors a native `ClusterRole` (kind `ClusterRole`)
//!
//! # Example: Declaring a User
//!
//! ```rust,no_run
//! use k8s_iam_operator::crd::{ClusterRoleEntry, UserSpec};
//!
//! let spec = UserSpec {
//!     cluster_roles: vec![ClusterRoleEntry {
//!         cluster_role: "view".to_string(),
//!         namespace: Some("team-a".to_string()),
//!         group: None,
//!     }],
//!     roles: vec![],
//!     enabled: false,
//! };
//! ```

use k8s_openapi::api::rbac::v1::PolicyRule;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One entry of the `CRoles` list shared by `User` and `Group`.
///
/// When `namespace` is set the entry becomes a `RoleBinding` in that namespace
/// referencing the `ClusterRole`; when it is absent the entry becomes a
/// cluster-wide `ClusterRoleBinding`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRoleEntry {
    /// Name of the native `ClusterRole` to bind.
    pub cluster_role: String,

    /// Target namespace of the binding. Absent means cluster scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Additional `Group` subject added to the binding (users only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// Condition represents an observation of a resource's current state.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition. The operator only writes `Ready`.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// Status shared by every IAM custom resource.
///
/// `observed_generation` doubles as the create/update discriminator: an object
/// that was never reconciled successfully has none.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IamStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reconcile_time: Option<String>,
}

impl IamStatus {
    /// Whether the `Ready` condition is `True`.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| c.r#type == "Ready" && c.status == "True")
    }
}

/// `User` declares a service-account backed principal.
///
/// The field names `CRoles` and `Roles` are kept verbatim for compatibility
/// with existing manifests.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[kube(
    group = "k8sio.auth",
    version = "v1",
    kind = "User",
    plural = "users",
    namespaced,
    doc = "User is backed by a ServiceAccount in its namespace. Its CRoles and Roles are turned into RoleBindings and ClusterRoleBindings; an enabled user additionally gets a token, a dedicated namespace, a restricted namespace-visibility policy and a kubeconfig secret."
)]
#[kube(status = "IamStatus")]
pub struct UserSpec {
    /// Cluster roles bound to the user, optionally scoped to a namespace.
    #[serde(rename = "CRoles", default)]
    pub cluster_roles: Vec<ClusterRoleEntry>,

    /// Names of `Role`s in the user's own namespace bound to the user.
    #[serde(rename = "Roles", default)]
    pub roles: Vec<String>,

    /// Whether the user gets credentials and a dedicated namespace.
    #[serde(default)]
    pub enabled: bool,
}

/// `Group` declares a virtual group principal.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[kube(
    group = "k8sio.auth",
    version = "v1",
    kind = "Group",
    plural = "groups",
    namespaced,
    doc = "Group has no backing identity object. Its CRoles and Roles are turned into bindings whose subject is a Group of the same name."
)]
#[kube(status = "IamStatus")]
pub struct GroupSpec {
    /// Cluster roles bound to the group, optionally scoped to a namespace.
    #[serde(rename = "CRoles", default)]
    pub cluster_roles: Vec<ClusterRoleEntry>,

    /// Names of `Role`s in the group's own namespace bound to the group.
    #[serde(rename = "Roles", default)]
    pub roles: Vec<String>,
}

/// Custom `Role`: mirrored into a native `Role` of the same name and namespace.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, PartialEq, JsonSchema)]
#[kube(
    group = "k8sio.auth",
    version = "v1",
    kind = "Role",
    plural = "roles",
    root = "IamRole",
    namespaced,
    doc = "Role is mirrored into a native RBAC Role with the same name in the same namespace."
)]
#[kube(status = "IamStatus")]
pub struct RoleSpec {
    /// Policy rules copied verbatim into the native object.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

/// Custom `ClusterRole`: mirrored into a native `ClusterRole` of the same name.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, PartialEq, JsonSchema)]
#[kube(
    group = "k8sio.auth",
    version = "v1",
    kind = "ClusterRole",
    plural = "clusterroles",
    root = "IamClusterRole",
    namespaced,
    doc = "ClusterRole is mirrored into a native RBAC ClusterRole with the same name."
)]
#[kube(status = "IamStatus")]
pub struct ClusterRoleSpec {
    /// Policy rules copied verbatim into the native object.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}
