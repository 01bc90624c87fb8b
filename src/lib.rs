// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # k8s-iam-operator - identity and access management on top of Kubernetes RBAC
//!
//! The operator watches four custom resources in the `k8sio.auth/v1` API group
//! and keeps native RBAC objects in line with them:
//!
//! - `User` - a service account, its bindings and, when enabled, credentials,
//!   a dedicated namespace and a restricted namespace-visibility policy
//! - `Group` - bindings whose subject is a virtual group
//! - `Role` / `ClusterRole` - mirrored into the native objects of the same name
//!
//! ## Modules
//!
//! - [`crd`] - custom resource types
//! - [`reconcilers`] - binding reconciler, orphan sweeper, deletion cascade and
//!   the per-kind handlers
//! - [`store`] - the cluster store capability and its `kube` implementation
//! - [`kubeconfig`] - credential bundle of enabled users
//! - [`metrics`] / [`health`] - Prometheus metrics and the HTTP endpoint
//!
//! ## Example
//!
//! ```rust,no_run
//! use k8s_iam_operator::crd::{ClusterRoleEntry, UserSpec};
//! use k8s_iam_operator::reconcilers::user::desired_bindings;
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
//! assert_eq!(desired_bindings(&spec, "iam").len(), 1);
//! ```

pub mod config;
pub mod constants;
pub mod context;
pub mod crd;
pub mod errors;
pub mod health;
pub mod kubeconfig;
pub mod labels;
pub mod metrics;
pub mod reconcilers;
pub mod store;
