// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the IAM operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for all IAM CRDs
pub const API_GROUP: &str = "k8sio.auth";

/// API version for all IAM CRDs
pub const API_VERSION: &str = "v1";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "k8sio.auth/v1";

/// API group of the native RBAC objects
pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Kind name for `User` resource
pub const KIND_USER: &str = "User";

/// Kind name for `Group` resource
pub const KIND_GROUP: &str = "Group";

/// Kind name for `Role` resource (custom and native share the kind name)
pub const KIND_ROLE: &str = "Role";

/// Kind name for `ClusterRole` resource (custom and native share the kind name)
pub const KIND_CLUSTER_ROLE: &str = "ClusterRole";

/// Kind name for native `ServiceAccount` objects and subjects
pub const KIND_SERVICE_ACCOUNT: &str = "ServiceAccount";

/// Kind name for native `RoleBinding` objects
pub const KIND_ROLE_BINDING: &str = "RoleBinding";

/// Kind name for native `ClusterRoleBinding` objects
pub const KIND_CLUSTER_ROLE_BINDING: &str = "ClusterRoleBinding";

/// Kind name for native `Namespace` objects
pub const KIND_NAMESPACE: &str = "Namespace";

/// Kind name for native `Secret` objects
pub const KIND_SECRET: &str = "Secret";

/// Kind name for native `ConfigMap` objects
pub const KIND_CONFIG_MAP: &str = "ConfigMap";

/// Plural for `User` resources
pub const PLURAL_USERS: &str = "users";

/// Plural for `Group` resources
pub const PLURAL_GROUPS: &str = "groups";

/// Plural for custom `Role` resources
pub const PLURAL_ROLES: &str = "roles";

/// Plural for custom `ClusterRole` resources
pub const PLURAL_CLUSTER_ROLES: &str = "clusterroles";

// ============================================================================
// Derived Object Names
// ============================================================================

/// Suffix of the service-account token secret (`{user}-token`)
pub const TOKEN_SECRET_SUFFIX: &str = "-token";

/// Suffix of the credential bundle secret (`{user}-cluster-config`)
pub const CLUSTER_CONFIG_SECRET_SUFFIX: &str = "-cluster-config";

/// Suffix of the restricted-access ClusterRole
pub const RESTRICTED_ROLE_SUFFIX: &str = "-restricted-namespace-role";

/// Suffix of the restricted-access ClusterRoleBinding
pub const RESTRICTED_BINDING_SUFFIX: &str = "-restricted-namespace-binding";

/// Namespace always visible through the restricted-access policy
pub const DEFAULT_NAMESPACE: &str = "default";

/// Annotation linking a token secret to its service account
pub const SERVICE_ACCOUNT_NAME_ANNOTATION: &str = "kubernetes.io/service-account.name";

/// Secret type of service-account token secrets
pub const SECRET_TYPE_SA_TOKEN: &str = "kubernetes.io/service-account-token";

/// Secret type of the credential bundle
pub const SECRET_TYPE_KUBECONFIG: &str = "kubernetes.io/kubeconfig";

/// Data key holding the token inside a token secret
pub const TOKEN_DATA_KEY: &str = "token";

/// Data key holding the bundle inside the credential bundle secret
pub const KUBECONFIG_DATA_KEY: &str = "kubeconfig";

/// ConfigMap published in every namespace with the cluster CA
pub const ROOT_CA_CONFIG_MAP: &str = "kube-root-ca.crt";

/// Namespace the root CA ConfigMap is read from
pub const ROOT_CA_NAMESPACE: &str = "kube-system";

/// Key of the CA certificate inside the root CA ConfigMap
pub const ROOT_CA_DATA_KEY: &str = "ca.crt";

/// Name of the cluster entry inside the credential bundle
pub const KUBECONFIG_CLUSTER_NAME: &str = "cluster";

// ============================================================================
// Retry and Requeue
// ============================================================================

/// Retries of the namespace-readiness check before a `Role` upsert aborts
pub const NAMESPACE_READY_MAX_RETRIES: u32 = 2;

/// Fixed delay between namespace-readiness checks (seconds)
pub const NAMESPACE_READY_RETRY_DELAY_SECS: u64 = 5;

/// Requeue interval after a successful reconciliation (5 minutes)
pub const REQUEUE_WHEN_READY_SECS: u64 = 300;

/// Requeue interval after a failed reconciliation (30 seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

// ============================================================================
// Runtime
// ============================================================================

/// Field manager / controller name used for patches
pub const FIELD_MANAGER: &str = "k8s-iam-operator";

/// Default bind address of the health and metrics endpoint
pub const DEFAULT_HEALTH_ADDR: &str = "0.0.0.0:8081";

/// Number of Tokio worker threads
pub const TOKIO_WORKER_THREADS: usize = 4;

/// Status phase written after a successful reconciliation
pub const PHASE_READY: &str = "Ready";

/// Status phase written after a failed reconciliation
pub const PHASE_FAILED: &str = "Failed";
