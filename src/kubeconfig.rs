// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Derived cluster-access credential bundle for enabled users.
//!
//! The bundle is a standard kubeconfig document (`apiVersion`, `clusters`,
//! `contexts`, `current-context`, `users`) serialized as JSON and stored in
//! secret `{user}-cluster-config` inside the user's dedicated namespace.
//!
//! Inputs:
//! - API server URL from the store capability
//! - cluster CA from ConfigMap `kube-root-ca.crt` (`ca.crt`) in `kube-system`
//! - bearer token from the user's `{user}-token` secret

use crate::constants::{
    CLUSTER_CONFIG_SECRET_SUFFIX, KIND_SECRET, KUBECONFIG_CLUSTER_NAME, KUBECONFIG_DATA_KEY,
    ROOT_CA_CONFIG_MAP, ROOT_CA_DATA_KEY, ROOT_CA_NAMESPACE, SECRET_TYPE_KUBECONFIG,
    TOKEN_DATA_KEY, TOKEN_SECRET_SUFFIX,
};
use crate::errors::ReconcileError;
use crate::labels::{managed_labels, MANAGED_BY_USER};
use crate::metrics;
use crate::store::ClusterStore;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// kubeconfig document. Field order is the serialization order.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Kubeconfig {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub clusters: Vec<NamedCluster>,
    pub contexts: Vec<NamedContext>,
    #[serde(rename = "current-context")]
    pub current_context: String,
    pub users: Vec<NamedUser>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamedCluster {
    pub cluster: ClusterEntry,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterEntry {
    pub server: String,
    #[serde(rename = "certificate-authority-data")]
    pub certificate_authority_data: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamedContext {
    pub context: ContextEntry,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextEntry {
    pub cluster: String,
    pub user: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamedUser {
    pub name: String,
    pub user: UserEntry,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserEntry {
    pub token: String,
}

impl Kubeconfig {
    /// Build the bundle for `user_name`.
    ///
    /// # Arguments
    ///
    /// * `server` - API server URL
    /// * `ca_pem` - cluster CA certificate in PEM form, base64-encoded here
    /// * `user_name` - name of the user, also used for the context
    /// * `token` - decoded bearer token
    #[must_use]
    pub fn for_user(server: &str, ca_pem: &str, user_name: &str, token: &str) -> Self {
        let context_name = format!("{user_name}-context");
        Self {
            api_version: "v1".to_string(),
            clusters: vec![NamedCluster {
                cluster: ClusterEntry {
                    server: server.to_string(),
                    certificate_authority_data: BASE64.encode(ca_pem.as_bytes()),
                },
                name: KUBECONFIG_CLUSTER_NAME.to_string(),
            }],
            contexts: vec![NamedContext {
                context: ContextEntry {
                    cluster: KUBECONFIG_CLUSTER_NAME.to_string(),
                    user: user_name.to_string(),
                },
                name: context_name.clone(),
            }],
            current_context: context_name,
            users: vec![NamedUser {
                name: user_name.to_string(),
                user: UserEntry {
                    token: token.to_string(),
                },
            }],
        }
    }

    /// Serialize to the JSON form stored in the secret.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<String, ReconcileError> {
        serde_json::to_string(self).map_err(|e| ReconcileError::Serialization(e.to_string()))
    }
}

/// Name of the secret holding the bundle of `user_name`.
#[must_use]
pub fn cluster_config_secret_name(user_name: &str) -> String {
    format!("{user_name}{CLUSTER_CONFIG_SECRET_SUFFIX}")
}

/// Name of the service-account token secret of `user_name`.
#[must_use]
pub fn token_secret_name(user_name: &str) -> String {
    format!("{user_name}{TOKEN_SECRET_SUFFIX}")
}

async fn read_token(
    store: &dyn ClusterStore,
    user_name: &str,
    user_namespace: &str,
) -> Result<String, ReconcileError> {
    let secret_name = token_secret_name(user_name);
    let secret = store
        .get_secret(user_namespace, &secret_name)
        .await
        .map_err(|e| ReconcileError::store("read token secret", e))?;

    let token = secret
        .data
        .as_ref()
        .and_then(|data| data.get(TOKEN_DATA_KEY))
        .filter(|bytes| !bytes.0.is_empty())
        .ok_or_else(|| ReconcileError::TokenNotReady {
            secret: format!("{user_namespace}/{secret_name}"),
        })?;

    String::from_utf8(token.0.clone()).map_err(|_| {
        ReconcileError::InvalidResource(format!(
            "token in secret {user_namespace}/{secret_name} is not valid UTF-8"
        ))
    })
}

async fn read_cluster_ca(store: &dyn ClusterStore) -> Result<String, ReconcileError> {
    let config_map = store
        .get_config_map(ROOT_CA_NAMESPACE, ROOT_CA_CONFIG_MAP)
        .await
        .map_err(|e| ReconcileError::store("read cluster CA", e))?;

    config_map
        .data
        .and_then(|mut data| data.remove(ROOT_CA_DATA_KEY))
        .ok_or_else(|| {
            ReconcileError::InvalidResource(format!(
                "ConfigMap {ROOT_CA_NAMESPACE}/{ROOT_CA_CONFIG_MAP} has no {ROOT_CA_DATA_KEY}"
            ))
        })
}

/// Generate the bundle of a user and persist it in the user's dedicated namespace.
///
/// An already existing bundle secret is left untouched.
///
/// # Errors
///
/// - [`ReconcileError::TokenNotReady`] when the token has not been populated yet
/// - [`ReconcileError::Store`] when any read or the create fails
pub async fn publish_kubeconfig(
    store: &dyn ClusterStore,
    user_name: &str,
    user_namespace: &str,
) -> Result<(), ReconcileError> {
    let token = read_token(store, user_name, user_namespace).await?;
    let ca = read_cluster_ca(store).await?;
    let bundle = Kubeconfig::for_user(&store.api_server_url(), &ca, user_name, &token).to_json()?;

    let secret_name = cluster_config_secret_name(user_name);
    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(secret_name.clone()),
            namespace: Some(user_name.to_string()),
            labels: Some(managed_labels(MANAGED_BY_USER, user_name)),
            ..ObjectMeta::default()
        },
        type_: Some(SECRET_TYPE_KUBECONFIG.to_string()),
        data: Some(BTreeMap::from([(
            KUBECONFIG_DATA_KEY.to_string(),
            ByteString(bundle.into_bytes()),
        )])),
        ..Secret::default()
    };

    match store.create_secret(user_name, &secret).await {
        Ok(_) => {
            info!(user = %user_name, secret = %secret_name, "Published cluster config");
            metrics::record_resource_created(KIND_SECRET);
            Ok(())
        }
        Err(e) if e.is_conflict() => {
            debug!(user = %user_name, secret = %secret_name, "Cluster config already present");
            Ok(())
        }
        Err(e) => Err(ReconcileError::store("create cluster config secret", e)),
    }
}

#[cfg(test)]
#[path = "kubeconfig_tests.rs"]
mod kubeconfig_tests;
