// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for all controllers.
//!
//! Every controller receives an `Arc<Context>` holding:
//! - the Kubernetes client, used for finalizer and status patches on the
//!   custom objects themselves
//! - the cluster store capability handed to the reconcilers
//! - the runtime configuration (readiness retry, requeue intervals)

use crate::config::OperatorConfig;
use crate::store::ClusterStore;
use kube::Client;
use std::sync::Arc;

#[derive(Clone)]
pub struct Context {
    pub client: Client,
    pub store: Arc<dyn ClusterStore>,
    pub config: OperatorConfig,
}

impl Context {
    pub fn new(client: Client, store: Arc<dyn ClusterStore>, config: OperatorConfig) -> Self {
        Self {
            client,
            store,
            config,
        }
    }
}
