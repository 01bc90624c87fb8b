// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use futures::StreamExt;
use k8s_iam_operator::{
    config::{LogFormat, OperatorConfig},
    constants::TOKIO_WORKER_THREADS,
    context::Context,
    crd::{Group, IamClusterRole, IamRole, User},
    errors::ReconcileError,
    health,
    labels::{FINALIZER_CLUSTER_ROLE, FINALIZER_GROUP, FINALIZER_ROLE, FINALIZER_USER},
    metrics,
    reconcilers::{
        classify_event,
        finalizers::{ensure_finalizer, handle_deletion, FinalizerCleanup},
        group, role,
        status::{failed_status, patch_status, ready_status, IamStatusExt},
        user, EventKind,
    },
    store::KubeStore,
};
use kube::{
    core::NamespaceResourceScope,
    runtime::{controller::Action, watcher::Config, Controller},
    Api, Client, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ControllerError(#[from] ReconcileError);

/// Per-kind glue between the controller runtime and the reconcilers.
#[async_trait]
trait Handler:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + FinalizerCleanup
    + IamStatusExt
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    const FINALIZER: &'static str;

    /// Run the create or update handler and return the message for the `Ready` condition.
    async fn apply(&self, ctx: &Context, event: EventKind) -> Result<String, ReconcileError>;
}

#[async_trait]
impl Handler for User {
    const FINALIZER: &'static str = FINALIZER_USER;

    async fn apply(&self, ctx: &Context, event: EventKind) -> Result<String, ReconcileError> {
        let applied = if event == EventKind::Create {
            user::on_create(ctx.store.as_ref(), self).await?
        } else {
            user::on_update(ctx.store.as_ref(), self).await?
        };
        Ok(format!("{} binding(s) applied", applied.len()))
    }
}

#[async_trait]
impl Handler for Group {
    const FINALIZER: &'static str = FINALIZER_GROUP;

    async fn apply(&self, ctx: &Context, event: EventKind) -> Result<String, ReconcileError> {
        let applied = if event == EventKind::Create {
            group::on_create(ctx.store.as_ref(), self).await?
        } else {
            group::on_update(ctx.store.as_ref(), self).await?
        };
        Ok(format!("{} binding(s) applied", applied.len()))
    }
}

#[async_trait]
impl Handler for IamRole {
    const FINALIZER: &'static str = FINALIZER_ROLE;

    async fn apply(&self, ctx: &Context, _event: EventKind) -> Result<String, ReconcileError> {
        let outcome = role::apply_role(ctx.store.as_ref(), self, ctx.config.readiness()).await?;
        Ok(format!("Role {outcome:?}"))
    }
}

#[async_trait]
impl Handler for IamClusterRole {
    const FINALIZER: &'static str = FINALIZER_CLUSTER_ROLE;

    async fn apply(&self, ctx: &Context, _event: EventKind) -> Result<String, ReconcileError> {
        let outcome = role::apply_cluster_role(ctx.store.as_ref(), self).await?;
        Ok(format!("ClusterRole {outcome:?}"))
    }
}

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("k8s-iam-operator")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

fn init_tracing(format: LogFormat) {
    // RUST_LOG wins when set, otherwise INFO
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main() -> Result<()> {
    let config = OperatorConfig::parse();
    init_tracing(config.log_format);

    info!("Starting k8s-iam-operator");
    debug!(?config, "Configuration loaded");

    let kube_config = kube::Config::infer().await?;
    let api_server_url = kube_config.cluster_url.to_string();
    let client = Client::try_from(kube_config)?;
    debug!(server = %api_server_url, "Kubernetes client initialized");

    let store = Arc::new(KubeStore::new(client.clone(), api_server_url));
    let health_addr = config.health_addr;
    let ctx = Arc::new(Context::new(client, store, config));

    info!("Starting all controllers");

    // Controllers never exit on their own; if one does, the process exits
    tokio::select! {
        result = run_controller::<User>(ctx.clone()) => {
            error!("CRITICAL: User controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("User controller exited unexpectedly without error")
        }
        result = run_controller::<Group>(ctx.clone()) => {
            error!("CRITICAL: Group controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Group controller exited unexpectedly without error")
        }
        result = run_controller::<IamRole>(ctx.clone()) => {
            error!("CRITICAL: Role controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Role controller exited unexpectedly without error")
        }
        result = run_controller::<IamClusterRole>(ctx.clone()) => {
            error!("CRITICAL: ClusterRole controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("ClusterRole controller exited unexpectedly without error")
        }
        result = health::serve(health_addr) => {
            error!("CRITICAL: health endpoint exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Health endpoint exited unexpectedly without error")
        }
        result = shutdown_signal() => {
            result?;
            info!("Shutdown signal received, stopping controllers");
            Ok(())
        }
    }
}

/// Resolves on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

/// Run the controller of one custom kind.
async fn run_controller<K: Handler>(ctx: Arc<Context>) -> Result<()> {
    info!(kind = %K::kind(&()), "Starting controller");

    let api = Api::<K>::all(ctx.client.clone());

    Controller::new(api, Config::default())
        .run(reconcile::<K>, error_policy::<K>, ctx)
        .for_each(|result| {
            if let Err(e) = result {
                debug!(error = %e, "Reconciliation finished with error");
            }
            futures::future::ready(())
        })
        .await;

    Ok(())
}

/// Reconcile one custom object: deletion, finalizer, handler and status.
async fn reconcile<K: Handler>(object: Arc<K>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let start = Instant::now();
    let kind = K::kind(&()).to_string();
    let being_deleted = object.meta().deletion_timestamp.is_some();
    let event = classify_event(being_deleted, object.observed_generation());

    debug!(
        kind = %kind,
        namespace = %object.namespace().unwrap_or_default(),
        name = %object.name_any(),
        ?event,
        "Reconciling"
    );

    if event == EventKind::Delete {
        return match handle_deletion(&ctx.client, ctx.store.as_ref(), object.as_ref(), K::FINALIZER).await {
            Ok(()) => {
                metrics::record_reconciliation_success(&kind, start.elapsed());
                Ok(Action::await_change())
            }
            Err(e) => {
                record_failure(&kind, start, &e);
                Err(e.into())
            }
        };
    }

    if let Err(e) = ensure_finalizer(&ctx.client, object.as_ref(), K::FINALIZER).await {
        record_failure(&kind, start, &e);
        return Err(e.into());
    }

    match object.apply(&ctx, event).await {
        Ok(message) => {
            let status = ready_status(object.iam_status(), object.meta().generation, &message);
            patch_status(&ctx.client, object.as_ref(), &status).await?;
            metrics::record_reconciliation_success(&kind, start.elapsed());
            info!(
                kind = %kind,
                namespace = %object.namespace().unwrap_or_default(),
                name = %object.name_any(),
                %message,
                "Successfully reconciled"
            );
            Ok(Action::requeue(ctx.config.requeue()))
        }
        Err(e) => {
            record_failure(&kind, start, &e);
            error!(
                kind = %kind,
                namespace = %object.namespace().unwrap_or_default(),
                name = %object.name_any(),
                error = %e,
                "Failed to reconcile"
            );
            let status = failed_status(object.iam_status(), &e);
            if let Err(status_err) = patch_status(&ctx.client, object.as_ref(), &status).await {
                warn!(error = %status_err, "Failed to record failure status");
            }
            Err(e.into())
        }
    }
}

fn record_failure(kind: &str, start: Instant, error: &ReconcileError) {
    metrics::record_reconciliation_error(kind, start.elapsed());
    metrics::record_error(kind, error.error_type());
}

fn error_policy<K: Handler>(_object: Arc<K>, _err: &ControllerError, ctx: Arc<Context>) -> Action {
    Action::requeue(ctx.config.error_requeue())
}
