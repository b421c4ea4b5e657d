//! Controller wiring for the reconciliation engine
//!
//! The kube runtime is the work dispatcher: it watches one kind, coalesces
//! change notifications, and guarantees one in-flight reconcile per object.
//! Each delivered trigger is reduced to the object identity and handed to the
//! engine, which re-fetches and converges the object. Errors map to requeue
//! actions through the [`Error::action`] policy.

use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use kube::api::ListParams;
use kube::runtime::controller::Action;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client};
use prometheus::IntCounterVec;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::engine::{Engine, ManagedObject, Outcome};
use crate::error::{Error, ErrorAction, Result};

/// Fixed delay used for the backoff requeue of transient store errors
const TRANSIENT_RETRY_DELAY: Duration = Duration::from_secs(30);

// =============================================================================
// Metrics
// =============================================================================

/// Reconcile counters shared by all controllers in the process
#[derive(Clone)]
pub struct ControllerMetrics {
    reconciles: IntCounterVec,
    failures: IntCounterVec,
}

impl ControllerMetrics {
    /// Register the counters with the default Prometheus registry
    pub fn new() -> Result<Self> {
        let reconciles = prometheus::register_int_counter_vec!(
            "fleet_node_operator_reconciles_total",
            "Reconcile invocations by kind and outcome",
            &["kind", "outcome"]
        )
        .map_err(|err| Error::Configuration(format!("failed to register metrics: {err}")))?;
        let failures = prometheus::register_int_counter_vec!(
            "fleet_node_operator_reconcile_failures_total",
            "Failed reconcile invocations by kind",
            &["kind"]
        )
        .map_err(|err| Error::Configuration(format!("failed to register metrics: {err}")))?;
        Ok(Self {
            reconciles,
            failures,
        })
    }

    #[cfg(test)]
    fn for_testing() -> Self {
        use prometheus::Opts;
        Self {
            reconciles: IntCounterVec::new(Opts::new("reconciles", "test"), &["kind", "outcome"])
                .unwrap(),
            failures: IntCounterVec::new(Opts::new("failures", "test"), &["kind"]).unwrap(),
        }
    }
}

// =============================================================================
// Controller Context
// =============================================================================

/// Shared state handed to every reconcile invocation of one kind
pub struct Context<K: ManagedObject> {
    pub engine: Engine<K>,
    pub metrics: ControllerMetrics,
}

impl<K: ManagedObject> Context<K> {
    pub fn new(engine: Engine<K>, metrics: ControllerMetrics) -> Self {
        Self { engine, metrics }
    }
}

// =============================================================================
// Reconcile Dispatch
// =============================================================================

async fn reconcile_request<K: ManagedObject>(
    object: Arc<K>,
    ctx: Arc<Context<K>>,
) -> Result<Action> {
    let id = object.identity();
    let outcome = match ctx.engine.reconcile(&id).await {
        Ok(outcome) => outcome,
        Err(err) => {
            ctx.metrics
                .failures
                .with_label_values(&[K::kind_name()])
                .inc();
            return Err(err);
        }
    };
    ctx.metrics
        .reconciles
        .with_label_values(&[K::kind_name(), outcome_label(&outcome)])
        .inc();
    Ok(match outcome {
        Outcome::Done => Action::await_change(),
        Outcome::RequeueAfter(delay) => Action::requeue(delay),
    })
}

fn error_policy<K: ManagedObject>(object: Arc<K>, error: &Error, _ctx: Arc<Context<K>>) -> Action {
    error!(
        kind = K::kind_name(),
        object = %object.identity(),
        %error,
        retryable = error.is_retryable(),
        "reconciliation failed"
    );
    requeue_action(error)
}

/// Map the error taxonomy onto dispatcher requeue actions
fn requeue_action(error: &Error) -> Action {
    match error.action() {
        ErrorAction::RequeueWithBackoff => Action::requeue(TRANSIENT_RETRY_DELAY),
        ErrorAction::RequeueAfter(delay) => Action::requeue(delay),
        ErrorAction::NoRequeue => Action::await_change(),
    }
}

fn outcome_label(outcome: &Outcome) -> &'static str {
    match outcome {
        Outcome::Done => "done",
        Outcome::RequeueAfter(_) => "requeue",
    }
}

// =============================================================================
// Controller Startup
// =============================================================================

/// Fail fast when a kind's API is not served, e.g. because the CRD is not
/// installed; starting a controller against it would just error forever.
pub async fn ensure_kind_registered<K>(client: &Client) -> Result<()>
where
    K: ManagedObject
        + kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Debug,
{
    let api: Api<K> = Api::all(client.clone());
    api.list(&ListParams::default().limit(1))
        .await
        .map_err(|err| {
            Error::Configuration(format!(
                "{} API is not available: {err}",
                K::kind_name()
            ))
        })?;
    Ok(())
}

/// Watch one kind and drive its engine until shutdown
pub async fn run_controller<K>(client: Client, context: Arc<Context<K>>) -> Result<()>
where
    K: ManagedObject
        + kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Debug,
{
    let api: Api<K> = Api::all(client);
    Controller::new(api, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile_request, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((object, _action)) => debug!(object = %object, "reconciled"),
                Err(err) => warn!(error = %err, "reconcile dispatch failed"),
            }
        })
        .await;
    Ok(())
}
