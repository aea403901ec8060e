use crate::{
    k8s::{Api, ResourceId, Rule},
    reconcile::{DocumentTarget, Error, KubeRules, Outcome, Reconciler},
};
use futures::prelude::*;
use kube::runtime::{controller::Action, watcher, Controller};
use std::sync::Arc;
use tokio::{sync::watch, time};

/// How long a rule waits before being retried after a failed reconciliation.
const ERROR_REQUEUE: time::Duration = time::Duration::from_secs(10);

/// How long a rule waits after its status could not be written.
const STATUS_REQUEUE: time::Duration = time::Duration::from_secs(2);

/// How often a replica that does not hold the lease checks it again.
const FOLLOWER_REQUEUE: time::Duration = time::Duration::from_secs(15);

pub(crate) struct Context {
    reconciler: Reconciler<KubeRules, Arc<dyn DocumentTarget>>,
    leader: Option<Leader>,
}

/// Tracks whether this replica holds the write lease.
pub(crate) struct Leader {
    claims: watch::Receiver<Arc<kubert::lease::Claim>>,
    hostname: String,
}

// === impl Context ===

impl Context {
    pub(crate) fn new(
        reconciler: Reconciler<KubeRules, Arc<dyn DocumentTarget>>,
        leader: Option<Leader>,
    ) -> Self {
        Self { reconciler, leader }
    }
}

// === impl Leader ===

impl Leader {
    pub(crate) fn new(claims: watch::Receiver<Arc<kubert::lease::Claim>>, hostname: String) -> Self {
        Self { claims, hostname }
    }

    fn is_current(&self) -> bool {
        self.claims.borrow().is_current_for(&self.hostname)
    }
}

/// Runs the rule controller until the runtime begins shutting down. In-flight reconciliations
/// are abandoned on shutdown.
pub(crate) async fn run(api: Api<Rule>, ctx: Arc<Context>, drain: drain::Watch) {
    let rules = Controller::new(api, watcher::Config::default())
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((rule, _)) => tracing::trace!(?rule, "Reconciled"),
                Err(error) => tracing::warn!(%error, "Reconciliation failed"),
            }
        });

    tokio::select! {
        _ = rules => tracing::info!("Rule watch ended"),
        _ = drain.signaled() => tracing::debug!("Shutting down"),
    }
}

async fn reconcile(rule: Arc<Rule>, ctx: Arc<Context>) -> Result<Action, Error> {
    let Some(id) = ResourceId::of(rule.as_ref()) else {
        return Ok(Action::await_change());
    };

    if let Some(leader) = &ctx.leader {
        if !leader.is_current() {
            tracing::debug!(rule = %id, "Not the leader; deferring");
            return Ok(Action::requeue(FOLLOWER_REQUEUE));
        }
    }

    match ctx.reconciler.handle_rule_change(&id).await? {
        Outcome::Requeue => Ok(Action::requeue(STATUS_REQUEUE)),
        Outcome::Gone | Outcome::Published | Outcome::Finalized => Ok(Action::await_change()),
    }
}

fn error_policy(rule: Arc<Rule>, error: &Error, _: Arc<Context>) -> Action {
    let id = ResourceId::of(rule.as_ref());
    tracing::warn!(rule = ?id, %error, "Failed to reconcile rule");
    Action::requeue(ERROR_REQUEUE)
}
