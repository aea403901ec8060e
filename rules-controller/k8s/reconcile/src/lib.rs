//! Kubernetes-facing rule reconciliation: status and finalizer management, and persistence of
//! the rules document.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod error;
mod metrics;
mod reconciler;
mod retry;
mod store;
pub mod target;


pub use self::{
    error::{Error, Result},
    metrics::ReconcileMetrics,
    reconciler::{Outcome, Reconciler},
    retry::RetryPolicy,
    store::{KubeRules, RuleStore},
    target::{ConfigMapTarget, ConfigMaps, DocumentTarget, FileTarget},
};
