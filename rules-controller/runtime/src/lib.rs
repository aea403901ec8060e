#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use rules_controller_core as core;
pub use rules_controller_k8s_api as k8s;
pub use rules_controller_k8s_reconcile as reconcile;

mod args;
mod controller;
mod lease;
mod validation;

pub use self::args::Args;
