//! Access rule control plane logic.
//!
//! Rules declared by users are checked against the handler allow-lists, turned into the gateway's
//! canonical form, and merged into a single ordered JSON document:
//!
//! ```text
//! [ Rule ] -> validation -> [ Rule + status ] -> RuleList filters -> [ CanonicalRule ] -> document
//! ```
//!
//! Nothing in this crate performs I/O; persisting the document and writing rule status is left to
//! the Kubernetes-facing crates.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod canonical;
pub mod document;
pub mod validation;

pub use self::{
    canonical::{CanonicalRule, CanonicalUpstream, DefaultHandlers, DefaultPolicy},
    document::RuleList,
    validation::{HandlerKind, InvalidHandler, InvalidHandlers},
};

/// The finalizer the controller places on rules so that their entries are removed from the
/// document before the rule disappears.
pub const FINALIZER: &str = "oathkeeper.ory.sh/finalizer";
