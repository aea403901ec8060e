#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod resource_id;
pub mod rule;

pub use self::{
    resource_id::ResourceId,
    rule::{Handler, Match, Rule, RuleSpec, RuleStatus, Upstream, Validation},
};
pub use k8s_openapi::api::{coordination::v1::Lease, core::v1::ConfigMap};
pub use kube::{
    api::{Api, DynamicObject, ListParams, ObjectMeta, Patch, PatchParams, PostParams, ResourceExt},
    core::ApiResource,
    Client, Error, Resource,
};
