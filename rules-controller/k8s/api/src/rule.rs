use crate::ResourceId;
use kube::{CustomResource, ResourceExt};
use schemars::{json_schema, JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};

/// Describes how requests matching a URL are forwarded and which handlers
/// authenticate, authorize, and mutate them on the way.
#[derive(Clone, Debug, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "oathkeeper.ory.sh",
    version = "v1alpha1",
    kind = "Rule",
    status = "RuleStatus",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct RuleSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<Upstream>,

    #[serde(rename = "match")]
    pub r#match: Match,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authenticators: Vec<Handler>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorizer: Option<Handler>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mutators: Vec<Handler>,

    /// Error handlers, in the order the gateway should try them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Handler>,

    /// Names a ConfigMap in the rule's namespace that receives this rule
    /// instead of the controller's default ConfigMap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_name: Option<String>,
}

/// The location of a server that matching requests are forwarded to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Upstream {
    #[schemars(length(min = 1))]
    pub url: String,

    /// Replaces the provided path prefix when forwarding the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strip_path: Option<String>,

    /// When unset the gateway is told not to preserve the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preserve_host: Option<bool>,
}

/// The URL and methods a rule applies to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Match {
    /// May contain `<...>` regex placeholders, which must reach the gateway
    /// verbatim.
    pub url: String,

    #[schemars(length(min = 1))]
    pub methods: Vec<String>,
}

/// A named gateway handler with handler-specific configuration.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct Handler {
    #[serde(rename = "handler")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub config: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct RuleStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,
}

/// The outcome of checking a rule's handlers against the configured
/// allow-lists.
///
/// Unset fields serialize as `null` so that a merge patch clears them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Validation {
    #[serde(default)]
    pub valid: Option<bool>,

    #[serde(default, rename = "validationError")]
    pub error: Option<String>,
}

// === impl Rule ===

impl Rule {
    /// Indicates whether the rule's last recorded validation succeeded.
    ///
    /// Rules that have not been validated yet are not valid.
    pub fn is_valid(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.validation.as_ref())
            .and_then(|v| v.valid)
            .unwrap_or(false)
    }

    pub fn validation(&self) -> Option<&Validation> {
        self.status.as_ref()?.validation.as_ref()
    }

    /// Identifies the ConfigMap this rule asks to be written to, if it
    /// overrides the default.
    pub fn target_document_key(&self) -> Option<ResourceId> {
        let name = self.spec.config_map_name.as_deref()?;
        if name.is_empty() {
            return None;
        }
        Some(ResourceId::new(self.namespace().unwrap_or_default(), name))
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers().iter().any(|f| f == finalizer)
    }
}

// === impl Validation ===

impl Validation {
    pub fn valid() -> Self {
        Self {
            valid: Some(true),
            error: None,
        }
    }

    pub fn invalid(error: impl ToString) -> Self {
        Self {
            valid: Some(false),
            error: Some(error.to_string()),
        }
    }
}

fn preserve_unknown_fields(_: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true,
    })
}
