use crate::Result;
use kube::core::TypeMeta;
use rules_controller_k8s_api::{
    self as k8s, Api, ApiResource, DynamicObject, ListParams, Patch, PatchParams, Resource,
    ResourceExt, ResourceId, Rule, RuleStatus,
};

const FIELD_MANAGER: &str = "rules-controller";

/// Reads rules and writes the parts of them the controller owns.
#[async_trait::async_trait]
pub trait RuleStore: Send + Sync {
    /// Returns `None` if the rule does not exist.
    async fn get(&self, id: &ResourceId) -> Result<Option<Rule>>;

    /// Lists every rule in scope. Rules that cannot be decoded are omitted.
    async fn list(&self) -> Result<Vec<Rule>>;

    /// Writes the status subresource, returning the updated rule.
    async fn patch_status(&self, id: &ResourceId, status: &RuleStatus) -> Result<Rule>;

    /// Sets the rule's finalizers, failing with a conflict if the rule changed since `rule` was
    /// read.
    async fn patch_finalizers(&self, rule: &Rule, finalizers: &[String]) -> Result<()>;
}

/// Rules stored in the Kubernetes API, optionally restricted to a single namespace.
#[derive(Clone)]
pub struct KubeRules {
    client: k8s::Client,
    namespace: Option<String>,
}

// === impl KubeRules ===

impl KubeRules {
    pub fn new(client: k8s::Client, namespace: Option<String>) -> Self {
        Self { client, namespace }
    }

    fn api(&self, namespace: &str) -> Api<Rule> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait::async_trait]
impl RuleStore for KubeRules {
    async fn get(&self, id: &ResourceId) -> Result<Option<Rule>> {
        Ok(self.api(&id.namespace).get_opt(&id.name).await?)
    }

    async fn list(&self) -> Result<Vec<Rule>> {
        let resource = ApiResource::erase::<Rule>(&());
        let api = match &self.namespace {
            Some(ns) => Api::<DynamicObject>::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::<DynamicObject>::all_with(self.client.clone(), &resource),
        };

        let objects = api.list(&ListParams::default()).await?;
        let rules = objects
            .items
            .into_iter()
            .filter_map(|obj| match decode(obj, &resource) {
                Ok(rule) => Some(rule),
                Err((id, error)) => {
                    tracing::warn!(rule = %id, %error, "Skipping malformed rule");
                    None
                }
            })
            .collect();
        Ok(rules)
    }

    async fn patch_status(&self, id: &ResourceId, status: &RuleStatus) -> Result<Rule> {
        let patch = Patch::Merge(serde_json::json!({
            "apiVersion": Rule::api_version(&()),
            "kind": Rule::kind(&()),
            "status": status,
        }));
        let rule = self
            .api(&id.namespace)
            .patch_status(&id.name, &PatchParams::apply(FIELD_MANAGER), &patch)
            .await?;
        Ok(rule)
    }

    async fn patch_finalizers(&self, rule: &Rule, finalizers: &[String]) -> Result<()> {
        let patch = Patch::Merge(serde_json::json!({
            "metadata": {
                "finalizers": finalizers,
                "resourceVersion": rule.resource_version(),
            },
        }));
        self.api(&rule.namespace().unwrap_or_default())
            .patch(&rule.name_any(), &PatchParams::default(), &patch)
            .await?;
        Ok(())
    }
}

/// Decodes a listed object as a rule. List items may omit their type, so it is filled in from
/// the resource being listed.
fn decode(
    mut obj: DynamicObject,
    resource: &ApiResource,
) -> std::result::Result<Rule, (String, serde_json::Error)> {
    let id = match ResourceId::of(&obj) {
        Some(id) => id.to_string(),
        None => obj.name_any(),
    };
    obj.types.get_or_insert_with(|| TypeMeta {
        api_version: resource.api_version.clone(),
        kind: resource.kind.clone(),
    });
    serde_json::to_value(obj)
        .and_then(serde_json::from_value)
        .map_err(|error| (id, error))
}
