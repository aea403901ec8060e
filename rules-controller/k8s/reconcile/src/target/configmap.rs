use super::DocumentTarget;
use crate::{Error, Result, RetryPolicy};
use rules_controller_k8s_api::{
    self as k8s, Api, ConfigMap, ObjectMeta, PostParams, ResourceId, Rule,
};

/// ConfigMap reads and writes, as needed by [`ConfigMapTarget`].
#[async_trait::async_trait]
pub trait ConfigMaps: Send + Sync {
    /// Returns `None` if the ConfigMap does not exist.
    async fn get(&self, id: &ResourceId) -> Result<Option<ConfigMap>>;

    async fn create(&self, config_map: &ConfigMap) -> Result<()>;

    /// Replaces a ConfigMap, failing with [`Error::Conflict`] if it changed since it was read.
    async fn replace(&self, config_map: &ConfigMap) -> Result<()>;
}

/// Keeps the rules document as an entry of a ConfigMap that the gateway mounts.
///
/// Writes are optimistic: each attempt reads the ConfigMap, sets the entry, and writes it back
/// with the version it read. Attempts that race with another writer are retried from the read.
#[derive(Clone, Debug)]
pub struct ConfigMapTarget<C> {
    client: C,
    default: ResourceId,
    entry: String,
    retry: RetryPolicy,
}

// === impl ConfigMapTarget ===

impl<C: ConfigMaps> ConfigMapTarget<C> {
    pub fn new(client: C, default: ResourceId, entry: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            default,
            entry: entry.into(),
            retry,
        }
    }

    /// The ConfigMap a document produced by `triggered_by` belongs in.
    pub fn resolve(&self, triggered_by: Option<&Rule>) -> ResourceId {
        triggered_by
            .and_then(Rule::target_document_key)
            .unwrap_or_else(|| self.default.clone())
    }

    async fn create_or_update_once(&self, id: &ResourceId, data: &str) -> Result<()> {
        let Some(mut config_map) = self.client.get(id).await? else {
            tracing::info!(configmap = %id, "Creating ConfigMap");
            let config_map = ConfigMap {
                metadata: ObjectMeta {
                    name: Some(id.name.clone()),
                    namespace: Some(id.namespace.clone()),
                    ..Default::default()
                },
                data: Some([(self.entry.clone(), data.to_string())].into_iter().collect()),
                ..Default::default()
            };
            return self.client.create(&config_map).await;
        };

        tracing::info!(configmap = %id, "Updating ConfigMap");
        config_map
            .data
            .get_or_insert_with(Default::default)
            .insert(self.entry.clone(), data.to_string());
        let res = self.client.replace(&config_map).await;
        if let Err(Error::Conflict(error)) = &res {
            tracing::warn!(configmap = %id, %error, "ConfigMap changed during update");
        }
        res
    }
}

#[async_trait::async_trait]
impl<C: ConfigMaps> DocumentTarget for ConfigMapTarget<C> {
    async fn create_or_update(&self, document: &[u8], triggered_by: Option<&Rule>) -> Result<()> {
        let data = std::str::from_utf8(document)
            .map_err(|error| Error::Malformed(format!("rules document is not UTF-8: {error}")))?;
        let id = self.resolve(triggered_by);
        self.retry
            .retry(|| self.create_or_update_once(&id, data))
            .await
    }
}

// === impl ConfigMaps ===

#[async_trait::async_trait]
impl ConfigMaps for k8s::Client {
    async fn get(&self, id: &ResourceId) -> Result<Option<ConfigMap>> {
        let api = Api::<ConfigMap>::namespaced(self.clone(), &id.namespace);
        Ok(api.get_opt(&id.name).await?)
    }

    async fn create(&self, config_map: &ConfigMap) -> Result<()> {
        let api = Api::<ConfigMap>::namespaced(self.clone(), namespace(config_map)?);
        api.create(&PostParams::default(), config_map).await?;
        Ok(())
    }

    async fn replace(&self, config_map: &ConfigMap) -> Result<()> {
        let api = Api::<ConfigMap>::namespaced(self.clone(), namespace(config_map)?);
        let name = config_map.metadata.name.as_deref().unwrap_or_default();
        api.replace(name, &PostParams::default(), config_map).await?;
        Ok(())
    }
}

fn namespace(config_map: &ConfigMap) -> Result<&str> {
    config_map
        .metadata
        .namespace
        .as_deref()
        .ok_or_else(|| Error::NotFound("ConfigMap has no namespace".to_string()))
}
