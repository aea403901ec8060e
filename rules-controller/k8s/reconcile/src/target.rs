mod configmap;
mod file;

pub use self::{
    configmap::{ConfigMapTarget, ConfigMaps},
    file::FileTarget,
};
use crate::Result;
use rules_controller_k8s_api::Rule;
use std::sync::Arc;

/// Stores the rendered rules document wherever the gateway reads it from.
#[async_trait::async_trait]
pub trait DocumentTarget: Send + Sync {
    /// Replaces the stored document.
    ///
    /// `triggered_by` is the rule whose change produced this document. A target may use it to pick
    /// an alternate destination.
    async fn create_or_update(&self, document: &[u8], triggered_by: Option<&Rule>) -> Result<()>;

    /// Indicates whether rules' `configMapName` selects between multiple documents. When it does
    /// not, every valid rule belongs to the single document.
    fn honors_target_key(&self) -> bool {
        true
    }
}

#[async_trait::async_trait]
impl<T: DocumentTarget + ?Sized> DocumentTarget for Arc<T> {
    async fn create_or_update(&self, document: &[u8], triggered_by: Option<&Rule>) -> Result<()> {
        (**self).create_or_update(document, triggered_by).await
    }

    fn honors_target_key(&self) -> bool {
        (**self).honors_target_key()
    }
}
