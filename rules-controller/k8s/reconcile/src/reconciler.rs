use crate::{DocumentTarget, ReconcileMetrics, Result, RuleStore};
use rules_controller_core::{validation, DefaultHandlers, RuleList, FINALIZER};
use rules_controller_k8s_api::{ResourceExt, ResourceId, Rule, RuleStatus, Validation};
use std::sync::Arc;
use tracing::instrument;

/// What a reconciliation did.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The rule no longer exists; there is nothing to do.
    Gone,

    /// The rule was validated and the document it belongs to was rewritten.
    Published,

    /// The rule was removed from its document and released for deletion.
    Finalized,

    /// The rule's status could not be written. The rule should be reconciled again.
    Requeue,
}

/// Brings the rules document in line with a rule that changed.
pub struct Reconciler<R, T> {
    rules: R,
    target: T,
    validation: Arc<validation::Config>,
    defaults: DefaultHandlers,
    metrics: ReconcileMetrics,
}

// === impl Outcome ===

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gone => "gone",
            Self::Published => "published",
            Self::Finalized => "finalized",
            Self::Requeue => "requeue",
        }
    }
}

// === impl Reconciler ===

impl<R: RuleStore, T: DocumentTarget> Reconciler<R, T> {
    pub fn new(
        rules: R,
        target: T,
        validation: Arc<validation::Config>,
        defaults: DefaultHandlers,
        metrics: ReconcileMetrics,
    ) -> Self {
        Self {
            rules,
            target,
            validation,
            defaults,
            metrics,
        }
    }

    /// Reconciles the rule identified by `id`.
    ///
    /// Running this again for an unchanged rule set writes the same status and the same
    /// document.
    #[instrument(skip_all, fields(namespace = %id.namespace, name = %id.name))]
    pub async fn handle_rule_change(&self, id: &ResourceId) -> Result<Outcome> {
        match self.reconcile(id).await {
            Ok(outcome) => {
                tracing::debug!(outcome = outcome.as_str(), "Reconciled");
                self.metrics.reconciled(outcome);
                Ok(outcome)
            }
            Err(error) => {
                self.metrics.reconcile_failed();
                Err(error)
            }
        }
    }

    async fn reconcile(&self, id: &ResourceId) -> Result<Outcome> {
        let Some(mut rule) = self.rules.get(id).await? else {
            tracing::debug!("Rule not found");
            return Ok(Outcome::Gone);
        };

        if rule.is_deleting() {
            return self.finalize(id, &rule).await;
        }

        let validation = match self.validation.validate(&rule) {
            Ok(()) => Validation::valid(),
            Err(invalid) => {
                tracing::info!(error = %invalid, "Rule is invalid");
                Validation::invalid(invalid)
            }
        };
        if rule.validation() != Some(&validation) {
            let status = RuleStatus {
                validation: Some(validation),
            };
            match self.rules.patch_status(id, &status).await {
                Ok(updated) => rule = updated,
                Err(error) => {
                    tracing::warn!(%error, "Failed to update rule status");
                    return Ok(Outcome::Requeue);
                }
            }
        }

        if !rule.has_finalizer(FINALIZER) {
            let mut finalizers = rule.finalizers().to_vec();
            finalizers.push(FINALIZER.to_string());
            self.rules.patch_finalizers(&rule, &finalizers).await?;
            tracing::debug!("Added finalizer");
            rule.metadata.finalizers = Some(finalizers);
        }

        let mut rules = self.rules.list().await?;
        match rules
            .iter_mut()
            .find(|listed| ResourceId::of(&**listed).as_ref() == Some(id))
        {
            Some(listed) => *listed = rule.clone(),
            None => rules.push(rule.clone()),
        }

        self.publish(RuleList::from(rules), &rule).await?;
        Ok(Outcome::Published)
    }

    /// Rewrites the document without the rule, then lets the deletion proceed.
    async fn finalize(&self, id: &ResourceId, rule: &Rule) -> Result<Outcome> {
        let rules = RuleList::from(self.rules.list().await?).filter_out_rule(id);
        self.publish(rules, rule).await?;

        if rule.has_finalizer(FINALIZER) {
            let finalizers = rule
                .finalizers()
                .iter()
                .filter(|f| *f != FINALIZER)
                .cloned()
                .collect::<Vec<_>>();
            self.rules.patch_finalizers(rule, &finalizers).await?;
            tracing::info!("Removed finalizer");
        }
        Ok(Outcome::Finalized)
    }

    async fn publish(&self, rules: RuleList, triggered_by: &Rule) -> Result<()> {
        let mut rules = rules.filter_deleting().filter_not_valid();
        if self.target.honors_target_key() {
            let key = triggered_by.target_document_key();
            rules = rules.filter_by_target_document_key(key.as_ref());
        }

        let document = rules.to_document(&self.defaults)?;
        if let Err(error) = self
            .target
            .create_or_update(&document, Some(triggered_by))
            .await
        {
            self.metrics.document_write_failed();
            return Err(error);
        }
        self.metrics.document_written(rules.len());
        tracing::info!(rules = rules.len(), "Published rules document");
        Ok(())
    }
}
