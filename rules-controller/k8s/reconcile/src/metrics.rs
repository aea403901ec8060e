use crate::Outcome;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct ReconcileMetrics {
    reconciles: Family<OutcomeLabels, Counter>,
    reconcile_errors: Counter,
    document_writes: Family<WriteLabels, Counter>,
    document_rules: Gauge,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct OutcomeLabels {
    outcome: &'static str,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct WriteLabels {
    result: &'static str,
}

// === impl ReconcileMetrics ===

impl ReconcileMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let reconciles = Family::<OutcomeLabels, Counter>::default();
        reg.register(
            "reconciles",
            "Count of rule reconciliations that completed, by outcome",
            reconciles.clone(),
        );

        let reconcile_errors = Counter::default();
        reg.register(
            "reconcile_errors",
            "Count of rule reconciliations that failed and were requeued",
            reconcile_errors.clone(),
        );

        let document_writes = Family::<WriteLabels, Counter>::default();
        reg.register(
            "document_writes",
            "Count of rules document writes, by result",
            document_writes.clone(),
        );

        let document_rules = Gauge::default();
        reg.register(
            "document_rules",
            "Number of rules in the most recently written rules document",
            document_rules.clone(),
        );

        Self {
            reconciles,
            reconcile_errors,
            document_writes,
            document_rules,
        }
    }

    pub fn reconciled(&self, outcome: Outcome) {
        self.reconciles
            .get_or_create(&OutcomeLabels {
                outcome: outcome.as_str(),
            })
            .inc();
    }

    pub fn reconcile_failed(&self) {
        self.reconcile_errors.inc();
    }

    pub(crate) fn document_written(&self, rules: usize) {
        self.document_writes
            .get_or_create(&WriteLabels { result: "ok" })
            .inc();
        self.document_rules.set(rules as i64);
    }

    pub(crate) fn document_write_failed(&self) {
        self.document_writes
            .get_or_create(&WriteLabels { result: "error" })
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus_client::encoding::text::encode;

    #[test]
    fn encodes_registered_metrics() {
        let mut reg = Registry::with_prefix("rules_controller");
        let metrics = ReconcileMetrics::register(&mut reg);
        metrics.reconciled(Outcome::Published);
        metrics.reconcile_failed();
        metrics.document_written(3);
        metrics.document_write_failed();

        let mut text = String::new();
        encode(&mut text, &reg).unwrap();
        assert!(text.contains("rules_controller_reconciles_total{outcome=\"published\"} 1"));
        assert!(text.contains("rules_controller_reconcile_errors_total 1"));
        assert!(text.contains("rules_controller_document_writes_total{result=\"ok\"} 1"));
        assert!(text.contains("rules_controller_document_writes_total{result=\"error\"} 1"));
        assert!(text.contains("rules_controller_document_rules 3"));
    }
}
