use crate::{CanonicalRule, DefaultHandlers};
use rules_controller_k8s_api::{ResourceId, Rule};

/// An ordered collection of rules being reduced to the rules document.
///
/// Filters never reorder rules: the document lists rules in the order they were provided.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RuleList(Vec<Rule>);

impl From<Vec<Rule>> for RuleList {
    fn from(rules: Vec<Rule>) -> Self {
        Self(rules)
    }
}

impl RuleList {
    pub fn filter(self, f: impl FnMut(&Rule) -> bool) -> Self {
        let mut rules = self.0;
        rules.retain(f);
        Self(rules)
    }

    /// Keeps only rules whose last validation succeeded. Rules that have not been validated yet
    /// are dropped.
    pub fn filter_not_valid(self) -> Self {
        self.filter(Rule::is_valid)
    }

    /// Keeps rules that target the document identified by `key`, where `None` is the default
    /// document.
    pub fn filter_by_target_document_key(self, key: Option<&ResourceId>) -> Self {
        self.filter(|rule| rule.target_document_key().as_ref() == key)
    }

    pub fn filter_out_rule(self, id: &ResourceId) -> Self {
        self.filter(|rule| ResourceId::of(rule).as_ref() != Some(id))
    }

    /// Drops rules that are being deleted.
    pub fn filter_deleting(self) -> Self {
        self.filter(|rule| !rule.is_deleting())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> + '_ {
        self.0.iter()
    }

    /// Renders the gateway rules document: a JSON array of canonical rules, indented with two
    /// spaces. An empty list renders as `[]`.
    ///
    /// Characters such as `<`, `>`, and `&` are written verbatim; match URLs use them as regex
    /// delimiters.
    pub fn to_document(&self, defaults: &DefaultHandlers) -> serde_json::Result<Vec<u8>> {
        let rules = self
            .0
            .iter()
            .map(|rule| CanonicalRule::new(rule, defaults))
            .collect::<Vec<_>>();
        serde_json::to_vec_pretty(&rules)
    }
}
