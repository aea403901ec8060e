use anyhow::{anyhow, Error, Result};
use rules_controller_k8s_api::{Handler, Match, ResourceExt, Rule, Upstream};
use serde::{Deserialize, Serialize};

/// Selects the handlers injected into rules that leave a handler slot empty.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum DefaultPolicy {
    /// Requests that match a rule without handlers are rejected.
    #[default]
    Deny,

    /// Requests that match a rule without handlers are let through unauthenticated.
    Allow,
}

/// The handler names substituted for empty handler slots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefaultHandlers {
    pub authenticator: String,
    pub authorizer: String,
    pub mutator: String,
}

/// A rule in the form the gateway consumes, with every handler slot filled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRule {
    pub upstream: CanonicalUpstream,
    pub id: String,
    #[serde(rename = "match")]
    pub r#match: Match,
    pub authenticators: Vec<Handler>,
    pub authorizer: Handler,
    pub mutators: Vec<Handler>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Handler>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalUpstream {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strip_path: Option<String>,
    pub preserve_host: bool,
}

// === impl DefaultPolicy ===

impl std::str::FromStr for DefaultPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "deny" => Ok(Self::Deny),
            "allow" => Ok(Self::Allow),
            s => Err(anyhow!("invalid default policy: {:?}", s)),
        }
    }
}

impl std::fmt::Display for DefaultPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deny => "deny".fmt(f),
            Self::Allow => "allow".fmt(f),
        }
    }
}

// === impl DefaultHandlers ===

impl From<DefaultPolicy> for DefaultHandlers {
    fn from(policy: DefaultPolicy) -> Self {
        let (authenticator, authorizer) = match policy {
            DefaultPolicy::Deny => ("unauthorized", "deny"),
            DefaultPolicy::Allow => ("noop", "allow"),
        };
        Self {
            authenticator: authenticator.to_string(),
            authorizer: authorizer.to_string(),
            mutator: "noop".to_string(),
        }
    }
}

impl Default for DefaultHandlers {
    fn default() -> Self {
        DefaultPolicy::default().into()
    }
}

fn default_handler(name: &str) -> Handler {
    Handler {
        name: name.to_string(),
        config: None,
    }
}

// === impl CanonicalRule ===

impl CanonicalRule {
    pub fn new(rule: &Rule, defaults: &DefaultHandlers) -> Self {
        let spec = &rule.spec;

        let upstream = spec
            .upstream
            .as_ref()
            .map(|Upstream { url, strip_path, preserve_host }| CanonicalUpstream {
                url: url.clone(),
                strip_path: strip_path.clone(),
                preserve_host: preserve_host.unwrap_or(false),
            })
            .unwrap_or_default();

        let authenticators = if spec.authenticators.is_empty() {
            vec![default_handler(&defaults.authenticator)]
        } else {
            spec.authenticators.clone()
        };

        let authorizer = spec
            .authorizer
            .clone()
            .unwrap_or_else(|| default_handler(&defaults.authorizer));

        let mutators = if spec.mutators.is_empty() {
            vec![default_handler(&defaults.mutator)]
        } else {
            spec.mutators.clone()
        };

        Self {
            upstream,
            id: Self::id(rule),
            r#match: spec.r#match.clone(),
            authenticators,
            authorizer,
            mutators,
            errors: spec.errors.clone(),
        }
    }

    /// The gateway rule ID: `<name>.<namespace>`.
    pub fn id(rule: &Rule) -> String {
        format!(
            "{}.{}",
            rule.name_any(),
            rule.namespace().unwrap_or_default()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rules_controller_k8s_api::RuleSpec;

    fn handler(name: &str) -> Handler {
        Handler {
            name: name.to_string(),
            config: None,
        }
    }

    fn static_rule(
        authenticators: Vec<Handler>,
        authorizer: Option<Handler>,
        mutators: Vec<Handler>,
    ) -> Rule {
        let mut rule = Rule::new(
            "r1",
            RuleSpec {
                upstream: Some(Upstream {
                    url: String::new(),
                    strip_path: Some(String::new()),
                    preserve_host: Some(false),
                }),
                r#match: Match {
                    url: String::new(),
                    methods: vec!["GET".to_string(), "POST".to_string()],
                },
                authenticators,
                authorizer,
                mutators,
                errors: vec![],
                config_map_name: None,
            },
        );
        rule.metadata.namespace = Some("test".to_string());
        rule
    }

    #[test]
    fn fills_every_missing_handler() {
        let defaults = DefaultHandlers::default();
        let rule = CanonicalRule::new(&static_rule(vec![], None, vec![]), &defaults);

        assert_eq!(rule.id, "r1.test");
        assert_eq!(rule.authenticators, vec![handler("unauthorized")]);
        assert_eq!(rule.authorizer, handler("deny"));
        assert_eq!(rule.mutators, vec![handler("noop")]);
    }

    #[test]
    fn fills_only_missing_handlers() {
        let defaults = DefaultHandlers::default();
        let rule = CanonicalRule::new(
            &static_rule(vec![], None, vec![handler("test-handler")]),
            &defaults,
        );

        assert_eq!(rule.authenticators, vec![handler("unauthorized")]);
        assert_eq!(rule.authorizer, handler("deny"));
        assert_eq!(rule.mutators, vec![handler("test-handler")]);
    }

    #[test]
    fn keeps_declared_handlers_in_order() {
        let defaults = DefaultHandlers::default();
        let rule = CanonicalRule::new(
            &static_rule(
                vec![handler("test-handler"), handler("test-handler2")],
                None,
                vec![handler("test-handler"), handler("test-handler2")],
            ),
            &defaults,
        );

        assert_eq!(
            rule.authenticators,
            vec![handler("test-handler"), handler("test-handler2")]
        );
        assert_eq!(
            rule.mutators,
            vec![handler("test-handler"), handler("test-handler2")]
        );
        assert_eq!(rule.authorizer, handler("deny"));
    }

    #[test]
    fn allow_policy_defaults() {
        let defaults = DefaultHandlers::from(DefaultPolicy::Allow);
        let rule = CanonicalRule::new(&static_rule(vec![], None, vec![]), &defaults);

        assert_eq!(rule.authenticators, vec![handler("noop")]);
        assert_eq!(rule.authorizer, handler("allow"));
        assert_eq!(rule.mutators, vec![handler("noop")]);
    }

    #[test]
    fn preserve_host_defaults_to_false() {
        let defaults = DefaultHandlers::default();
        for (declared, expected) in [(None, false), (Some(false), false), (Some(true), true)] {
            let mut rule = static_rule(vec![], None, vec![]);
            rule.spec.upstream = Some(Upstream {
                url: "http://backend".to_string(),
                strip_path: None,
                preserve_host: declared,
            });
            let canonical = CanonicalRule::new(&rule, &defaults);
            assert_eq!(canonical.upstream.preserve_host, expected, "{declared:?}");
            assert_eq!(canonical.upstream.url, "http://backend");
        }
    }

    #[test]
    fn missing_upstream_is_empty() {
        let mut rule = static_rule(vec![], None, vec![]);
        rule.spec.upstream = None;
        let canonical = CanonicalRule::new(&rule, &DefaultHandlers::default());
        assert_eq!(canonical.upstream, CanonicalUpstream::default());

        let json = serde_json::to_value(&canonical).unwrap();
        assert_eq!(
            json["upstream"],
            serde_json::json!({ "url": "", "preserve_host": false })
        );
    }

    #[test]
    fn parses_default_policy() {
        assert_eq!("deny".parse::<DefaultPolicy>().unwrap(), DefaultPolicy::Deny);
        assert_eq!("allow".parse::<DefaultPolicy>().unwrap(), DefaultPolicy::Allow);
        assert!("Deny".parse::<DefaultPolicy>().is_err());
        assert_eq!(DefaultPolicy::Allow.to_string(), "allow");
    }
}
