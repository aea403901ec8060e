use crate::DefaultHandlers;
use rules_controller_k8s_api::{Handler, Rule};
use std::fmt;
use thiserror::Error;

pub const DEFAULT_AUTHENTICATORS: &[&str] = &[
    "noop",
    "unauthorized",
    "anonymous",
    "cookie_session",
    "oauth2_client_credentials",
    "oauth2_introspection",
    "jwt",
    "bearer_token",
];
pub const DEFAULT_AUTHORIZERS: &[&str] =
    &["allow", "deny", "keto_engine_acp_ory", "remote", "remote_json"];
pub const DEFAULT_MUTATORS: &[&str] = &["noop", "id_token", "header", "cookie", "hydrator"];
pub const DEFAULT_ERROR_HANDLERS: &[&str] = &["json", "redirect", "www_authenticate"];

/// The handler names that rules may reference, one allow-list per handler kind.
///
/// Built once at startup and shared, read-only, by every reconciliation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub authenticators: Vec<String>,
    pub authorizers: Vec<String>,
    pub mutators: Vec<String>,
    pub error_handlers: Vec<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Authenticator,
    Authorizer,
    Mutator,
    Error,
}

/// A handler reference that is not in its kind's allow-list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidHandler {
    pub kind: HandlerKind,
    pub name: String,
}

/// Every disallowed handler declared by a rule, in declaration order.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid handlers: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
pub struct InvalidHandlers(pub Vec<InvalidHandler>);

// === impl Config ===

impl Default for Config {
    fn default() -> Self {
        Self {
            authenticators: to_strings(DEFAULT_AUTHENTICATORS),
            authorizers: to_strings(DEFAULT_AUTHORIZERS),
            mutators: to_strings(DEFAULT_MUTATORS),
            error_handlers: to_strings(DEFAULT_ERROR_HANDLERS),
        }
    }
}

impl Config {
    pub fn is_authenticator_valid(&self, name: &str) -> bool {
        self.is_valid(HandlerKind::Authenticator, name)
    }

    pub fn is_authorizer_valid(&self, name: &str) -> bool {
        self.is_valid(HandlerKind::Authorizer, name)
    }

    pub fn is_mutator_valid(&self, name: &str) -> bool {
        self.is_valid(HandlerKind::Mutator, name)
    }

    pub fn is_error_handler_valid(&self, name: &str) -> bool {
        self.is_valid(HandlerKind::Error, name)
    }

    /// Exact, case-sensitive membership in the allow-list for `kind`.
    pub fn is_valid(&self, kind: HandlerKind, name: &str) -> bool {
        let allowed = match kind {
            HandlerKind::Authenticator => &self.authenticators,
            HandlerKind::Authorizer => &self.authorizers,
            HandlerKind::Mutator => &self.mutators,
            HandlerKind::Error => &self.error_handlers,
        };
        allowed.iter().any(|a| a == name)
    }

    /// Checks every handler a rule declares, collecting all that are not allowed.
    ///
    /// Omitted handlers are always valid: defaults are filled in when the rule is canonicalized.
    pub fn validate(&self, rule: &Rule) -> Result<(), InvalidHandlers> {
        let spec = &rule.spec;
        let declared = spec
            .authenticators
            .iter()
            .map(|h| (HandlerKind::Authenticator, h))
            .chain(spec.authorizer.iter().map(|h| (HandlerKind::Authorizer, h)))
            .chain(spec.mutators.iter().map(|h| (HandlerKind::Mutator, h)))
            .chain(spec.errors.iter().map(|h| (HandlerKind::Error, h)));
        self.check(declared)
    }

    /// Ensures that the handlers injected by canonicalization would themselves pass validation.
    pub fn check_defaults(&self, defaults: &DefaultHandlers) -> Result<(), InvalidHandlers> {
        let authenticator = Handler {
            name: defaults.authenticator.clone(),
            config: None,
        };
        let authorizer = Handler {
            name: defaults.authorizer.clone(),
            config: None,
        };
        let mutator = Handler {
            name: defaults.mutator.clone(),
            config: None,
        };
        self.check([
            (HandlerKind::Authenticator, &authenticator),
            (HandlerKind::Authorizer, &authorizer),
            (HandlerKind::Mutator, &mutator),
        ])
    }

    fn check<'h>(
        &self,
        handlers: impl IntoIterator<Item = (HandlerKind, &'h Handler)>,
    ) -> Result<(), InvalidHandlers> {
        let invalid = handlers
            .into_iter()
            .filter(|(kind, h)| !self.is_valid(*kind, &h.name))
            .map(|(kind, h)| InvalidHandler {
                kind,
                name: h.name.clone(),
            })
            .collect::<Vec<_>>();

        if invalid.is_empty() {
            Ok(())
        } else {
            Err(InvalidHandlers(invalid))
        }
    }
}

/// Parses a comma-separated list of handler names, dropping blank entries.
pub fn parse_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn to_strings(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}

// === impl HandlerKind ===

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authenticator => "authenticator".fmt(f),
            Self::Authorizer => "authorizer".fmt(f),
            Self::Mutator => "mutator".fmt(f),
            Self::Error => "error".fmt(f),
        }
    }
}

impl fmt::Display for InvalidHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}
