use crate::{
    controller::{self, Context, Leader},
    core::{validation, DefaultHandlers, DefaultPolicy},
    k8s::{self, ResourceId, Rule},
    lease,
    reconcile::{
        ConfigMapTarget, DocumentTarget, FileTarget, KubeRules, ReconcileMetrics, Reconciler,
        RetryPolicy,
    },
    validation::parse_rules_file_name,
};
use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{info, info_span, Instrument};

const DEFAULT_CONFIGMAP_NAME: &str = "oathkeeper-rules";
const DEFAULT_CONFIGMAP_NAMESPACE: &str = "oathkeeper-maester-system";

#[derive(Debug, Parser)]
#[clap(name = "rules-controller", about = "Publishes access rules to the gateway")]
pub struct Args {
    #[clap(
        long,
        default_value = "rules_controller=info,warn",
        env = "RULES_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Name of the rules document, used as the ConfigMap entry.
    #[clap(long, default_value = "access-rules.json", value_parser = parse_rules_file_name)]
    rules_file_name: String,

    /// Only reconciles rules in this namespace. All namespaces are watched by default.
    #[clap(long)]
    watch_namespace: Option<String>,

    /// Handlers filled in for rules that omit them: `deny` or `allow`.
    #[clap(long, default_value = "deny")]
    default_policy: DefaultPolicy,

    /// Comma-separated authenticator handlers that rules may use.
    #[clap(long, env = "authenticatorsAvailable", default_value = "")]
    authenticators_available: String,

    /// Comma-separated authorizer handlers that rules may use.
    #[clap(long, env = "authorizersAvailable", default_value = "")]
    authorizers_available: String,

    /// Comma-separated mutator handlers that rules may use.
    #[clap(long, env = "mutatorsAvailable", default_value = "")]
    mutators_available: String,

    /// Comma-separated error handlers that rules may use.
    #[clap(long, env = "errorsAvailable", default_value = "")]
    errors_available: String,

    #[clap(long, default_value = "5")]
    retry_attempts: u32,

    #[clap(long, default_value = "2000")]
    retry_delay_ms: u64,

    /// Only the replica holding the lease writes the rules document.
    #[clap(long)]
    enable_leader_election: bool,

    #[clap(long, default_value = DEFAULT_CONFIGMAP_NAMESPACE)]
    leader_election_namespace: String,

    #[clap(subcommand)]
    mode: Option<Mode>,
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
enum Mode {
    /// Writes rules to a ConfigMap (the default).
    Controller {
        #[clap(long, default_value = DEFAULT_CONFIGMAP_NAME)]
        rules_configmap_name: String,

        #[clap(long, default_value = DEFAULT_CONFIGMAP_NAMESPACE)]
        rules_configmap_namespace: String,
    },

    /// Writes rules to a file shared with the gateway.
    Sidecar {
        #[clap(long, default_value = "/etc/config/access-rules.json")]
        rules_file_path: String,
    },
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            rules_file_name,
            watch_namespace,
            default_policy,
            authenticators_available,
            authorizers_available,
            mutators_available,
            errors_available,
            retry_attempts,
            retry_delay_ms,
            enable_leader_election,
            leader_election_namespace,
            mode,
        } = self;

        let mut prom = <Registry>::default();
        let metrics = ReconcileMetrics::register(prom.sub_registry_with_prefix("rules_controller"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let validation = Arc::new(validation::Config {
            authenticators: allow_list(
                "authenticatorsAvailable",
                &authenticators_available,
                validation::DEFAULT_AUTHENTICATORS,
            ),
            authorizers: allow_list(
                "authorizersAvailable",
                &authorizers_available,
                validation::DEFAULT_AUTHORIZERS,
            ),
            mutators: allow_list(
                "mutatorsAvailable",
                &mutators_available,
                validation::DEFAULT_MUTATORS,
            ),
            error_handlers: allow_list(
                "errorsAvailable",
                &errors_available,
                validation::DEFAULT_ERROR_HANDLERS,
            ),
        });
        let defaults = DefaultHandlers::from(default_policy);
        if let Err(invalid) = validation.check_defaults(&defaults) {
            bail!("default policy {default_policy} uses handlers that are not available: {invalid}");
        }

        let retry = RetryPolicy::new(retry_attempts, Duration::from_millis(retry_delay_ms));
        let target: Arc<dyn DocumentTarget> = match mode.unwrap_or_else(default_mode) {
            Mode::Controller {
                rules_configmap_name,
                rules_configmap_namespace,
            } => {
                let default = ResourceId::new(rules_configmap_namespace, rules_configmap_name);
                info!(configmap = %default, entry = %rules_file_name, "Running in controller mode");
                Arc::new(ConfigMapTarget::new(
                    runtime.client(),
                    default,
                    rules_file_name,
                    retry,
                ))
            }
            Mode::Sidecar { rules_file_path } => {
                info!(path = %rules_file_path, "Running in sidecar mode");
                Arc::new(FileTarget::new(rules_file_path))
            }
        };

        let leader = if enable_leader_election {
            let hostname = std::env::var("HOSTNAME")
                .context("failed to fetch `HOSTNAME` environment variable")?;
            let claims = lease::init(&runtime, &leader_election_namespace, &hostname).await?;
            Some(Leader::new(claims, hostname))
        } else {
            None
        };

        let rules = KubeRules::new(runtime.client(), watch_namespace.clone());
        let reconciler = Reconciler::new(rules, target, validation, defaults, metrics);
        let api = match &watch_namespace {
            Some(ns) => k8s::Api::<Rule>::namespaced(runtime.client(), ns),
            None => k8s::Api::<Rule>::all(runtime.client()),
        };

        tokio::spawn(
            controller::run(
                api,
                Arc::new(Context::new(reconciler, leader)),
                runtime.shutdown_handle(),
            )
            .instrument(info_span!("rules")),
        );

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

fn default_mode() -> Mode {
    Mode::Controller {
        rules_configmap_name: DEFAULT_CONFIGMAP_NAME.to_string(),
        rules_configmap_namespace: DEFAULT_CONFIGMAP_NAMESPACE.to_string(),
    }
}

/// Parses an allow-list, falling back to the built-in handlers when it is empty.
fn allow_list(name: &str, list: &str, default: &[&str]) -> Vec<String> {
    let parsed = validation::parse_list(list);
    if parsed.is_empty() {
        info!("Using default values for {name}");
        return default.iter().map(ToString::to_string).collect();
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("rules-controller").chain(args.iter().copied()))
            .expect("arguments must parse")
    }

    #[test]
    fn defaults_to_controller_mode() {
        let args = parse(&[]);
        assert_eq!(args.mode, None);
        assert_eq!(args.rules_file_name, "access-rules.json");
        assert_eq!(args.default_policy, DefaultPolicy::Deny);
        assert_eq!(args.retry_attempts, 5);
        assert_eq!(args.retry_delay_ms, 2000);
        assert!(!args.enable_leader_election);
        assert_eq!(
            default_mode(),
            Mode::Controller {
                rules_configmap_name: "oathkeeper-rules".to_string(),
                rules_configmap_namespace: "oathkeeper-maester-system".to_string(),
            }
        );
    }

    #[test]
    fn parses_controller_mode() {
        let args = parse(&[
            "--default-policy=allow",
            "controller",
            "--rules-configmap-name=rules",
            "--rules-configmap-namespace=gateway",
        ]);
        assert_eq!(args.default_policy, DefaultPolicy::Allow);
        assert_eq!(
            args.mode,
            Some(Mode::Controller {
                rules_configmap_name: "rules".to_string(),
                rules_configmap_namespace: "gateway".to_string(),
            })
        );
    }

    #[test]
    fn parses_sidecar_mode() {
        let args = parse(&["sidecar"]);
        assert_eq!(
            args.mode,
            Some(Mode::Sidecar {
                rules_file_path: "/etc/config/access-rules.json".to_string(),
            })
        );
    }

    #[test]
    fn rejects_invalid_rules_file_name() {
        let res = Args::try_parse_from(["rules-controller", "--rules-file-name=rules/../x.json"]);
        assert!(res.is_err());
    }

    #[test]
    fn allow_list_falls_back_to_defaults() {
        assert_eq!(
            allow_list("mutatorsAvailable", " , ", &["noop", "header"]),
            vec!["noop".to_string(), "header".to_string()]
        );
        assert_eq!(
            allow_list("mutatorsAvailable", "header, cookie", &["noop"]),
            vec!["header".to_string(), "cookie".to_string()]
        );
    }
}
