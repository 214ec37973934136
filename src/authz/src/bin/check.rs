//! # Offline authorization check
//!
//! Evaluates one rule against local files and prints the decision as JSON.
//!
//! ```text
//! accessguard-check --policy policy.json --directory people.json \
//!     --claims token.json --rule own-profile --resource profile/42 \
//!     --attr owner=leonardo@x.com
//! ```
//!
//! Engine settings come from `--config` or the `ACCESSGUARD_*` environment
//! variables. Exit status is 0 when allowed, 2 when denied.
//!
//! Environment variables:
//! - `RUST_LOG` - Log level (default: info)

use accessguard_authz::{
    EngineConfig, InMemoryDirectory, PolicyEngine, PolicyRegistry, RequestContext,
    TracingAuditSink, VerifiedToken,
};
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "accessguard-check", version, about = "Evaluate an authorization rule offline")]
struct Cli {
    /// JSON policy file with named rules
    #[arg(long, env = "ACCESSGUARD_POLICY")]
    policy: PathBuf,

    /// JSON directory file with email, department and title records
    #[arg(long, env = "ACCESSGUARD_DIRECTORY")]
    directory: PathBuf,

    /// JSON file with verified token claims; omit to check as unauthenticated
    #[arg(long)]
    claims: Option<PathBuf>,

    /// Rule to evaluate
    #[arg(long)]
    rule: String,

    /// Resource identifier
    #[arg(long, default_value = "")]
    resource: String,

    /// Context attribute as key=value (repeatable)
    #[arg(long = "attr", value_parser = parse_attribute)]
    attributes: Vec<(String, String)>,

    /// JSON engine config file; defaults to the environment
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pretty-print the decision
    #[arg(long)]
    pretty: bool,
}

fn parse_attribute(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only the decision
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    info!("Starting accessguard-check v{}", accessguard_authz::VERSION);

    let config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::from_env().context("reading ACCESSGUARD_* environment")?,
    };

    let registry = PolicyRegistry::from_json_file(&cli.policy)
        .with_context(|| format!("loading policy {}", cli.policy.display()))?;
    registry.require(&cli.rule).with_context(|| {
        format!(
            "{} defines: {}",
            cli.policy.display(),
            registry.names().join(", ")
        )
    })?;

    let directory = InMemoryDirectory::from_json_file(&cli.directory)
        .with_context(|| format!("loading directory {}", cli.directory.display()))?;

    let engine = PolicyEngine::new(config, registry, Arc::new(directory))?
        .with_audit_sink(Arc::new(TracingAuditSink));

    let identity = match &cli.claims {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading claims {}", path.display()))?;
            let token: VerifiedToken = serde_json::from_str(&raw)
                .with_context(|| format!("parsing claims {}", path.display()))?;
            Some(engine.identify(&token)?)
        }
        None => None,
    };

    let context = cli
        .attributes
        .into_iter()
        .fold(RequestContext::new(cli.resource), |ctx, (key, value)| {
            ctx.with_attribute(key, value)
        });

    let decision = engine.authorize(identity.as_ref(), &cli.rule, &context).await;
    engine.shutdown().await;

    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&decision)?
    } else {
        serde_json::to_string(&decision)?
    };
    println!("{}", rendered);

    if !decision.allowed {
        std::process::exit(2);
    }
    Ok(())
}
