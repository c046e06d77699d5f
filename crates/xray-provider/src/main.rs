//! xray-provider - reconcile declared Xray policies against a server
//!
//! Desired policies come from a YAML file; the last reconciled state is kept
//! in a JSON state file next to it.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use xray_provider::{
    Applier, ApplyReport, DesiredState, Diagnostic, Provider, ProviderConfig, Severity, StateFile,
};

/// Xray policy provider CLI
#[derive(Parser)]
#[command(name = "xray-provider")]
#[command(about = "Declarative management of JFrog Xray policies", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path (YAML, TOML or JSON)
    #[arg(short, long, global = true, env = "XRAY_PROVIDER_CONFIG")]
    config: Option<String>,

    /// Platform URL, overrides the config file and environment
    #[arg(long, global = true)]
    url: Option<String>,

    /// Access token, overrides the config file and environment
    #[arg(long, global = true)]
    access_token: Option<String>,

    /// OIDC integration name used to exchange a workload identity token
    #[arg(long, global = true)]
    oidc_provider_name: Option<String>,

    /// Skip the license tier check
    #[arg(long, global = true)]
    no_license_check: bool,

    /// State file path
    #[arg(short, long, global = true, default_value = "xray-state.json")]
    state: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable JSON logging
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Converge the server on a desired-state file
    Apply {
        /// Desired policies (YAML)
        file: PathBuf,
    },

    /// Refresh the state file from the server and report drift
    Read,

    /// Delete managed policies; all of them when no address is given
    Delete {
        /// Addresses such as `xray_license_policy.no-gpl`
        addresses: Vec<String>,
    },

    /// Adopt an existing policy
    Import {
        /// Resource type, e.g. `xray_security_policy`
        type_name: String,

        /// `name` or `name:project_key`
        id: String,
    },

    /// Print the schema of one or all resource types
    Schema {
        type_name: Option<String>,
    },

    /// List resource types
    Types,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| filter.into());

    if cli.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let provider = Provider::new();

    match &cli.command {
        Commands::Types => {
            for type_name in provider.resource_types() {
                println!("{}", type_name);
            }
            return Ok(());
        }
        Commands::Schema { type_name } => {
            let schemas = provider
                .resources()
                .filter(|r| type_name.as_deref().map_or(true, |t| t == r.type_name()))
                .map(|r| {
                    serde_json::json!({
                        "type": r.type_name(),
                        "description": r.description(),
                        "schema": r.schema(),
                    })
                })
                .collect::<Vec<_>>();
            if schemas.is_empty() {
                bail!("unknown resource type: {}", type_name.as_deref().unwrap_or_default());
            }
            println!("{}", serde_json::to_string_pretty(&schemas)?);
            return Ok(());
        }
        _ => {}
    }

    let mut config = ProviderConfig::load(cli.config.as_deref())?;
    if let Some(url) = &cli.url {
        config.url = Some(url.clone());
    }
    if let Some(token) = &cli.access_token {
        config.access_token = Some(token.clone());
    }
    if let Some(name) = &cli.oidc_provider_name {
        config.oidc_provider_name = Some(name.clone());
    }
    if cli.no_license_check {
        config.check_license = false;
    }

    let session = match provider
        .configure(config, concat!("cli-", env!("CARGO_PKG_VERSION")))
        .await
    {
        Ok(session) => session,
        Err(e) => {
            print_diagnostics(&[Diagnostic::from(&e)]);
            return Err(e.into());
        }
    };

    let mut state = StateFile::load(&cli.state)?;
    let applier = Applier::new(&provider, &session);

    let report = match &cli.command {
        Commands::Apply { file } => {
            let source = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let desired = DesiredState::from_yaml(&source)
                .with_context(|| format!("Failed to parse {}", file.display()))?;
            applier.apply(&desired, &mut state).await
        }
        Commands::Read => applier.refresh(&mut state).await,
        Commands::Delete { addresses } => applier.destroy(addresses, &mut state).await,
        Commands::Import { type_name, id } => applier.import(type_name, id, &mut state).await,
        Commands::Schema { .. } | Commands::Types => unreachable!("handled before configuring"),
    };

    state
        .save(&cli.state)
        .with_context(|| format!("Failed to write {}", cli.state.display()))?;

    print_report(&report);
    if report.has_errors() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_report(report: &ApplyReport) {
    for resource in &report.resources {
        println!("{}: {:?}", resource.address, resource.action);
    }
    print_diagnostics(&report.diagnostics);
}

fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        let label = match diagnostic.severity {
            Severity::Error => "Error",
            Severity::Warning => "Warning",
        };
        match &diagnostic.resource {
            Some(resource) => eprintln!(
                "{}: {} ({})\n  {}",
                label, diagnostic.summary, resource, diagnostic.detail
            ),
            None => eprintln!("{}: {}\n  {}", label, diagnostic.summary, diagnostic.detail),
        }
    }
}
