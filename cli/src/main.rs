//! Command-line front end for the InstantDB admin API.
//!
//! Credentials come from `--app-id` / `--secret` or the environment
//! (`INSTANT_APP_ID`, `INSTANT_SECRET`, falling back to `APP_ID`, `SECRET`).
//! Results are printed to stdout as JSON.

use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use instant_core::config::{ENV_APP_ID, ENV_BASE_URL, ENV_SECRET};
use instant_core::{lookup, new_id, AdminClient, ClientConfig, Context, Step, Target};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "instant")]
#[command(about = "Query and mutate an InstantDB app through the admin API")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    connection: Connection,

    #[command(flatten)]
    identity: IdentityArgs,

    /// Abort the request after this many seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Connection {
    /// Application id (defaults to INSTANT_APP_ID / APP_ID)
    #[arg(long, global = true)]
    app_id: Option<String>,

    /// Admin secret (defaults to INSTANT_SECRET / SECRET)
    #[arg(long, global = true)]
    secret: Option<String>,

    /// API base URL (defaults to INSTANT_API_URL or the production host)
    #[arg(long, global = true)]
    base_url: Option<String>,
}

#[derive(Args)]
#[group(multiple = false)]
struct IdentityArgs {
    /// Evaluate permissions as the user with this email
    #[arg(long, global = true)]
    as_email: Option<String>,

    /// Evaluate permissions as the owner of this refresh token
    #[arg(long, global = true)]
    as_token: Option<String>,

    /// Evaluate permissions as an unauthenticated guest
    #[arg(long, global = true)]
    as_guest: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run a query, e.g. '{"todos": {}}'
    Query {
        /// Query as JSON
        query: String,
    },
    /// Create or merge attributes into a record
    Update {
        namespace: String,
        /// Record id; generated when omitted
        #[arg(long)]
        id: Option<String>,
        /// Address the record by `attribute=value` instead of its id
        #[arg(long, conflicts_with = "id")]
        lookup: Option<String>,
        /// Attributes as a JSON object
        payload: String,
    },
    /// Delete a record
    Delete { namespace: String, id: String },
    /// Link two records
    Link {
        namespace: String,
        id: String,
        other_namespace: String,
        other_id: String,
    },
    /// Remove the link between two records
    Unlink {
        namespace: String,
        id: String,
        other_namespace: String,
        other_id: String,
    },
    /// Issue a refresh token for an email
    CreateToken { email: String },
    /// Look up the user owning a refresh token
    VerifyToken { refresh_token: String },
    /// Print a fresh record id
    NewId,
}

fn main() -> Result<()> {
    // Quiet by default; RUST_LOG=debug shows each request and response status.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok()))
        .init();

    let cli = Cli::parse();

    if let Command::NewId = cli.command {
        println!("{}", new_id());
        return Ok(());
    }

    let client = build_client(&cli.connection, &cli.identity, |key| std::env::var(key).ok())?;
    let ctx = match cli.timeout {
        Some(secs) => Context::with_timeout(Duration::from_secs(secs)),
        None => Context::background(),
    };

    let output = run(&client, &ctx, cli.command)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// `RUST_LOG` directives when set, otherwise warnings only.
fn log_filter(directives: Option<String>) -> EnvFilter {
    match directives.filter(|d| !d.trim().is_empty()) {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::new("warn"),
    }
}

/// Command-line flags first, then the environment as read by
/// `ClientConfig::from_lookup` (empty values count as unset).
fn resolve_config(
    connection: &Connection,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ClientConfig> {
    let lookup = |key: &str| {
        let flag = match key {
            ENV_APP_ID => connection.app_id.clone(),
            ENV_SECRET => connection.secret.clone(),
            ENV_BASE_URL => connection.base_url.clone(),
            _ => None,
        };
        flag.or_else(|| env(key))
    };
    ClientConfig::from_lookup(lookup).context("credentials not configured")
}

fn build_client(
    connection: &Connection,
    identity: &IdentityArgs,
    env: impl Fn(&str) -> Option<String>,
) -> Result<AdminClient> {
    let config = resolve_config(connection, env)?;
    tracing::debug!(?config, "client configuration");

    let mut client = AdminClient::from_config(&config);
    if let Some(email) = &identity.as_email {
        client.as_email(email.as_str());
    } else if let Some(token) = &identity.as_token {
        client.as_token(token.as_str());
    } else if identity.as_guest {
        client.as_guest();
    }
    Ok(client)
}

fn run(client: &AdminClient, ctx: &Context, command: Command) -> Result<serde_json::Value> {
    let transact = |step: Step| -> Result<serde_json::Value> {
        let encoded = step.encode();
        client.transact(ctx, &[step])?;
        Ok(serde_json::json!({ "applied": [encoded] }))
    };

    match command {
        Command::Query { query } => {
            let query: serde_json::Value = serde_json::from_str(&query).context("query is not valid JSON")?;
            Ok(client.query(ctx, &query)?)
        }
        Command::Update {
            namespace,
            id,
            lookup: by,
            payload,
        } => {
            let payload: serde_json::Value =
                serde_json::from_str(&payload).context("payload is not valid JSON")?;
            let id = match (id, by) {
                (_, Some(by)) => {
                    let (attribute, value) = by
                        .split_once('=')
                        .context("--lookup expects attribute=value")?;
                    lookup(attribute, value)
                }
                (Some(id), None) => id,
                (None, None) => new_id(),
            };
            transact(Step::update(namespace, id, &payload)?)
        }
        Command::Delete { namespace, id } => transact(Step::delete(namespace, id)),
        Command::Link {
            namespace,
            id,
            other_namespace,
            other_id,
        } => transact(Step::link(
            Target::new(namespace, id),
            Target::new(other_namespace, other_id),
        )),
        Command::Unlink {
            namespace,
            id,
            other_namespace,
            other_id,
        } => transact(Step::unlink(
            Target::new(namespace, id),
            Target::new(other_namespace, other_id),
        )),
        Command::CreateToken { email } => Ok(serde_json::to_value(client.create_token(ctx, &email)?)?),
        Command::VerifyToken { refresh_token } => {
            Ok(serde_json::to_value(client.verify_token(ctx, &refresh_token)?)?)
        }
        Command::NewId => Ok(serde_json::Value::String(new_id())),
    }
}
