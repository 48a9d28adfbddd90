//! `nodeflow` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`: start the API server with an in-process worker.
//! - `worker`: start a queue worker.
//! - `migrate`: run pending database migrations.
//! - `validate`: validate a workflow JSON file.
//! - `run`: run a workflow file in memory and print the final context.
//! - `encrypt-secret`: seal a credential value for the `credentials` table.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine::store::{CredentialStore, WorkflowStore};
use engine::trigger::manual_context;
use engine::{
    encrypt_secret, BroadcastPublisher, Credential, EncryptionKey, Engine, EngineConfig,
    ExecutionStatus, MemoryStore, PgStore, StoreCredentialResolver, Stores, Workflow,
    WorkflowRunner,
};
use nodes::{CredentialResolver, CredentialType, HttpClient, NodeRegistry, ReqwestClient};
use queue::{JobQueue, MemoryQueue};

#[derive(Parser)]
#[command(name = "nodeflow", about = "Workflow execution engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server and a worker in the same process.
    Serve {
        #[arg(long, env = "NODEFLOW_BIND", default_value = "0.0.0.0:8080")]
        bind: SocketAddr,
        #[command(flatten)]
        backend: BackendArgs,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Start a background worker that processes queued runs.
    Worker {
        #[command(flatten)]
        backend: BackendArgs,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Run a workflow file against in-memory stores.
    Run {
        /// Path to the workflow JSON file.
        path: PathBuf,
        /// Initial context, as a JSON object.
        #[arg(long)]
        input: Option<String>,
        /// Credential available to the run, as `ID:TYPE:VALUE`. Repeatable.
        #[arg(long = "credential", value_name = "ID:TYPE:VALUE")]
        credentials: Vec<String>,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Encrypt a secret for storage in the `credentials` table.
    EncryptSecret {
        value: String,
        /// Base64 key; a fresh key is generated and printed when omitted.
        #[arg(long, env = "CREDENTIAL_ENCRYPTION_KEY")]
        encryption_key: Option<String>,
    },
}

#[derive(Args)]
struct BackendArgs {
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 10)]
    max_connections: u32,
    /// Base64 of the 32-byte credential encryption key.
    #[arg(long, env = "CREDENTIAL_ENCRYPTION_KEY", hide_env_values = true)]
    encryption_key: String,
}

#[derive(Args)]
struct EngineArgs {
    #[arg(long, env = "NODEFLOW_MAX_CONCURRENT_RUNS", default_value_t = 8)]
    max_concurrent_runs: usize,
    #[arg(long, env = "NODEFLOW_POLL_INTERVAL_MS", default_value_t = 500)]
    poll_interval_ms: u64,
    /// Attempts per step, the first one included.
    #[arg(long, env = "NODEFLOW_STEP_MAX_ATTEMPTS", default_value_t = 4)]
    step_max_attempts: u32,
    /// Outbound HTTP timeout in seconds.
    #[arg(long, env = "NODEFLOW_HTTP_TIMEOUT_SECS", default_value_t = 30)]
    http_timeout_secs: u64,
    /// Seconds a claimed job may go without a heartbeat before another
    /// worker reclaims it.
    #[arg(long, env = "NODEFLOW_JOB_LEASE_SECS", default_value_t = 300)]
    job_lease_secs: u64,
}

impl EngineArgs {
    fn config(&self) -> EngineConfig {
        let mut config = EngineConfig {
            max_concurrent_runs: self.max_concurrent_runs,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            job_heartbeat: (self.job_lease() / 3).max(Duration::from_secs(1)),
            ..EngineConfig::default()
        };
        config.retry.max_attempts = self.step_max_attempts;
        config
    }

    fn job_lease(&self) -> Duration {
        Duration::from_secs(self.job_lease_secs)
    }
}

/// Everything a running service needs, wired together.
struct Services {
    engine: Arc<Engine>,
    publisher: Arc<BroadcastPublisher>,
    credentials: Arc<dyn CredentialResolver>,
    http: Arc<dyn HttpClient>,
}

fn build_services(
    stores: Stores,
    queue: Arc<dyn JobQueue>,
    key: EncryptionKey,
    args: &EngineArgs,
) -> Result<Services> {
    let config = args.config();
    let publisher = Arc::new(BroadcastPublisher::new(config.status_channel_capacity));
    let credentials: Arc<dyn CredentialResolver> =
        Arc::new(StoreCredentialResolver::new(stores.credentials.clone(), key));
    let http: Arc<dyn HttpClient> =
        Arc::new(ReqwestClient::new(Duration::from_secs(args.http_timeout_secs))?);

    let runner = WorkflowRunner::new(
        stores,
        NodeRegistry::builtin(),
        publisher.clone(),
        credentials.clone(),
        http.clone(),
        config.retry.clone(),
    )?;
    let engine = Arc::new(Engine::new(Arc::new(runner), queue, config));

    Ok(Services {
        engine,
        publisher,
        credentials,
        http,
    })
}

async fn postgres_services(backend: &BackendArgs, args: &EngineArgs) -> Result<Services> {
    let key = EncryptionKey::from_base64(&backend.encryption_key)
        .context("CREDENTIAL_ENCRYPTION_KEY is invalid")?;
    let pool = db::create_pool(&backend.database_url, backend.max_connections).await?;
    let store = Arc::new(PgStore::new(pool).with_job_lease(args.job_lease()));
    build_services(Stores::shared(store.clone()), store, key, args)
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
        token.cancel();
    });
}

fn read_workflow(path: &Path) -> Result<Workflow> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid workflow JSON in {}", path.display()))
}

fn parse_credential(raw: &str, user_id: &str, key: &EncryptionKey) -> Result<Credential> {
    let mut parts = raw.splitn(3, ':');
    let (Some(id), Some(kind), Some(value)) = (parts.next(), parts.next(), parts.next()) else {
        bail!("credential '{raw}' is not in ID:TYPE:VALUE form");
    };
    let kind: CredentialType = kind.parse().map_err(anyhow::Error::msg)?;
    Ok(Credential {
        id: id.to_owned(),
        user_id: user_id.to_owned(),
        name: id.to_owned(),
        kind,
        encrypted_value: encrypt_secret(key, value)?,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind, backend, engine } => {
            let services = postgres_services(&backend, &engine).await?;
            let shutdown = CancellationToken::new();
            cancel_on_ctrl_c(shutdown.clone());

            let worker = tokio::spawn(services.engine.clone().run_worker(shutdown.clone()));
            let state = api::AppState {
                engine: services.engine,
                publisher: services.publisher,
                credentials: services.credentials,
                http: services.http,
            };
            let stop = shutdown.clone();
            api::serve(bind, state, async move { stop.cancelled().await }).await?;

            shutdown.cancel();
            worker.await?;
        }
        Command::Worker { backend, engine } => {
            let services = postgres_services(&backend, &engine).await?;
            let shutdown = CancellationToken::new();
            cancel_on_ctrl_c(shutdown.clone());
            services.engine.run_worker(shutdown).await;
        }
        Command::Migrate { database_url } => {
            let pool = db::create_pool(&database_url, 2).await?;
            db::run_migrations(&pool).await?;
            info!("migrations applied");
        }
        Command::Validate { path } => {
            let workflow = read_workflow(&path)?;
            match engine::validate_dag(&workflow) {
                Ok(order) => println!("Workflow is valid. Execution order: {order:?}"),
                Err(e) => {
                    eprintln!("Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Run {
            path,
            input,
            credentials,
            engine,
        } => {
            let workflow = read_workflow(&path)?;
            let input: Option<Value> = input
                .map(|raw| serde_json::from_str(&raw))
                .transpose()
                .context("--input is not valid JSON")?;

            let key = EncryptionKey::generate();
            let store = Arc::new(MemoryStore::new());
            store.save_workflow(&workflow).await?;
            for raw in &credentials {
                store
                    .save_credential(&parse_credential(raw, &workflow.user_id, &key)?)
                    .await?;
            }

            let services = build_services(
                Stores::shared(store),
                Arc::new(MemoryQueue::new()),
                key,
                &engine,
            )?;
            services
                .engine
                .start_workflow_execution(workflow.id, manual_context(input)?)
                .await?;

            for result in services.engine.run_pending().await? {
                println!("{}", serde_json::to_string_pretty(&result.context)?);
                if result.status == ExecutionStatus::Failed {
                    eprintln!(
                        "Execution failed: {}",
                        result.error.as_deref().unwrap_or("unknown error")
                    );
                    std::process::exit(1);
                }
            }
        }
        Command::EncryptSecret {
            value,
            encryption_key,
        } => {
            let key = match encryption_key {
                Some(encoded) => EncryptionKey::from_base64(&encoded)?,
                None => {
                    let key = EncryptionKey::generate();
                    eprintln!("Generated CREDENTIAL_ENCRYPTION_KEY={}", key.to_base64());
                    key
                }
            };
            println!("{}", encrypt_secret(&key, &value)?);
        }
    }

    Ok(())
}
