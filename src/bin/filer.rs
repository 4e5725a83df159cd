//! Filer server binary

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use weedfiler::common::{BackendKind, Config};
use weedfiler::security::OperationKind;
use weedfiler::{FilerServer, TokenIssuer};

#[derive(Parser)]
#[command(name = "weedfiler")]
#[command(version = weedfiler::BUILD_INFO)]
#[command(about = "Filer server with master failover and pluggable metadata stores")]
struct Cli {
    /// Config file (TOML); defaults to ./weedfiler.toml if present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the filer server
    Serve(ServeArgs),

    /// Print a short-lived token for a file id
    Token {
        /// File id, e.g. 3,01637037d6
        fid: String,

        /// Signing secret; falls back to the configured one
        #[arg(long)]
        secret: Option<String>,
    },
}

#[derive(clap::Args)]
struct ServeArgs {
    /// IP address to bind to
    #[arg(long)]
    ip: Option<String>,

    /// HTTP port
    #[arg(long)]
    port: Option<u16>,

    /// Seed master address
    #[arg(long)]
    master: Option<String>,

    /// Directory for the embedded metadata store
    #[arg(long)]
    dir: Option<PathBuf>,

    #[arg(long)]
    collection: Option<String>,

    #[arg(long)]
    default_replication: Option<String>,

    /// Proxy reads instead of redirecting to volume servers
    #[arg(long)]
    no_redirect_on_read: bool,

    #[arg(long)]
    disable_dir_listing: bool,

    /// Largest request body accepted, in MB
    #[arg(long)]
    max_mb: Option<u32>,

    /// Token signing secret
    #[arg(long)]
    secret: Option<String>,

    /// Metadata backend: embedded, cassandra or redis
    #[arg(long)]
    backend: Option<BackendKind>,

    #[arg(long)]
    cassandra_server: Option<String>,

    #[arg(long)]
    cassandra_keyspace: Option<String>,

    #[arg(long)]
    redis_server: Option<String>,

    #[arg(long)]
    redis_password: Option<String>,

    #[arg(long)]
    redis_database: Option<i64>,

    /// Allowed client IP or CIDR for an operation, as KIND=ENTRY (repeatable)
    #[arg(long = "ip-whitelist", value_parser = parse_guard_entry)]
    ip_whitelist: Vec<(OperationKind, String)>,

    /// Allowed path root for an operation, as KIND=ROOT (repeatable)
    #[arg(long = "root-whitelist", value_parser = parse_guard_entry)]
    root_whitelist: Vec<(OperationKind, String)>,

    /// Token secret for an operation, as KIND=SECRET
    #[arg(long = "secure-key", value_parser = parse_guard_entry)]
    secure_key: Vec<(OperationKind, String)>,
}

fn parse_guard_entry(s: &str) -> Result<(OperationKind, String), String> {
    let (kind, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KIND=VALUE, got '{}'", s))?;
    let kind = kind.parse::<OperationKind>().map_err(|e| e.to_string())?;
    Ok((kind, value.to_string()))
}

impl ServeArgs {
    /// CLI values take priority over file and environment settings
    fn apply(self, config: &mut Config) {
        if let Some(ip) = self.ip {
            config.ip = ip;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(master) = self.master {
            config.master = master;
        }
        if let Some(dir) = self.dir {
            config.dir = dir;
        }
        if let Some(collection) = self.collection {
            config.collection = collection;
        }
        if let Some(replication) = self.default_replication {
            config.default_replication = replication;
        }
        if self.no_redirect_on_read {
            config.redirect_on_read = false;
        }
        if self.disable_dir_listing {
            config.disable_dir_listing = true;
        }
        if let Some(max_mb) = self.max_mb {
            config.max_mb = max_mb;
        }
        if let Some(secret) = self.secret {
            config.secret = secret;
        }
        if self.backend.is_some() {
            config.backend = self.backend;
        }
        if let Some(server) = self.cassandra_server {
            config.cassandra.server = server;
        }
        if let Some(keyspace) = self.cassandra_keyspace {
            config.cassandra.keyspace = keyspace;
        }
        if let Some(server) = self.redis_server {
            config.redis.server = server;
        }
        if let Some(password) = self.redis_password {
            config.redis.password = password;
        }
        if let Some(database) = self.redis_database {
            config.redis.database = database;
        }
        for (kind, entry) in self.ip_whitelist {
            config.guards.entry(kind).or_default().ip_whitelist.push(entry);
        }
        for (kind, root) in self.root_whitelist {
            config.guards.entry(kind).or_default().root_whitelist.push(root);
        }
        for (kind, key) in self.secure_key {
            config.guards.entry(kind).or_default().secure_key = key;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Serve(args) => {
            args.apply(&mut config);
            let server = FilerServer::new(config).await?;
            server
                .serve(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await?;
        }
        Commands::Token { fid, secret } => {
            let issuer = TokenIssuer::new(secret.unwrap_or(config.secret));
            let token = issuer.issue(&fid)?;
            if token.is_empty() {
                anyhow::bail!("no secret configured, tokens are disabled");
            }
            println!("{}", token);
        }
    }

    Ok(())
}
