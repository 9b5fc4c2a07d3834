/// Version injected at compile time via CLOUDINV_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("CLOUDINV_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use cloudinv::config::Config;
use cloudinv::provider::http::{format_api_error, HttpClientFactory};
use cloudinv::provider::memory::{MemoryProvider, Snapshot};
use cloudinv::provider::{ApiRegionCatalog, ClientFactory, Region, RegionCatalog, StaticRegions};
use cloudinv::resource::{get_all_resource_kinds, get_resource};
use cloudinv::{InventoryError, NodeRequest, Session};
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Region the region catalog itself is queried in
const HOME_REGION: &str = "us-east-1";

/// Multi-region cloud inventory
#[derive(Parser, Debug)]
#[command(name = "cloudinv", version, about, long_about = None)]
struct Args {
    /// Resource kind, e.g. aws.cloudwatch.loggroup (defaults to the last one used)
    kind: Option<String>,

    /// Resolve a single node by identity
    #[arg(long, conflicts_with = "lookup")]
    id: Option<String>,

    /// Resolve a single node by attribute, as ATTR=VALUE
    #[arg(long)]
    lookup: Option<String>,

    /// Derived field to include for each node (repeatable)
    #[arg(long = "field")]
    fields: Vec<String>,

    /// Child collection to list under each node, e.g. records (repeatable)
    #[arg(long = "children")]
    children: Vec<String>,

    /// Regions to query, comma separated
    #[arg(long, value_delimiter = ',')]
    regions: Option<Vec<String>>,

    /// Endpoint override (local emulator or signing proxy)
    #[arg(long)]
    endpoint: Option<String>,

    /// Serve every call from a snapshot file instead of the network
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Concurrent region jobs
    #[arg(long)]
    concurrency: Option<usize>,

    /// List the known resource kinds and exit
    #[arg(long)]
    list_kinds: bool,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file {:?}: {}", log_path, e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("cloudinv {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("cloudinv").join("cloudinv.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".cloudinv").join("cloudinv.log");
    }
    PathBuf::from("cloudinv.log")
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_guard = setup_logging(args.log_level);

    let code = match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let message = match err.downcast_ref::<InventoryError>() {
                Some(inventory) => format_api_error(inventory),
                None => format!("{:#}", err),
            };
            eprintln!("Error: {}", message);
            ExitCode::FAILURE
        }
    };

    // Flush buffered log lines before the process exits
    drop(log_guard);
    code
}

async fn run(args: &Args) -> Result<()> {
    if args.list_kinds {
        for kind in get_all_resource_kinds() {
            let name = get_resource(kind).map(|d| d.display_name.as_str()).unwrap_or("");
            println!("{:<32} {}", kind, name);
        }
        return Ok(());
    }

    let mut config = Config::load();
    let Some(kind) = args.kind.clone().or_else(|| config.last_kind.clone()) else {
        anyhow::bail!("No resource kind given. Use --list-kinds to see the available kinds");
    };

    let session = build_session(args, &config)?;

    let output = match run_query(&session, &kind, args).await {
        Ok(output) => output,
        Err(err) => {
            tracing::error!("{} query failed: {:#}", kind, err);
            return Err(err);
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    if let Err(e) = config.set_last_kind(&kind) {
        tracing::warn!("Failed to save config: {:#}", e);
    }
    Ok(())
}

fn build_session(args: &Args, config: &Config) -> Result<Session> {
    let concurrency = config.effective_concurrency(args.concurrency);
    let static_regions = config.effective_regions(args.regions.as_deref());

    if let Some(ref path) = args.replay {
        let snapshot = Snapshot::load(path)?;
        let provider = MemoryProvider::new(snapshot);
        let regions: Arc<dyn RegionCatalog> = match static_regions {
            Some(regions) => Arc::new(StaticRegions::new(regions)),
            None => Arc::new(provider.clone()),
        };
        tracing::info!("Replaying {:?}", path);
        return Ok(Session::builder(regions, Arc::new(provider))
            .concurrency(concurrency)
            .build());
    }

    let endpoint = config.effective_endpoint(args.endpoint.as_deref());
    let factory = HttpClientFactory::new(endpoint.as_deref()).context("Invalid endpoint")?;
    let regions: Arc<dyn RegionCatalog> = match static_regions {
        Some(regions) => Arc::new(StaticRegions::new(regions)),
        None => {
            let client = factory
                .client("ec2", Some(&Region::from(HOME_REGION)))
                .context("Region discovery needs EC2 DescribeRegions; pass --regions instead")?;
            Arc::new(ApiRegionCatalog::new(client))
        }
    };

    Ok(Session::builder(regions, Arc::new(factory))
        .concurrency(concurrency)
        .build())
}

/// Parse `ATTR=VALUE`; numbers and booleans keep their JSON type
fn parse_lookup(raw: &str) -> Result<NodeRequest> {
    let (attribute, value) = raw
        .split_once('=')
        .with_context(|| format!("Lookup {:?} must look like ATTR=VALUE", raw))?;

    let value = serde_json::from_str::<Value>(value)
        .ok()
        .filter(|v| v.is_number() || v.is_boolean())
        .unwrap_or_else(|| Value::String(value.to_string()));

    Ok(NodeRequest::ByAttributeLookup {
        attribute: attribute.trim().to_string(),
        value,
    })
}

async fn run_query(session: &Session, kind: &str, args: &Args) -> Result<Value> {
    let request = match (&args.id, &args.lookup) {
        (Some(id), _) => Some(NodeRequest::ByIdentityLookup(id.clone())),
        (None, Some(lookup)) => Some(parse_lookup(lookup)?),
        (None, None) => None,
    };

    let nodes = match request {
        Some(request) => vec![session.request(kind, request).await?],
        None => session.fetch_all(kind).await?,
    };

    let mut output = Vec::with_capacity(nodes.len());
    for node in nodes {
        let mut value = serde_json::to_value(node.as_ref())?;
        if !args.fields.is_empty() {
            let mut derived = serde_json::Map::new();
            for name in &args.fields {
                let field = session.field(&node, name).await?;
                derived.insert(name.clone(), serde_json::to_value(field)?);
            }
            value["derived"] = Value::Object(derived);
        }
        if !args.children.is_empty() {
            let mut listed = serde_json::Map::new();
            for name in &args.children {
                let children = session.children(&node, name).await?;
                let children = children
                    .iter()
                    .map(|child| serde_json::to_value(child.as_ref()))
                    .collect::<serde_json::Result<Vec<_>>>()?;
                listed.insert(name.clone(), Value::Array(children));
            }
            value["children"] = Value::Object(listed);
        }
        output.push(value);
    }

    Ok(Value::Array(output))
}
