//! albumfs CLI - mount remote photo albums as a directory tree
//!
//! Usage:
//!   albumfs ~/albums --token "$TOKEN"          # Mount the default service
//!   ALBUMFS_TOKEN=... albumfs ~/albums         # Token from the environment
//!   albumfs ~/albums --demo                    # In-memory albums, no network
//!   albumfs ~/albums --allow-destructive -v    # Enable rm/rmdir, debug logs

mod mount;

use albumfs::config::{DEFAULT_MAX_RETRIES, DEFAULT_SERVICE_URL};
use albumfs::network::{
    DEFAULT_MEMORY_URL, HttpTransport, MemoryService, StaticToken, Transport,
};
use albumfs::{AlbumStore, FilesystemAdapter, MountConfig, ServiceConfig};
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// albumfs - Remote photo albums as a filesystem
#[derive(Parser, Debug)]
#[command(name = "albumfs")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory to mount the albums on
    mountpoint: PathBuf,

    /// Allow deleting photos (rm) and empty albums (rmdir)
    #[arg(long)]
    allow_destructive: bool,

    /// AtomPub service document URL
    #[arg(long, default_value = DEFAULT_SERVICE_URL)]
    service_url: String,

    /// OAuth token sent with every request to the service
    #[arg(long, env = "ALBUMFS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Retries for failed or throttled requests
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    retries: u32,

    /// Seconds to wait between retries
    #[arg(long, default_value_t = 5)]
    retry_delay: u64,

    /// Mount a built-in in-memory album service instead of the network
    #[arg(long)]
    demo: bool,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "albumfs=debug" } else { "albumfs=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn transport(args: &Args, config: &ServiceConfig) -> Result<Arc<dyn Transport>> {
    if args.demo {
        let service = Arc::new(MemoryService::demo());
        let token = Arc::new(StaticToken::new("demo"));
        return Ok(Arc::new(HttpTransport::with_backend(service, config, token)));
    }
    let Some(token) = args.token.as_deref() else {
        bail!("no token given: pass --token or set ALBUMFS_TOKEN");
    };
    let transport = HttpTransport::new(config, Arc::new(StaticToken::new(token)))
        .context("Failed to set up the HTTP client")?;
    Ok(Arc::new(transport))
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let service_url = if args.demo {
        DEFAULT_MEMORY_URL
    } else {
        args.service_url.as_str()
    };
    let config = ServiceConfig::new()
        .service_url(service_url)
        .max_retries(args.retries)
        .retry_delay(Duration::from_secs(args.retry_delay));
    let store = AlbumStore::connect(transport(&args, &config)?, &config)
        .context("Invalid service configuration")?;
    let adapter = FilesystemAdapter::new(
        Arc::new(store),
        MountConfig::new().allow_destructive(args.allow_destructive),
    );

    // fuser callbacks block on this runtime; it must not be the current one.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    tracing::info!(
        mountpoint = %args.mountpoint.display(),
        destructive = args.allow_destructive,
        demo = args.demo,
        "mounting"
    );
    mount::mount(Arc::new(adapter), runtime, &args.mountpoint)
        .with_context(|| format!("Failed to mount {}", args.mountpoint.display()))
}
