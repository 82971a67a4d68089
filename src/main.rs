use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use local_files::{routes, Config, SecureFileServer, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "local-files")]
#[command(about = "Secure download endpoint for a local workspace directory")]
#[command(version)]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "LOCAL_FILES_PORT", default_value = "41822")]
    port: u16,

    /// Address to bind to
    #[arg(short, long, env = "LOCAL_FILES_BIND", default_value = "127.0.0.1")]
    bind: String,

    /// Root directory to serve files from (overrides the config file)
    #[arg(short, long, env = "LOCAL_FILES_ROOT")]
    root: Option<PathBuf>,

    /// URL prefix the download route is mounted under (overrides the config file)
    #[arg(short, long, env = "LOCAL_FILES_URL_PREFIX")]
    url_prefix: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, env = "LOCAL_FILES_VERBOSE")]
    verbose: bool,

    /// Config file path (optional)
    #[arg(short, long, env = "LOCAL_FILES_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "local_files=debug,tower_http=debug"
    } else {
        "local_files=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load config from file if provided, otherwise use defaults
    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };
    if let Some(prefix) = cli.url_prefix {
        config.url_prefix = prefix;
    }

    // No root means no server: never fall back to a guessed directory.
    let server_config = ServerConfig::from_config(cli.root.as_deref(), &config)?;

    let root_dir = server_config.root_dir();
    if !root_dir.exists() {
        warn!(
            "Root directory does not exist yet: {} (requests return 404 until it appears)",
            root_dir.display()
        );
    } else if !root_dir.is_dir() {
        return Err(format!("Root path is not a directory: {}", root_dir.display()).into());
    }

    info!(
        "Serving files from {} at {}",
        root_dir.display(),
        server_config.url_prefix()
    );

    if server_config.url_prefix() == "/" {
        info!("Health endpoint not mounted: prefix / serves every path from the root");
    }

    let server = SecureFileServer::new(server_config);

    // Build router
    let app = routes::file_routes(server).layer(TraceLayer::new_for_http());

    // Start server
    let addr: SocketAddr = format!("{}:{}", cli.bind, cli.port).parse()?;
    info!("Starting local-files on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
