use anyhow::Result;
use axum::Router;
use clap::Parser;
use reel_core::{ClientConfig, DocumentStore, DocumentStoreClient, MemoryStore, SledStore};
use reel_server::build_app;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Store directory
    #[arg(long, default_value = "./data")]
    data: String,
    /// Keep everything in memory instead of on disk
    #[arg(long, default_value_t = false)]
    ephemeral: bool,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let store: Arc<dyn DocumentStore> = if args.ephemeral {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(SledStore::open(&args.data)?)
    };
    let client = DocumentStoreClient::with_config(store, ClientConfig::from_env()?);
    let app: Router = build_app(client);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, ephemeral = args.ephemeral, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
