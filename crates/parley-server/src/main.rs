use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::info;

use parley_db::Database;
use parley_relay::{RelayState, Storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "parley_server=debug,parley_relay=debug,parley_db=debug".into()
            }),
        )
        .init();

    // Config
    let host = std::env::var("PARLEY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PARLEY_PORT")
        .unwrap_or_else(|_| "5555".into())
        .parse()?;
    let db_path = std::env::var("PARLEY_DB_PATH").unwrap_or_else(|_| "parley.db".into());
    let files_dir = std::env::var("PARLEY_FILES_DIR").unwrap_or_else(|_| "parley_files".into());

    // Init database and file storage
    let db = Database::open(&PathBuf::from(&db_path))?;
    let storage = Storage::new(PathBuf::from(&files_dir)).await?;

    let state = RelayState::new(db, storage);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Parley relay listening on {}", addr);

    state.run(listener).await;

    Ok(())
}
