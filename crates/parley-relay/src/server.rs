//! Connection acceptor and shared relay state.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};

use parley_db::Database;

use crate::connection;
use crate::registry::Registry;
use crate::storage::Storage;

/// Shared state for all relay connections. Cheap to clone; owned by the
/// process entry point and handed to every per-connection task.
#[derive(Clone)]
pub struct RelayState {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    registry: Registry,
    db: Arc<Database>,
    storage: Storage,
}

impl RelayState {
    pub fn new(db: Database, storage: Storage) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                registry: Registry::new(),
                db: Arc::new(db),
                storage,
            }),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub(crate) fn db(&self) -> Arc<Database> {
        self.inner.db.clone()
    }

    pub(crate) fn storage(&self) -> &Storage {
        &self.inner.storage
    }

    /// Accept connections until the task is cancelled. Each connection gets
    /// its own task; accept failures are logged and do not stop the loop.
    pub async fn run(self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!("new connection from {}", addr);
                    let state = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = connection::handle_connection(state, stream).await {
                            warn!("connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("accept error: {}", e);
                }
            }
        }
    }
}
