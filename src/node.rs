use crate::api::{run_api_server, ApiState};
use crate::chain::JsonRpcClient;
use crate::config::Config;
use crate::persistence::{Database, InMemoryLedger, LedgerStore};
use std::fs;
use std::sync::Arc;
use tracing::{info, warn};

/// `database.path` value selecting the ephemeral ledger.
pub const MEMORY_DATABASE: &str = ":memory:";

/// Wires configuration, storage and the chain client into a running API.
pub struct Node {
    pub config: Config,
    pub state: Arc<ApiState>,
}

impl Node {
    pub fn init(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        info!(
            rpc_url = %config.chain.rpc_url,
            token_contract = %config.chain.token_contract,
            "Starting txledger node"
        );

        // Ensure data directory (parent of DB path) exists
        let db_path = std::path::Path::new(&config.database.path);
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create data dir {:?}: {}", parent, e))?;
            }
        }

        let ledger: Arc<dyn LedgerStore> = if config.database.path == MEMORY_DATABASE {
            warn!("Using an in-memory ledger; records are lost on restart");
            Arc::new(InMemoryLedger::new())
        } else {
            let db = Database::open_with_busy_timeout(
                &config.database.path,
                config.database.busy_timeout(),
            )
            .map_err(|e| format!("Failed to open DB at {}: {}", config.database.path, e))?;
            Arc::new(db)
        };

        let rpc = Arc::new(JsonRpcClient::new(
            config.chain.rpc_url.clone(),
            config.chain.token_contract.clone(),
            config.chain.timeout(),
        )?);

        let state = ApiState::new(ledger, rpc.clone(), rpc)
            .with_request_timeout(config.server.request_timeout());

        Ok(Self {
            config,
            state: Arc::new(state),
        })
    }

    /// Serve until Ctrl-C.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        };

        run_api_server(self.state, self.config.server.listen_addr, shutdown).await
    }
}
