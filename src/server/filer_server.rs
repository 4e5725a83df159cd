//! Filer server: wires the backend, guards and master supervisor together

use crate::common::{Config, Result};
use crate::filer::{open_backend, MetadataBackend};
use crate::master::{HttpMasterClient, MasterCell, MasterClient, MasterSupervisor};
use crate::security::{GuardSet, TokenIssuer};
use crate::server::http::{create_router, FilerState};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;

pub struct FilerServer {
    config: Config,
    backend: MetadataBackend,
    guards: Arc<GuardSet>,
    master: MasterCell,
    tokens: TokenIssuer,
}

impl FilerServer {
    /// Validate `config` and open the metadata backend.
    ///
    /// Fails if the backend cannot be constructed or a guard entry is
    /// malformed; the process should not start in either case.
    pub async fn new(config: Config) -> Result<Self> {
        let kind = config.validate()?;
        let backend = open_backend(&config, kind).await?;
        let guards = Arc::new(GuardSet::from_config(&config)?);
        let master = MasterCell::new(config.master.clone());
        let tokens = TokenIssuer::new(config.secret.clone());

        Ok(Self {
            config,
            backend,
            guards,
            master,
            tokens,
        })
    }

    pub fn master(&self) -> MasterCell {
        self.master.clone()
    }

    pub fn backend(&self) -> &MetadataBackend {
        &self.backend
    }

    pub fn router(&self) -> Router {
        let state = FilerState {
            master: self.master.clone(),
            backend: self.backend.clone(),
            tokens: self.tokens.clone(),
            collection: self.config.collection.clone(),
            default_replication: self.config.default_replication.clone(),
            redirect_on_read: self.config.redirect_on_read,
            disable_dir_listing: self.config.disable_dir_listing,
            max_mb: self.config.max_mb,
        };
        create_router(state, self.guards.clone())
    }

    /// Serve until `shutdown` resolves, using the HTTP master client
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let client = Arc::new(HttpMasterClient::new(
            self.config.supervisor.request_timeout(),
        )?);
        self.serve_with_client(client, shutdown).await
    }

    /// Serve until `shutdown` resolves.
    ///
    /// The listener is only bound once a master has answered; until then
    /// the server is not ready.
    pub async fn serve_with_client(
        self,
        client: Arc<dyn MasterClient>,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        tracing::info!("Starting filer server");
        tracing::info!("  HTTP API: {}", self.config.bind_addr());
        tracing::info!("  Master: {}", self.config.master);
        tracing::info!("  Backend: {}", self.backend.kind());
        if !self.config.collection.is_empty() {
            tracing::info!("  Collection: {}", self.config.collection);
        }
        tracing::info!("  Max request body: {} MB", self.config.max_mb);

        let (tx, rx) = watch::channel(false);
        let tx = Arc::new(tx);
        let signal = {
            let tx = tx.clone();
            tokio::spawn(async move {
                shutdown.await;
                tracing::info!("Shutdown requested");
                tx.send_replace(true);
            })
        };

        let mut supervisor = MasterSupervisor::new(
            self.master.clone(),
            client,
            self.config.supervisor.clone(),
            rx.clone(),
        );
        if !supervisor.bootstrap().await {
            self.backend.flush()?;
            return Ok(());
        }
        let supervisor_handle = supervisor.spawn();

        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr()).await?;
        tracing::info!("✓ Filer server ready on {}", listener.local_addr()?);

        let mut stop = rx;
        let served = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = stop.wait_for(|stopped| *stopped).await;
        })
        .await;

        if let Err(e) = &served {
            tracing::error!("HTTP server error: {}", e);
        }

        tx.send_replace(true);
        signal.abort();
        if let Err(e) = supervisor_handle.await {
            tracing::warn!("Master supervisor task failed: {}", e);
        }
        self.backend.flush()?;
        tracing::info!("Filer server stopped");

        served.map_err(Into::into)
    }
}
