//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::FarmError;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::workers::poller;

/// Run the controller until `shutdown_signal` resolves
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), FarmError> {
    info!("Initializing farm controller...");

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&options, &shutdown_tx, &mut shutdown_manager).await {
        error!("Failed to start controller: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), FarmError> {
    options.layout.setup().await?;

    let app_state = Arc::new(AppState::init(options));
    shutdown_manager.with_app_state(app_state.clone())?;

    init_poller_worker(
        options.poller.clone(),
        app_state.clone(),
        shutdown_manager,
        shutdown_tx.subscribe(),
    )?;

    if options.enable_server {
        init_server(options, app_state, shutdown_manager, shutdown_tx.subscribe()).await?;
    }

    Ok(())
}

fn init_poller_worker(
    options: poller::Options,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), FarmError> {
    info!("Initializing poller worker...");

    let registry = app_state.registry.clone();
    let poller_handle = tokio::spawn(async move {
        poller::run(
            &options,
            registry.as_ref(),
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_poller_worker_handle(poller_handle)
}

async fn init_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), FarmError> {
    info!("Initializing local HTTP server...");

    let server_state = ServerState::from_app(&app_state);
    let server_handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_server_handle(server_handle)
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    app_state: Option<Arc<AppState>>,
    server_handle: Option<JoinHandle<Result<(), FarmError>>>,
    poller_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            app_state: None,
            server_handle: None,
            poller_worker_handle: None,
        }
    }

    pub fn with_app_state(&mut self, state: Arc<AppState>) -> Result<(), FarmError> {
        if self.app_state.is_some() {
            return Err(FarmError::ShutdownError("app_state already set".to_string()));
        }
        self.app_state = Some(state);
        Ok(())
    }

    pub fn with_poller_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), FarmError> {
        if self.poller_worker_handle.is_some() {
            return Err(FarmError::ShutdownError("poller_handle already set".to_string()));
        }
        self.poller_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), FarmError>>,
    ) -> Result<(), FarmError> {
        if self.server_handle.is_some() {
            return Err(FarmError::ShutdownError("server_handle already set".to_string()));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), FarmError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), FarmError> {
        info!("Shutting down farm controller...");

        // 1. Stop macro runs first so queued steps see the cancellation
        if let Some(app_state) = self.app_state.as_ref() {
            app_state.macros.stop_all();
        }

        // 2. Poller worker
        if let Some(handle) = self.poller_worker_handle.take() {
            handle.await.map_err(|e| FarmError::ShutdownError(e.to_string()))?;
        }

        // 3. Server
        if let Some(handle) = self.server_handle.take() {
            handle.await.map_err(|e| FarmError::ShutdownError(e.to_string()))??;
        }

        // 4. App state
        if let Some(app_state) = self.app_state.take() {
            app_state.shutdown();
        }

        info!("Shutdown complete");
        Ok(())
    }
}
