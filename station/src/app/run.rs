//! Main application run loops

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{DeviceModeOptions, LifecycleOptions, ServerModeOptions};
use crate::app::state::AppState;
use crate::device::actuator::{Actuator, GpioValve, LogActuator};
use crate::device::interpreter::CommandInterpreter;
use crate::dispatch::transport::{LinkState, MqttTransport};
use crate::errors::StationError;
use crate::mqtt::client::MqttClient;
use crate::mqtt::topics::Topics;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::workers::{device, ingest, scheduler};

/// Run the scheduler, telemetry ingest and HTTP gateway
pub async fn run_server(
    options: ServerModeOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), StationError> {
    info!("Initializing AgroSmart server...");

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init_server(&options, &shutdown_tx, &mut shutdown_manager).await {
        error!("Failed to start server: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

/// Run the field-device valve controller
pub async fn run_device(
    options: DeviceModeOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), StationError> {
    info!("Initializing AgroSmart device {}...", options.device_id);

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init_device(&options, &shutdown_tx, &mut shutdown_manager) {
        error!("Failed to start device: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

fn shutdown_future(
    shutdown_tx: &broadcast::Sender<()>,
) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> {
    let mut shutdown_rx = shutdown_tx.subscribe();
    Box::pin(async move {
        let _ = shutdown_rx.recv().await;
    })
}

// =============================== INITIALIZATION ================================== //

async fn init_server(
    options: &ServerModeOptions,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), StationError> {
    let client = MqttClient::new(&options.broker.address, &options.broker.client_id)?;
    let link = LinkState::default();
    let transport = Arc::new(MqttTransport::new(client.handle(), link.clone()));

    let app_state = Arc::new(AppState::init(options, transport).await?);
    shutdown_manager.with_app_state(app_state.clone())?;

    init_ingest_worker(
        options.ingest_worker.clone(),
        client,
        link,
        app_state.clone(),
        shutdown_manager,
        shutdown_tx,
    )?;

    init_scheduler_worker(
        options.scheduler_worker.clone(),
        app_state.clone(),
        shutdown_manager,
        shutdown_tx,
    )?;

    init_http_server(options, app_state, shutdown_manager, shutdown_tx).await
}

fn init_ingest_worker(
    options: ingest::Options,
    client: MqttClient,
    link: LinkState,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    shutdown_tx: &broadcast::Sender<()>,
) -> Result<(), StationError> {
    info!("Initializing MQTT ingest worker...");

    let shutdown = shutdown_future(shutdown_tx);
    let handle = tokio::spawn(async move {
        ingest::run(
            &options,
            client,
            &app_state.topics,
            &link,
            app_state.telemetry.as_ref(),
            tokio::time::sleep,
            shutdown,
        )
        .await;
    });

    shutdown_manager.with_worker_handle("ingest", handle)
}

fn init_scheduler_worker(
    options: scheduler::Options,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    shutdown_tx: &broadcast::Sender<()>,
) -> Result<(), StationError> {
    info!("Initializing scheduler worker...");

    let engine = app_state.engine.clone();
    let shutdown = shutdown_future(shutdown_tx);
    let handle = tokio::spawn(async move {
        scheduler::run(&options, engine.as_ref(), tokio::time::sleep, shutdown).await;
    });

    shutdown_manager.with_worker_handle("scheduler", handle)
}

async fn init_http_server(
    options: &ServerModeOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    shutdown_tx: &broadcast::Sender<()>,
) -> Result<(), StationError> {
    info!("Initializing HTTP server...");

    let server_state = ServerState::new(
        app_state.telemetry.clone(),
        app_state.history.clone(),
        app_state.gateway.clone(),
        options.server.max_page_size,
    );

    let handle = serve(
        &options.server,
        Arc::new(server_state),
        shutdown_future(shutdown_tx),
    )
    .await?;

    shutdown_manager.with_server_handle(handle)
}

fn init_device(
    options: &DeviceModeOptions,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), StationError> {
    let actuator: Box<dyn Actuator> = match options.valve_gpio_pin {
        Some(pin) => Box::new(GpioValve::new(pin)?),
        None => Box::new(LogActuator),
    };

    let (interpreter, shutoff) = CommandInterpreter::new(
        options.device_id.clone(),
        options.max_valve_duration_secs,
        actuator,
    );
    let interpreter = Arc::new(interpreter);
    shutdown_manager.with_interpreter(interpreter.clone())?;

    let shutoff_handle = tokio::spawn(shutoff.run(shutdown_future(shutdown_tx)));
    shutdown_manager.with_worker_handle("auto-shutoff", shutoff_handle)?;

    info!("Initializing device listener...");
    let client = MqttClient::new(&options.broker.address, &options.broker.client_id)?;
    let topics = Topics::new(options.broker.topic_prefix.clone());
    let listener_options = options.listener.clone();
    let shutdown = shutdown_future(shutdown_tx);
    let listener_handle = tokio::spawn(async move {
        device::run(
            &listener_options,
            client,
            &topics,
            interpreter.as_ref(),
            tokio::time::sleep,
            shutdown,
        )
        .await;
    });

    shutdown_manager.with_worker_handle("device listener", listener_handle)
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    app_state: Option<Arc<AppState>>,
    interpreter: Option<Arc<CommandInterpreter>>,
    server_handle: Option<JoinHandle<Result<(), StationError>>>,
    worker_handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            app_state: None,
            interpreter: None,
            server_handle: None,
            worker_handles: Vec::new(),
        }
    }

    pub fn with_app_state(&mut self, state: Arc<AppState>) -> Result<(), StationError> {
        if self.app_state.is_some() {
            return Err(StationError::ShutdownError("app_state already set".to_string()));
        }
        self.app_state = Some(state);
        Ok(())
    }

    pub fn with_interpreter(&mut self, interpreter: Arc<CommandInterpreter>) -> Result<(), StationError> {
        if self.interpreter.is_some() {
            return Err(StationError::ShutdownError("interpreter already set".to_string()));
        }
        self.interpreter = Some(interpreter);
        Ok(())
    }

    pub fn with_worker_handle(&mut self, name: &'static str, handle: JoinHandle<()>) -> Result<(), StationError> {
        if self.worker_handles.iter().any(|(n, _)| *n == name) {
            return Err(StationError::ShutdownError(format!("{name} handle already set")));
        }
        self.worker_handles.push((name, handle));
        Ok(())
    }

    pub fn with_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), StationError>>,
    ) -> Result<(), StationError> {
        if self.server_handle.is_some() {
            return Err(StationError::ShutdownError("server_handle already set".to_string()));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), StationError> {
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
                // Never leave water running behind a hung task
                if let Some(interpreter) = self.interpreter.take() {
                    interpreter.close();
                }
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), StationError> {
        info!("Shutting down AgroSmart...");

        // 1. Workers, in start order
        let mut result: Result<(), StationError> = Ok(());
        for (name, handle) in self.worker_handles.drain(..) {
            if let Err(e) = handle.await {
                error!("{} worker failed: {}", name, e);
                result = Err(StationError::ShutdownError(format!("{name}: {e}")));
            }
        }

        // 2. Valve, even if a worker failed
        if let Some(interpreter) = self.interpreter.take() {
            interpreter.close();
            info!("Valve closed for shutdown");
        }
        result?;

        // 3. HTTP server
        if let Some(handle) = self.server_handle.take() {
            handle.await.map_err(|e| StationError::ShutdownError(e.to_string()))??;
        }

        // 4. App state
        if let Some(app_state) = self.app_state.take() {
            app_state.shutdown().await?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
