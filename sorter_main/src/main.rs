//! Process wiring: load configuration, build the GPIO provider, bring the
//! sort core up at its safe baseline, spawn every long-lived loop, bind the
//! control plane, and tear it all down in order on shutdown.

mod cli;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use parking_lot::Mutex;
use sorter_common::config::AppConfig;
use sorter_core::broadcaster::StateBroadcaster;
use sorter_core::executor::{self, SortExecutorPool};
use sorter_core::ingester::Ingester;
use sorter_core::maintenance::MaintenanceController;
use sorter_core::qr_queue::QrQueue;
use sorter_core::sensor_monitor::SensorMonitor;
use sorter_core::state_store::StateStore;
use sorter_core::token_queue::TokenQueue;
use sorter_core::SorterHandle;
use sorter_detector::camera_loop;
use sorter_detector::NullDetector;
use sorter_hal::{GpioProvider, Level, MockGpio, RealGpio};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;
const FRAME_CHANNEL_CAPACITY: usize = 8;
const SORT_WORKER_COUNT: usize = 5;
const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(5);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_line_number(true)
        .init();

    let cli = cli::Cli::parse();
    let bootstrap = cli::build_bootstrap(&cli);

    info!(bind_addr = %bootstrap.bind_addr, config_dir = %cli.config_dir.display(), "starting sort controller");

    if let Err(e) = tokio::fs::create_dir_all(&cli.config_dir).await {
        error!(error = %e, "failed to create config dir, aborting startup");
        std::process::exit(1);
    }

    let maintenance = Arc::new(MaintenanceController::new());

    let config_path = cli.config_dir.join("config.json");
    let mut config = match sorter_api::persistence::load_config(&config_path).await {
        Ok(Some(cfg)) => cfg,
        Ok(None) => {
            let cfg = AppConfig::fallback_default();
            if let Err(e) = sorter_api::persistence::atomic_save_json(&config_path, &cfg).await {
                warn!(error = %e, "failed to persist initial default config");
            }
            cfg
        }
        Err(e) => {
            error!(error = %e, "config file present but invalid, entering maintenance with a fallback config");
            maintenance.trigger(format!("invalid config at startup: {e}"));
            AppConfig::fallback_default()
        }
    };
    config.timing_config.gpio_mode = cli.gpio_mode.into();

    let gpio: Box<dyn GpioProvider> = if cli.mock_gpio {
        info!("using mock gpio provider");
        Box::new(MockGpio::new())
    } else {
        info!("using real (sysfs) gpio provider");
        Box::new(RealGpio::new())
    };
    let gpio: sorter_core::gpio_shared::SharedGpio = Arc::new(Mutex::new(gpio));

    if let Err(e) = configure_pins(&gpio, &bootstrap, &config) {
        error!(error = %e, "gpio pin setup failed, entering maintenance");
        maintenance.trigger(format!("gpio setup failed: {e}"));
        std::process::exit(1);
    }

    let state = Arc::new(StateStore::new(config.timing_config.clone(), &config.lanes_config));

    if let Err(e) = executor::reset_all_relays(&gpio, &state, &state.lanes()) {
        error!(error = %e, "failed to drive relays to the safe baseline, entering maintenance");
        maintenance.trigger(format!("safe-baseline relay reset failed: {e}"));
    }

    let qr_queue = Arc::new(QrQueue::new(Arc::clone(&state)));
    let token_queue = Arc::new(TokenQueue::new());
    let (events_tx, _events_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();
    let auto_test = Arc::new(AtomicBool::new(false));

    let executor_pool = SortExecutorPool::spawn(
        SORT_WORKER_COUNT,
        Arc::clone(&state),
        Arc::clone(&gpio),
        Arc::clone(&maintenance),
        events_tx.clone(),
        cancel.clone(),
    );

    let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);

    let handle = Arc::new(SorterHandle::new(
        Arc::clone(&state),
        Arc::clone(&qr_queue),
        Arc::clone(&token_queue),
        Arc::clone(&maintenance),
        Arc::clone(&gpio),
        Arc::clone(&executor_pool),
        events_tx.clone(),
        cancel.clone(),
        frame_tx,
    ));

    let sensor_monitor = SensorMonitor::new(
        Arc::clone(&state),
        Arc::clone(&qr_queue),
        Arc::clone(&token_queue),
        Arc::clone(&maintenance),
        Arc::clone(&gpio),
        events_tx.clone(),
        Arc::clone(&executor_pool),
        Arc::clone(&auto_test),
        bootstrap.entry_sensor_pin,
    );
    tokio::task::spawn(sensor_monitor.run(cancel.clone()));

    let ingester = Ingester::new(Arc::clone(&state), Arc::clone(&qr_queue), events_tx.clone());
    tokio::task::spawn(ingester.run(frame_rx, cancel.clone()));

    let broadcaster = StateBroadcaster::new(Arc::clone(&state), Arc::clone(&maintenance), events_tx.clone());
    tokio::task::spawn(broadcaster.run(cancel.clone()));

    tokio::task::spawn(camera_loop::run(NullDetector, Arc::clone(&handle), cancel.clone()));

    tokio::task::spawn(sorter_api::persistence::sort_log_autosaver(
        Arc::clone(&handle),
        cli.config_dir.join("sort_log.json"),
        cancel.clone(),
    ));

    let api_state = sorter_api::ApiState::new(Arc::clone(&handle), bootstrap.clone(), cli.config_dir.clone());
    let router = sorter_api::build_router(api_state);

    let listener = match tokio::net::TcpListener::bind(bootstrap.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, addr = %bootstrap.bind_addr, "failed to bind control plane, aborting startup");
            std::process::exit(1);
        }
    };
    info!(addr = %bootstrap.bind_addr, "control plane listening");

    let server_cancel = cancel.clone();
    let server = tokio::task::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
    });

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, cancelling all loops");
    cancel.cancel();

    match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
        Ok(Ok(Ok(()))) => info!("control plane shut down cleanly"),
        Ok(Ok(Err(e))) => error!(error = %e, "control plane server error"),
        Ok(Err(e)) => error!(error = %e, "control plane task panicked"),
        Err(_) => warn!("control plane did not shut down within the grace period"),
    }

    if let Err(e) = gpio.lock().cleanup() {
        error!(error = %e, "gpio cleanup failed");
    }
    info!("shutdown complete");
}

fn configure_pins(
    gpio: &sorter_core::gpio_shared::SharedGpio,
    bootstrap: &sorter_common::config::BootstrapConfig,
    config: &AppConfig,
) -> Result<(), sorter_hal::HalError> {
    let mut gpio = gpio.lock();
    gpio.set_mode(config.timing_config.gpio_mode)?;
    gpio.configure_input(bootstrap.entry_sensor_pin)?;
    for lane in &config.lanes_config {
        gpio.configure_input(lane.sensor_pin)?;
        if let Some(push) = lane.push_pin {
            gpio.configure_output(push, Level::High)?;
        }
        if let Some(pull) = lane.pull_pin {
            gpio.configure_output(pull, Level::Low)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
