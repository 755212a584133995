pub mod control;
pub mod device;
pub mod profile;
pub mod settings;
pub mod surface;

use std::net::{IpAddr, UdpSocket};
use std::sync::Arc;

use color_eyre::{eyre::eyre, Result};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::control::{EngineHandle, EngineSettings, SharedState};
use crate::device::{MakcuTransport, MouseTransport};
use crate::profile::{Profile, ProfileStore};
use crate::settings::Settings;
use crate::surface::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let settings = Settings::load();
    info!("Starting recoilctl: {:?}", settings);

    let transport = MakcuTransport::spawn(settings.serial_port.clone())
        .map_err(|e| eyre!("Failed to start device worker: {}", e))?;
    let transport_dyn: Arc<dyn MouseTransport> = transport.clone();

    let store = ProfileStore::open(settings.profiles_path())
        .map_err(|e| eyre!("Failed to open profile store: {}", e))?;

    let shared = SharedState::new(Profile::default());

    let cancel = CancellationToken::new();
    let engine = EngineHandle::spawn(
        transport_dyn.clone(),
        shared.clone(),
        Some(EngineSettings {
            tick_interval_ms: settings.tick_interval_ms,
        }),
        cancel.clone(),
    );

    let app = surface::router(AppState {
        shared,
        store: Arc::new(Mutex::new(store)),
        transport: transport_dyn,
        engine_commands: engine.commands(),
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", settings.listen_port))
        .await
        .map_err(|e| eyre!("Failed to bind port {}: {}", settings.listen_port, e))?;
    report_urls(settings.listen_port);

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                signal_cancel.cancel();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    let server_cancel = cancel.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_cancel.cancelled().await })
        .await;

    // The loop drains before the device handle goes away, so no movement
    // command is in flight after shutdown begins. This holds even when the
    // server itself failed, hence the deferred error propagation.
    cancel.cancel();
    engine.join().await;
    transport.shutdown();
    served.map_err(|e| eyre!("Control surface failed: {}", e))?;
    info!("Shutdown complete");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

fn report_urls(port: u16) {
    info!("Open on this PC:    http://localhost:{}", port);
    match lan_ip() {
        Some(ip) => info!("Open on another PC: http://{}:{}", ip, port),
        None => warn!("Could not determine a LAN address; only loopback reported"),
    }
}

/// Routing-table trick: connecting a UDP socket picks the outbound interface
/// without sending a packet.
fn lan_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).ok()?;
    socket.connect(("8.8.8.8", 80)).ok()?;
    Some(socket.local_addr().ok()?.ip())
}
