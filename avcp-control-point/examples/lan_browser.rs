//! LAN browser - lists media servers and renderers as they come and go
//!
//! Selects the first media server it finds and keeps searching until Ctrl-C.
//!
//! Run with: AVCP_LOG_MODE=development cargo run -p avcp-sdk-control-point --example lan_browser

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use avcp_control_point::logging::init_logging_from_env;
use avcp_control_point::prelude::*;

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    init_logging_from_env()?;

    println!("=== UPnP AV LAN Browser ===\n");

    let coordinator = Arc::new(
        DiscoveryCoordinator::builder()
            .config(ControlPointConfig::fast_search())
            .notice_handler(|notice| println!("! {}", notice))
            .on_server_selected(|server| match server {
                Some(server) => println!("* Selected server: {}", server.friendly_name),
                None => println!("* No server selected"),
            })
            .build()?,
    );

    coordinator.renderer_registry().set_discovery_listener(DiscoveryListener::notify(|event| {
        match event {
            DeviceEvent::Found(device) => println!("+ renderer {} ({})", device.friendly_name, device.udn),
            DeviceEvent::Lost(device) => println!("- renderer {}", device.friendly_name),
        }
    }));

    coordinator.initialize()?;
    coordinator.search_start(DiscoveryListener::notify(|event| match event {
        DeviceEvent::Found(device) => println!(
            "+ server {} ({}) icon: {}",
            device.friendly_name,
            device.udn,
            device.icon.as_ref().map_or("-", |icon| icon.url.as_str())
        ),
        DeviceEvent::Lost(device) => println!("- server {}", device.friendly_name),
    }))?;

    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })?;

    loop {
        match stop_rx.recv_timeout(Duration::from_secs(2)) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if coordinator.selected_media_server().is_none() {
                    if let Some(server) = coordinator.media_servers().first() {
                        coordinator.set_selected_media_server(Some(Arc::clone(server)));
                    }
                }
            }
        }
    }

    println!(
        "\nStopping: {} server(s), {} renderer(s) known",
        coordinator.media_servers().len(),
        coordinator.media_renderers().len()
    );
    coordinator.search_stop();
    coordinator.terminate()?;
    Ok(())
}
