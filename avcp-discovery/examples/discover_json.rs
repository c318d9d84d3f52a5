//! Discover media servers and renderers and print them as JSON
//!
//! Usage: cargo run -p avcp-sdk-discovery --example discover_json [seconds]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use avcp_discovery::engine::{DiscoveryEngine, EngineFactory, QueueDispatcher};
use avcp_discovery::interface::{AddressFamily, InterfaceSource, SystemInterfaces};
use avcp_discovery::ssdp_engine::{SsdpConfig, SsdpEngineFactory};
use avcp_discovery::{Device, DeviceEvent, DeviceKind};
use parking_lot::Mutex;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let seconds = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(5);

    let interfaces: Vec<_> = SystemInterfaces
        .interfaces()
        .into_iter()
        .filter(|iface| iface.is_usable(AddressFamily::Ipv4))
        .collect();

    let (dispatcher, queue) = QueueDispatcher::new();
    let mut engine = SsdpEngineFactory::new(SsdpConfig::default()).build(&interfaces, Arc::new(dispatcher))?;

    let found: Arc<Mutex<BTreeMap<String, Arc<Device>>>> = Arc::default();
    let sink = Arc::clone(&found);
    engine.add_listener(Arc::new(move |event: &DeviceEvent| match event {
        DeviceEvent::Found(device) => {
            sink.lock().insert(device.udn.clone(), Arc::clone(device));
        }
        DeviceEvent::Lost(device) => {
            sink.lock().remove(&device.udn);
        }
    }));

    engine.initialize()?;
    engine.start()?;
    engine.search(None)?;
    queue.run_for(Duration::from_secs(seconds));
    engine.terminate();

    let devices: Vec<Arc<Device>> = found
        .lock()
        .values()
        .filter(|device| {
            DeviceKind::MediaServer.matches(&device.device_type)
                || DeviceKind::MediaRenderer.matches(&device.device_type)
        })
        .cloned()
        .collect();

    println!("{}", serde_json::to_string_pretty(&devices)?);
    Ok(())
}
