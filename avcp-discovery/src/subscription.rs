//! GENA event subscriptions.
//!
//! Sends SUBSCRIBE / UNSUBSCRIBE requests to every evented service of a
//! device and keeps the SIDs the devices hand back. Receiving the NOTIFY
//! event bodies is left to whoever owns the callback URL.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use reqwest::blocking::Client;
use reqwest::Method;
use tracing::{debug, warn};

use crate::engine::EventSubscriber;
use crate::error::{DiscoveryError, Result};
use crate::Device;

/// An accepted subscription on one service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSubscription {
    pub sid: String,
    pub event_sub_url: String,
    pub timeout_seconds: u32,
}

/// GENA subscriber shared between an engine and its callers
pub struct GenaSubscriber {
    http: Client,
    callback_url: Option<String>,
    timeout_seconds: u32,
    /// (device UDN, service id) -> subscription
    active: Mutex<HashMap<(String, String), ActiveSubscription>>,
}

impl GenaSubscriber {
    pub fn new(http: Client, callback_url: Option<String>, timeout: Duration) -> Self {
        Self {
            http,
            callback_url,
            timeout_seconds: u32::try_from(timeout.as_secs()).unwrap_or(u32::MAX),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Subscriptions currently held for `udn`
    pub fn subscriptions_for(&self, udn: &str) -> Vec<ActiveSubscription> {
        self.lock_active()
            .iter()
            .filter(|((device, _), _)| device == udn)
            .map(|(_, subscription)| subscription.clone())
            .collect()
    }

    /// Cancel every subscription, logging failures
    pub fn unsubscribe_all(&self) {
        let drained: Vec<_> = self.lock_active().drain().collect();
        for ((udn, service_id), subscription) in drained {
            if let Err(e) = self.send_unsubscribe(&subscription) {
                debug!("Failed to unsubscribe {} {}: {}", udn, service_id, e);
            }
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, HashMap<(String, String), ActiveSubscription>> {
        self.active.lock()
    }

    fn send_subscribe(&self, event_sub_url: &str, callback_url: &str) -> Result<ActiveSubscription> {
        let response = self
            .http
            .request(gena_method(b"SUBSCRIBE")?, event_sub_url)
            .header("CALLBACK", format!("<{}>", callback_url))
            .header("NT", "upnp:event")
            .header("TIMEOUT", format!("Second-{}", self.timeout_seconds))
            .send()
            .map_err(|e| DiscoveryError::NetworkError(format!("SUBSCRIBE request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(DiscoveryError::SubscriptionError(format!(
                "SUBSCRIBE failed: HTTP {}",
                response.status()
            )));
        }

        let sid = response
            .headers()
            .get("SID")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                DiscoveryError::SubscriptionError("Missing SID header in SUBSCRIBE response".to_string())
            })?
            .to_string();

        let timeout_seconds = response
            .headers()
            .get("TIMEOUT")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_timeout_header)
            .unwrap_or(self.timeout_seconds);

        Ok(ActiveSubscription {
            sid,
            event_sub_url: event_sub_url.to_string(),
            timeout_seconds,
        })
    }

    fn send_unsubscribe(&self, subscription: &ActiveSubscription) -> Result<()> {
        let response = self
            .http
            .request(gena_method(b"UNSUBSCRIBE")?, &subscription.event_sub_url)
            .header("SID", &subscription.sid)
            .send()
            .map_err(|e| DiscoveryError::NetworkError(format!("UNSUBSCRIBE request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(DiscoveryError::SubscriptionError(format!(
                "UNSUBSCRIBE failed: HTTP {}",
                response.status()
            )));
        }

        Ok(())
    }
}

impl EventSubscriber for GenaSubscriber {
    fn subscribe(&self, device: &Device) -> Result<()> {
        let Some(callback_url) = self.callback_url.as_deref() else {
            debug!("No GENA callback URL configured, not subscribing to {}", device.udn);
            return Ok(());
        };

        let mut first_error = None;
        for service in &device.services {
            let key = (device.udn.clone(), service.service_id.clone());
            if self.lock_active().contains_key(&key) {
                continue;
            }

            match self.send_subscribe(&service.event_sub_url, callback_url) {
                Ok(subscription) => {
                    debug!(
                        "Subscribed to {} on {} (SID {})",
                        service.service_id, device.friendly_name, subscription.sid
                    );
                    self.lock_active().insert(key, subscription);
                }
                Err(e) => {
                    warn!("Failed to subscribe to {} on {}: {}", service.service_id, device.friendly_name, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    fn unsubscribe(&self, device: &Device) -> Result<()> {
        let removed: Vec<_> = {
            let mut active = self.lock_active();
            let keys: Vec<_> = active
                .keys()
                .filter(|(udn, _)| *udn == device.udn)
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|key| active.remove(&key).map(|subscription| (key.1, subscription)))
                .collect()
        };

        let mut first_error = None;
        for (service_id, subscription) in removed {
            if let Err(e) = self.send_unsubscribe(&subscription) {
                warn!("Failed to unsubscribe {} on {}: {}", service_id, device.friendly_name, e);
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

fn gena_method(name: &[u8]) -> Result<Method> {
    Method::from_bytes(name)
        .map_err(|e| DiscoveryError::SubscriptionError(format!("Invalid HTTP method: {}", e)))
}

/// Parse a GENA `TIMEOUT` header (`Second-1800`)
fn parse_timeout_header(value: &str) -> Option<u32> {
    value.trim().strip_prefix("Second-")?.parse().ok()
}
