//! Selected media server and renderer
//!
//! Changing a selection runs, in order: unsubscribe the old device, store
//! the new value, notify the observer, subscribe the new device. Observers
//! therefore never see a selection whose predecessor is still subscribed.

use std::sync::Arc;

use avcp_discovery::engine::EventSubscriber;
use avcp_discovery::Device;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

/// Called with the new selection after it is stored
pub type SelectionObserver = Arc<dyn Fn(Option<&Arc<Device>>) + Send + Sync>;

/// The current engine's subscriber, shared with selection state
///
/// The manager publishes into the slot after a successful initialize and
/// clears it on terminate. Selection changes made while the slot is empty
/// update state and observers without any subscription traffic. A fresh
/// engine starts without subscriptions; the lifecycle worker re-subscribes
/// the current selections once the new subscriber is published.
#[derive(Clone, Default)]
pub struct SubscriberSlot {
    inner: Arc<RwLock<Option<Arc<dyn EventSubscriber>>>>,
}

impl SubscriberSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, subscriber: Arc<dyn EventSubscriber>) {
        *self.inner.write() = Some(subscriber);
    }

    pub fn clear(&self) {
        self.inner.write().take();
    }

    pub fn get(&self) -> Option<Arc<dyn EventSubscriber>> {
        self.inner.read().clone()
    }

    pub fn is_set(&self) -> bool {
        self.inner.read().is_some()
    }
}

/// One selectable slot (server or renderer)
pub(crate) struct Selection {
    label: &'static str,
    current: RwLock<Option<Arc<Device>>>,
    /// Serializes whole transitions, observer call included
    transition: Mutex<()>,
    observer: Option<SelectionObserver>,
}

impl Selection {
    pub(crate) fn new(label: &'static str, observer: Option<SelectionObserver>) -> Self {
        Self {
            label,
            current: RwLock::new(None),
            transition: Mutex::new(()),
            observer,
        }
    }

    pub(crate) fn get(&self) -> Option<Arc<Device>> {
        self.current.read().clone()
    }

    pub(crate) fn is_selected(&self, device: &Device) -> bool {
        self.current
            .read()
            .as_ref()
            .is_some_and(|current| current.udn == device.udn)
    }

    pub(crate) fn set(&self, slot: &SubscriberSlot, next: Option<Arc<Device>>) {
        let _transition = self.transition.lock();
        let subscriber = slot.get();

        let previous = self.current.read().clone();
        if let (Some(previous), Some(subscriber)) = (&previous, &subscriber) {
            if let Err(e) = subscriber.unsubscribe(previous) {
                warn!("Failed to unsubscribe from {} {}: {}", self.label, previous.friendly_name, e);
            }
        }

        *self.current.write() = next.clone();
        debug!(
            "Selected {}: {}",
            self.label,
            next.as_ref().map_or("none", |device| device.friendly_name.as_str())
        );

        if let Some(observer) = &self.observer {
            observer(next.as_ref());
        }

        if let (Some(next), Some(subscriber)) = (&next, &subscriber) {
            if let Err(e) = subscriber.subscribe(next) {
                warn!("Failed to subscribe to {} {}: {}", self.label, next.friendly_name, e);
            }
        }
    }

    /// Subscribe the current selection through the slot's subscriber.
    ///
    /// Used after the engine behind the slot was replaced; the observer is
    /// not called since the selection itself did not change.
    pub(crate) fn resubscribe(&self, slot: &SubscriberSlot) {
        let _transition = self.transition.lock();
        let current = self.current.read().clone();

        if let (Some(current), Some(subscriber)) = (current, slot.get()) {
            debug!("Re-subscribing {} {}", self.label, current.friendly_name);
            if let Err(e) = subscriber.subscribe(&current) {
                warn!("Failed to re-subscribe to {} {}: {}", self.label, current.friendly_name, e);
            }
        }
    }
}
