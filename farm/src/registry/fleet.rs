//! The fleet view: one [`Device`] per identifier ever discovered.
//!
//! Each poll cycle lists attached devices, merges their state into the known
//! entities and schedules enrichment and agent checks through the devices'
//! own queues. Devices that disappear are marked OFFLINE, never removed.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use crate::agent::AgentLink;
use crate::bridge::{DeviceBridge, DiscoveredDevice};
use crate::device::{Device, DeviceInfo, DeviceState};

const PROP_MODEL: &str = "ro.product.model";
const PROP_OS_VERSION: &str = "ro.build.version.release";

/// Registry options
#[derive(Debug, Clone)]
pub struct Options {
    /// Minimum time between two agent checks of the same device
    pub agent_check_cooldown: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            agent_check_cooldown: Duration::from_secs(5),
        }
    }
}

pub struct DeviceRegistry {
    bridge: Arc<dyn DeviceBridge>,
    agent: Arc<dyn AgentLink>,
    options: Options,
    devices: RwLock<HashMap<String, Arc<Device>>>,
    enriching: Arc<Mutex<HashSet<String>>>,
    checking: Arc<Mutex<HashSet<String>>>,
    polling: AtomicBool,
    updates: watch::Sender<Vec<DeviceInfo>>,
    span: Span,
}

/// Clears the in-flight flag when a cycle ends, however it ends.
struct PollGuard<'a>(&'a AtomicBool);

impl Drop for PollGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl DeviceRegistry {
    pub fn new(
        bridge: Arc<dyn DeviceBridge>,
        agent: Arc<dyn AgentLink>,
        options: Options,
        span: Span,
    ) -> Self {
        let (updates, _) = watch::channel(Vec::new());
        Self {
            bridge,
            agent,
            options,
            devices: RwLock::new(HashMap::new()),
            enriching: Arc::new(Mutex::new(HashSet::new())),
            checking: Arc::new(Mutex::new(HashSet::new())),
            polling: AtomicBool::new(false),
            updates,
            span,
        }
    }

    pub fn get(&self, device_id: &str) -> Option<Arc<Device>> {
        self.devices
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(device_id)
            .cloned()
    }

    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.devices
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Attributes of every known device, sorted by id
    pub fn snapshot(&self) -> Vec<DeviceInfo> {
        let mut infos: Vec<DeviceInfo> = self.devices().iter().map(|d| d.info()).collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Receives the device list after every completed poll cycle
    pub fn subscribe(&self) -> watch::Receiver<Vec<DeviceInfo>> {
        self.updates.subscribe()
    }

    pub fn is_polling(&self) -> bool {
        self.polling.load(Ordering::SeqCst)
    }

    /// Run one discovery and reconciliation cycle.
    ///
    /// Returns `false` without doing anything when another cycle is still in
    /// flight. Never fails: discovery errors leave every entity untouched.
    pub async fn poll(&self) -> bool {
        if self.polling.swap(true, Ordering::SeqCst) {
            debug!(parent: &self.span, "Poll cycle still running, skipping tick");
            return false;
        }
        let _guard = PollGuard(&self.polling);

        self.poll_impl().instrument(self.span.clone()).await;
        true
    }

    /// Out-of-band poll, e.g. on operator request. Same guard as the timer.
    pub async fn refresh_now(&self) -> bool {
        info!(parent: &self.span, "Refresh requested");
        self.poll().await
    }

    async fn poll_impl(&self) {
        let discovered = match self.bridge.list_devices().await {
            Ok(discovered) => discovered,
            Err(e) => {
                warn!("Device discovery failed, keeping last known state: {}", e);
                return;
            }
        };

        self.reconcile(&discovered);

        for device in self.devices() {
            if device.state() != DeviceState::Online {
                continue;
            }
            self.schedule_enrichment(&device);
            self.schedule_agent_check(&device);
        }

        self.updates.send_replace(self.snapshot());
    }

    /// Merge one discovery listing into the known entities.
    pub fn reconcile(&self, discovered: &[DiscoveredDevice]) {
        let now = Utc::now();
        let mut devices = self.devices.write().unwrap_or_else(|e| e.into_inner());
        let visible: HashSet<&str> = discovered.iter().map(|d| d.id.as_str()).collect();

        for found in discovered {
            let device = devices.entry(found.id.clone()).or_insert_with(|| {
                info!(device = %found.id, "Discovered new device");
                let span = info_span!(parent: &self.span, "device", id = %found.id);
                Arc::new(Device::new(found.id.clone(), span))
            });

            device.update(|info| {
                if info.state != found.state {
                    info!(device = %found.id, "{:?} -> {:?}", info.state, found.state);
                }
                info.set_state(found.state);
                if info.model.is_none() {
                    info.model.clone_from(&found.model);
                }
                info.last_seen_at = Some(now);
            });
        }

        for (id, device) in devices.iter() {
            if visible.contains(id.as_str()) {
                continue;
            }
            device.update(|info| {
                if info.state != DeviceState::Offline {
                    info!(device = %id, "{:?} -> Offline (no longer listed)", info.state);
                    info.set_state(DeviceState::Offline);
                }
            });
        }
    }

    /// Queue an enrichment task unless one is already pending for the device.
    fn schedule_enrichment(&self, device: &Arc<Device>) {
        if !device.info().needs_enrichment() {
            return;
        }

        let id = device.id().to_string();
        {
            let mut enriching = self.enriching.lock().unwrap_or_else(|e| e.into_inner());
            if !enriching.insert(id.clone()) {
                return;
            }
        }

        let bridge = self.bridge.clone();
        let enriching = self.enriching.clone();
        let target = device.clone();
        let submitted = device.queue().enqueue(move || async move {
            enrich(bridge.as_ref(), &target).await;
            enriching
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(target.id());
            Ok(())
        });

        if let Err(e) = submitted {
            debug!(device = %id, "Enrichment not scheduled: {}", e);
            self.enriching
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&id);
        }
    }

    /// Queue an agent check if the cooldown since the last one has elapsed and
    /// none is still waiting on the device's queue.
    fn schedule_agent_check(&self, device: &Arc<Device>) {
        let id = device.id().to_string();
        if self
            .checking
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&id)
        {
            return;
        }

        let now = Utc::now();
        let cooldown = chrono::Duration::from_std(self.options.agent_check_cooldown)
            .unwrap_or(chrono::Duration::MAX);

        let due = device.update(|info| {
            let due = info
                .last_agent_check_at
                .is_none_or(|last| now.signed_duration_since(last) >= cooldown);
            if due {
                info.last_agent_check_at = Some(now);
            }
            due
        });
        if !due {
            return;
        }
        self.checking
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone());

        let agent = self.agent.clone();
        let checking = self.checking.clone();
        let target = device.clone();
        let submitted = device.queue().enqueue(move || async move {
            checking
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(target.id());
            match agent.ping(target.id()).await {
                Ok(()) => target.update(|info| info.set_agent_ready(true)),
                Err(e) => {
                    debug!(device = %target.id(), "Agent check failed, keeping last readiness: {}", e);
                }
            }
            Ok(())
        });

        if let Err(e) = submitted {
            debug!(device = %id, "Agent check not scheduled: {}", e);
            self.checking
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&id);
        }
    }

    /// Dispose every device queue. Entities stay readable.
    pub fn dispose(&self) {
        for device in self.devices() {
            device.queue().dispose();
        }
    }
}

/// Fetch model, OS version and screen size concurrently; each lookup may fail
/// on its own without affecting the others.
async fn enrich(bridge: &dyn DeviceBridge, device: &Device) {
    let id = device.id();
    let (model, os_version, resolution) = tokio::join!(
        bridge.get_prop(id, PROP_MODEL),
        bridge.get_prop(id, PROP_OS_VERSION),
        bridge.screen_size(id),
    );

    let model = model.inspect_err(|e| debug!(device = id, "model lookup failed: {}", e));
    let os_version = os_version.inspect_err(|e| debug!(device = id, "OS version lookup failed: {}", e));
    let resolution = resolution.inspect_err(|e| debug!(device = id, "screen size lookup failed: {}", e));

    device.update(|info| {
        if let Ok(Some(model)) = model {
            info.model.get_or_insert(model);
        }
        if let Ok(Some(os_version)) = os_version {
            info.os_version = Some(os_version);
        }
        if let Ok(Some(resolution)) = resolution {
            info.resolution = Some(resolution);
        }
    });
}
